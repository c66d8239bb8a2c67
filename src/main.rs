//! panelctl
//!
//! Daemon and command-line tool for the storage appliance front panel.
//!
//! # Usage
//!
//! ```bash
//! # Run the panel daemon until SIGINT/SIGTERM
//! panelctl run
//!
//! # Show two lines of text
//! panelctl text "Backup" "42% complete"
//!
//! # Switch LEDs
//! panelctl led set red on
//! panelctl disk 3 on
//! panelctl led status
//!
//! # Print button events for 30 seconds
//! panelctl watch --seconds 30
//!
//! # Print the default configuration
//! panelctl config > /etc/panelctl.toml
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{info, warn};
use panelctl::serial::list_ports;
use panelctl::{led_by_name, PanelButtonEvent, PanelConfig, PanelController};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/panelctl.toml";

/// Front-panel control for storage appliances
#[derive(Parser)]
#[command(name = "panelctl")]
#[command(version)]
#[command(about = "Drive the appliance front panel: LCD, buttons and LEDs")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial device (overrides the configuration file)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate (overrides the configuration file)
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the panel daemon until interrupted
    Run,

    /// Write text to the LCD
    Text {
        /// First line
        line1: String,

        /// Second line
        line2: Option<String>,
    },

    /// Switch the LCD backlight
    Backlight {
        #[arg(value_enum)]
        state: Switch,
    },

    /// LED operations
    #[command(subcommand)]
    Led(LedCommands),

    /// Switch a disk activity LED
    Disk {
        /// Disk number (1-6)
        index: usize,

        #[arg(value_enum)]
        state: Switch,
    },

    /// Print button events as they happen
    Watch {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// List available serial ports
    Ports,

    /// Print the default configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum LedCommands {
    /// Switch one LED (green, red, usb, disk1-disk6)
    Set {
        name: String,

        #[arg(value_enum)]
        state: Switch,
    },

    /// Show the state of every LED
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn is_on(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Ports => print_ports(),
        Commands::Config => {
            print!("{}", PanelConfig::default().to_toml_string()?);
            Ok(())
        }
        ref command => {
            let config = load_config(&cli.config, cli.port.clone(), cli.baud)?;
            let device = config.serial.device.clone();
            let panel = tokio::task::spawn_blocking(move || PanelController::open(&config))
                .await
                .context("Open task failed")?
                .with_context(|| format!("Failed to open panel on {}", device))?;
            let panel = Arc::new(panel);

            let result = handle_panel_command(command, &panel).await;

            blocking(&panel, |panel| panel.close())
                .await
                .context("Failed to close panel")?;

            result
        }
    }
}

fn load_config(path: &Path, port: Option<String>, baud: Option<u32>) -> Result<PanelConfig> {
    let mut config = if path.exists() {
        PanelConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?
    } else {
        warn!("{} not found, using default configuration", path.display());
        PanelConfig::default()
    };

    if let Some(port) = port {
        config.serial.device = port;
    }
    if let Some(baud) = baud {
        config.serial.baud_rate = baud;
    }
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

async fn handle_panel_command(command: &Commands, panel: &Arc<PanelController>) -> Result<()> {
    match command {
        Commands::Run => run_daemon(panel).await,

        Commands::Text { line1, line2 } => {
            let text = match line2 {
                Some(line2) => format!("{}\n{}", line1, line2),
                None => line1.clone(),
            };
            blocking(panel, move |panel| panel.write_text(&text))
                .await
                .context("Failed to write text")?;
            println!("{} Text written", "[OK]".green().bold());
            Ok(())
        }

        Commands::Backlight { state } => {
            let on = state.is_on();
            blocking(panel, move |panel| panel.set_backlight(on)).await?;
            println!(
                "{} Backlight {}",
                "[OK]".green().bold(),
                if state.is_on() { "on" } else { "off" }
            );
            Ok(())
        }

        Commands::Led(LedCommands::Set { name, state }) => {
            let led = led_by_name(name)?;
            require_leds(panel)?;
            let on = state.is_on();
            blocking(panel, move |panel| panel.set_led(led, on)).await?;
            println!(
                "{} {} {}",
                "[OK]".green().bold(),
                led.to_string().white(),
                if state.is_on() { "on" } else { "off" }
            );
            Ok(())
        }

        Commands::Led(LedCommands::Status) => {
            require_leds(panel)?;
            println!("{}", "LED status".cyan().bold());
            for (led, on) in blocking(panel, |panel| panel.led_states()).await? {
                let state = if on { "on".green() } else { "off".dimmed() };
                println!("  {:<14} {}", led.to_string(), state);
            }
            Ok(())
        }

        Commands::Disk { index, state } => {
            let (index, on) = (*index, state.is_on());
            blocking(panel, move |panel| panel.set_disk_activity(index, on)).await?;
            if !panel.has_led_control() {
                println!("{} LED control unavailable (requires root)", "[WARN]".yellow().bold());
                return Ok(());
            }
            println!(
                "{} disk{} {}",
                "[OK]".green().bold(),
                index,
                if state.is_on() { "on" } else { "off" }
            );
            Ok(())
        }

        Commands::Watch { seconds } => watch(panel, *seconds).await,

        Commands::Ports | Commands::Config => Ok(()),
    }
}

/// Run a panel call that may wait on the serial link or port lock off the
/// async worker threads
async fn blocking<T, F>(panel: &Arc<PanelController>, call: F) -> Result<T>
where
    F: FnOnce(&PanelController) -> panelctl::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let panel = Arc::clone(panel);
    let value = tokio::task::spawn_blocking(move || call(&panel))
        .await
        .context("Panel task failed")??;
    Ok(value)
}

fn require_leds(panel: &PanelController) -> Result<()> {
    if !panel.has_led_control() {
        anyhow::bail!("LED control unavailable; run as root on the appliance");
    }
    Ok(())
}

async fn run_daemon(panel: &Arc<PanelController>) -> Result<()> {
    blocking(panel, |panel| panel.initialize())
        .await
        .context("Failed to initialize panel")?;
    panel.set_button_handler(|event: PanelButtonEvent| info!("{}", event));

    info!(
        "Panel daemon running (LEDs: {}, USB copy button: {})",
        availability(panel.has_led_control()),
        availability(panel.has_usb_copy_button())
    );

    shutdown_signal().await?;
    info!("Shutting down");

    if let Err(e) = blocking(panel, |panel| panel.write_text("Shutting down")).await {
        warn!("Failed to update display: {}", e);
    }
    panel.clear_button_handler();
    Ok(())
}

async fn watch(panel: &Arc<PanelController>, seconds: Option<u64>) -> Result<()> {
    panel.set_button_handler(|event: PanelButtonEvent| {
        let state = if event.pressed {
            "pressed".green().bold()
        } else {
            "released".dimmed()
        };
        println!(
            "{} {:<8} {:<8} {}",
            Local::now().format("%H:%M:%S%.3f").to_string().dimmed(),
            event.button.to_string().white().bold(),
            state,
            format!("[{}]", event.source).cyan()
        );
    });

    println!(
        "{} Watching buttons{} (Ctrl+C to stop)",
        "[*]".cyan().bold(),
        seconds
            .map(|s| format!(" for {}s", s))
            .unwrap_or_default()
    );

    match seconds {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                result = shutdown_signal() => result?,
            }
        }
        None => shutdown_signal().await?,
    }

    panel.clear_button_handler();
    Ok(())
}

fn availability(available: bool) -> &'static str {
    if available {
        "available"
    } else {
        "unavailable"
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to wait for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C")?;

    Ok(())
}

fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        return Ok(());
    }

    println!("{}", "Available serial ports:".green().bold());
    for port in ports {
        println!("  {} ({})", port.path.white().bold(), port.port_type);
        if let Some(product) = &port.product {
            println!("    Product: {}", product);
        }
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            println!("    VID:PID: {:04x}:{:04x}", vid, pid);
        }
    }

    Ok(())
}
