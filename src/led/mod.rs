//! Status, USB and disk activity LEDs

pub mod driver;
pub mod table;

pub use driver::LedRegisterDriver;
pub use table::{
    led_by_name, led_names, LedBinding, LedRegister, LogicalLed, DISK_LED_COUNT, LED_DATA_PORT,
    LED_INDEX_PORT, LED_PORT_COUNT,
};
