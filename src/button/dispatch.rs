//! Bounded, fault-isolating job dispatch
//!
//! A [`Dispatcher`] owns one worker thread fed by a bounded queue. Jobs run
//! in submission order. `submit` never blocks: a full queue drops the job.
//! A panicking job is logged and the worker carries on.

use log::{error, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Queue depth used for button event lanes
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

pub struct Dispatcher {
    name: String,
    sender: Mutex<Option<SyncSender<Job>>>,
}

impl Dispatcher {
    /// Spawn a worker thread named `name` with a queue of `depth` jobs
    pub fn spawn(name: &str, depth: usize) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(depth);
        let worker_name = name.to_string();

        thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in receiver {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!(
                        "{}: handler panicked: {}",
                        worker_name,
                        panic_message(payload.as_ref())
                    );
                }
            }
        })?;

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job. Returns `false` if it was dropped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return false;
        };

        match sender.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("{}: dispatch queue full, dropping event", self.name);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Stop accepting jobs. Queued jobs still run; the worker then exits.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
