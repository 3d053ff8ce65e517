//! Common types & constants across this crate

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering::Relaxed},
    },
    time::Duration,
};


/// The one file shared by the producer & the consumer
pub const LOG_FILE_PATH: &str = "/tmp/deadbeef.log";

/// How many records the handshake benchmark round-trips
pub const BENCHMARK_RECORDS: usize = 128;

/// The continuous stream's "1 time unit": one record produced -- and one read attempt -- per interval
pub const PACING_INTERVAL: Duration = Duration::from_secs(1);


/// A one-way "please stop" signal, shared between a harness and the threads it spawned.\
/// Once asserted, it stays asserted.
#[derive(Debug, Clone)]
pub struct Cancellation {
    keep_running: Arc<AtomicBool>,
}

impl Cancellation {

    pub fn new() -> Self {
        Self { keep_running: Arc::new(AtomicBool::new(true)) }
    }

    /// Asks every holder of this signal to wrap up their loops
    pub fn cancel(&self) {
        self.keep_running.store(false, Relaxed);
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        !self.keep_running.load(Relaxed)
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}


/// Unit tests the [types](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    /// clones observe the cancellation of any other clone
    #[cfg_attr(not(doc),test)]
    fn cancellation_is_shared() {
        let cancellation = Cancellation::new();
        let observer = cancellation.clone();
        assert!(!observer.is_cancelled(), "A fresh signal should not be asserted");
        cancellation.cancel();
        assert!(observer.is_cancelled(), "Cancellation wasn't seen by a clone");
        cancellation.cancel();
        assert!(observer.is_cancelled(), "Cancelling twice should be harmless");
    }

}
