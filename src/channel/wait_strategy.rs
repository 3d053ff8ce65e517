//! Pluggable idling policies for the [LogReader](crate::LogReader)'s tailing loop.\
//! The offset-tracking algorithm only tells *when* it is idle (nothing new in the log) or busy (some bytes arrived);
//! how much CPU is burnt -- or how much latency is traded -- while waiting is up to the [WaitStrategy].

use std::{
    fmt::Debug,
    time::Duration,
};


/// Decides what the reader does between read attempts
pub trait WaitStrategy: Debug + Send {

    /// Called after a read that returned zero bytes -- the writer didn't catch up yet.
    /// Returning means "retry now".
    fn on_empty_read(&mut self);

    /// Called after a read that delivered some bytes, before the next read attempt
    fn on_data(&mut self) {}

    /// a short name, for logs & benchmarks
    fn name(&self) -> &'static str;
}


/// Busy poll: retries right away, only hinting the CPU it is spinning.\
/// Lowest detection latency, one fully used core.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpin;

impl WaitStrategy for BusySpin {
    #[inline(always)]
    fn on_empty_read(&mut self) {
        std::hint::spin_loop();
    }
    fn name(&self) -> &'static str {
        "busy-spin"
    }
}


/// Gives the rest of the time slice back to the OS scheduler before retrying
#[derive(Debug, Default, Clone, Copy)]
pub struct Yielding;

impl WaitStrategy for Yielding {
    #[inline(always)]
    fn on_empty_read(&mut self) {
        std::thread::yield_now();
    }
    fn name(&self) -> &'static str {
        "yielding"
    }
}


/// Sleeps a fixed interval between *every* pair of read attempts -- empty or not.\
/// This is how the continuous stream consumer paces itself.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    interval: Duration,
}

impl Pacing {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl WaitStrategy for Pacing {
    fn on_empty_read(&mut self) {
        std::thread::sleep(self.interval);
    }
    fn on_data(&mut self) {
        std::thread::sleep(self.interval);
    }
    fn name(&self) -> &'static str {
        "pacing"
    }
}


/// Spins for a few empty reads, then sleeps for exponentially growing intervals -- capped at `max` --
/// resetting as soon as data shows up
#[derive(Debug, Clone, Copy)]
pub struct BoundedBackoff {
    min:         Duration,
    max:         Duration,
    empty_reads: u32,
    current:     Duration,
}

impl BoundedBackoff {

    /// empty reads answered by spinning, before sleeping kicks in
    const SPIN_LIMIT: u32 = 64;

    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max:         max.max(min),
            empty_reads: 0,
            current:     min,
        }
    }

    /// the sleep the next empty read (past the spinning phase) will take
    pub fn current_delay(&self) -> Duration {
        self.current
    }
}

impl Default for BoundedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_micros(10), Duration::from_millis(10))
    }
}

impl WaitStrategy for BoundedBackoff {
    fn on_empty_read(&mut self) {
        if self.empty_reads < Self::SPIN_LIMIT {
            self.empty_reads += 1;
            std::hint::spin_loop();
            return
        }
        std::thread::sleep(self.current);
        self.current = (self.current * 2).min(self.max);
    }
    fn on_data(&mut self) {
        self.empty_reads = 0;
        self.current = self.min;
    }
    fn name(&self) -> &'static str {
        "bounded-backoff"
    }
}


/// Unit tests the [wait_strategy](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    /// delays double after the spinning phase, never exceed `max` & reset on data
    #[cfg_attr(not(doc),test)]
    fn bounded_backoff_is_bounded() {
        let min = Duration::from_nanos(1);
        let max = Duration::from_nanos(8);
        let mut backoff = BoundedBackoff::new(min, max);
        for _ in 0..BoundedBackoff::SPIN_LIMIT {
            backoff.on_empty_read();
        }
        assert_eq!(backoff.current_delay(), min, "spinning shouldn't grow the delay");
        let observed: Vec<Duration> = (0..6)
            .map(|_| { backoff.on_empty_read(); backoff.current_delay() })
            .collect();
        let expected: Vec<Duration> = [2, 4, 8, 8, 8, 8].into_iter().map(Duration::from_nanos).collect();
        assert_eq!(observed, expected, "wrong backoff progression");
        backoff.on_data();
        assert_eq!(backoff.current_delay(), min, "data should reset the backoff");
    }

    /// `max` smaller than `min` is taken as `min`
    #[cfg_attr(not(doc),test)]
    fn inverted_bounds() {
        let mut backoff = BoundedBackoff::new(Duration::from_nanos(5), Duration::from_nanos(1));
        for _ in 0..BoundedBackoff::SPIN_LIMIT+3 {
            backoff.on_empty_read();
        }
        assert_eq!(backoff.current_delay(), Duration::from_nanos(5));
    }

}
