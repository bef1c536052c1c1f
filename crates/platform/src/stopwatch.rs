//! Elapsed-time measurement.

/// A start/stop stopwatch reporting elapsed microseconds.
///
/// On hardware this wraps a triple-timer counter; on the host,
/// [`StdStopwatch`] wraps `std::time::Instant`.
pub trait Stopwatch {
    /// Start (or restart) the stopwatch.
    fn start(&mut self);

    /// Stop the stopwatch, freezing the elapsed value.
    fn stop(&mut self);

    /// Elapsed microseconds between the last start and stop (or now, if
    /// still running).
    fn elapsed_us(&self) -> u64;
}

/// [`Stopwatch`] over `std::time::Instant`.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Default)]
pub struct StdStopwatch {
    started: Option<std::time::Instant>,
    frozen_us: u64,
}

#[cfg(any(test, feature = "std"))]
impl Stopwatch for StdStopwatch {
    fn start(&mut self) {
        self.frozen_us = 0;
        self.started = Some(std::time::Instant::now());
    }

    fn stop(&mut self) {
        if let Some(t0) = self.started.take() {
            self.frozen_us = t0.elapsed().as_micros() as u64;
        }
    }

    fn elapsed_us(&self) -> u64 {
        match self.started {
            Some(t0) => t0.elapsed().as_micros() as u64,
            None => self.frozen_us,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stop_freezes_the_elapsed_value() {
        let mut sw = StdStopwatch::default();
        sw.start();
        sw.stop();
        let frozen = sw.elapsed_us();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(sw.elapsed_us(), frozen);
    }

    #[test]
    fn restart_clears_the_previous_measurement() {
        let mut sw = StdStopwatch::default();
        sw.start();
        std::thread::sleep(std::time::Duration::from_millis(1));
        sw.stop();
        sw.start();
        sw.stop();
        assert!(sw.elapsed_us() < 1_000_000);
    }
}
