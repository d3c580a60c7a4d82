//! Wall-clock timing of stages and checks.

use std::time::{Duration, Instant};

/// Measures how long a named activity takes.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts timing `name`.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time since start in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The activity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer, returning the elapsed milliseconds.
    #[must_use]
    pub fn finish(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!(activity = %self.name, elapsed_ms = elapsed, "Finished");
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("Coaddition");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(timer.name(), "Coaddition");
        assert!(timer.finish() >= 10);
    }
}
