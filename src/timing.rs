//! Per-phase wall-clock timings of a step.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepTimings {
    pub index_build: Duration,
    pub query: Duration,
    pub commit: Duration,
}

impl StepTimings {
    pub fn total(&self) -> Duration {
        self.index_build + self.query + self.commit
    }

    /// Adds another step's timings, for running totals.
    pub fn accumulate(&mut self, other: &StepTimings) {
        self.index_build += other.index_build;
        self.query += other.query;
        self.commit += other.commit;
    }
}

/// Runs `f` and returns its result with the elapsed time.
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate() {
        let step = StepTimings {
            index_build: Duration::from_millis(2),
            query: Duration::from_millis(5),
            commit: Duration::from_millis(1),
        };
        let mut total = StepTimings::default();
        total.accumulate(&step);
        total.accumulate(&step);
        assert_eq!(total.total(), Duration::from_millis(16));
    }
}
