//! Randomized politeness delay observed before every request.

use std::time::Duration;

use rand::Rng;
use retriever_types::DelayRange;
use tracing::debug;

/// Sleeps for a uniformly random number of milliseconds within a
/// [`DelayRange`] (both bounds inclusive).
#[derive(Debug, Clone, Copy, Default)]
pub struct PolitenessDelay {
    range: DelayRange,
}

impl PolitenessDelay {
    pub fn new(range: DelayRange) -> Self {
        Self { range }
    }

    pub fn none() -> Self {
        Self::new(DelayRange::none())
    }

    pub fn range(&self) -> DelayRange {
        self.range
    }

    /// Draw the next delay.
    pub fn sample(&self) -> Duration {
        if self.range.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(self.range.min_ms()..=self.range.max_ms());
        self.range.clamp(millis)
    }

    /// Sleep for a freshly drawn delay and return it.
    pub async fn wait(&self) -> Duration {
        let delay = self.sample();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "delaying request");
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn samples_stay_within_bounds() {
        let delay = PolitenessDelay::new(DelayRange::new(5, 9).unwrap());
        for _ in 0..200 {
            let sample = delay.sample();
            assert!(sample >= Duration::from_millis(5) && sample <= Duration::from_millis(9), "{sample:?}");
        }

        let fixed = PolitenessDelay::new(DelayRange::new(7, 7).unwrap());
        assert_eq!(fixed.sample(), Duration::from_millis(7));
    }

    #[test]
    fn zero_range_never_sleeps() {
        assert_eq!(PolitenessDelay::none().sample(), Duration::ZERO);
    }

    #[tokio::test]
    async fn wait_sleeps_at_least_the_minimum() {
        let delay = PolitenessDelay::new(DelayRange::new(10, 15).unwrap());
        let started = Instant::now();
        let waited = delay.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(waited >= Duration::from_millis(10));
    }
}
