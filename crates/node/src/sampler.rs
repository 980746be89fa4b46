//! Noise-averaged analog sampling.

use std::time::Duration;

use anyhow::Result;

use crate::ports::AnalogPort;

/// Take `count` readings from `port`, pausing `settle` after each so the
/// input can settle, and return the integer-truncated mean.
///
/// `count` must be positive; zero is a caller bug, not a runtime condition.
/// Individual reads are not retried, so a stuck sensor biases the average
/// instead of failing the cycle.
pub async fn sample_average<P: AnalogPort>(
    port: &mut P,
    count: u32,
    settle: Duration,
) -> Result<i32> {
    assert!(count > 0, "sample count must be positive");

    let mut sum: i64 = 0;
    for _ in 0..count {
        sum += i64::from(port.read()?);
        tokio::time::sleep(settle).await;
    }
    Ok((sum / i64::from(count)) as i32)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    /// Port that replays a fixed script of readings, then errors.
    struct ScriptedPort {
        reads: VecDeque<i32>,
    }

    impl ScriptedPort {
        fn new(reads: &[i32]) -> Self {
            Self {
                reads: reads.iter().copied().collect(),
            }
        }
    }

    impl AnalogPort for ScriptedPort {
        fn read(&mut self) -> Result<i32> {
            self.reads.pop_front().ok_or_else(|| anyhow!("script exhausted"))
        }
    }

    /// Port that always reads the same value.
    struct ConstantPort(i32);

    impl AnalogPort for ConstantPort {
        fn read(&mut self) -> Result<i32> {
            Ok(self.0)
        }
    }

    // -- Averaging ----------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn constant_port_returns_exact_value() {
        let mut port = ConstantPort(1912);
        for count in [1, 7, 1000] {
            let avg = sample_average(&mut port, count, Duration::from_millis(10))
                .await
                .unwrap();
            assert_eq!(avg, 1912, "count={count}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mean_is_integer_truncated() {
        let mut port = ScriptedPort::new(&[1, 2]);
        let avg = sample_average(&mut port, 2, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(avg, 1); // 3 / 2
    }

    #[tokio::test(start_paused = true)]
    async fn large_sums_do_not_overflow() {
        // 1000 samples near full i32 range would overflow a 32-bit sum.
        let mut port = ConstantPort(i32::MAX);
        let avg = sample_average(&mut port, 1000, Duration::ZERO).await.unwrap();
        assert_eq!(avg, i32::MAX);
    }

    // -- Pacing -------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn settles_after_every_read() {
        let settle = Duration::from_millis(10);
        let start = Instant::now();
        let mut port = ConstantPort(100);
        sample_average(&mut port, 50, settle).await.unwrap();
        assert_eq!(start.elapsed(), settle * 50);
    }

    // -- Contract -----------------------------------------------------------

    #[tokio::test]
    #[should_panic(expected = "sample count must be positive")]
    async fn zero_count_panics() {
        let mut port = ConstantPort(0);
        let _ = sample_average(&mut port, 0, Duration::ZERO).await;
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_propagates() {
        let mut port = ScriptedPort::new(&[10, 20]);
        let err = sample_average(&mut port, 3, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("script exhausted"), "{err}");
    }
}
