//! Rolling-mean signal smoothing

use ring_buffer::{RingBuffer, RingBufferError};

/// Running sum is recomputed from the window after this many pushes to
/// stop floating-point drift from accumulating
const RESYNC_INTERVAL: usize = 1024;

/// Arithmetic mean over the last `window` samples
///
/// O(1) per push. Non-finite samples are ignored so a single bad frame
/// cannot poison the window.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: RingBuffer<f32>,
    sum: f64,
    since_resync: usize,
}

impl RollingMean {
    pub fn new(window: usize) -> Result<Self, RingBufferError> {
        Ok(Self {
            window: RingBuffer::new(window)?,
            sum: 0.0,
            since_resync: 0,
        })
    }

    /// Add a sample and return the updated mean
    ///
    /// Until the window fills, the mean covers the samples seen so far.
    pub fn push(&mut self, sample: f32) -> f32 {
        if sample.is_finite() {
            if let Some(evicted) = self.window.push(sample) {
                self.sum -= f64::from(evicted);
            }
            self.sum += f64::from(sample);

            self.since_resync += 1;
            if self.since_resync >= RESYNC_INTERVAL.max(self.window.capacity()) {
                self.sum = self.window.iter().map(|&v| f64::from(v)).sum();
                self.since_resync = 0;
            }
        }
        self.mean().unwrap_or(sample)
    }

    /// Current mean, `None` before the first sample
    pub fn mean(&self) -> Option<f32> {
        if self.window.is_empty() {
            None
        } else {
            Some((self.sum / self.window.len() as f64) as f32)
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window.capacity()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.since_resync = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_window_rejected() {
        assert!(RollingMean::new(0).is_err());
    }

    #[test]
    fn test_partial_then_full_window() {
        let mut mean = RollingMean::new(3).unwrap();
        assert_eq!(mean.mean(), None);
        assert_eq!(mean.push(3.0), 3.0);
        assert_eq!(mean.push(6.0), 4.5);
        assert_eq!(mean.push(9.0), 6.0);
        // 3.0 falls out of the window
        assert_eq!(mean.push(12.0), 9.0);
        assert_eq!(mean.len(), 3);
    }

    #[test]
    fn test_non_finite_samples_ignored() {
        let mut mean = RollingMean::new(4).unwrap();
        mean.push(10.0);
        assert_eq!(mean.push(f32::NAN), 10.0);
        assert_eq!(mean.push(f32::INFINITY), 10.0);
        assert_eq!(mean.len(), 1);

        let mut empty = RollingMean::new(4).unwrap();
        assert!(empty.push(f32::NAN).is_nan());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_reset() {
        let mut mean = RollingMean::new(2).unwrap();
        mean.push(50.0);
        mean.push(60.0);
        mean.reset();
        assert_eq!(mean.mean(), None);
        assert_eq!(mean.push(1.0), 1.0);
    }

    #[test]
    fn test_long_run_does_not_drift() {
        let mut mean = RollingMean::new(10).unwrap();
        for i in 0..100_000 {
            mean.push(if i % 2 == 0 { 0.1 } else { 1e6 });
        }
        for _ in 0..10 {
            mean.push(0.5);
        }
        assert!((mean.mean().unwrap() - 0.5).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_mean_of_last_window(
            samples in proptest::collection::vec(-100.0f32..100.0, 1..200),
            window in 1usize..20,
        ) {
            let mut mean = RollingMean::new(window).unwrap();
            let mut last = 0.0;
            for &s in &samples {
                last = mean.push(s);
            }
            let tail = &samples[samples.len().saturating_sub(window)..];
            let expected = tail.iter().map(|&v| f64::from(v)).sum::<f64>() / tail.len() as f64;
            prop_assert!((f64::from(last) - expected).abs() < 1e-3);
        }
    }
}
