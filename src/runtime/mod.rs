//! The concurrent sensor/actuator runtime: four cooperative loops plus the
//! supervisor that owns their lifecycle.
//!
//! Every loop follows the same shape: do one tick of work, then wait on a
//! `select!` over the cancellation token and a fixed sleep. Loops never
//! hold the shared-state lock across I/O and never take each other down.

pub mod illumination;
pub mod presence;
pub mod ranging;
pub mod supervisor;
pub mod telemetry;

pub use ranging::RangingFactory;
pub use supervisor::{Peripherals, Supervisor};

/// Exponential moving average with `retain` weight kept on the previous
/// value. With no previous value the sample passes through unchanged, so
/// the output always stays within the hull of samples seen so far.
pub fn ewma(previous: Option<f64>, sample: f64, retain: f64) -> f64 {
    match previous {
        Some(prev) => retain * prev + (1.0 - retain) * sample,
        None => sample,
    }
}

/// Round to `decimals` places for publication.
pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewma_passes_first_sample_through() {
        assert_eq!(ewma(None, 2.5, 0.7), 2.5);
    }

    #[test]
    fn ewma_stays_within_input_hull() {
        let inputs = [2.5, 2.4, 2.8, 1.0, 1.2, 3.5, 0.4, 0.4, 2.9];
        let mut smoothed = None;
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for sample in inputs {
            lo = lo.min(sample);
            hi = hi.max(sample);
            let value = ewma(smoothed, sample, 0.7);
            assert!(value >= lo && value <= hi, "{} outside [{}, {}]", value, lo, hi);
            smoothed = Some(value);
        }
    }

    #[test]
    fn ewma_weights_previous_value() {
        let value = ewma(Some(2.0), 1.0, 0.7);
        assert!((value - 1.7).abs() < 1e-12);
    }

    #[test]
    fn rounding_for_publication() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(74.25, 1), 74.3);
        assert_eq!(round_to(-0.0004, 3), -0.0);
    }
}
