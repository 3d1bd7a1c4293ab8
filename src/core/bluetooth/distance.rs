//! Distance estimation from RSSI signal strength
//!
//! Empirical path-loss fit:
//! ```text
//! ratio    = rssi * 7.0 / tx_power
//! distance = ratio^10                       if ratio < 1.0
//!          = 0.89976 * ratio^20 + 0.111     otherwise
//! ```
//! The constants are reproduced as-is because the value is displayed directly.

use crate::core::bluetooth::constants::{DEFAULT_TX_POWER, DISTANCE_UNAVAILABLE};

/// Estimate the distance to a peripheral from its signal strength.
///
/// # Arguments
/// * `signal_strength` - Received signal strength in dBm, 0 when unknown
/// * `tx_power` - Expected signal strength at one metre in dBm
///
/// # Returns
/// The estimated distance, or `-1.0` when `signal_strength` is 0
pub fn estimate_distance(signal_strength: i16, tx_power: i16) -> f64 {
    if signal_strength == 0 {
        return DISTANCE_UNAVAILABLE;
    }

    let ratio = f64::from(signal_strength) * 7.0 / f64::from(tx_power);

    if ratio < 1.0 {
        ratio.powi(10)
    } else {
        0.89976 * ratio.powi(20) + 0.111
    }
}

/// [`estimate_distance`] with the default tx power of -59 dBm
pub fn estimate_distance_default(signal_strength: i16) -> f64 {
    estimate_distance(signal_strength, DEFAULT_TX_POWER)
}

/// Format a distance for display with two decimals
pub fn format_distance(distance: f64) -> String {
    format!("{:.2}", distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = expected.abs() * 1e-12 + 1e-12;
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_zero_signal_is_unavailable() {
        assert_eq!(estimate_distance(0, -59), -1.0);
        assert_eq!(estimate_distance(0, -70), -1.0);
        assert_eq!(estimate_distance(0, 1), -1.0);
    }

    #[test]
    fn test_near_branch() {
        // -5 * 7 / -59 = 0.593..., below 1.0
        let ratio = -5.0 * 7.0 / -59.0;
        assert!(ratio < 1.0);
        assert_close(estimate_distance(-5, -59), f64::powi(ratio, 10));
    }

    #[test]
    fn test_far_branch() {
        for rssi in [-40i16, -55, -90] {
            let ratio = f64::from(rssi) * 7.0 / -59.0;
            assert!(ratio >= 1.0);
            assert_close(
                estimate_distance(rssi, -59),
                0.89976 * f64::powi(ratio, 20) + 0.111,
            );
        }
    }

    #[test]
    fn test_default_tx_power() {
        assert_eq!(estimate_distance_default(-55), estimate_distance(-55, -59));
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(-1.0), "-1.00");
        assert_eq!(format_distance(0.123456), "0.12");
    }
}
