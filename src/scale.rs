//! Percentage vs fraction normalization.
//!
//! Proficiency and engagement values arrive on two scales: [0,100]
//! percentages from storage and [0,1] fractions from internal math. Every
//! call site that may receive either goes through `to_fraction` so the
//! inference rule lives in exactly one place.

use tracing::warn;

/// Converts a possibly-percentage value to a [0,1] fraction.
///
/// Values above 1.0 are treated as percentages and divided by 100; values
/// in [0,1] pass through unchanged. The boundary case 1.0 is read as an
/// already-fractional 100%.
pub fn to_fraction(value: f64) -> f64 {
    if value > 1.0 {
        if value <= 100.0 {
            warn!(value, "treating value > 1 as a percentage");
        } else {
            warn!(value, "value above 100 clamped after percentage inference");
        }
        (value / 100.0).min(1.0)
    } else {
        value.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractions_pass_through() {
        assert_eq!(to_fraction(0.0), 0.0);
        assert_eq!(to_fraction(0.42), 0.42);
        assert_eq!(to_fraction(1.0), 1.0);
    }

    #[test]
    fn percentages_are_divided() {
        assert!((to_fraction(42.0) - 0.42).abs() < 1e-12);
        assert!((to_fraction(100.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_eq!(to_fraction(-3.0), 0.0);
        assert_eq!(to_fraction(250.0), 1.0);
    }
}
