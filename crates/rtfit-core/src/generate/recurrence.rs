//! Detecting individuals that repeat previously evaluated ones.

use crate::config::RecurrenceConfig;
use crate::params::ParameterVector;

/// Whether two values agree within the label's tolerances.
fn values_match(a: f64, b: f64, rtol: f64, atol: f64) -> bool {
    (a - b).abs() <= atol + rtol * b.abs()
}

/// Two individuals are equal iff every label matches within the configured
/// `(rtol, atol)`. Per-label overrides take precedence over the global
/// tolerances; comparison happens in base units so mixed-unit tables agree.
pub fn is_recurrent(candidate: &ParameterVector, previous: &ParameterVector, config: &RecurrenceConfig) -> bool {
    if candidate.len() != previous.len() {
        return false;
    }
    for (label, value) in candidate.iter() {
        let Some(other) = previous.get(label) else {
            return false;
        };
        let (rtol, atol) = match config.per_label.get(label) {
            Some(tolerance) => (tolerance.rtol, tolerance.atol),
            None => (config.rtol, config.atol),
        };
        if !values_match(value.in_base(), other.in_base(), rtol, atol) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tolerance;
    use crate::units::{Quantity, Unit};

    fn vector(mass: f64, scale: f64) -> ParameterVector {
        let mut v = ParameterVector::new();
        v.push("dust_mass", Quantity::new(mass, Unit::SolarMass));
        v.push("scale", Quantity::dimensionless(scale));
        v
    }

    #[test]
    fn test_exact_match() {
        let config = RecurrenceConfig::default();
        assert!(is_recurrent(&vector(3e7, 0.5), &vector(3e7, 0.5), &config));
    }

    #[test]
    fn test_within_rtol() {
        let config = RecurrenceConfig {
            rtol: 1e-3,
            ..Default::default()
        };
        assert!(is_recurrent(
            &vector(3e7 * (1.0 + 5e-4), 0.5),
            &vector(3e7, 0.5),
            &config
        ));
        assert!(!is_recurrent(
            &vector(3e7 * 1.01, 0.5),
            &vector(3e7, 0.5),
            &config
        ));
    }

    #[test]
    fn test_one_label_differs() {
        let config = RecurrenceConfig::default();
        assert!(!is_recurrent(&vector(3e7, 0.5), &vector(3e7, 0.7), &config));
    }

    #[test]
    fn test_per_label_override() {
        let mut config = RecurrenceConfig {
            rtol: 0.0,
            atol: 0.0,
            ..Default::default()
        };
        config.per_label.insert(
            "scale".to_string(),
            Tolerance { rtol: 0.0, atol: 0.3 },
        );
        // scale differs by 0.2 (within its override), mass is exact
        assert!(is_recurrent(&vector(3e7, 0.5), &vector(3e7, 0.7), &config));
        // mass differs and has no override
        assert!(!is_recurrent(&vector(3e7 + 1.0, 0.5), &vector(3e7, 0.5), &config));
    }

    #[test]
    fn test_unit_conversion_before_compare() {
        let config = RecurrenceConfig::default();
        let mut a = ParameterVector::new();
        a.push("walltime", Quantity::new(1.0, Unit::Hour));
        let mut b = ParameterVector::new();
        b.push("walltime", Quantity::seconds(3600.0));
        assert!(is_recurrent(&a, &b, &config));
    }
}
