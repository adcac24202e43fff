//! Free parameters: labels, ranges, scales and parameter vectors.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::units::Quantity;

/// Axis scaling for sampling and mutation of one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Linear,
    Log,
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Linear
    }
}

/// Inclusive value range of one free parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: Quantity,
    pub max: Quantity,
}

impl Range {
    pub fn new(min: Quantity, max: Quantity) -> Result<Self> {
        if min.dimension() != max.dimension() {
            return Err(Error::Configuration(format!(
                "range bounds {min} and {max} have different dimensions"
            )));
        }
        if min.in_base() > max.in_base() {
            return Err(Error::Configuration(format!(
                "range minimum {min} exceeds maximum {max}"
            )));
        }
        Ok(Range { min, max })
    }

    /// Bounds expressed in the minimum's unit.
    pub fn bounds(&self) -> (f64, f64) {
        (self.min.value, self.max.in_base() / self.min.unit.to_base())
    }

    pub fn clamp(&self, value: f64) -> f64 {
        let (lo, hi) = self.bounds();
        value.clamp(lo, hi)
    }

    pub fn contains(&self, q: &Quantity) -> bool {
        let v = q.in_base();
        v >= self.min.in_base() && v <= self.max.in_base()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// An ordered mapping from free-parameter label to value.
///
/// Order follows the label declaration order of the fitting run, which also
/// fixes the column order of parameter tables and the locus of single-point
/// crossover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    entries: Vec<(String, Quantity)>,
}

impl ParameterVector {
    pub fn new() -> Self {
        ParameterVector { entries: Vec::new() }
    }

    pub fn push(&mut self, label: impl Into<String>, value: Quantity) {
        let label = label.into();
        if let Some(entry) = self.entries.iter_mut().find(|(l, _)| *l == label) {
            entry.1 = value;
        } else {
            self.entries.push((label, value));
        }
    }

    pub fn get(&self, label: &str) -> Option<&Quantity> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, q)| q)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Quantity)> {
        self.entries.iter().map(|(l, q)| (l.as_str(), q))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ParameterVector {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(String, Quantity)> for ParameterVector {
    fn from_iter<T: IntoIterator<Item = (String, Quantity)>>(iter: T) -> Self {
        let mut vector = ParameterVector::new();
        for (label, value) in iter {
            vector.push(label, value);
        }
        vector
    }
}

/// A parameter vector with the name the generator assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub name: String,
    pub parameters: ParameterVector,
}

impl Individual {
    pub fn new(name: impl Into<String>, parameters: ParameterVector) -> Self {
        Individual {
            name: name.into(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    #[test]
    fn test_vector_preserves_order() {
        let mut vector = ParameterVector::new();
        vector.push("dust_mass", Quantity::new(3e7, Unit::SolarMass));
        vector.push("fuv_young", Quantity::new(1e15, Unit::Watt));
        vector.push("dust_mass", Quantity::new(4e7, Unit::SolarMass));
        let labels: Vec<_> = vector.labels().collect();
        assert_eq!(labels, vec!["dust_mass", "fuv_young"]);
        assert_eq!(vector.get("dust_mass").unwrap().value, 4e7);
    }

    #[test]
    fn test_range_validation() {
        let ok = Range::new(Quantity::dimensionless(1.0), Quantity::dimensionless(4.0));
        assert!(ok.is_ok());
        let flipped = Range::new(Quantity::dimensionless(4.0), Quantity::dimensionless(1.0));
        assert!(flipped.is_err());
        let mixed = Range::new(Quantity::seconds(1.0), Quantity::gibibytes(4.0));
        assert!(mixed.is_err());
    }

    #[test]
    fn test_range_contains_across_units() {
        let range = Range::new(
            Quantity::new(1.0, Unit::Minute),
            Quantity::new(1.0, Unit::Hour),
        )
        .unwrap();
        assert!(range.contains(&Quantity::seconds(120.0)));
        assert!(!range.contains(&Quantity::seconds(10.0)));
    }
}
