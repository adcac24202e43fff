//! Physical quantities as `(f64, Unit)` pairs.
//!
//! The unit surface is deliberately small: parse, convert, multiply, divide
//! and compare. Free parameters, memory sizes and wall times all flow through
//! `Quantity`, and every parameter table column records its unit in the
//! header.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Dimensionless,
    Memory,
    Time,
    Length,
    Mass,
    Luminosity,
}

/// A named unit with a conversion factor to its dimension's base unit.
///
/// Base units: byte, second, metre, kilogram, watt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    None,
    // Memory
    Byte,
    Kibibyte,
    Mebibyte,
    Gibibyte,
    Tebibyte,
    // Time
    Second,
    Minute,
    Hour,
    // Length
    Metre,
    Micron,
    Parsec,
    Kiloparsec,
    AstronomicalUnit,
    // Mass
    Kilogram,
    SolarMass,
    // Luminosity
    Watt,
    SolarLuminosity,
}

impl Unit {
    pub fn dimension(self) -> Dimension {
        use Unit::*;
        match self {
            None => Dimension::Dimensionless,
            Byte | Kibibyte | Mebibyte | Gibibyte | Tebibyte => Dimension::Memory,
            Second | Minute | Hour => Dimension::Time,
            Metre | Micron | Parsec | Kiloparsec | AstronomicalUnit => Dimension::Length,
            Kilogram | SolarMass => Dimension::Mass,
            Watt | SolarLuminosity => Dimension::Luminosity,
        }
    }

    /// Conversion factor to the base unit of this dimension.
    pub fn to_base(self) -> f64 {
        use Unit::*;
        match self {
            None | Byte | Second | Metre | Kilogram | Watt => 1.0,
            Kibibyte => 1024.0,
            Mebibyte => 1024.0 * 1024.0,
            Gibibyte => 1024.0 * 1024.0 * 1024.0,
            Tebibyte => 1024.0 * 1024.0 * 1024.0 * 1024.0,
            Minute => 60.0,
            Hour => 3600.0,
            Micron => 1e-6,
            Parsec => 3.085_677_581_49e16,
            Kiloparsec => 3.085_677_581_49e19,
            AstronomicalUnit => 1.495_978_707e11,
            SolarMass => 1.988_47e30,
            SolarLuminosity => 3.828e26,
        }
    }

    pub fn symbol(self) -> &'static str {
        use Unit::*;
        match self {
            None => "",
            Byte => "B",
            Kibibyte => "KiB",
            Mebibyte => "MiB",
            Gibibyte => "GiB",
            Tebibyte => "TiB",
            Second => "s",
            Minute => "min",
            Hour => "h",
            Metre => "m",
            Micron => "micron",
            Parsec => "pc",
            Kiloparsec => "kpc",
            AstronomicalUnit => "AU",
            Kilogram => "kg",
            SolarMass => "Msun",
            Watt => "W",
            SolarLuminosity => "Lsun",
        }
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        use Unit::*;
        match s.trim() {
            "" | "1" => Ok(None),
            "B" | "byte" => Ok(Byte),
            "KiB" => Ok(Kibibyte),
            "MiB" => Ok(Mebibyte),
            "GiB" | "Gbyte" => Ok(Gibibyte),
            "TiB" => Ok(Tebibyte),
            "s" | "sec" => Ok(Second),
            "min" => Ok(Minute),
            "h" | "hour" => Ok(Hour),
            "m" => Ok(Metre),
            "micron" | "um" => Ok(Micron),
            "pc" => Ok(Parsec),
            "kpc" => Ok(Kiloparsec),
            "AU" => Ok(AstronomicalUnit),
            "kg" => Ok(Kilogram),
            "Msun" => Ok(SolarMass),
            "W" => Ok(Watt),
            "Lsun" => Ok(SolarLuminosity),
            other => Err(Error::Unit(format!("unknown unit '{other}'"))),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Unit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A value paired with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Quantity { value, unit }
    }

    pub fn dimensionless(value: f64) -> Self {
        Quantity { value, unit: Unit::None }
    }

    pub fn bytes(value: f64) -> Self {
        Quantity { value, unit: Unit::Byte }
    }

    pub fn gibibytes(value: f64) -> Self {
        Quantity { value, unit: Unit::Gibibyte }
    }

    pub fn seconds(value: f64) -> Self {
        Quantity { value, unit: Unit::Second }
    }

    pub fn dimension(&self) -> Dimension {
        self.unit.dimension()
    }

    /// The value expressed in the base unit of its dimension.
    pub fn in_base(&self) -> f64 {
        self.value * self.unit.to_base()
    }

    /// Convert to another unit of the same dimension.
    pub fn to(&self, unit: Unit) -> Result<Quantity> {
        if unit.dimension() != self.dimension() {
            return Err(Error::Unit(format!(
                "cannot convert {} to '{}'",
                self,
                unit.symbol()
            )));
        }
        Ok(Quantity::new(self.in_base() / unit.to_base(), unit))
    }

    /// Multiply by a dimensionless factor.
    pub fn scaled(&self, factor: f64) -> Quantity {
        Quantity::new(self.value * factor, self.unit)
    }

    /// Multiply two quantities; at least one side must be dimensionless.
    pub fn multiply(&self, other: &Quantity) -> Result<Quantity> {
        match (self.dimension(), other.dimension()) {
            (_, Dimension::Dimensionless) => Ok(self.scaled(other.value)),
            (Dimension::Dimensionless, _) => Ok(other.scaled(self.value)),
            _ => Err(Error::Unit(format!("cannot multiply {self} by {other}"))),
        }
    }

    /// Divide two quantities. Same dimension yields a dimensionless ratio; a
    /// dimensionless divisor preserves the unit.
    pub fn divide(&self, other: &Quantity) -> Result<Quantity> {
        if other.value == 0.0 {
            return Err(Error::Unit(format!("division of {self} by zero")));
        }
        if other.dimension() == Dimension::Dimensionless {
            return Ok(self.scaled(1.0 / other.value));
        }
        if self.dimension() == other.dimension() {
            return Ok(Quantity::dimensionless(self.in_base() / other.in_base()));
        }
        Err(Error::Unit(format!("cannot divide {self} by {other}")))
    }

    /// Add two quantities of the same dimension; the left unit wins.
    pub fn add(&self, other: &Quantity) -> Result<Quantity> {
        if self.dimension() != other.dimension() {
            return Err(Error::Unit(format!("cannot add {other} to {self}")));
        }
        Ok(Quantity::new(
            self.value + other.in_base() / self.unit.to_base(),
            self.unit,
        ))
    }

    /// Compare across units of the same dimension.
    pub fn compare(&self, other: &Quantity) -> Result<Ordering> {
        if self.dimension() != other.dimension() {
            return Err(Error::Unit(format!("cannot compare {self} with {other}")));
        }
        self.in_base()
            .partial_cmp(&other.in_base())
            .ok_or_else(|| Error::Unit(format!("cannot compare {self} with {other}")))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == Unit::None {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit.symbol())
        }
    }
}

impl FromStr for Quantity {
    type Err = Error;

    /// Parse strings of the form `"4.5 GiB"`, `"1e10 Msun"` or `"0.3"`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || "+-.eE".contains(c)))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| Error::Unit(format!("malformed quantity '{s}'")))?;
        Ok(Quantity::new(value, unit.parse()?))
    }
}

impl Serialize for Quantity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
