//! Unit-safe angular quantity.
//!
//! [`Angle`] always stores radians. Every other unit is a pure conversion on the
//! way in ([`Angle::new`], [`Angle::parse`]) or on the way out
//! ([`Angle::as_unit`] and the per-unit accessors).
//!
//! Supported units:
//!
//! | Unit   | Meaning                                  |
//! |--------|------------------------------------------|
//! | `RAD`  | radians                                  |
//! | `DEG`  | decimal degrees                          |
//! | `PDEG` | pseudo degrees `ddd.mmss`                |
//! | `GON`  | gradians, 400 per circle                 |
//! | `MIL`  | NATO mils, 6400 per circle               |
//! | `SEC`  | arcseconds                               |
//! | `DMS`  | text `D-MM-SS`                           |
//! | `NMEA` | `DDMM.mmmm` as used by GNSS receivers     |

use crate::error::AngleFormatError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Radian to arcsecond factor.
pub const RO: f64 = 180.0 * 3600.0 / PI;

/// Full circle in radians.
pub const PI2: f64 = 2.0 * PI;

static DMS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?[0-9]{1,3}(-[0-9]{1,2}){0,2}$").unwrap_or_else(|_| unreachable!())
});

/// Angular unit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AngleUnit {
    /// Radians
    Rad,
    /// Decimal degrees
    Deg,
    /// Pseudo degrees `ddd.mmss`
    Pdeg,
    /// Gradians
    Gon,
    /// NATO mils
    Mil,
    /// Arcseconds
    Sec,
    /// `D-MM-SS` text
    Dms,
    /// `DDMM.mmmm`
    Nmea,
}

impl AngleUnit {
    /// Upper-case tag used in configuration files and writer options.
    pub fn tag(self) -> &'static str {
        match self {
            AngleUnit::Rad => "RAD",
            AngleUnit::Deg => "DEG",
            AngleUnit::Pdeg => "PDEG",
            AngleUnit::Gon => "GON",
            AngleUnit::Mil => "MIL",
            AngleUnit::Sec => "SEC",
            AngleUnit::Dms => "DMS",
            AngleUnit::Nmea => "NMEA",
        }
    }
}

impl FromStr for AngleUnit {
    type Err = AngleFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RAD" => Ok(AngleUnit::Rad),
            "DEG" => Ok(AngleUnit::Deg),
            "PDEG" => Ok(AngleUnit::Pdeg),
            "GON" => Ok(AngleUnit::Gon),
            "MIL" => Ok(AngleUnit::Mil),
            "SEC" => Ok(AngleUnit::Sec),
            "DMS" => Ok(AngleUnit::Dms),
            "NMEA" => Ok(AngleUnit::Nmea),
            _ => Err(AngleFormatError::UnknownUnit(s.to_string())),
        }
    }
}

impl fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An angle rendered in a specific unit.
#[derive(Debug, Clone, PartialEq)]
pub enum AngleRepr {
    /// Numeric units
    Number(f64),
    /// DMS text
    Text(String),
}

impl fmt::Display for AngleRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AngleRepr::Number(value) => match f.precision() {
                Some(p) => write!(f, "{:.*}", p, value),
                None => write!(f, "{}", value),
            },
            AngleRepr::Text(text) => f.write_str(text),
        }
    }
}

/// Immutable angle stored in radians.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Angle(f64);

impl Angle {
    /// Build an angle from a numeric value in `unit`.
    ///
    /// # Errors
    /// `DMS` is a text format; use [`Angle::parse`] for it.
    pub fn new(value: f64, unit: AngleUnit) -> Result<Self, AngleFormatError> {
        let rad = match unit {
            AngleUnit::Rad => value,
            AngleUnit::Deg => deg2rad(value),
            AngleUnit::Pdeg => pdeg2rad(value),
            AngleUnit::Gon => gon2rad(value),
            AngleUnit::Mil => mil2rad(value),
            AngleUnit::Sec => sec2rad(value),
            AngleUnit::Nmea => nmea2rad(value),
            AngleUnit::Dms => {
                return Err(AngleFormatError::ValueKind {
                    unit: "DMS",
                    expected: "text",
                })
            }
        };
        Ok(Angle(rad))
    }

    /// Build an angle from text in `unit`. Numeric units accept a decimal literal.
    pub fn parse(text: &str, unit: AngleUnit) -> Result<Self, AngleFormatError> {
        match unit {
            AngleUnit::Dms => dms2rad(text).map(Angle),
            _ => {
                let value: f64 = text.trim().parse().map_err(|_| AngleFormatError::ValueKind {
                    unit: unit.tag(),
                    expected: "numeric",
                })?;
                Angle::new(value, unit)
            }
        }
    }

    /// Like [`Angle::new`], then reduced modulo 2π (see [`Angle::normalized`]).
    pub fn new_normalized(
        value: f64,
        unit: AngleUnit,
        positive: bool,
    ) -> Result<Self, AngleFormatError> {
        Ok(Angle::new(value, unit)?.normalized(positive))
    }

    /// Radians, the internal representation.
    pub const fn from_rad(rad: f64) -> Self {
        Angle(rad)
    }

    /// Decimal degrees.
    pub fn from_deg(deg: f64) -> Self {
        Angle(deg2rad(deg))
    }

    /// Gradians.
    pub fn from_gon(gon: f64) -> Self {
        Angle(gon2rad(gon))
    }

    /// Pseudo degrees `ddd.mmss`.
    pub fn from_pdeg(pdeg: f64) -> Self {
        Angle(pdeg2rad(pdeg))
    }

    /// Zero angle.
    pub const fn zero() -> Self {
        Angle(0.0)
    }

    /// Radians.
    pub fn rad(&self) -> f64 {
        self.0
    }

    /// Decimal degrees.
    pub fn deg(&self) -> f64 {
        rad2deg(self.0)
    }

    /// Gradians.
    pub fn gon(&self) -> f64 {
        rad2gon(self.0)
    }

    /// Pseudo degrees `ddd.mmss`.
    pub fn pdeg(&self) -> f64 {
        rad2pdeg(self.0)
    }

    /// Arc seconds.
    pub fn sec(&self) -> f64 {
        rad2sec(self.0)
    }

    /// Mils.
    pub fn mil(&self) -> f64 {
        rad2mil(self.0)
    }

    /// NMEA `dddmm.mmmm`.
    pub fn nmea(&self) -> f64 {
        rad2nmea(self.0)
    }

    /// `d-mm-ss` text.
    pub fn dms(&self) -> String {
        rad2dms(self.0)
    }

    /// Render in any unit.
    pub fn as_unit(&self, unit: AngleUnit) -> AngleRepr {
        match unit {
            AngleUnit::Rad => AngleRepr::Number(self.rad()),
            AngleUnit::Deg => AngleRepr::Number(self.deg()),
            AngleUnit::Pdeg => AngleRepr::Number(self.pdeg()),
            AngleUnit::Gon => AngleRepr::Number(self.gon()),
            AngleUnit::Mil => AngleRepr::Number(self.mil()),
            AngleUnit::Sec => AngleRepr::Number(self.sec()),
            AngleUnit::Nmea => AngleRepr::Number(self.nmea()),
            AngleUnit::Dms => AngleRepr::Text(self.dms()),
        }
    }

    /// Reduce modulo 2π. With `positive` the result lies in [0, 2π), otherwise
    /// negative angles stay in (−2π, 0].
    pub fn normalized(&self, positive: bool) -> Self {
        Angle(normalize_rad(self.0, positive))
    }

    /// Absolute value of the angle.
    pub fn abs(&self) -> Self {
        Angle(self.0.abs())
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.gon())
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Angle) -> Angle {
        Angle(self.0 + rhs.0)
    }
}

impl AddAssign for Angle {
    fn add_assign(&mut self, rhs: Angle) {
        self.0 += rhs.0;
    }
}

impl Sub for Angle {
    type Output = Angle;

    fn sub(self, rhs: Angle) -> Angle {
        Angle(self.0 - rhs.0)
    }
}

impl SubAssign for Angle {
    fn sub_assign(&mut self, rhs: Angle) {
        self.0 -= rhs.0;
    }
}

impl Neg for Angle {
    type Output = Angle;

    fn neg(self) -> Angle {
        Angle(-self.0)
    }
}

impl Mul<f64> for Angle {
    type Output = Angle;

    fn mul(self, rhs: f64) -> Angle {
        Angle(self.0 * rhs)
    }
}

impl Div<f64> for Angle {
    type Output = Angle;

    fn div(self, rhs: f64) -> Angle {
        Angle(self.0 / rhs)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Split whole arcseconds into (degrees, minutes, seconds).
fn split_seconds(secs: u64) -> (u64, u64, u64) {
    let (mi, sec) = (secs / 60, secs % 60);
    (mi / 60, mi % 60, sec)
}

fn deg2rad(angle: f64) -> f64 {
    angle.to_radians()
}

fn gon2rad(angle: f64) -> f64 {
    angle / 200.0 * PI
}

fn sec2rad(angle: f64) -> f64 {
    angle / RO
}

fn mil2rad(angle: f64) -> f64 {
    angle / 6400.0 * PI2
}

fn pdeg2rad(angle: f64) -> f64 {
    let sign = angle.signum();
    let angle = angle.abs();
    let d = angle.floor();
    let rest = round_to((angle - d) * 100.0, 10);
    let m = rest.floor();
    let s = round_to((rest - m) * 100.0, 10);
    sign * deg2rad(d + m / 60.0 + s / 3600.0)
}

fn nmea2rad(angle: f64) -> f64 {
    let w = angle / 100.0;
    let d = w.trunc();
    deg2rad(d + (w - d) * 100.0 / 60.0)
}

fn dms2rad(dms: &str) -> Result<f64, AngleFormatError> {
    let text = dms.trim();
    if !DMS_PATTERN.is_match(text) {
        return Err(AngleFormatError::InvalidDms(dms.to_string()));
    }
    let (sign, body) = match text.strip_prefix('-') {
        Some(body) => (-1.0, body),
        None => (1.0, text),
    };
    let mut div = 1.0;
    let mut acc = 0.0;
    for item in body.split('-') {
        let value: f64 = item
            .parse()
            .map_err(|_| AngleFormatError::InvalidDms(dms.to_string()))?;
        acc += value / div;
        div *= 60.0;
    }
    Ok(sign * deg2rad(acc))
}

fn rad2deg(angle: f64) -> f64 {
    angle.to_degrees()
}

fn rad2gon(angle: f64) -> f64 {
    angle / PI * 200.0
}

fn rad2sec(angle: f64) -> f64 {
    angle * RO
}

fn rad2mil(angle: f64) -> f64 {
    angle / PI2 * 6400.0
}

fn rad2dms(angle: f64) -> String {
    let sign = if angle < 0.0 { "-" } else { "" };
    let (deg, mi, sec) = split_seconds((angle.abs() * RO).round() as u64);
    format!("{sign}{deg}-{mi:02}-{sec:02}")
}

fn rad2pdeg(angle: f64) -> f64 {
    let sign = if angle < 0.0 { -1.0 } else { 1.0 };
    let (deg, mi, sec) = split_seconds((angle.abs() * RO).round() as u64);
    sign * (deg as f64 + mi as f64 / 100.0 + sec as f64 / 10000.0)
}

fn rad2nmea(angle: f64) -> f64 {
    let w = rad2deg(angle);
    let d = w.trunc();
    d * 100.0 + (w - d) * 60.0
}

fn normalize_rad(angle: f64, positive: bool) -> f64 {
    let norm = angle.rem_euclid(PI2);
    if !positive && angle < 0.0 && norm != 0.0 {
        norm - PI2
    } else {
        norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_numeric_round_trips() {
        let units = [
            AngleUnit::Rad,
            AngleUnit::Deg,
            AngleUnit::Gon,
            AngleUnit::Mil,
            AngleUnit::Sec,
            AngleUnit::Nmea,
        ];
        for rad in [0.0, 0.1234, 1.0, 3.0, 5.9, -0.75] {
            let a = Angle::from_rad(rad);
            for unit in units {
                let AngleRepr::Number(value) = a.as_unit(unit) else {
                    panic!("{unit} should render as a number");
                };
                let back = Angle::new(value, unit).unwrap();
                assert!((back.rad() - rad).abs() < EPS, "{unit}: {rad} -> {value}");
            }
        }
    }

    #[test]
    fn test_pdeg_round_trip_to_the_second() {
        let a = Angle::parse("123-45-56", AngleUnit::Dms).unwrap();
        assert!((a.pdeg() - 123.4556).abs() < 1e-9);
        let back = Angle::from_pdeg(a.pdeg());
        assert!((back.sec() - a.sec()).abs() < 1e-6);

        let neg = Angle::from_pdeg(-12.3015);
        assert!((neg.deg() + (12.0 + 30.0 / 60.0 + 15.0 / 3600.0)).abs() < EPS);
        assert!((neg.pdeg() + 12.3015).abs() < 1e-9);
    }

    #[test]
    fn test_dms_format_and_parse() {
        assert_eq!(Angle::from_deg(90.0).dms(), "90-00-00");
        assert_eq!(Angle::from_deg(-(1.0 + 2.0 / 60.0 + 3.0 / 3600.0)).dms(), "-1-02-03");

        for text in ["0-00-00", "359-59-59", "12-03-04", "-45-30-15"] {
            let a = Angle::parse(text, AngleUnit::Dms).unwrap();
            assert_eq!(a.dms(), text);
        }
        let partial = Angle::parse("10-30", AngleUnit::Dms).unwrap();
        assert!((partial.deg() - 10.5).abs() < EPS);
    }

    #[test]
    fn test_invalid_dms_is_rejected() {
        for text in ["abc", "1234-00-00", "10-300", "10:30:00", "1-2-3-4", ""] {
            assert!(matches!(
                Angle::parse(text, AngleUnit::Dms),
                Err(AngleFormatError::InvalidDms(_))
            ));
        }
        assert!(Angle::new(10.0, AngleUnit::Dms).is_err());
    }

    #[test]
    fn test_nmea_conversion() {
        let lat = Angle::new(3907.356, AngleUnit::Nmea).unwrap();
        assert!((lat.deg() - 39.1226).abs() < 1e-6);
        let lon = Angle::new(-12102.482, AngleUnit::Nmea).unwrap();
        assert!((lon.deg() + 121.041_366_67).abs() < 1e-6);
    }

    #[test]
    fn test_gon_and_mil_constants() {
        assert!((Angle::from_gon(200.0).rad() - PI).abs() < EPS);
        assert!((Angle::new(1600.0, AngleUnit::Mil).unwrap().deg() - 90.0).abs() < EPS);
        assert!((Angle::new(RO, AngleUnit::Sec).unwrap().rad() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_normalization() {
        let a = Angle::from_deg(-90.0);
        assert!((a.normalized(true).deg() - 270.0).abs() < EPS);
        assert!((a.normalized(false).deg() + 90.0).abs() < EPS);
        assert!((Angle::from_deg(450.0).normalized(true).deg() - 90.0).abs() < EPS);
        let n = Angle::new_normalized(-400.0, AngleUnit::Gon, false).unwrap();
        assert!(n.rad().abs() < EPS);
    }

    #[test]
    fn test_arithmetic() {
        let a = Angle::from_gon(50.0) + Angle::from_gon(180.0);
        assert!((a.gon() - 230.0).abs() < EPS);
        let b = Angle::from_gon(400.0) - Angle::from_gon(80.0);
        assert!((b.gon() - 320.0).abs() < EPS);
        assert!(((Angle::from_deg(10.0) * 3.0).deg() - 30.0).abs() < EPS);
        assert!(((Angle::from_deg(10.0) / 4.0).deg() - 2.5).abs() < EPS);
        assert!(((-Angle::from_deg(10.0)).deg() + 10.0).abs() < EPS);
    }

    #[test]
    fn test_unit_tags_parse() {
        assert_eq!("gon".parse::<AngleUnit>().unwrap(), AngleUnit::Gon);
        assert_eq!("PDEG".parse::<AngleUnit>().unwrap(), AngleUnit::Pdeg);
        assert!("furlong".parse::<AngleUnit>().is_err());
        assert_eq!(format!("{:.3}", Angle::from_gon(100.0).as_unit(AngleUnit::Gon)), "100.000");
        assert_eq!(Angle::from_gon(12.5).to_string(), "12.5000");
    }
}
