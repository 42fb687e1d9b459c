//! Typed results of instrument exchanges.
//!
//! A [`Measurement`] carries one optional slot per field a reply can contain.
//! A slot is `Some` only when the corresponding reply token was parsed, so
//! "field missing" is a typed state rather than a failed lookup. Absence alone
//! is not an error: it is how an instrument says "not ready yet".

pub mod record;

pub use record::{FieldValue, Record};

use crate::angle::Angle;
use serde::Serialize;

/// Telescope face, derived from the zenith angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Face {
    /// Zenith below 200 gon
    Left,
    /// Zenith at or above 200 gon
    Right,
}

impl Face {
    /// Classify a zenith angle.
    pub fn from_zenith(v: Angle) -> Self {
        if v.normalized(true).gon() < 200.0 {
            Face::Left
        } else {
            Face::Right
        }
    }
}

/// Atmospheric correction parameters as reported by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AtmosphericCorrection {
    /// Carrier wavelength constant (Leica only)
    pub lambda: Option<f64>,
    /// Air pressure [hPa]
    pub pressure: Option<f64>,
    /// Dry temperature [°C]
    pub dry_temp: Option<f64>,
    /// Wet temperature [°C]
    pub wet_temp: Option<f64>,
}

/// Refraction correction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RefractionCorrection {
    pub enabled: Option<bool>,
    /// Earth radius [m]
    pub earth_radius: Option<f64>,
    /// Refraction coefficient
    pub scale: Option<f64>,
}

/// Decoded reply of one logical operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Measurement {
    /// Horizontal direction
    pub hz: Option<Angle>,
    /// Zenith angle
    pub v: Option<Angle>,
    /// Slope distance [m]
    pub distance: Option<f64>,
    pub east: Option<f64>,
    pub north: Option<f64>,
    pub elev: Option<f64>,
    /// Instrument height [m]
    pub instrument_height: Option<f64>,
    /// Prism constant [mm]
    pub pc: Option<f64>,
    /// Atmospheric scale correction [ppm]
    pub ppm: Option<f64>,
    pub atmospheric: Option<AtmosphericCorrection>,
    pub refraction: Option<RefractionCorrection>,
    pub atr: Option<bool>,
    pub lock: Option<bool>,
    pub edm_mode: Option<i32>,
    pub prism_type: Option<i32>,
    pub face: Option<Face>,
    /// Search spiral extent
    pub spiral_hz: Option<Angle>,
    pub spiral_v: Option<Angle>,
    pub instrument_no: Option<u64>,
    pub instrument_name: Option<String>,
    /// Internal temperature [°C]
    pub internal_temp: Option<f64>,
    pub latitude: Option<Angle>,
    pub longitude: Option<Angle>,
    /// Altitude above mean sea level [m]
    pub altitude: Option<f64>,
    /// GNSS fix quality indicator
    pub quality: Option<u8>,
    /// Satellites in use
    pub nsat: Option<u32>,
    pub hdop: Option<f64>,
    /// Non-zero return code reported by the instrument
    pub error_code: Option<i32>,
}

impl Measurement {
    /// Measurement holding only an instrument return code.
    pub fn with_error_code(code: i32) -> Self {
        Self {
            error_code: Some(code),
            ..Default::default()
        }
    }

    /// True when nothing was decoded.
    pub fn is_empty(&self) -> bool {
        *self == Measurement::default()
    }

    /// Both direction angles, if present.
    pub fn angles(&self) -> Option<(Angle, Angle)> {
        Some((self.hz?, self.v?))
    }

    /// Horizontal direction, zenith and slope distance, if all present.
    pub fn polar(&self) -> Option<(Angle, Angle, f64)> {
        Some((self.hz?, self.v?, self.distance?))
    }

    /// Fill the local coordinates from polar observations.
    ///
    /// `east = d·sin(v)·sin(hz)`, `north = d·sin(v)·cos(hz)`, `elev = d·cos(v)`.
    pub fn set_local_coordinates(&mut self, hz: Angle, v: Angle, distance: f64) {
        let (sin_v, cos_v) = v.rad().sin_cos();
        let (sin_hz, cos_hz) = hz.rad().sin_cos();
        self.east = Some(distance * sin_v * sin_hz);
        self.north = Some(distance * sin_v * cos_hz);
        self.elev = Some(distance * cos_v);
    }

    /// Copy every field `other` has into `self`, overwriting.
    pub fn merge(&mut self, other: Measurement) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            hz, v, distance, east, north, elev, instrument_height, pc, ppm,
            atmospheric, refraction, atr, lock, edm_mode, prism_type, face,
            spiral_hz, spiral_v, instrument_no, instrument_name, internal_temp,
            latitude, longitude, altitude, quality, nsat, hdop, error_code,
        );
    }
}
