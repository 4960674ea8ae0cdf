//! Reference ellipsoids used by the geodetic conversions.

use crate::error::{GeoError, Result};
use std::fmt;
use uom::si::f64::Length;
use uom::si::length::meter;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A rotational ellipsoid described by its semi-major axis and inverse flattening.
///
/// Ellipsoids serialize with their constants; to read one back, look it up by name with
/// [`Ellipsoid::named`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Ellipsoid {
    name: &'static str,
    #[doc(alias = "a")]
    semi_major_axis: f64,
    #[doc(alias = "1/f")]
    inverse_flattening: f64,
}

/// The Geodetic Reference System 1980 ellipsoid, used by ITRF.
pub const GRS80: Ellipsoid = Ellipsoid {
    name: "GRS80",
    semi_major_axis: 6_378_137.0,
    inverse_flattening: 298.257_222_101,
};

/// The World Geodetic System 1984 ellipsoid, used by GPS.
pub const WGS84: Ellipsoid = Ellipsoid {
    name: "WGS84",
    semi_major_axis: 6_378_137.0,
    inverse_flattening: 298.257_223_563,
};

/// The World Geodetic System 1972 ellipsoid.
pub const WGS72: Ellipsoid = Ellipsoid {
    name: "WGS72",
    semi_major_axis: 6_378_135.0,
    inverse_flattening: 298.26,
};

// looked up by name in `Ellipsoid::named`
static ELLIPSOIDS: [Ellipsoid; 3] = [GRS80, WGS84, WGS72];

impl Ellipsoid {
    /// Looks up one of the built-in ellipsoids by name (case-insensitive).
    pub fn named(name: &str) -> Result<Self> {
        ELLIPSOIDS
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| GeoError::UnknownEllipsoid {
                name: name.to_string(),
                valid: ELLIPSOIDS.iter().map(|e| e.name.to_string()).collect(),
            })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Equatorial radius.
    #[doc(alias = "equatorial radius")]
    #[must_use]
    pub fn semi_major_axis(&self) -> Length {
        Length::new::<meter>(self.semi_major_axis)
    }

    /// Polar radius, `b = a (1 - f)`.
    #[doc(alias = "polar radius")]
    #[must_use]
    pub fn semi_minor_axis(&self) -> Length {
        Length::new::<meter>(self.b())
    }

    #[must_use]
    pub fn flattening(&self) -> f64 {
        1.0 / self.inverse_flattening
    }

    #[must_use]
    pub fn inverse_flattening(&self) -> f64 {
        self.inverse_flattening
    }

    /// First eccentricity squared, `e² = 2f - f²`.
    #[doc(alias = "e^2")]
    #[must_use]
    pub fn eccentricity_squared(&self) -> f64 {
        let f = self.flattening();
        2.0 * f - f * f
    }

    pub(crate) fn a(&self) -> f64 {
        self.semi_major_axis
    }

    pub(crate) fn b(&self) -> f64 {
        self.semi_major_axis * (1.0 - self.flattening())
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        GRS80
    }
}

impl fmt::Display for Ellipsoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (a = {} m, 1/f = {})",
            self.name, self.semi_major_axis, self.inverse_flattening
        )
    }
}
