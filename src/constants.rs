//! Physical constants used by the derived fields and orbit conversions.

/// Speed of light in vacuum, in meters per second.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Nominal mean angular velocity of the earth, in radians per second (IERS Conventions 2010).
pub const EARTH_ROTATION_RATE: f64 = 7.292_115_146_7e-5;

/// Geocentric gravitational constant, in cubic meters per square second (IERS Conventions 2010).
#[doc(alias = "GM")]
pub const GM_EARTH: f64 = 3.986_004_418e14;
