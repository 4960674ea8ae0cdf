//! Orbit-related systems: classical Keplerian elements for absolute states and the
//! along-track/cross-track/radial frame for relative ones.
//!
//! Keplerian elements are computed from the state vector as given, without rotating it into an
//! inertial frame first. This keeps `kepler` an exact reparametrization of `trs`, which is what
//! the conversion graph needs, but it means the elements of an earth-fixed state are not the
//! osculating elements of the orbit.

use crate::constants::GM_EARTH;
use crate::error::Result;
use crate::geodetic::{require_columns, rotate_blocks};
use nalgebra::{DMatrix, Matrix3, Vector3};
use std::f64::consts::TAU;

/// Classical orbital elements using the eccentric anomaly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeplerElements {
    /// Semi-major axis, in meters.
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    /// Inclination, in radians.
    pub inclination: f64,
    /// Right ascension of the ascending node, in radians.
    pub ascending_node: f64,
    /// Argument of perigee, in radians.
    pub argument_of_perigee: f64,
    /// Eccentric anomaly, in radians.
    pub eccentric_anomaly: f64,
}

impl KeplerElements {
    /// Computes the elements of an elliptic orbit from position and velocity.
    ///
    /// Circular or equatorial orbits leave the node and perigee undefined. Close to those, the
    /// elements are ill-conditioned and converting back to a state loses precision.
    ///
    /// See Montenbruck & Gill, Satellite Orbits (2000), section 2.2.4.
    #[must_use]
    pub fn from_state(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        let h = position.cross(&velocity);
        let w = h.normalize();
        let r = position.norm();
        let v2 = velocity.norm_squared();

        let inclination = w.xy().norm().atan2(w.z);
        let ascending_node = w.x.atan2(-w.y).rem_euclid(TAU);
        let p = h.norm_squared() / GM_EARTH;
        let semi_major_axis = 1. / (2. / r - v2 / GM_EARTH);
        let eccentricity = (1. - p / semi_major_axis).max(0.).sqrt();

        let n = (GM_EARTH / semi_major_axis.powi(3)).sqrt();
        let eccentric_anomaly = (position.dot(&velocity) / (semi_major_axis.powi(2) * n))
            .atan2(1. - r / semi_major_axis)
            .rem_euclid(TAU);

        let u = position.z.atan2(-position.x * w.y + position.y * w.x);
        let true_anomaly = ((1. - eccentricity.powi(2)).sqrt() * eccentric_anomaly.sin())
            .atan2(eccentric_anomaly.cos() - eccentricity);
        let argument_of_perigee = (u - true_anomaly).rem_euclid(TAU);

        Self {
            semi_major_axis,
            eccentricity,
            inclination,
            ascending_node,
            argument_of_perigee,
            eccentric_anomaly,
        }
    }

    /// Computes position and velocity from the elements.
    ///
    /// See Montenbruck & Gill, Satellite Orbits (2000), section 2.2.3.
    #[must_use]
    pub fn to_state(&self) -> (Vector3<f64>, Vector3<f64>) {
        let Self {
            semi_major_axis: a,
            eccentricity: e,
            inclination: i,
            ascending_node: node,
            argument_of_perigee: omega,
            eccentric_anomaly: ecc,
        } = *self;

        let (sin_e, cos_e) = ecc.sin_cos();
        let fac = (1. - e.powi(2)).sqrt();
        let r = a * (1. - e * cos_e);

        let in_plane_position = (a * (cos_e - e), a * fac * sin_e);
        let speed = (GM_EARTH * a).sqrt() / r;
        let in_plane_velocity = (-speed * sin_e, speed * fac * cos_e);

        let (sin_o, cos_o) = omega.sin_cos();
        let (sin_n, cos_n) = node.sin_cos();
        let (sin_i, cos_i) = i.sin_cos();
        // perifocal axes expressed in the reference frame
        let p = Vector3::new(
            cos_o * cos_n - sin_o * cos_i * sin_n,
            cos_o * sin_n + sin_o * cos_i * cos_n,
            sin_o * sin_i,
        );
        let q = Vector3::new(
            -sin_o * cos_n - cos_o * cos_i * sin_n,
            -sin_o * sin_n + cos_o * cos_i * cos_n,
            cos_o * sin_i,
        );

        (
            p * in_plane_position.0 + q * in_plane_position.1,
            p * in_plane_velocity.0 + q * in_plane_velocity.1,
        )
    }

    fn to_row(self) -> [f64; 6] {
        [
            self.semi_major_axis,
            self.eccentricity,
            self.inclination,
            self.ascending_node,
            self.argument_of_perigee,
            self.eccentric_anomaly,
        ]
    }
}

/// Converts position and velocity rows into Keplerian element rows
/// (a, e, i, Omega, omega, E).
pub fn trs2kepler(trs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_columns("trs2kepler", "trs", trs, 6)?;
    let mut kepler = DMatrix::zeros(trs.nrows(), 6);
    for (i, row) in trs.row_iter().enumerate() {
        let position = Vector3::new(row[0], row[1], row[2]);
        let velocity = Vector3::new(row[3], row[4], row[5]);
        for (c, value) in KeplerElements::from_state(position, velocity)
            .to_row()
            .into_iter()
            .enumerate()
        {
            kepler[(i, c)] = value;
        }
    }
    Ok(kepler)
}

/// Converts Keplerian element rows (a, e, i, Omega, omega, E) into position and velocity rows.
pub fn kepler2trs(kepler: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_columns("kepler2trs", "kepler", kepler, 6)?;
    let mut trs = DMatrix::zeros(kepler.nrows(), 6);
    for (i, row) in kepler.row_iter().enumerate() {
        let elements = KeplerElements {
            semi_major_axis: row[0],
            eccentricity: row[1],
            inclination: row[2],
            ascending_node: row[3],
            argument_of_perigee: row[4],
            eccentric_anomaly: row[5],
        };
        let (position, velocity) = elements.to_state();
        for c in 0..3 {
            trs[(i, c)] = position[c];
            trs[(i, c + 3)] = velocity[c];
        }
    }
    Ok(trs)
}

/// The rotation taking TRS components into along-track, cross-track, and radial components.
///
/// Radial points away from the center of the earth, cross-track along the orbit normal, and
/// along-track completes the right-handed frame (roughly in the direction of motion).
#[must_use]
pub fn trs_to_acr_rotation(position: Vector3<f64>, velocity: Vector3<f64>) -> Matrix3<f64> {
    let radial = position.normalize();
    let cross = position.cross(&velocity).normalize();
    let along = cross.cross(&radial);
    Matrix3::from_rows(&[along.transpose(), cross.transpose(), radial.transpose()])
}

/// Rotates TRS delta rows into the ACR frame of each reference position and velocity.
///
/// `ref_trs` needs six columns (position and velocity) and one row per observation or a single
/// shared row.
pub fn trs2acr(values: &DMatrix<f64>, ref_trs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_columns("trs2acr", "trs", ref_trs, 6)?;
    rotate_blocks("trs2acr", values, ref_trs.nrows(), |r| acr_at(ref_trs, r))
}

/// The inverse of [`trs2acr`].
pub fn acr2trs(values: &DMatrix<f64>, ref_trs: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_columns("acr2trs", "trs", ref_trs, 6)?;
    rotate_blocks("acr2trs", values, ref_trs.nrows(), |r| {
        acr_at(ref_trs, r).transpose()
    })
}

fn acr_at(ref_trs: &DMatrix<f64>, row: usize) -> Matrix3<f64> {
    let position = Vector3::new(ref_trs[(row, 0)], ref_trs[(row, 1)], ref_trs[(row, 2)]);
    let velocity = Vector3::new(ref_trs[(row, 3)], ref_trs[(row, 4)], ref_trs[(row, 5)]);
    trs_to_acr_rotation(position, velocity)
}
