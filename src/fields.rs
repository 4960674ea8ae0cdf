//! Derived fields and the things they can be computed against.
//!
//! Positions compute geometric quantities (distance, direction, azimuth, ...) towards an "other"
//! [`Target`]. Nothing here is cached: every accessor recomputes from the current values and the
//! current target, so reassigning a target takes effect immediately.

use crate::constants::{EARTH_ROTATION_RATE, SPEED_OF_LIGHT};
use crate::coordinate_systems::{METER, RADIAN, UNITLESS};
use crate::error::{GeoError, Result};
use crate::geodetic::trs2enu;
use crate::util::{broadcast_len, broadcast_rows, row_norms, BoundedAngle};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use std::f64::consts::FRAC_PI_2;
use std::fmt;

/// Something a position can look at.
///
/// Implemented by [`Position`](crate::Position) and [`PosVel`](crate::PosVel) (finite points)
/// and by [`Direction`](crate::Direction) (points at infinity, for which only directions and
/// the angles derived from them are defined).
pub trait Target: fmt::Debug + Send + Sync {
    /// Name of the concrete type, used in error messages.
    fn type_name(&self) -> &'static str;

    fn num_obs(&self) -> usize;

    /// The geocentric cartesian positions of this target, one row per observation, or `None` if
    /// the target has no finite position.
    fn positions_in_trs(&self) -> Result<Option<DMatrix<f64>>>;

    /// Unit vectors from `origin` (TRS positions) towards this target.
    ///
    /// Only called when [`Target::positions_in_trs`] returns `None`, so targets with finite
    /// positions can rely on the default.
    fn direction_from(&self, origin: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let _ = origin;
        Err(GeoError::UndefinedOperation {
            operation: "direction_from",
            left: self.type_name(),
            right: "Position",
        })
    }
}

/// The result of resolving a name on an array with `get`.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<A> {
    /// The whole array converted into the registered system of that name.
    System(A),
    /// One column of the array in its current system.
    Column(DVector<f64>),
    /// A derived quantity with one number per observation (eg, distance or azimuth).
    Scalars(DVector<f64>),
    /// A derived quantity with one vector per observation (eg, direction or aberration).
    Vectors(DMatrix<f64>),
}

impl<A> Field<A> {
    #[must_use]
    pub fn into_system(self) -> Option<A> {
        match self {
            Self::System(array) => Some(array),
            _ => None,
        }
    }

    /// Returns columns and scalar fields.
    #[must_use]
    pub fn into_vector(self) -> Option<DVector<f64>> {
        match self {
            Self::Column(values) | Self::Scalars(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_matrix(self) -> Option<DMatrix<f64>> {
        match self {
            Self::Vectors(values) => Some(values),
            _ => None,
        }
    }

    pub(crate) fn map_system<B>(self, f: impl FnOnce(A) -> B) -> Field<B> {
        match self {
            Self::System(array) => Field::System(f(array)),
            Self::Column(values) => Field::Column(values),
            Self::Scalars(values) => Field::Scalars(values),
            Self::Vectors(values) => Field::Vectors(values),
        }
    }
}

/// Derived fields of positions with respect to their `other`, and their units.
pub(crate) const POSITION_FIELDS: &[(&str, &str)] = &[
    ("distance", METER),
    ("direction", UNITLESS),
    ("azimuth", RADIAN),
    ("elevation", RADIAN),
    ("zenith_distance", RADIAN),
    ("aberration", METER),
    ("aberrated_distance", METER),
    ("aberrated_direction", UNITLESS),
    ("aberrated_azimuth", RADIAN),
    ("aberrated_elevation", RADIAN),
    ("aberrated_zenith_distance", RADIAN),
];

/// Derived fields of deltas, in the local frame of their reference position.
pub(crate) const DELTA_FIELDS: &[(&str, &str)] = &[
    ("length", METER),
    ("direction", UNITLESS),
    ("azimuth", RADIAN),
    ("elevation", RADIAN),
    ("zenith_distance", RADIAN),
];

pub(crate) fn field_unit(fields: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    fields.iter().find(|(f, _)| *f == name).map(|(_, unit)| *unit)
}

/// `to - from`, row by row, with single rows broadcast.
pub(crate) fn vectors_between(
    operation: &'static str,
    from: &DMatrix<f64>,
    to: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let num_obs = broadcast_len(operation, from.nrows(), to.nrows())?;
    Ok(broadcast_rows(to, num_obs) - broadcast_rows(from, num_obs))
}

/// Azimuth (clockwise from north, in [0, 2π)) and elevation (above the horizon) of TRS
/// vectors, as seen in the local frame at each observer latitude and longitude.
pub(crate) fn local_angles(
    vectors: &DMatrix<f64>,
    observer_llh: &DMatrix<f64>,
) -> Result<(DVector<f64>, DVector<f64>)> {
    let enu = trs2enu(vectors, observer_llh)?;
    let norms = row_norms(&enu);
    let azimuth = DVector::from_iterator(
        enu.nrows(),
        enu.row_iter()
            .map(|row| BoundedAngle::from_radians(row[0].atan2(row[1])).get_bounded()),
    );
    let elevation = DVector::from_iterator(
        enu.nrows(),
        enu.row_iter()
            .zip(norms.iter())
            .map(|(row, norm)| (row[2] / norm).clamp(-1., 1.).asin()),
    );
    Ok((azimuth, elevation))
}

pub(crate) fn zenith_distance(elevation: DVector<f64>) -> DVector<f64> {
    elevation.map(|e| FRAC_PI_2 - e)
}

/// The rotation about the Z axis by `angle`, in the passive (R3) convention.
fn r3(angle: f64) -> Matrix3<f64> {
    let (sin, cos) = angle.sin_cos();
    Matrix3::new(cos, sin, 0., -sin, cos, 0., 0., 0., 1.)
}

/// Where each target appears to be from each observer when accounting for light travel time.
///
/// The signal takes `distance / c` to arrive, during which the earth (and the observer with it)
/// rotates by `ω · distance / c`. The target is rotated by that angle about the Z axis. This is
/// a first-order correction without any light-time iteration.
pub(crate) fn apparent_positions(
    observers: &DMatrix<f64>,
    targets: &DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let num_obs = broadcast_len("aberration", observers.nrows(), targets.nrows())?;
    let targets = broadcast_rows(targets, num_obs);
    let distances = row_norms(&vectors_between("aberration", observers, &targets)?);

    let mut apparent = DMatrix::zeros(num_obs, 3);
    for (i, distance) in distances.iter().enumerate() {
        let flight_time = distance / SPEED_OF_LIGHT;
        let target = Vector3::new(targets[(i, 0)], targets[(i, 1)], targets[(i, 2)]);
        let rotated = r3(flight_time * EARTH_ROTATION_RATE) * target;
        for (c, component) in rotated.iter().enumerate() {
            apparent[(i, c)] = *component;
        }
    }
    Ok(apparent)
}

#[cfg(test)]
mod tests {
    use super::{apparent_positions, local_angles, vectors_between, zenith_distance, Field};
    use crate::constants::{EARTH_ROTATION_RATE, SPEED_OF_LIGHT};
    use crate::error::GeoError;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use rstest::rstest;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn vectors_broadcast_a_single_row() {
        let from = DMatrix::from_row_slice(1, 3, &[1., 1., 1.]);
        let to = DMatrix::from_row_slice(2, 3, &[1., 2., 3., 4., 5., 6.]);
        let v = vectors_between("test", &from, &to).unwrap();
        assert_eq!(v, DMatrix::from_row_slice(2, 3, &[0., 1., 2., 3., 4., 5.]));

        let three = DMatrix::zeros(3, 3);
        assert_eq!(
            vectors_between("vector_to", &three, &to),
            Err(GeoError::LengthMismatch {
                operation: "vector_to",
                left: 3,
                right: 2,
            })
        );
    }

    // at lat = lon = 0: east is +y, north is +z, up is +x
    #[rstest]
    #[case([0., 0., 1.], 0., 0.)]
    #[case([0., 1., 0.], FRAC_PI_2, 0.)]
    #[case([0., -1., 0.], 3. * FRAC_PI_2, 0.)]
    #[case([0., 0., -1.], PI, 0.)]
    #[case([1., 1., 0.], FRAC_PI_2, FRAC_PI_4)]
    #[case([-1., 0., 0.], 0., -FRAC_PI_2)]
    fn angles_at_the_origin_of_the_frame(
        #[case] vector: [f64; 3],
        #[case] azimuth: f64,
        #[case] elevation: f64,
    ) {
        let vectors = DMatrix::from_row_slice(1, 3, &vector);
        let llh = DMatrix::from_row_slice(1, 2, &[0., 0.]);
        let (az, el) = local_angles(&vectors, &llh).unwrap();
        assert_relative_eq!(az[0], azimuth, epsilon = 1e-12);
        assert_relative_eq!(el[0], elevation, epsilon = 1e-12);
        assert_relative_eq!(
            zenith_distance(el)[0],
            FRAC_PI_2 - elevation,
            epsilon = 1e-12
        );
    }

    #[test]
    fn apparent_position_is_rotated_by_flight_time() {
        let observer = DMatrix::from_row_slice(1, 3, &[0., 0., 0.]);
        let target = DMatrix::from_row_slice(1, 3, &[20_000_000., 0., 0.]);
        let apparent = apparent_positions(&observer, &target).unwrap();

        let angle = 20_000_000. / SPEED_OF_LIGHT * EARTH_ROTATION_RATE;
        assert_relative_eq!(apparent[(0, 0)], 20_000_000. * angle.cos(), epsilon = 1e-6);
        assert_relative_eq!(apparent[(0, 1)], -20_000_000. * angle.sin(), epsilon = 1e-6);
        assert_eq!(apparent[(0, 2)], 0.);
        // about 97 m for a GNSS-like range
        assert!((apparent[(0, 1)] + 97.).abs() < 1.);
    }

    #[test]
    fn field_accessors() {
        let column: Field<()> = Field::Column(DVector::from_vec(vec![1., 2.]));
        assert_eq!(column.clone().into_vector().map(|v| v.len()), Some(2));
        assert_eq!(column.into_matrix(), None);
        assert_eq!(Field::System(3).map_system(|x| x * 2).into_system(), Some(6));
    }
}
