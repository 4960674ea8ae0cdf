//! Conversions between geocentric cartesian (TRS), geodetic (LLH), and topocentric (ENU) values.
//!
//! All functions work on whole batches: one observation per row. Latitude and longitude are in
//! radians, everything else in meters (or meters per second for velocity columns).

use crate::ellipsoid::Ellipsoid;
use crate::error::{GeoError, Result};
use crate::util::{broadcast_len, BoundedAngle};
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Points closer than this to the rotation axis are treated as lying on it.
const POLAR_AXIS_TOLERANCE: f64 = 1e-9;

pub(crate) fn require_columns(
    type_name: &'static str,
    system: &str,
    values: &DMatrix<f64>,
    expected: usize,
) -> Result<()> {
    if values.ncols() < expected {
        return Err(GeoError::ShapeMismatch {
            type_name,
            system: system.to_string(),
            expected,
            rows: values.nrows(),
            columns: values.ncols(),
        });
    }
    Ok(())
}

/// Converts geocentric cartesian coordinates into geodetic latitude, longitude, and height.
///
/// Only the first three columns of `trs` are used. The result has three columns: latitude
/// (radians), longitude (radians, in [-π, π)), and height above the ellipsoid (meters).
///
/// See [`trs_to_llh`] for the algorithm.
pub fn trs2llh(trs: &DMatrix<f64>, ellipsoid: &Ellipsoid) -> Result<DMatrix<f64>> {
    require_columns("trs2llh", "trs", trs, 3)?;
    let mut llh = DMatrix::zeros(trs.nrows(), 3);
    for (i, row) in trs.row_iter().enumerate() {
        let (lat, lon, height) = trs_to_llh(row[0], row[1], row[2], ellipsoid);
        llh[(i, 0)] = lat;
        llh[(i, 1)] = lon;
        llh[(i, 2)] = height;
    }
    Ok(llh)
}

/// Converts geodetic latitude, longitude, and height into geocentric cartesian coordinates.
///
/// Only the first three columns of `llh` are used.
pub fn llh2trs(llh: &DMatrix<f64>, ellipsoid: &Ellipsoid) -> Result<DMatrix<f64>> {
    require_columns("llh2trs", "llh", llh, 3)?;
    let mut trs = DMatrix::zeros(llh.nrows(), 3);
    for (i, row) in llh.row_iter().enumerate() {
        let (x, y, z) = llh_to_trs(row[0], row[1], row[2], ellipsoid);
        trs[(i, 0)] = x;
        trs[(i, 1)] = y;
        trs[(i, 2)] = z;
    }
    Ok(trs)
}

/// Converts a single geocentric point into (latitude, longitude, height).
///
/// This is the closed-form solution from
///
///   Direct transformation from geocentric coordinates to geodetic coordinates
///   H. Vermeille, Journal of Geodesy (2002) 76:451–454
///   <https://doi.org/10.1007/s00190-002-0273-6>
///
/// which needs no iteration and is accurate to machine precision for points outside the
/// evolute of the ellipsoid (ie, anything further than ~50 km from the center of the earth).
///
/// The general formula degrades close to the rotation axis, so points within
/// `POLAR_AXIS_TOLERANCE` of it are handled separately: their latitude is exactly ±90° and their
/// height is the distance beyond the polar radius.
#[must_use]
pub fn trs_to_llh(x: f64, y: f64, z: f64, ellipsoid: &Ellipsoid) -> (f64, f64, f64) {
    let a = ellipsoid.a();
    let e2 = ellipsoid.eccentricity_squared();
    let e4 = e2 * e2;

    let rho = x.hypot(y);
    let lon = BoundedAngle::from_radians(y.atan2(x)).to_signed_range();

    if rho < POLAR_AXIS_TOLERANCE {
        let lat = std::f64::consts::FRAC_PI_2.copysign(z);
        return (lat, lon, z.abs() - ellipsoid.b());
    }

    let p = rho.powi(2) / a.powi(2);
    let q = (1. - e2) * z.powi(2) / a.powi(2);
    let r = (p + q - e4) / 6.;
    let s = e4 * p * q / (4. * r.powi(3));
    let t = (1. + s + (s * (2. + s)).sqrt()).cbrt();
    let u = r * (1. + t + 1. / t);
    let v = (u.powi(2) + e4 * q).sqrt();
    let w = e2 * (u + v - q) / (2. * v);
    let k = (u + v + w.powi(2)).sqrt() - w;
    let d = k * rho / (k + e2);
    let d_z = d.hypot(z);

    let lat = 2. * z.atan2(d + d_z);
    let height = (k + e2 - 1.) / k * d_z;

    (lat, lon, height)
}

/// Converts a single (latitude, longitude, height) into a geocentric point.
///
/// See
/// <https://en.wikipedia.org/wiki/Geographic_coordinate_conversion#From_geodetic_to_ECEF_coordinates>
#[must_use]
pub fn llh_to_trs(lat: f64, lon: f64, height: f64, ellipsoid: &Ellipsoid) -> (f64, f64, f64) {
    let a = ellipsoid.a();
    let e2 = ellipsoid.eccentricity_squared();

    let (sin_phi, cos_phi) = lat.sin_cos();
    let (sin_lambda, cos_lambda) = lon.sin_cos();

    // https://en.wikipedia.org/wiki/Earth_radius#Prime_vertical
    let n_phi = a / (1. - e2 * sin_phi.powi(2)).sqrt();

    let x = (n_phi + height) * cos_phi * cos_lambda;
    let y = (n_phi + height) * cos_phi * sin_lambda;
    let z = ((1. - e2) * n_phi + height) * sin_phi;
    (x, y, z)
}

/// The rotation taking ENU components at the given latitude and longitude into TRS components.
///
/// The columns are the East, North, and Up axes expressed in TRS. Its transpose takes TRS
/// components into ENU.
///
/// See also
/// <https://en.wikipedia.org/wiki/Local_tangent_plane_coordinates#Local_east,_north,_up_(ENU)_coordinates>.
#[must_use]
pub fn enu_to_trs_rotation(lat: f64, lon: f64) -> Matrix3<f64> {
    let (sin_phi, cos_phi) = lat.sin_cos();
    let (sin_lambda, cos_lambda) = lon.sin_cos();

    Matrix3::new(
        -sin_lambda,
        -cos_lambda * sin_phi,
        cos_lambda * cos_phi,
        cos_lambda,
        -sin_lambda * sin_phi,
        sin_lambda * cos_phi,
        0.,
        cos_phi,
        sin_phi,
    )
}

/// Rotates TRS components into the local ENU frame of each reference observation.
///
/// `values` has three (position) or six (position and velocity) columns; every group of three
/// columns is rotated the same way. `ref_llh` holds the geodetic latitude and longitude of the
/// reference point in its first two columns, either one row per observation or a single row
/// shared by all of them.
pub fn trs2enu(values: &DMatrix<f64>, ref_llh: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_columns("trs2enu", "llh", ref_llh, 2)?;
    rotate_blocks("trs2enu", values, ref_llh.nrows(), |r| {
        enu_to_trs_rotation(ref_llh[(r, 0)], ref_llh[(r, 1)]).transpose()
    })
}

/// Rotates local ENU components at each reference observation into TRS.
///
/// The inverse of [`trs2enu`].
pub fn enu2trs(values: &DMatrix<f64>, ref_llh: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    require_columns("enu2trs", "llh", ref_llh, 2)?;
    rotate_blocks("enu2trs", values, ref_llh.nrows(), |r| {
        enu_to_trs_rotation(ref_llh[(r, 0)], ref_llh[(r, 1)])
    })
}

/// Applies one rotation per observation to every group of three columns of `values`.
///
/// `rotation_at` is called with the index of a reference row; with a single reference row (or a
/// single row of values) the other side is broadcast.
pub(crate) fn rotate_blocks(
    operation: &'static str,
    values: &DMatrix<f64>,
    num_refs: usize,
    rotation_at: impl Fn(usize) -> Matrix3<f64>,
) -> Result<DMatrix<f64>> {
    if values.ncols() == 0 || values.ncols() % 3 != 0 {
        return Err(GeoError::ShapeMismatch {
            type_name: operation,
            system: "trs".to_string(),
            expected: 3,
            rows: values.nrows(),
            columns: values.ncols(),
        });
    }
    let num_obs = broadcast_len(operation, values.nrows(), num_refs)?;
    let value_row = |i: usize| if values.nrows() == 1 { 0 } else { i };
    let ref_row = |i: usize| if num_refs == 1 { 0 } else { i };

    let mut rotated = DMatrix::zeros(num_obs, values.ncols());
    for i in 0..num_obs {
        let rotation = rotation_at(ref_row(i));
        for block in (0..values.ncols()).step_by(3) {
            let v = Vector3::new(
                values[(value_row(i), block)],
                values[(value_row(i), block + 1)],
                values[(value_row(i), block + 2)],
            );
            let out = rotation * v;
            for (offset, component) in out.iter().enumerate() {
                rotated[(i, block + offset)] = *component;
            }
        }
    }
    Ok(rotated)
}

#[cfg(test)]
mod tests {
    use super::{enu2trs, llh2trs, llh_to_trs, trs2enu, trs2llh, trs_to_llh};
    use crate::ellipsoid::{Ellipsoid, GRS80, WGS84};
    use crate::util::BoundedAngle;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::DMatrix;
    use quickcheck::{quickcheck, Arbitrary, Gen, TestResult};
    use rstest::rstest;
    use std::f64::consts::FRAC_PI_2;

    /// A geodetic point in physically sensible ranges.
    #[derive(Clone, Debug)]
    struct Geodetic {
        lat: f64,
        lon: f64,
        height: f64,
    }

    fn finite(g: &mut Gen) -> f64 {
        // quickcheck will give us awkward f64 values -- we ignore those
        loop {
            match f64::arbitrary(g) {
                0. => break 0.,
                f if f.is_normal() => break f,
                _ => {}
            }
        }
    }

    impl Arbitrary for Geodetic {
        fn arbitrary(g: &mut Gen) -> Self {
            Self {
                lat: finite(g).rem_euclid(std::f64::consts::PI) - FRAC_PI_2,
                lon: finite(g).rem_euclid(std::f64::consts::TAU) - std::f64::consts::PI,
                height: finite(g).rem_euclid(101_000.) - 1_000.,
            }
        }
    }

    fn try_roundtrip(lat: f64, lon: f64, height: f64, ellipsoid: &Ellipsoid) {
        let (x, y, z) = llh_to_trs(lat, lon, height, ellipsoid);
        let (lat2, lon2, height2) = trs_to_llh(x, y, z, ellipsoid);

        assert_abs_diff_eq!(lat2, lat, epsilon = 1e-12);
        assert_abs_diff_eq!(height2, height, epsilon = 1e-6);
        // longitude is meaningless on the poles, and ±180° are the same meridian
        if lat.abs() < FRAC_PI_2 - 1e-12 {
            let wrapped = BoundedAngle::from_radians(lon2 - lon).to_signed_range();
            assert_abs_diff_eq!(wrapped, 0., epsilon = 1e-12);
        }
    }

    quickcheck! {
        fn llh_trs_roundtrip(p: Geodetic) -> TestResult {
            try_roundtrip(p.lat, p.lon, p.height, &GRS80);
            TestResult::passed()
        }
    }

    #[rstest]
    #[case(0., 0., 0.)]
    #[case(90., 0., 1000.)]
    #[case(-90., 0., 1000.)]
    #[case(90., 180., -1000.)]
    #[case(-90., -90., 100_000.)]
    #[case(89.999999, 0., 1000.)]
    #[case(-89.999999, 180., 1000.)]
    #[case(10., 180., 0.)]
    #[case(10., -180., 0.)]
    #[case(45., -179.99999, 0.)]
    #[case(-27.270950, 19.880389, 3000.)]
    fn hard_llh_trs_roundtrips(#[case] lat: f64, #[case] lon: f64, #[case] height: f64) {
        try_roundtrip(lat.to_radians(), lon.to_radians(), height, &WGS84);
    }

    #[rstest]
    #[case(6_400_000.)]
    #[case(-6_400_000.)]
    #[case(6_356_752.314_140_356)]
    fn poles_are_exact(#[case] z: f64) {
        let (lat, _, height) = trs_to_llh(0., 0., z, &GRS80);
        assert_eq!(lat, FRAC_PI_2.copysign(z));
        assert_eq!(height, z.abs() - GRS80.b());
    }

    #[test]
    fn known_llh_to_trs() {
        let known: [((f64, f64, f64), (f64, f64, f64)); 2] = [
            ((0., 0., 0.), (6378137., 0., 0.)),
            (
                // Mt. Fuji
                (35.3619, 138.7280, 2294.0),
                (-3915138.118709466, 3436144.354064903, 3672011.028417511),
            ),
        ];
        for (llh, trs) in known {
            let (lat, lon, h) = llh;
            let (x, y, z) = llh_to_trs(lat.to_radians(), lon.to_radians(), h, &WGS84);
            assert_abs_diff_eq!(x, trs.0, epsilon = 1e-6);
            assert_abs_diff_eq!(y, trs.1, epsilon = 1e-6);
            assert_abs_diff_eq!(z, trs.2, epsilon = 1e-6);
        }
    }

    #[rstest]
    #[case(47.9948211, 7.8211606, 1000.)]
    #[case(67.112282, 19.880389, 0.)]
    #[case(-84.883074, -29.160550, 2000.)]
    fn llh_to_trs_matches_nav_types(#[case] lat: f64, #[case] lon: f64, #[case] height: f64) {
        let location = nav_types::WGS84::from_degrees_and_meters(lat, lon, height);
        let expected = nav_types::ECEF::from(location);

        let (x, y, z) = llh_to_trs(lat.to_radians(), lon.to_radians(), height, &WGS84);
        assert_abs_diff_eq!(x, expected.x(), epsilon = 1e-3);
        assert_abs_diff_eq!(y, expected.y(), epsilon = 1e-3);
        assert_abs_diff_eq!(z, expected.z(), epsilon = 1e-3);
    }

    #[test]
    fn batch_conversion_keeps_rows() {
        let trs = DMatrix::from_row_slice(
            2,
            3,
            &[2102928.189605, 721619.617278, 5958196.398820, 0., 0., -6_400_000.],
        );
        let llh = trs2llh(&trs, &GRS80).unwrap();
        assert_eq!(llh.shape(), (2, 3));
        assert_eq!(llh[(1, 0)], -FRAC_PI_2);

        let back = llh2trs(&llh, &GRS80).unwrap();
        assert_relative_eq!(back, trs, epsilon = 1e-6);
    }

    #[test]
    fn too_few_columns_is_a_shape_error() {
        let values = DMatrix::from_row_slice(1, 2, &[1., 2.]);
        assert!(matches!(
            trs2llh(&values, &GRS80),
            Err(crate::GeoError::ShapeMismatch { expected: 3, .. })
        ));
    }

    #[rstest]
    #[case(47.9948211, 7.8211606)]
    #[case(-33.8688, 151.2093)]
    #[case(0., -90.)]
    fn enu_matches_nav_types(#[case] lat: f64, #[case] lon: f64) {
        let location = nav_types::WGS84::from_degrees_and_meters(lat, lon, 0.);
        let origin = nav_types::ECEF::from(location);
        let shifted = origin + nav_types::ENU::new(10., -20., 30.);

        let enu = DMatrix::from_row_slice(1, 3, &[10., -20., 30.]);
        let ref_llh = DMatrix::from_row_slice(1, 2, &[lat.to_radians(), lon.to_radians()]);
        let trs = enu2trs(&enu, &ref_llh).unwrap();

        assert_abs_diff_eq!(trs[(0, 0)], shifted.x() - origin.x(), epsilon = 1e-6);
        assert_abs_diff_eq!(trs[(0, 1)], shifted.y() - origin.y(), epsilon = 1e-6);
        assert_abs_diff_eq!(trs[(0, 2)], shifted.z() - origin.z(), epsilon = 1e-6);
    }

    #[test]
    fn enu_rotation_is_per_observation_and_invertible() {
        let values = DMatrix::from_row_slice(
            2,
            6,
            &[1., 2., 3., 0.1, 0.2, 0.3, -4., 5., -6., 0.4, -0.5, 0.6],
        );
        let ref_llh = DMatrix::from_row_slice(2, 2, &[0.3, 1.2, -1.1, -2.5]);

        let enu = trs2enu(&values, &ref_llh).unwrap();
        assert_eq!(enu.shape(), (2, 6));
        // rotations keep lengths of both blocks
        for i in 0..2 {
            assert_relative_eq!(
                enu.fixed_view::<1, 3>(i, 0).norm(),
                values.fixed_view::<1, 3>(i, 0).norm(),
                epsilon = 1e-12
            );
            assert_relative_eq!(
                enu.fixed_view::<1, 3>(i, 3).norm(),
                values.fixed_view::<1, 3>(i, 3).norm(),
                epsilon = 1e-12
            );
        }
        assert_relative_eq!(enu2trs(&enu, &ref_llh).unwrap(), values, epsilon = 1e-12);
    }

    #[test]
    fn up_points_away_from_the_equator_center() {
        // at lat = lon = 0, east is +y, north is +z, and up is +x
        let ref_llh = DMatrix::from_row_slice(1, 2, &[0., 0.]);
        let trs = DMatrix::from_row_slice(3, 3, &[0., 1., 0., 0., 0., 1., 1., 0., 0.]);
        let enu = trs2enu(&trs, &ref_llh).unwrap();
        assert_relative_eq!(enu, DMatrix::identity(3, 3), epsilon = 1e-15);
    }
}
