use crate::error::{GeoError, Result};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use uom::si::angle::radian;
use uom::si::f64::Angle;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

/// An angle that compares and reports modulo a full turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BoundedAngle {
    angle: Angle,
}

impl BoundedAngle {
    pub(crate) fn new(angle: impl Into<Angle>) -> Self {
        Self {
            // uom may store the value differently-normalized, so we normalize on output as well.
            angle: Angle::new::<radian>(Self::into_bounds(angle.into())),
        }
    }

    pub(crate) fn from_radians(radians: f64) -> Self {
        Self::new(Angle::new::<radian>(radians))
    }

    /// Returns the angle in [0°, 360°) in radians.
    pub(crate) fn get_bounded(self) -> f64 {
        Self::into_bounds(self.angle)
    }

    fn into_bounds(angle: Angle) -> f64 {
        let out_of_bounds: f64 = angle.get::<radian>();
        let bounded = out_of_bounds.rem_euclid(Angle::FULL_TURN.get::<radian>());
        // rem_euclid of a tiny negative number rounds up to exactly one full turn
        if bounded == Angle::FULL_TURN.get::<radian>() {
            0.
        } else {
            bounded
        }
    }

    /// Returns the angle in [-180°, 180°) in radians.
    pub(crate) fn to_signed_range(self) -> f64 {
        let angle = self.get_bounded();
        if angle < Angle::HALF_TURN.get::<radian>() {
            angle
        } else {
            angle - Angle::FULL_TURN.get::<radian>()
        }
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for BoundedAngle {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        let bounded = self.get_bounded();
        let other_bounded = other.get_bounded();

        let min = f64::min(bounded, other_bounded);
        let max = f64::max(bounded, other_bounded);

        f64::relative_eq(&min, &max, epsilon, max_relative)
            || f64::relative_eq(
                &(min + Angle::FULL_TURN.get::<radian>()),
                &max,
                epsilon,
                max_relative,
            )
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for BoundedAngle {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        // this is very accurate in radians
        0.000_000_001
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        Self::new(self.angle - other.angle).to_signed_range().abs() <= epsilon
    }
}

/// Returns the number of observations produced by combining `left` and `right` rows.
///
/// Equal lengths combine row by row, and a single row broadcasts against any length.
pub(crate) fn broadcast_len(operation: &'static str, left: usize, right: usize) -> Result<usize> {
    match (left, right) {
        (l, r) if l == r => Ok(l),
        (1, r) => Ok(r),
        (l, 1) => Ok(l),
        (left, right) => Err(GeoError::LengthMismatch {
            operation,
            left,
            right,
        }),
    }
}

/// Repeats a single-row matrix `num_obs` times; other matrices are returned unchanged.
pub(crate) fn broadcast_rows(values: &DMatrix<f64>, num_obs: usize) -> DMatrix<f64> {
    if values.nrows() == 1 && num_obs != 1 {
        DMatrix::from_fn(num_obs, values.ncols(), |_, c| values[(0, c)])
    } else {
        values.clone()
    }
}

/// Fails on the first NaN or infinite value, scanning row by row.
pub(crate) fn require_finite(type_name: &'static str, values: &DMatrix<f64>) -> Result<()> {
    for (row, values) in values.row_iter().enumerate() {
        if let Some((column, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(GeoError::NonFiniteValue {
                type_name,
                row,
                column,
                value,
            });
        }
    }
    Ok(())
}

/// Row-wise Euclidean norm.
pub(crate) fn row_norms(values: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(
        values.nrows(),
        values.row_iter().map(|row| row.norm()),
    )
}

/// Scales every row to unit length. Zero rows become NaN, as their direction is undefined.
pub(crate) fn normalize_rows(values: &DMatrix<f64>) -> DMatrix<f64> {
    let mut unit = values.clone();
    for mut row in unit.row_iter_mut() {
        let norm = row.norm();
        row /= norm;
    }
    unit
}

/// Writes one indented `[a, b, c]` line per row.
pub(crate) fn write_rows(f: &mut fmt::Formatter<'_>, values: &DMatrix<f64>) -> fmt::Result {
    for row in values.row_iter() {
        write!(f, "\n  [")?;
        for (c, value) in row.iter().enumerate() {
            if c > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        broadcast_len, broadcast_rows, normalize_rows, require_finite, row_norms, BoundedAngle,
    };
    use crate::error::GeoError;
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne, assert_relative_eq};
    use nalgebra::DMatrix;
    use rstest::rstest;
    use uom::si::angle::{degree, radian};
    use uom::si::f64::Angle;

    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[test]
    fn bounded_angle_negative_radians() {
        let out_of_bounds = -(0.5 * Angle::HALF_TURN);
        let sut = BoundedAngle::new(out_of_bounds);
        assert_eq!(sut.get_bounded(), 1.5 * Angle::HALF_TURN.get::<radian>());
    }

    #[test]
    fn bounded_angle_tiny_negative_is_zero_not_full_turn() {
        let sut = BoundedAngle::from_radians(-1e-18);
        assert!(sut.get_bounded() < Angle::FULL_TURN.get::<radian>());
    }

    #[rstest]
    #[case(d(0.), 0.)]
    #[case(d(180.), -180.)]
    #[case(d(359.), -1.)]
    #[case(d(270.), -90.)]
    #[case(d(-180.), -180.)]
    #[case(d(360.+340.), -20.)]
    fn bounded_angle_to_signed_range_converts_correctly(
        #[case] input: Angle,
        #[case] expected_result_in_degrees: f64,
    ) {
        assert_relative_eq!(
            BoundedAngle::new(input).to_signed_range(),
            expected_result_in_degrees.to_radians(),
            epsilon = f64::EPSILON * 1000.
        );
    }

    #[rstest]
    #[case(360. - f64::EPSILON * 1e3, 0., true)]
    #[case(10., 2. + 360., false)]
    fn bounded_angle_comparison_wraps(#[case] a: f64, #[case] b: f64, #[case] expected: bool) {
        let a = BoundedAngle::new(d(a));
        let b = BoundedAngle::new(d(b));
        if expected {
            assert_abs_diff_eq!(&a, &b, epsilon = f64::EPSILON * 1e3);
        } else {
            assert_abs_diff_ne!(&a, &b, epsilon = f64::EPSILON * 1e3);
        }
    }

    #[rstest]
    #[case(4, 4, Some(4))]
    #[case(1, 7, Some(7))]
    #[case(7, 1, Some(7))]
    #[case(3, 2, None)]
    fn broadcasting_lengths(#[case] left: usize, #[case] right: usize, #[case] expected: Option<usize>) {
        match expected {
            Some(n) => assert_eq!(broadcast_len("test", left, right), Ok(n)),
            None => assert!(matches!(
                broadcast_len("test", left, right),
                Err(GeoError::LengthMismatch { .. })
            )),
        }
    }

    #[test]
    fn single_rows_are_repeated() {
        let one = DMatrix::from_row_slice(1, 3, &[1., 2., 3.]);
        let many = broadcast_rows(&one, 3);
        assert_eq!(many.nrows(), 3);
        assert_eq!(many.row(2), one.row(0));
    }

    #[test]
    fn rows_are_normalized() {
        let values = DMatrix::from_row_slice(2, 3, &[3., 0., 4., 0., 2., 0.]);
        assert_eq!(row_norms(&values).as_slice(), &[5., 2.]);
        let unit = normalize_rows(&values);
        assert_relative_eq!(unit[(0, 0)], 0.6);
        assert_relative_eq!(unit[(0, 2)], 0.8);
        assert_relative_eq!(unit[(1, 1)], 1.0);
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    fn non_finite_values_are_located(#[case] bad: f64) {
        let mut values = DMatrix::from_element(3, 2, 1.);
        values[(2, 1)] = bad;
        values[(1, 0)] = bad;
        assert!(matches!(
            require_finite("test", &values),
            Err(GeoError::NonFiniteValue { row: 1, column: 0, .. })
        ));
        assert_eq!(require_finite("test", &DMatrix::from_element(3, 2, -1e300)), Ok(()));
    }
}
