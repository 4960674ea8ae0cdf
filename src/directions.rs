use crate::error::Result;
use crate::fields::Target;
use crate::geodetic::require_columns;
use crate::util::{broadcast_len, broadcast_rows, normalize_rows, write_rows, BoundedAngle};
use nalgebra::{DMatrix, DVector};
use std::fmt::{self, Display, Formatter};
use uom::si::angle::radian;
use uom::si::f64::Angle;

#[cfg(any(feature = "approx", test))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::Position;

/// Directions towards objects so far away that they have no meaningful position, like radio
/// sources or stars, as unit vectors in TRS.
///
/// A `Direction` can be the `other` of a [`Position`]: the direction, azimuth, elevation, and
/// zenith distance towards it are defined, while distance and aberration are not.
///
/// ```
/// use geoarray::{Direction, Position};
/// use std::f64::consts::FRAC_PI_2;
/// use std::sync::Arc;
/// use uom::si::angle::degree;
/// use uom::si::f64::Angle;
///
/// let north_pole = Position::from_slice(&[0., 0., 6356752.3], "trs")?;
/// let polaris = Direction::from_angles(Angle::new::<degree>(37.95), Angle::new::<degree>(89.26));
/// let elevation = north_pole.with_other(Arc::new(polaris)).elevation()?;
/// assert!((elevation[0] - 89.26f64.to_radians()).abs() < 1e-9);
/// # Ok::<(), geoarray::GeoError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Direction {
    unit_vectors: DMatrix<f64>,
}

impl Direction {
    /// Builds directions from vectors with three columns, normalizing every row.
    pub fn from_vectors(vectors: &DMatrix<f64>) -> Result<Self> {
        require_columns("Direction", "trs", vectors, 3)?;
        Ok(Self {
            unit_vectors: normalize_rows(&vectors.columns(0, 3).into_owned()),
        })
    }

    /// A single direction at the given right ascension (longitude-like, counter-clockwise from
    /// the X axis) and declination (latitude-like, up from the equatorial plane).
    #[must_use]
    pub fn from_angles(right_ascension: impl Into<Angle>, declination: impl Into<Angle>) -> Self {
        let ra = right_ascension.into().get::<radian>();
        let dec = declination.into().get::<radian>();
        let (sin_ra, cos_ra) = ra.sin_cos();
        let (sin_dec, cos_dec) = dec.sin_cos();
        Self {
            unit_vectors: DMatrix::from_row_slice(
                1,
                3,
                &[cos_dec * cos_ra, cos_dec * sin_ra, sin_dec],
            ),
        }
    }

    #[must_use]
    pub fn unit_vectors(&self) -> &DMatrix<f64> {
        &self.unit_vectors
    }

    #[must_use]
    pub fn num_obs(&self) -> usize {
        self.unit_vectors.nrows()
    }

    /// Right ascension of every direction, in [0, 2π).
    #[must_use]
    pub fn right_ascension(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.num_obs(),
            self.unit_vectors
                .row_iter()
                .map(|v| BoundedAngle::from_radians(v[1].atan2(v[0])).get_bounded()),
        )
    }

    #[must_use]
    pub fn declination(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.num_obs(),
            self.unit_vectors
                .row_iter()
                .map(|v| v[2].clamp(-1., 1.).asin()),
        )
    }
}

impl Target for Direction {
    fn type_name(&self) -> &'static str {
        "Direction"
    }

    fn num_obs(&self) -> usize {
        self.unit_vectors.nrows()
    }

    fn positions_in_trs(&self) -> Result<Option<DMatrix<f64>>> {
        Ok(None)
    }

    // parallel from everywhere, so the origin only matters for the number of rows
    fn direction_from(&self, origin: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let num_obs = broadcast_len("direction_to", origin.nrows(), self.num_obs())?;
        Ok(broadcast_rows(&self.unit_vectors, num_obs))
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Direction")?;
        write_rows(f, &self.unit_vectors)
    }
}

#[cfg(any(feature = "approx", test))]
impl AbsDiffEq<Self> for Direction {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        // unitless, so this is roughly radians
        1e-12
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.unit_vectors.shape() == other.unit_vectors.shape()
            && self.unit_vectors.abs_diff_eq(&other.unit_vectors, epsilon)
    }
}

#[cfg(any(feature = "approx", test))]
impl RelativeEq for Direction {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.unit_vectors.shape() == other.unit_vectors.shape()
            && self
                .unit_vectors
                .relative_eq(&other.unit_vectors, epsilon, max_relative)
    }
}
