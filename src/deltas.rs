use crate::attributes::{AttributeValue, Attributes};
use crate::coordinate_systems::{Layout, PosVelLike, PositionLike, SystemDef};
use crate::error::{GeoError, Result};
use crate::fields::{local_angles, zenith_distance, Field, DELTA_FIELDS};
use crate::positions::{unit_of, PositionArray};
use crate::registry::CoordinateArray;
use crate::util::{normalize_rows, require_finite, row_norms, write_rows};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

/// Relative vectors (or relative states), one observation per row, tied to a reference position.
///
/// The reference position (`ref_pos`) is shared, not owned: many deltas can point at the same
/// [`PositionArray`]. It has either one row shared by every observation or one row per
/// observation. Local systems like `enu` are oriented at the reference position, so converting
/// into or out of them reads its geodetic latitude and longitude.
///
/// ```
/// use geoarray::{Position, PositionDelta};
///
/// let station = Position::from_slice(&[6378137., 0., 0.], "trs")?;
/// let up = PositionDelta::from_slice(&[0., 0., 10.], "enu", station)?;
/// let trs = up.to_system("trs")?;
/// assert!((trs.val()[(0, 0)] - 10.).abs() < 1e-9);
/// # Ok::<(), geoarray::GeoError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DeltaArray<L: Layout> {
    values: DMatrix<f64>,
    system: Arc<SystemDef>,
    ref_pos: Arc<PositionArray<L>>,
    attributes: Attributes,
}

/// Relative positions with three columns per observation.
pub type PositionDelta = DeltaArray<PositionLike>;

/// Relative positions and velocities with six columns per observation.
pub type PosVelDelta = DeltaArray<PosVelLike>;

impl<L: Layout> DeltaArray<L> {
    /// Wraps `values` as deltas in the registered `system`, relative to `ref_pos`.
    ///
    /// Every value must be finite, and `ref_pos` must hold either one position or one per row.
    pub fn new(
        values: DMatrix<f64>,
        system: &str,
        ref_pos: impl Into<Arc<PositionArray<L>>>,
    ) -> Result<Self> {
        let system = L::deltas().system(system)?;
        system.check_shape(L::DELTA_NAME, values.nrows(), values.ncols())?;
        require_finite(L::DELTA_NAME, &values)?;
        let ref_pos = ref_pos.into();
        check_ref_rows(values.nrows(), &ref_pos)?;
        Ok(Self {
            values,
            system,
            ref_pos,
            attributes: Attributes::default(),
        })
    }

    /// Wraps a single observation, producing an array with one row.
    pub fn from_slice(
        values: &[f64],
        system: &str,
        ref_pos: impl Into<Arc<PositionArray<L>>>,
    ) -> Result<Self> {
        Self::new(DMatrix::from_row_slice(1, values.len(), values), system, ref_pos)
    }

    pub fn from_rows<const C: usize>(
        rows: &[[f64; C]],
        system: &str,
        ref_pos: impl Into<Arc<PositionArray<L>>>,
    ) -> Result<Self> {
        Self::new(
            DMatrix::from_row_iterator(rows.len(), C, rows.iter().flatten().copied()),
            system,
            ref_pos,
        )
    }

    #[must_use]
    pub fn ref_pos(&self) -> &Arc<PositionArray<L>> {
        &self.ref_pos
    }

    /// Points this delta at another reference position.
    ///
    /// Values are kept as they are; in local systems that means the vectors are reinterpreted
    /// in the frame of the new reference.
    pub fn set_ref_pos(&mut self, ref_pos: impl Into<Arc<PositionArray<L>>>) -> Result<()> {
        let ref_pos = ref_pos.into();
        check_ref_rows(self.num_obs(), &ref_pos)?;
        self.ref_pos = ref_pos;
        Ok(())
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Result<Self> {
        self.set_attribute(name, value)?;
        Ok(self)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> Result<()> {
        let num_obs = self.num_obs();
        self.attributes.set(
            L::DELTA_NAME,
            L::deltas().has_attribute(name),
            num_obs,
            name,
            value.into(),
        )
    }

    pub fn clear_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    pub fn attribute(&self, name: &str) -> Result<Option<&AttributeValue>> {
        if !L::deltas().has_attribute(name) {
            return Err(GeoError::AttributeNotFound {
                type_name: L::DELTA_NAME,
                key: name.to_string(),
            });
        }
        Ok(self.attributes.get(name))
    }

    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, Option<AttributeValue>> {
        self.attributes.report(L::deltas().attribute_names())
    }

    #[must_use]
    pub fn val(&self) -> &DMatrix<f64> {
        &self.values
    }

    #[must_use]
    pub fn system(&self) -> &str {
        self.system.name()
    }

    #[must_use]
    pub fn system_def(&self) -> &SystemDef {
        &self.system
    }

    #[must_use]
    pub fn num_obs(&self) -> usize {
        self.values.nrows()
    }

    pub fn to_system(&self, system: &str) -> Result<Self> {
        L::deltas().convert(self, system)
    }

    /// Resolves `name` as a registered system, a column of the current system, or a derived
    /// field (`length`, `direction`, `azimuth`, `elevation`, `zenith_distance`), in that order.
    pub fn get(&self, name: &str) -> Result<Field<Self>> {
        if L::deltas().has_system(name) {
            return self.to_system(name).map(Field::System);
        }
        if let Some(c) = self.system.column_index(name) {
            return Ok(Field::Column(self.values.column(c).into_owned()));
        }
        Ok(match name {
            "length" => Field::Scalars(self.length()?),
            "direction" => Field::Vectors(self.direction()?),
            "azimuth" => Field::Scalars(self.azimuth()?),
            "elevation" => Field::Scalars(self.elevation()?),
            "zenith_distance" => Field::Scalars(self.zenith_distance()?),
            _ => {
                return Err(GeoError::AttributeNotFound {
                    type_name: L::DELTA_NAME,
                    key: name.to_string(),
                })
            }
        })
    }

    pub fn unit(&self, name: &str) -> Result<Vec<String>> {
        unit_of(L::deltas(), &self.system, name, DELTA_FIELDS, L::DELTA_NAME)
    }

    /// The position part of the deltas in TRS, without any velocity columns.
    pub fn trs_vectors(&self) -> Result<DMatrix<f64>> {
        let trs = self.to_system("trs")?;
        Ok(trs.values.columns(0, 3).into_owned())
    }

    /// Length of the (position part of the) deltas.
    pub fn length(&self) -> Result<DVector<f64>> {
        Ok(row_norms(&self.trs_vectors()?))
    }

    /// Unit vectors along the deltas, in TRS.
    pub fn direction(&self) -> Result<DMatrix<f64>> {
        Ok(normalize_rows(&self.trs_vectors()?))
    }

    /// Azimuth of the deltas in the local frame of the reference position.
    pub fn azimuth(&self) -> Result<DVector<f64>> {
        Ok(self.local_angles()?.0)
    }

    /// Elevation of the deltas above the local horizon of the reference position.
    pub fn elevation(&self) -> Result<DVector<f64>> {
        Ok(self.local_angles()?.1)
    }

    pub fn zenith_distance(&self) -> Result<DVector<f64>> {
        Ok(zenith_distance(self.elevation()?))
    }

    fn local_angles(&self) -> Result<(DVector<f64>, DVector<f64>)> {
        local_angles(&self.trs_vectors()?, &self.ref_pos.llh_of_positions()?)
    }

    /// Same deltas with new values in the same system.
    pub(crate) fn with_values(&self, values: DMatrix<f64>) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.fit_to(values.nrows());
        Self {
            values,
            system: Arc::clone(&self.system),
            ref_pos: Arc::clone(&self.ref_pos),
            attributes,
        }
    }
}

fn check_ref_rows<L: Layout>(num_obs: usize, ref_pos: &PositionArray<L>) -> Result<()> {
    let ref_rows = ref_pos.num_obs();
    if ref_rows != 1 && ref_rows != num_obs {
        return Err(GeoError::LengthMismatch {
            operation: "ref_pos",
            left: num_obs,
            right: ref_rows,
        });
    }
    Ok(())
}

impl<L: Layout> CoordinateArray for DeltaArray<L> {
    const TYPE_NAME: &'static str = L::DELTA_NAME;

    fn system_def(&self) -> &Arc<SystemDef> {
        &self.system
    }

    fn num_obs(&self) -> usize {
        self.values.nrows()
    }

    fn rewrap(&self, values: DMatrix<f64>, system: Arc<SystemDef>) -> Self {
        Self {
            values,
            system,
            ref_pos: Arc::clone(&self.ref_pos),
            attributes: self.attributes.clone(),
        }
    }
}

impl<L: Layout> PartialEq<Self> for DeltaArray<L> {
    fn eq(&self, other: &Self) -> bool {
        self.system == other.system
            && self.values == other.values
            && self.attributes == other.attributes
            && (Arc::ptr_eq(&self.ref_pos, &other.ref_pos) || self.ref_pos == other.ref_pos)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<L: Layout> AbsDiffEq<Self> for DeltaArray<L> {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        1e-9
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.system == other.system
            && self.values.shape() == other.values.shape()
            && self.values.abs_diff_eq(&other.values, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<L: Layout> RelativeEq for DeltaArray<L> {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.system == other.system
            && self.values.shape() == other.values.shape()
            && self.values.relative_eq(&other.values, epsilon, max_relative)
    }
}

impl<L: Layout> fmt::Display for DeltaArray<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", L::DELTA_NAME, self.system)?;
        write_rows(f, &self.values)
    }
}
