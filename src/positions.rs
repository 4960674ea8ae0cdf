use crate::attributes::{AttributeValue, Attributes};
use crate::coordinate_systems::{Layout, PosVelLike, PositionLike, SystemDef};
use crate::ellipsoid::Ellipsoid;
use crate::error::{GeoError, Result};
use crate::fields::{
    apparent_positions, field_unit, local_angles, vectors_between, zenith_distance, Field,
    Target, POSITION_FIELDS,
};
use crate::geodetic::trs2llh;
use crate::registry::{CoordinateArray, Registry};
use crate::util::{normalize_rows, require_finite, row_norms, write_rows};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(doc)]
use crate::Direction;

/// Absolute positions (or positions and velocities), one observation per row.
///
/// A `PositionArray` is an `N×C` matrix of values in one of the registered systems of its
/// family, where `C` is fixed by the system (eg, 3 for `trs` and `llh` positions, 6 for `trs`
/// and `kepler` states). Use the [`Position`] and [`PosVel`] aliases rather than naming the
/// layout directly.
///
/// Besides its values, every array carries
///
/// - the [`Ellipsoid`] used for geodetic conversions (GRS80 unless set otherwise),
/// - an optional `other` [`Target`] against which the derived fields like [`distance`] or
///   [`elevation`] are computed, and
/// - the extension attributes registered for its family.
///
/// All of these travel along when the array is converted into another system.
///
/// Derived fields are recomputed on every call. If `other` is reassigned, the next call sees the
/// new target; callers that need a value repeatedly should hold on to the result.
///
/// ```
/// use geoarray::Position;
///
/// let oslo = Position::from_slice(&[3172870.7, 604208.3, 5481574.2], "trs")?;
/// let llh = oslo.to_system("llh")?;
/// assert_eq!(llh.system(), "llh");
/// assert!((llh.val()[(0, 0)].to_degrees() - 59.7).abs() < 0.1);
/// # Ok::<(), geoarray::GeoError>(())
/// ```
///
/// [`distance`]: PositionArray::distance
/// [`elevation`]: PositionArray::elevation
#[derive(Debug, Clone)]
pub struct PositionArray<L: Layout> {
    values: DMatrix<f64>,
    system: Arc<SystemDef>,
    other: Option<Arc<dyn Target>>,
    ellipsoid: Ellipsoid,
    attributes: Attributes,
    layout: PhantomData<L>,
}

/// Positions with three columns per observation.
pub type Position = PositionArray<PositionLike>;

/// Positions and velocities with six columns per observation.
pub type PosVel = PositionArray<PosVelLike>;

impl<L: Layout> PositionArray<L> {
    /// Wraps `values` as an array in the registered `system`.
    ///
    /// Fails if `system` is not registered for this family, if `values` does not have the
    /// system's number of columns, or if any value is NaN or infinite.
    pub fn new(values: DMatrix<f64>, system: &str) -> Result<Self> {
        let system = L::positions().system(system)?;
        system.check_shape(L::POSITION_NAME, values.nrows(), values.ncols())?;
        require_finite(L::POSITION_NAME, &values)?;
        Ok(Self {
            values,
            system,
            other: None,
            ellipsoid: Ellipsoid::default(),
            attributes: Attributes::default(),
            layout: PhantomData,
        })
    }

    /// Wraps a single observation, producing an array with one row.
    pub fn from_slice(values: &[f64], system: &str) -> Result<Self> {
        Self::new(DMatrix::from_row_slice(1, values.len(), values), system)
    }

    /// Wraps one observation per element of `rows`.
    pub fn from_rows<const C: usize>(rows: &[[f64; C]], system: &str) -> Result<Self> {
        Self::new(
            DMatrix::from_row_iterator(rows.len(), C, rows.iter().flatten().copied()),
            system,
        )
    }

    /// Sets the target that the derived fields are computed against.
    #[must_use]
    pub fn with_other(mut self, other: Arc<dyn Target>) -> Self {
        self.other = Some(other);
        self
    }

    pub fn set_other(&mut self, other: Option<Arc<dyn Target>>) {
        self.other = other;
    }

    #[must_use]
    pub fn other(&self) -> Option<&Arc<dyn Target>> {
        self.other.as_ref()
    }

    #[must_use]
    pub fn with_ellipsoid(mut self, ellipsoid: Ellipsoid) -> Self {
        self.ellipsoid = ellipsoid;
        self
    }

    pub fn set_ellipsoid(&mut self, ellipsoid: Ellipsoid) {
        self.ellipsoid = ellipsoid;
    }

    #[must_use]
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Sets an extension attribute registered for this family.
    ///
    /// The value must hold either one value or one value per observation.
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Result<Self> {
        self.set_attribute(name, value)?;
        Ok(self)
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> Result<()> {
        let num_obs = self.num_obs();
        self.attributes.set(
            L::POSITION_NAME,
            L::positions().has_attribute(name),
            num_obs,
            name,
            value.into(),
        )
    }

    /// Unsets an extension attribute, returning its previous value.
    pub fn clear_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Returns the value of an extension attribute, or `None` if it is registered but unset.
    pub fn attribute(&self, name: &str) -> Result<Option<&AttributeValue>> {
        if !L::positions().has_attribute(name) {
            return Err(GeoError::AttributeNotFound {
                type_name: L::POSITION_NAME,
                key: name.to_string(),
            });
        }
        Ok(self.attributes.get(name))
    }

    /// Every extension attribute registered for this family, with its value if set.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, Option<AttributeValue>> {
        self.attributes.report(L::positions().attribute_names())
    }

    /// The raw values in the current system, without any conversion.
    #[must_use]
    pub fn val(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Name of the current system.
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

    /// Converts this array into the registered system `system`, going through intermediate
    /// systems if there is no direct conversion.
    pub fn to_system(&self, system: &str) -> Result<Self> {
        L::positions().convert(self, system)
    }

    /// Resolves `name` on this array.
    ///
    /// Names are tried in this order:
    ///
    /// 1. a registered system, giving the whole array converted into it,
    /// 2. a column of the current system,
    /// 3. a derived field (`distance`, `azimuth`, `aberrated_elevation`, ...).
    ///
    /// ```
    /// use geoarray::{Field, Position};
    ///
    /// let p = Position::from_slice(&[6378137., 0., 0.], "trs")?;
    /// assert!(matches!(p.get("x")?, Field::Column(x) if x[0] == 6378137.));
    /// let height = p.get("llh")?.into_system().unwrap().get("height")?;
    /// assert!(height.into_vector().unwrap()[0].abs() < 1e-6);
    /// # Ok::<(), geoarray::GeoError>(())
    /// ```
    pub fn get(&self, name: &str) -> Result<Field<Self>> {
        if L::positions().has_system(name) {
            return self.to_system(name).map(Field::System);
        }
        if let Some(c) = self.system.column_index(name) {
            return Ok(Field::Column(self.values.column(c).into_owned()));
        }
        Ok(match name {
            "distance" => Field::Scalars(self.distance()?),
            "direction" => Field::Vectors(self.direction()?),
            "azimuth" => Field::Scalars(self.azimuth()?),
            "elevation" => Field::Scalars(self.elevation()?),
            "zenith_distance" => Field::Scalars(self.zenith_distance()?),
            "aberration" => Field::Vectors(self.aberration()?),
            "aberrated_distance" => Field::Scalars(self.aberrated_distance()?),
            "aberrated_direction" => Field::Vectors(self.aberrated_direction()?),
            "aberrated_azimuth" => Field::Scalars(self.aberrated_azimuth()?),
            "aberrated_elevation" => Field::Scalars(self.aberrated_elevation()?),
            "aberrated_zenith_distance" => Field::Scalars(self.aberrated_zenith_distance()?),
            _ => {
                return Err(GeoError::AttributeNotFound {
                    type_name: L::POSITION_NAME,
                    key: name.to_string(),
                })
            }
        })
    }

    /// Unit names of what [`get`](Self::get) returns for `name`.
    ///
    /// An empty `name` gives the units of every column of the current system.
    pub fn unit(&self, name: &str) -> Result<Vec<String>> {
        unit_of(L::positions(), &self.system, name, POSITION_FIELDS, L::POSITION_NAME)
    }

    /// Geocentric cartesian positions, without any velocity columns.
    pub fn trs_positions(&self) -> Result<DMatrix<f64>> {
        let trs = self.to_system("trs")?;
        Ok(trs.values.columns(0, 3).into_owned())
    }

    /// Geodetic latitude, longitude, and height of the positions on this array's ellipsoid.
    pub fn llh_of_positions(&self) -> Result<DMatrix<f64>> {
        trs2llh(&self.trs_positions()?, &self.ellipsoid)
    }

    /// Vectors from these positions to `target`, in TRS.
    ///
    /// A single row on either side is broadcast against the other.
    pub fn vector_to(&self, target: &dyn Target) -> Result<DMatrix<f64>> {
        let to = self.finite_positions_of("vector_to", target)?;
        vectors_between("vector_to", &self.trs_positions()?, &to)
    }

    pub fn distance_to(&self, target: &dyn Target) -> Result<DVector<f64>> {
        Ok(row_norms(&self.vector_to(target)?))
    }

    /// Unit vectors towards `target`, in TRS.
    ///
    /// For targets without a finite position (like a [`Direction`]), the target itself is asked
    /// for the direction from these positions.
    pub fn direction_to(&self, target: &dyn Target) -> Result<DMatrix<f64>> {
        let from = self.trs_positions()?;
        match target.positions_in_trs()? {
            Some(to) => Ok(normalize_rows(&vectors_between("direction_to", &from, &to)?)),
            None => target.direction_from(&from),
        }
    }

    /// Azimuth towards `target` in the local frame of each position, clockwise from north in
    /// [0, 2π).
    pub fn azimuth_to(&self, target: &dyn Target) -> Result<DVector<f64>> {
        Ok(self.local_angles_of(&self.direction_to(target)?)?.0)
    }

    /// Elevation of `target` above the local horizon of each position.
    pub fn elevation_to(&self, target: &dyn Target) -> Result<DVector<f64>> {
        Ok(self.local_angles_of(&self.direction_to(target)?)?.1)
    }

    pub fn zenith_distance_to(&self, target: &dyn Target) -> Result<DVector<f64>> {
        Ok(zenith_distance(self.elevation_to(target)?))
    }

    /// Distance to `other`.
    pub fn distance(&self) -> Result<DVector<f64>> {
        self.distance_to(self.require_other()?)
    }

    /// Unit vectors towards `other`.
    pub fn direction(&self) -> Result<DMatrix<f64>> {
        self.direction_to(self.require_other()?)
    }

    /// Azimuth towards `other`.
    pub fn azimuth(&self) -> Result<DVector<f64>> {
        self.azimuth_to(self.require_other()?)
    }

    /// Elevation of `other`.
    pub fn elevation(&self) -> Result<DVector<f64>> {
        self.elevation_to(self.require_other()?)
    }

    /// Zenith distance of `other`.
    pub fn zenith_distance(&self) -> Result<DVector<f64>> {
        self.zenith_distance_to(self.require_other()?)
    }

    /// Shift of `other` caused by the rotation of the earth while its signal travels to these
    /// positions, as apparent minus true position in TRS.
    pub fn aberration(&self) -> Result<DMatrix<f64>> {
        let other = self.require_other()?;
        let true_positions = self.finite_positions_of("aberration", other)?;
        let apparent = apparent_positions(&self.trs_positions()?, &true_positions)?;
        vectors_between("aberration", &true_positions, &apparent)
    }

    /// Distance to the apparent position of `other`.
    pub fn aberrated_distance(&self) -> Result<DVector<f64>> {
        Ok(row_norms(&self.vectors_to_apparent_other()?))
    }

    pub fn aberrated_direction(&self) -> Result<DMatrix<f64>> {
        Ok(normalize_rows(&self.vectors_to_apparent_other()?))
    }

    pub fn aberrated_azimuth(&self) -> Result<DVector<f64>> {
        Ok(self.local_angles_of(&self.vectors_to_apparent_other()?)?.0)
    }

    pub fn aberrated_elevation(&self) -> Result<DVector<f64>> {
        Ok(self.local_angles_of(&self.vectors_to_apparent_other()?)?.1)
    }

    pub fn aberrated_zenith_distance(&self) -> Result<DVector<f64>> {
        Ok(zenith_distance(self.aberrated_elevation()?))
    }

    fn require_other(&self) -> Result<&dyn Target> {
        self.other
            .as_deref()
            .ok_or(GeoError::MissingAttribute {
                type_name: L::POSITION_NAME,
                attribute: "other",
            })
    }

    fn finite_positions_of(&self, operation: &'static str, target: &dyn Target) -> Result<DMatrix<f64>> {
        target
            .positions_in_trs()?
            .ok_or_else(|| GeoError::UndefinedOperation {
                operation,
                left: L::POSITION_NAME,
                right: target.type_name(),
            })
    }

    fn vectors_to_apparent_other(&self) -> Result<DMatrix<f64>> {
        let other = self.require_other()?;
        let from = self.trs_positions()?;
        let apparent = apparent_positions(&from, &self.finite_positions_of("aberration", other)?)?;
        vectors_between("aberration", &from, &apparent)
    }

    fn local_angles_of(&self, vectors: &DMatrix<f64>) -> Result<(DVector<f64>, DVector<f64>)> {
        local_angles(vectors, &self.llh_of_positions()?)
    }

    /// Same array with new values in the same system; per-observation attributes that no
    /// longer fit the row count are dropped.
    pub(crate) fn with_values(&self, values: DMatrix<f64>) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.fit_to(values.nrows());
        Self {
            values,
            system: Arc::clone(&self.system),
            other: self.other.clone(),
            ellipsoid: self.ellipsoid,
            attributes,
            layout: PhantomData,
        }
    }
}

/// Shared implementation of `unit` for positions and deltas.
pub(crate) fn unit_of<A>(
    registry: &Registry<A>,
    system: &SystemDef,
    name: &str,
    fields: &[(&str, &'static str)],
    type_name: &'static str,
) -> Result<Vec<String>> {
    if name.is_empty() {
        return Ok(system.units().to_vec());
    }
    if registry.has_system(name) {
        return Ok(registry.system(name)?.units().to_vec());
    }
    if let Some(c) = system.column_index(name) {
        return Ok(vec![system.units()[c].clone()]);
    }
    field_unit(fields, name)
        .map(|unit| vec![unit.to_string()])
        .ok_or_else(|| GeoError::AttributeNotFound {
            type_name,
            key: name.to_string(),
        })
}

impl<L: Layout> CoordinateArray for PositionArray<L> {
    const TYPE_NAME: &'static str = L::POSITION_NAME;

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
            other: self.other.clone(),
            ellipsoid: self.ellipsoid,
            attributes: self.attributes.clone(),
            layout: PhantomData,
        }
    }
}

impl<L: Layout> Target for PositionArray<L> {
    fn type_name(&self) -> &'static str {
        L::POSITION_NAME
    }

    fn num_obs(&self) -> usize {
        self.values.nrows()
    }

    fn positions_in_trs(&self) -> Result<Option<DMatrix<f64>>> {
        self.trs_positions().map(Some)
    }
}

impl<L: Layout> PartialEq<Self> for PositionArray<L> {
    fn eq(&self, other: &Self) -> bool {
        let same_other = match (&self.other, &other.other) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.system == other.system
            && self.values == other.values
            && self.ellipsoid == other.ellipsoid
            && self.attributes == other.attributes
            && same_other
    }
}

#[cfg(any(test, feature = "approx"))]
impl<L: Layout> AbsDiffEq<Self> for PositionArray<L> {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        // meters in trs, but also fine for radians in llh
        1e-9
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.system == other.system
            && self.values.shape() == other.values.shape()
            && self.values.abs_diff_eq(&other.values, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<L: Layout> RelativeEq for PositionArray<L> {
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

impl<L: Layout> fmt::Display for PositionArray<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", L::POSITION_NAME, self.system)?;
        write_rows(f, &self.values)
    }
}
