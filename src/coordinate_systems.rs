use crate::deltas::DeltaArray;
use crate::error::{GeoError, Result};
use crate::positions::PositionArray;
use crate::registry::Registry;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::{PosVel, Position};

/// Unit name for lengths.
pub const METER: &str = "meter";
/// Unit name for velocities.
pub const METER_PER_SECOND: &str = "meter per second";
/// Unit name for angles.
pub const RADIAN: &str = "radian";
/// Unit name for dimensionless quantities.
pub const UNITLESS: &str = "unitless";

/// The layout of a coordinate system: its name plus the name and unit of every column.
///
/// A `SystemDef` is the key under which a coordinate system is registered with a [`Registry`].
/// Once registered, the column layout of a system never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SystemDef {
    name: String,
    columns: Vec<String>,
    units: Vec<String>,
}

impl SystemDef {
    /// Describes a system from `(column name, unit)` pairs.
    pub fn new(name: impl Into<String>, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|(c, _)| c.to_string()).collect(),
            units: columns.iter().map(|(_, u)| u.to_string()).collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Returns the index of the column called `name`, if there is one.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub(crate) fn check_shape(&self, type_name: &'static str, rows: usize, columns: usize) -> Result<()> {
        if columns != self.num_columns() {
            return Err(GeoError::ShapeMismatch {
                type_name,
                system: self.name.clone(),
                expected: self.num_columns(),
                rows,
                columns,
            });
        }
        Ok(())
    }
}

impl fmt::Display for SystemDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (column, unit)) in self.columns.iter().zip(&self.units).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column} [{unit}]")?;
        }
        write!(f, ")")
    }
}

/// Links an array layout (position only, or position and velocity) to its registries.
///
/// Every layout has two independent families: absolute values ([`PositionArray`]) and relative
/// values ([`DeltaArray`]), each with its own registry of systems and conversions.
///
/// This trait is implemented by [`PositionLike`] and [`PosVelLike`]; the set of layouts is fixed
/// while the set of systems within each family is open.
pub trait Layout: fmt::Debug + Clone + Copy + PartialEq + Send + Sync + 'static {
    /// Type name of the absolute family, eg `"Position"`.
    const POSITION_NAME: &'static str;
    /// Type name of the relative family, eg `"PositionDelta"`.
    const DELTA_NAME: &'static str;

    /// The registry of absolute systems for this layout.
    fn positions() -> &'static Registry<PositionArray<Self>>;

    /// The registry of relative systems for this layout.
    fn deltas() -> &'static Registry<DeltaArray<Self>>;
}

/// Marks arrays holding one position per observation (three columns).
///
/// See [`Position`] and [`PositionDelta`](crate::PositionDelta).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionLike;

impl Layout for PositionLike {
    const POSITION_NAME: &'static str = "Position";
    const DELTA_NAME: &'static str = "PositionDelta";

    fn positions() -> &'static Registry<PositionArray<Self>> {
        crate::systems::position_registry()
    }

    fn deltas() -> &'static Registry<DeltaArray<Self>> {
        crate::systems::position_delta_registry()
    }
}

/// Marks arrays holding a position and a velocity per observation (six columns).
///
/// See [`PosVel`] and [`PosVelDelta`](crate::PosVelDelta).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosVelLike;

impl Layout for PosVelLike {
    const POSITION_NAME: &'static str = "PosVel";
    const DELTA_NAME: &'static str = "PosVelDelta";

    fn positions() -> &'static Registry<PositionArray<Self>> {
        crate::systems::posvel_registry()
    }

    fn deltas() -> &'static Registry<DeltaArray<Self>> {
        crate::systems::posvel_delta_registry()
    }
}
