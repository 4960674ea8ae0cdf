//! Arrays of geodetic coordinates that know which coordinate system they are in, and how to get
//! to any other one.
//!
//! Every array type in this crate ([`Position`], [`PosVel`], [`PositionDelta`], and
//! [`PosVelDelta`]) wraps an `N×C` matrix of observations together with the name of the system
//! the values are expressed in. Systems live in a per-family [`Registry`], which holds direct
//! conversions between pairs of systems and finds the shortest chain of direct conversions
//! between any two of them. Asking for a system an array is not in converts it along that
//! chain:
//!
//! ```
//! use geoarray::{Field, Position};
//!
//! let oslo = Position::from_slice(&[3172870.7, 604208.3, 5481574.2], "trs")?;
//! let llh = oslo.to_system("llh")?;
//! assert!((llh.val()[(0, 0)].to_degrees() - 59.66).abs() < 0.01);
//!
//! // columns of the current system and whole other systems resolve by name
//! assert!(matches!(llh.get("lon")?, Field::Column(_)));
//! assert!(matches!(oslo.get("llh")?, Field::System(_)));
//! # Ok::<(), geoarray::GeoError>(())
//! ```
//!
//! Positions can look at another [`Target`] (a second set of positions, or a [`Direction`]
//! towards something far away) to compute distances, azimuths, elevations, and their
//! light-time aberrated counterparts:
//!
//! ```
//! use geoarray::Position;
//! use std::sync::Arc;
//!
//! let station = Position::from_slice(&[6378137., 0., 0.], "trs")?;
//! let satellite = Position::from_slice(&[26378137., 0., 0.], "trs")?;
//! let station = station.with_other(Arc::new(satellite));
//!
//! assert_eq!(station.distance()?[0], 2e7);
//! assert!((station.elevation()?[0].to_degrees() - 90.).abs() < 1e-9);
//! # Ok::<(), geoarray::GeoError>(())
//! ```
//!
//! Deltas are relative to a reference position, which local systems like `enu` need; positions
//! and deltas combine with `+` and `-` on references, returning a [`Result`] since the two sides
//! must agree on their number of observations. [`AnyArray`] offers the same operations when the
//! family is only known at runtime.

mod attributes;
mod coordinate_systems;
mod deltas;
mod directions;
mod ellipsoid;
mod error;
mod fields;
mod ops;
mod positions;
mod registry;
mod util;

pub mod constants;
pub mod geodetic;
pub mod orbit;
pub mod systems;

pub use attributes::AttributeValue;
pub use coordinate_systems::{
    Layout, PosVelLike, PositionLike, SystemDef, METER, METER_PER_SECOND, RADIAN, UNITLESS,
};
pub use deltas::{DeltaArray, PosVelDelta, PositionDelta};
pub use directions::Direction;
pub use ellipsoid::{Ellipsoid, GRS80, WGS72, WGS84};
pub use error::{GeoError, Result};
pub use fields::{Field, Target};
pub use ops::AnyArray;
pub use positions::{PosVel, Position, PositionArray};
pub use registry::{converter, Converter, CoordinateArray, Hop, Registry};
pub use systems::{
    position_delta_registry, position_registry, posvel_delta_registry, posvel_registry,
};
