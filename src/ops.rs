//! Arithmetic between positions and deltas.
//!
//! For the typed arrays, only meaningful combinations have operator impls:
//!
//! | left          | op  | right         | result        |
//! |---------------|-----|---------------|---------------|
//! | position      | `+` | delta         | position      |
//! | delta         | `+` | position      | position      |
//! | position      | `-` | delta         | position      |
//! | position      | `-` | position      | delta         |
//! | delta         | `±` | delta         | delta         |
//!
//! so `position + position` does not compile. [`AnyArray`] offers the same arithmetic for arrays
//! whose type is only known at runtime and reports other combinations as
//! [`GeoError::UndefinedOperation`].
//!
//! All operators take references and return a [`Result`], since the operands may have
//! incompatible numbers of observations or need conversions that can fail.

use crate::coordinate_systems::Layout;
use crate::deltas::{DeltaArray, PosVelDelta, PositionDelta};
use crate::error::{GeoError, Result};
use crate::fields::Field;
use crate::positions::{PosVel, Position, PositionArray};
use crate::util::{broadcast_len, broadcast_rows};
use nalgebra::DMatrix;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::sync::Arc;

fn combine(
    operation: &'static str,
    left: &DMatrix<f64>,
    right: &DMatrix<f64>,
    f: impl Fn(DMatrix<f64>, DMatrix<f64>) -> DMatrix<f64>,
) -> Result<DMatrix<f64>> {
    let num_obs = broadcast_len(operation, left.nrows(), right.nrows())?;
    Ok(f(broadcast_rows(left, num_obs), broadcast_rows(right, num_obs)))
}

/// Moves `position` by `delta` (or against it), in TRS, and converts back.
fn shift<L: Layout>(
    operation: &'static str,
    position: &PositionArray<L>,
    delta: &DeltaArray<L>,
    sign: f64,
) -> Result<PositionArray<L>> {
    let trs = position.to_system("trs")?;
    let moved = combine(operation, trs.val(), delta.to_system("trs")?.val(), |p, d| {
        p + d * sign
    })?;
    trs.with_values(moved).to_system(position.system())
}

impl<L: Layout> Add<&DeltaArray<L>> for &PositionArray<L> {
    type Output = Result<PositionArray<L>>;

    /// The positions moved by `rhs`, in the system of `self`.
    fn add(self, rhs: &DeltaArray<L>) -> Self::Output {
        shift("+", self, rhs, 1.)
    }
}

impl<L: Layout> Add<&PositionArray<L>> for &DeltaArray<L> {
    type Output = Result<PositionArray<L>>;

    fn add(self, rhs: &PositionArray<L>) -> Self::Output {
        shift("+", rhs, self, 1.)
    }
}

impl<L: Layout> Sub<&DeltaArray<L>> for &PositionArray<L> {
    type Output = Result<PositionArray<L>>;

    fn sub(self, rhs: &DeltaArray<L>) -> Self::Output {
        shift("-", self, rhs, -1.)
    }
}

impl<L: Layout> Sub<&PositionArray<L>> for &PositionArray<L> {
    type Output = Result<DeltaArray<L>>;

    /// The vectors from `rhs` to `self`, relative to `rhs`.
    ///
    /// The result is in the system of `rhs` if deltas have a system of that name, and in `trs`
    /// otherwise (eg, there are no `llh` deltas).
    fn sub(self, rhs: &PositionArray<L>) -> Self::Output {
        let values = combine("-", self.to_system("trs")?.val(), rhs.to_system("trs")?.val(), |a, b| {
            a - b
        })?;
        let delta = DeltaArray::new(values, "trs", Arc::new(rhs.clone()))?;
        if L::deltas().has_system(rhs.system()) {
            delta.to_system(rhs.system())
        } else {
            Ok(delta)
        }
    }
}

impl<L: Layout> Add<&DeltaArray<L>> for &DeltaArray<L> {
    type Output = Result<DeltaArray<L>>;

    /// The sum in the system of `self`; `rhs` is converted into it first.
    fn add(self, rhs: &DeltaArray<L>) -> Self::Output {
        let rhs = rhs.to_system(self.system())?;
        let values = combine("+", self.val(), rhs.val(), |a, b| a + b)?;
        Ok(self.with_values(values))
    }
}

impl<L: Layout> Sub<&DeltaArray<L>> for &DeltaArray<L> {
    type Output = Result<DeltaArray<L>>;

    fn sub(self, rhs: &DeltaArray<L>) -> Self::Output {
        let rhs = rhs.to_system(self.system())?;
        let values = combine("-", self.val(), rhs.val(), |a, b| a - b)?;
        Ok(self.with_values(values))
    }
}

impl<L: Layout> Neg for &DeltaArray<L> {
    type Output = DeltaArray<L>;

    fn neg(self) -> Self::Output {
        self.with_values(-self.val())
    }
}

/// Any of the four array families, for code that only knows the type at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyArray {
    Position(Position),
    PositionDelta(PositionDelta),
    PosVel(PosVel),
    PosVelDelta(PosVelDelta),
}

macro_rules! each {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            AnyArray::Position($array) => $body,
            AnyArray::PositionDelta($array) => $body,
            AnyArray::PosVel($array) => $body,
            AnyArray::PosVelDelta($array) => $body,
        }
    };
}

impl AnyArray {
    /// Name of the array family, eg `"PositionDelta"`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Position(_) => "Position",
            Self::PositionDelta(_) => "PositionDelta",
            Self::PosVel(_) => "PosVel",
            Self::PosVelDelta(_) => "PosVelDelta",
        }
    }

    #[must_use]
    pub fn val(&self) -> &DMatrix<f64> {
        each!(self, a => a.val())
    }

    #[must_use]
    pub fn system(&self) -> &str {
        each!(self, a => a.system())
    }

    #[must_use]
    pub fn num_obs(&self) -> usize {
        each!(self, a => a.num_obs())
    }

    pub fn to_system(&self, system: &str) -> Result<Self> {
        Ok(match self {
            Self::Position(a) => a.to_system(system)?.into(),
            Self::PositionDelta(a) => a.to_system(system)?.into(),
            Self::PosVel(a) => a.to_system(system)?.into(),
            Self::PosVelDelta(a) => a.to_system(system)?.into(),
        })
    }

    pub fn get(&self, name: &str) -> Result<Field<Self>> {
        Ok(match self {
            Self::Position(a) => a.get(name)?.map_system(Self::from),
            Self::PositionDelta(a) => a.get(name)?.map_system(Self::from),
            Self::PosVel(a) => a.get(name)?.map_system(Self::from),
            Self::PosVelDelta(a) => a.get(name)?.map_system(Self::from),
        })
    }

    pub fn unit(&self, name: &str) -> Result<Vec<String>> {
        each!(self, a => a.unit(name))
    }

    fn undefined(&self, operation: &'static str, rhs: &Self) -> GeoError {
        GeoError::UndefinedOperation {
            operation,
            left: self.type_name(),
            right: rhs.type_name(),
        }
    }

    /// `self + rhs`, if adding these two kinds of arrays means anything.
    pub fn try_add(&self, rhs: &Self) -> Result<Self> {
        use AnyArray::{PosVel, PosVelDelta, Position, PositionDelta};
        Ok(match (self, rhs) {
            (Position(p), PositionDelta(d)) | (PositionDelta(d), Position(p)) => (p + d)?.into(),
            (PosVel(p), PosVelDelta(d)) | (PosVelDelta(d), PosVel(p)) => (p + d)?.into(),
            (PositionDelta(a), PositionDelta(b)) => (a + b)?.into(),
            (PosVelDelta(a), PosVelDelta(b)) => (a + b)?.into(),
            _ => return Err(self.undefined("+", rhs)),
        })
    }

    /// `self - rhs`, if subtracting these two kinds of arrays means anything.
    pub fn try_sub(&self, rhs: &Self) -> Result<Self> {
        use AnyArray::{PosVel, PosVelDelta, Position, PositionDelta};
        Ok(match (self, rhs) {
            (Position(a), Position(b)) => (a - b)?.into(),
            (Position(p), PositionDelta(d)) => (p - d)?.into(),
            (PositionDelta(a), PositionDelta(b)) => (a - b)?.into(),
            (PosVel(a), PosVel(b)) => (a - b)?.into(),
            (PosVel(p), PosVelDelta(d)) => (p - d)?.into(),
            (PosVelDelta(a), PosVelDelta(b)) => (a - b)?.into(),
            _ => return Err(self.undefined("-", rhs)),
        })
    }
}

impl Add<&AnyArray> for &AnyArray {
    type Output = Result<AnyArray>;

    fn add(self, rhs: &AnyArray) -> Self::Output {
        self.try_add(rhs)
    }
}

impl Sub<&AnyArray> for &AnyArray {
    type Output = Result<AnyArray>;

    fn sub(self, rhs: &AnyArray) -> Self::Output {
        self.try_sub(rhs)
    }
}

impl From<Position> for AnyArray {
    fn from(array: Position) -> Self {
        Self::Position(array)
    }
}

impl From<PositionDelta> for AnyArray {
    fn from(array: PositionDelta) -> Self {
        Self::PositionDelta(array)
    }
}

impl From<PosVel> for AnyArray {
    fn from(array: PosVel) -> Self {
        Self::PosVel(array)
    }
}

impl From<PosVelDelta> for AnyArray {
    fn from(array: PosVelDelta) -> Self {
        Self::PosVelDelta(array)
    }
}

impl fmt::Display for AnyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        each!(self, a => fmt::Display::fmt(a, f))
    }
}

#[cfg(test)]
mod tests {
    use super::AnyArray;
    use crate::deltas::{PosVelDelta, PositionDelta};
    use crate::error::GeoError;
    use crate::positions::{PosVel, Position};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::DMatrix;
    use std::sync::Arc;

    const A: f64 = 6_378_137.;

    fn trs(xyz: [f64; 3]) -> Position {
        Position::from_slice(&xyz, "trs").unwrap()
    }

    #[test]
    fn position_plus_delta_stays_in_the_position_system() {
        let llh = trs([A, 0., 0.]).to_system("llh").unwrap();
        let up = PositionDelta::from_slice(&[0., 0., 100.], "enu", Arc::new(llh.clone())).unwrap();

        let moved = (&llh + &up).unwrap();
        assert_eq!(moved.system(), "llh");
        assert_relative_eq!(moved.val()[(0, 2)], 100., epsilon = 1e-6);
        assert_abs_diff_eq!((&moved - &up).unwrap(), llh, epsilon = 1e-6);
        assert_abs_diff_eq!((&up + &llh).unwrap(), moved, epsilon = 1e-12);
    }

    #[test]
    fn difference_of_positions_is_relative_to_the_right_operand() {
        let p1 = trs([2102928.189605, 721619.617278, 5958196.398820]);
        let p2 = trs([2102000., 721000., 5958000.]);

        let delta = (&p1 - &p2).unwrap();
        assert_eq!(delta.system(), "trs");
        assert_eq!(delta.ref_pos().as_ref(), &p2);
        assert_abs_diff_eq!((&p2 + &delta).unwrap(), p1, epsilon = 1e-6);
    }

    #[test]
    fn difference_in_llh_falls_back_to_trs_deltas() {
        let p1 = trs([A, 100., 0.]).to_system("llh").unwrap();
        let p2 = trs([A, 0., 0.]).to_system("llh").unwrap();
        let delta = (&p1 - &p2).unwrap();
        assert_eq!(delta.system(), "trs");
        assert_relative_eq!(delta.length().unwrap()[0], 100., epsilon = 1e-6);
        assert_abs_diff_eq!((&p2 + &delta).unwrap(), p1, epsilon = 1e-6);
    }

    #[test]
    fn deltas_are_combined_in_the_left_system() {
        let station = Arc::new(trs([A, 0., 0.]));
        let east = PositionDelta::from_slice(&[1., 0., 0.], "enu", Arc::clone(&station)).unwrap();
        // at the equator, +y is east
        let also_east = PositionDelta::from_slice(&[0., 2., 0.], "trs", station).unwrap();

        let sum = (&east + &also_east).unwrap();
        assert_eq!(sum.system(), "enu");
        assert_relative_eq!(
            sum.val().clone(),
            DMatrix::from_row_slice(1, 3, &[3., 0., 0.]),
            epsilon = 1e-12
        );
        let difference = (&east - &also_east).unwrap();
        assert_relative_eq!(difference.val()[(0, 0)], -1., epsilon = 1e-12);
        assert_eq!((-&east).val()[(0, 0)], -1.);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let three = Position::from_rows(&[[1., 0., 0.], [2., 0., 0.], [3., 0., 0.]], "trs").unwrap();
        let two = Position::from_rows(&[[1., 0., 0.], [2., 0., 0.]], "trs").unwrap();
        assert_eq!(
            (&three - &two).unwrap_err(),
            GeoError::LengthMismatch {
                operation: "-",
                left: 3,
                right: 2,
            }
        );
    }

    #[test]
    fn posvel_states_subtract_and_add_back() {
        let a = PosVel::from_slice(&[A + 2e7, 0., 0., 0., 3_800., 0.], "trs").unwrap();
        let b = PosVel::from_slice(&[A + 2e7, 1_000., 0., 0., 3_790., 5.], "trs").unwrap();
        let delta: PosVelDelta = (&a - &b).unwrap();
        assert_eq!(delta.system(), "trs");
        assert_abs_diff_eq!((&b + &delta).unwrap(), a, epsilon = 1e-6);
    }

    #[test]
    fn dynamic_arithmetic_reports_undefined_operations() {
        let p: AnyArray = trs([1., 2., 3.]).into();
        let q: AnyArray = trs([1., 1., 1.]).into();

        assert_eq!(
            (&p + &q).unwrap_err(),
            GeoError::UndefinedOperation {
                operation: "+",
                left: "Position",
                right: "Position",
            }
        );

        let delta = (&p - &q).unwrap();
        assert_eq!(delta.type_name(), "PositionDelta");
        assert_eq!(delta.val(), &DMatrix::from_row_slice(1, 3, &[0., 1., 2.]));

        let back = (&q + &delta).unwrap();
        assert_eq!(back.type_name(), "Position");
        assert_eq!(back.val(), p.val());

        assert!(matches!(
            &delta - &p,
            Err(GeoError::UndefinedOperation { operation: "-", .. })
        ));
    }

    #[test]
    fn arrays_can_be_shared_across_threads() {
        fn shareable<T: Send + Sync>() {}
        shareable::<Position>();
        shareable::<PositionDelta>();
        shareable::<PosVel>();
        shareable::<PosVelDelta>();
        shareable::<AnyArray>();
    }

    #[test]
    fn dynamic_arrays_convert_and_resolve_names() {
        let p: AnyArray = trs([A, 0., 0.]).into();
        let llh = p.to_system("llh").unwrap();
        assert_eq!(llh.system(), "llh");
        assert_eq!(llh.unit("lat").unwrap(), ["radian"]);
        assert!(matches!(
            p.get("trs").unwrap().into_system(),
            Some(AnyArray::Position(_))
        ));
        assert_eq!(p.num_obs(), 1);
    }
}
