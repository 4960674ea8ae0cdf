//! The built-in coordinate systems and the global registries holding them.
//!
//! | family          | systems                  |
//! |-----------------|--------------------------|
//! | `Position`      | `trs`, `llh`             |
//! | `PosVel`        | `trs`, `kepler`          |
//! | `PositionDelta` | `trs`, `enu`             |
//! | `PosVelDelta`   | `trs`, `enu`, `acr`      |
//!
//! Each registry is populated by one explicit registration function, run once on first access.
//! Further systems can be registered at runtime through the same registries:
//!
//! ```
//! use geoarray::{converter, position_registry, Position, SystemDef};
//!
//! position_registry().register_system(
//!     SystemDef::new("trs_km", &[("x", "kilometer"), ("y", "kilometer"), ("z", "kilometer")]),
//!     [("trs", converter(|p: &Position| Ok(p.val() * 1000.)))],
//!     [("trs", converter(|p: &Position| Ok(p.val() / 1000.)))],
//! )?;
//!
//! let p = Position::from_slice(&[6378.137, 0., 0.], "trs_km")?;
//! // trs_km -> trs -> llh
//! let llh = p.to_system("llh")?;
//! assert!(llh.val()[(0, 2)].abs() < 1e-6);
//! # Ok::<(), geoarray::GeoError>(())
//! ```

use crate::coordinate_systems::{SystemDef, METER, METER_PER_SECOND, RADIAN, UNITLESS};
use crate::deltas::{PosVelDelta, PositionDelta};
use crate::error::Result;
use crate::geodetic::{enu2trs, llh2trs, trs2enu, trs2llh};
use crate::orbit::{acr2trs, kepler2trs, trs2acr, trs2kepler};
use crate::positions::{PosVel, Position};
use crate::registry::{converter, Registry};
use lazy_static::lazy_static;

lazy_static! {
    static ref POSITIONS: Registry<Position> = bootstrap("Position", register_position_systems);
    static ref POSITION_DELTAS: Registry<PositionDelta> = bootstrap("PositionDelta", register_position_delta_systems);
    static ref POSVELS: Registry<PosVel> = bootstrap("PosVel", register_posvel_systems);
    static ref POSVEL_DELTAS: Registry<PosVelDelta> = bootstrap("PosVelDelta", register_posvel_delta_systems);
}

/// Builds a registry holding the built-in systems of `family`.
///
/// The built-in layouts are distinct, so registration only fails on a broken build; the systems
/// registered before the failure stay usable.
fn bootstrap<A>(family: &'static str, register: fn(&Registry<A>) -> Result<()>) -> Registry<A> {
    let registry = Registry::new(family);
    if let Err(error) = register(&registry) {
        tracing::error!(family, %error, "failed to register built-in coordinate systems");
    }
    registry
}

/// The registry of [`Position`] systems.
pub fn position_registry() -> &'static Registry<Position> {
    &POSITIONS
}

/// The registry of [`PositionDelta`] systems.
pub fn position_delta_registry() -> &'static Registry<PositionDelta> {
    &POSITION_DELTAS
}

/// The registry of [`PosVel`] systems.
pub fn posvel_registry() -> &'static Registry<PosVel> {
    &POSVELS
}

/// The registry of [`PosVelDelta`] systems.
pub fn posvel_delta_registry() -> &'static Registry<PosVelDelta> {
    &POSVEL_DELTAS
}

fn trs_columns() -> [(&'static str, &'static str); 3] {
    [("x", METER), ("y", METER), ("z", METER)]
}

fn trs_state_columns() -> [(&'static str, &'static str); 6] {
    [
        ("x", METER),
        ("y", METER),
        ("z", METER),
        ("vx", METER_PER_SECOND),
        ("vy", METER_PER_SECOND),
        ("vz", METER_PER_SECOND),
    ]
}

fn register_position_systems(registry: &Registry<Position>) -> Result<()> {
    registry.register_system(SystemDef::new("trs", &trs_columns()), [], [])?;
    registry.register_system(
        SystemDef::new("llh", &[("lat", RADIAN), ("lon", RADIAN), ("height", METER)]),
        [(
            "trs",
            converter(|p: &Position| llh2trs(p.val(), p.ellipsoid())),
        )],
        [(
            "trs",
            converter(|p: &Position| trs2llh(p.val(), p.ellipsoid())),
        )],
    )
}

fn register_posvel_systems(registry: &Registry<PosVel>) -> Result<()> {
    registry.register_system(SystemDef::new("trs", &trs_state_columns()), [], [])?;
    registry.register_system(
        SystemDef::new(
            "kepler",
            &[
                ("a", METER),
                ("e", UNITLESS),
                ("i", RADIAN),
                ("Omega", RADIAN),
                ("omega", RADIAN),
                ("E", RADIAN),
            ],
        ),
        [("trs", converter(|p: &PosVel| kepler2trs(p.val())))],
        [("trs", converter(|p: &PosVel| trs2kepler(p.val())))],
    )
}

fn register_position_delta_systems(registry: &Registry<PositionDelta>) -> Result<()> {
    registry.register_system(SystemDef::new("trs", &trs_columns()), [], [])?;
    registry.register_system(
        SystemDef::new("enu", &[("east", METER), ("north", METER), ("up", METER)]),
        [(
            "trs",
            converter(|d: &PositionDelta| enu2trs(d.val(), &d.ref_pos().llh_of_positions()?)),
        )],
        [(
            "trs",
            converter(|d: &PositionDelta| trs2enu(d.val(), &d.ref_pos().llh_of_positions()?)),
        )],
    )
}

fn register_posvel_delta_systems(registry: &Registry<PosVelDelta>) -> Result<()> {
    registry.register_system(SystemDef::new("trs", &trs_state_columns()), [], [])?;
    registry.register_system(
        SystemDef::new(
            "enu",
            &[
                ("east", METER),
                ("north", METER),
                ("up", METER),
                ("veast", METER_PER_SECOND),
                ("vnorth", METER_PER_SECOND),
                ("vup", METER_PER_SECOND),
            ],
        ),
        [(
            "trs",
            converter(|d: &PosVelDelta| enu2trs(d.val(), &d.ref_pos().llh_of_positions()?)),
        )],
        [(
            "trs",
            converter(|d: &PosVelDelta| trs2enu(d.val(), &d.ref_pos().llh_of_positions()?)),
        )],
    )?;
    // only linked to trs, so enu <-> acr goes through it
    registry.register_system(
        SystemDef::new(
            "acr",
            &[
                ("along", METER),
                ("cross", METER),
                ("radial", METER),
                ("valong", METER_PER_SECOND),
                ("vcross", METER_PER_SECOND),
                ("vradial", METER_PER_SECOND),
            ],
        ),
        [(
            "trs",
            converter(|d: &PosVelDelta| acr2trs(d.val(), d.ref_pos().to_system("trs")?.val())),
        )],
        [(
            "trs",
            converter(|d: &PosVelDelta| trs2acr(d.val(), d.ref_pos().to_system("trs")?.val())),
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::{posvel_delta_registry, posvel_registry, position_delta_registry, position_registry};
    use crate::coordinate_systems::{SystemDef, METER, UNITLESS};
    use crate::deltas::PosVelDelta;
    use crate::error::GeoError;
    use crate::positions::{PosVel, Position};
    use crate::registry::converter;
    use approx::assert_abs_diff_eq;
    use quickcheck::{quickcheck, TestResult};
    use std::sync::Arc;

    #[test]
    fn built_in_systems_are_registered() {
        for (names, expected) in [
            (position_registry().system_names(), ["llh", "trs"].as_slice()),
            (position_delta_registry().system_names(), &["enu", "trs"]),
            (posvel_registry().system_names(), &["kepler", "trs"]),
            (posvel_delta_registry().system_names(), &["acr", "enu", "trs"]),
        ] {
            for name in expected {
                assert!(names.contains(&name.to_string()), "{name} missing from {names:?}");
            }
        }
    }

    #[test]
    fn runtime_systems_join_the_graph() {
        position_registry().register_system(
            SystemDef::new("trs_km", &[("x", "kilometer"), ("y", "kilometer"), ("z", "kilometer")]),
            [("trs", converter(|p: &Position| Ok(p.val() * 1000.)))],
            [("trs", converter(|p: &Position| Ok(p.val() / 1000.)))],
        )
        .unwrap();
        let p = Position::from_slice(&[2102.928189605, 721.619617278, 5958.196398820], "trs_km")
            .unwrap();
        let llh = p.to_system("llh").unwrap();
        let back = llh.to_system("trs_km").unwrap();
        assert_abs_diff_eq!(back, p, epsilon = 1e-9);
        assert_eq!(p.unit("x").unwrap(), ["kilometer"]);
    }

    #[test]
    fn isolated_systems_are_unreachable() {
        position_registry().register_system(
            SystemDef::new("island", &[("u", UNITLESS), ("v", UNITLESS), ("w", UNITLESS)]),
            [],
            [],
        )
        .unwrap();
        let p = Position::from_slice(&[1., 2., 3.], "island").unwrap();
        assert_eq!(
            p.to_system("trs").unwrap_err(),
            GeoError::UnknownConversion {
                family: "Position",
                from: "island".into(),
                to: "trs".into(),
            }
        );
        assert_eq!(p.to_system("island").unwrap(), p);
    }

    #[test]
    fn built_in_layouts_cannot_be_redefined() {
        let err = position_registry()
            .register_system(SystemDef::new("trs", &[("x", METER), ("y", METER)]), [], [])
            .unwrap_err();
        assert!(matches!(err, GeoError::SystemRedefined { family: "Position", .. }));
        assert_eq!(position_registry().system("trs").unwrap().num_columns(), 3);
        let p = Position::from_slice(&[6378137., 0., 0.], "trs").unwrap();
        assert_eq!(p.to_system("llh").unwrap().system(), "llh");
    }

    #[test]
    fn misshapen_converter_output_is_an_error() {
        position_registry()
            .register_system(
                SystemDef::new("flat", &[("u", METER), ("v", METER), ("w", METER)]),
                [("trs", converter(|p: &Position| Ok(p.val().columns(0, 2).into_owned())))],
                [],
            )
            .unwrap();
        let flat = Position::from_slice(&[1., 2., 3.], "flat").unwrap();
        assert_eq!(
            flat.to_system("trs").unwrap_err(),
            GeoError::ShapeMismatch {
                type_name: "Position",
                system: "trs".into(),
                expected: 3,
                rows: 1,
                columns: 2,
            }
        );
        let station = Position::from_slice(&[6378137., 0., 0.], "trs").unwrap();
        assert!(flat.distance_to(&station).is_err());
        assert!(flat.to_system("llh").is_err());
    }

    quickcheck! {
        fn kepler_roundtrip(a: u16, e: u8, i: u8, node: u8, perigee: u8, anomaly: u8) -> TestResult {
            let unit = |x: u8| f64::from(x) / 255.;
            let kepler = [
                7_000_000. + f64::from(a) * 500.,
                0.01 + 0.6 * unit(e),
                0.1 + 2.9 * unit(i),
                6.2 * unit(node),
                6.2 * unit(perigee),
                6.2 * unit(anomaly),
            ];
            let p = PosVel::from_slice(&kepler, "kepler").unwrap();
            let trs = p.to_system("trs").unwrap();
            let back = trs.to_system("kepler").unwrap().to_system("trs").unwrap();
            let scale = trs.val().abs().max();
            TestResult::from_bool((back.val() - trs.val()).abs().max() < 1e-6 * scale)
        }
    }

    #[test]
    fn posvel_delta_round_trips_through_every_system() {
        let reference = Arc::new(
            PosVel::from_slice(&[26_000_000., 1e6, 2e6, -100., 3_800., 500.], "trs").unwrap(),
        );
        let delta = PosVelDelta::from_slice(&[10., -20., 30., 0.5, -0.25, 0.125], "trs", reference)
            .unwrap();
        for via in ["enu", "acr"] {
            let back = delta.to_system(via).unwrap().to_system("trs").unwrap();
            assert_abs_diff_eq!(back, delta, epsilon = 1e-9);
        }
    }
}
