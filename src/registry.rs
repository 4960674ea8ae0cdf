//! Registries of coordinate systems and the conversions between them.
//!
//! Every array family (eg, [`Position`](crate::Position) or
//! [`PosVelDelta`](crate::PosVelDelta)) has its own [`Registry`] holding
//!
//! - the systems an array of that family can be in,
//! - the direct conversions (edges) between pairs of those systems, and
//! - a memo of the shortest chain of conversions found between any two systems.
//!
//! When asked to convert between two systems without a direct conversion, the registry runs a
//! breadth-first search over the registered edges and applies the resulting hops one by one.
//! Neighbours are explored in lexicographic order of system name, so among several shortest
//! paths the one through the alphabetically-first intermediate systems wins. This tie-break is
//! deterministic for a given set of registrations, but adding systems may change which of
//! several equally short paths is used.

use crate::coordinate_systems::SystemDef;
use crate::error::{GeoError, Result};
use nalgebra::DMatrix;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A direct conversion of a whole array into raw values of another system.
///
/// Converters receive the whole array rather than just its values, since some conversions depend
/// on more than the values themselves (eg, ENU deltas need the geodetic location of their
/// reference position).
pub type Converter<A> = Arc<dyn Fn(&A) -> Result<DMatrix<f64>> + Send + Sync>;

/// One edge of the conversion graph, as `(from, to)`.
pub type Hop = (String, String);

/// Wraps a closure or function into a [`Converter`].
pub fn converter<A, F>(f: F) -> Converter<A>
where
    F: Fn(&A) -> Result<DMatrix<f64>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An array type whose values can be moved between the systems of its [`Registry`].
pub trait CoordinateArray: Clone + Sized + 'static {
    /// Name of the array family, eg `"Position"`.
    const TYPE_NAME: &'static str;

    /// The system this array is currently in.
    fn system_def(&self) -> &Arc<SystemDef>;

    fn num_obs(&self) -> usize;

    /// Builds an array in `system` from `values`, carrying over every attribute of `self`.
    ///
    /// `values` are the output of a registered converter; the registry has already checked that
    /// they have one row per observation and the column count of `system`.
    fn rewrap(&self, values: DMatrix<f64>, system: Arc<SystemDef>) -> Self;
}

/// The systems, conversions, and extension attributes of one array family.
pub struct Registry<A> {
    family: &'static str,
    tables: RwLock<Tables<A>>,
}

struct Tables<A> {
    systems: BTreeMap<String, Arc<SystemDef>>,
    // from -> to -> converter; the inner map orders neighbours for the search
    conversions: BTreeMap<String, BTreeMap<String, Converter<A>>>,
    conversion_hops: HashMap<(String, String), Arc<[Hop]>>,
    attributes: BTreeSet<String>,
}

impl<A> Registry<A> {
    /// Creates an empty registry for the family called `family`.
    #[must_use]
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            tables: RwLock::new(Tables {
                systems: BTreeMap::new(),
                conversions: BTreeMap::new(),
                conversion_hops: HashMap::new(),
                attributes: BTreeSet::new(),
            }),
        }
    }

    // the tables are never left half-updated, so a poisoned lock still holds consistent data
    fn read(&self) -> RwLockReadGuard<'_, Tables<A>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables<A>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Registers a system together with its direct conversions.
    ///
    /// Every `(target, f)` in `convert_to` adds the edge `system -> target`, and every
    /// `(source, f)` in `convert_from` adds the edge `source -> system`. The systems on the other
    /// end of an edge do not need to be registered yet; an edge to a system that never gets
    /// registered is simply never used.
    ///
    /// The column layout of a system is fixed once registered. Registering a name again with
    /// the same layout adds the given edges (replacing edges between the same pair of systems);
    /// registering it with a different layout fails with [`GeoError::SystemRedefined`] and
    /// changes nothing. Memoized conversion paths are discarded on every registration.
    pub fn register_system<'a>(
        &self,
        system: SystemDef,
        convert_to: impl IntoIterator<Item = (&'a str, Converter<A>)>,
        convert_from: impl IntoIterator<Item = (&'a str, Converter<A>)>,
    ) -> Result<()> {
        let name = system.name().to_string();
        let mut tables = self.write();

        match tables.systems.get(&name).cloned() {
            Some(existing) if *existing != system => {
                return Err(GeoError::SystemRedefined {
                    family: self.family,
                    system: name,
                    registered: existing.to_string(),
                    requested: system.to_string(),
                });
            }
            Some(_) => {
                tracing::warn!(family = self.family, system = %name, "re-registering coordinate system");
            }
            None => {
                tables.systems.insert(name.clone(), Arc::new(system));
            }
        }

        for (target, f) in convert_to {
            tables
                .conversions
                .entry(name.clone())
                .or_default()
                .insert(target.to_string(), f);
        }
        for (source, f) in convert_from {
            tables
                .conversions
                .entry(source.to_string())
                .or_default()
                .insert(name.clone(), f);
        }
        tables.conversion_hops.clear();

        tracing::debug!(family = self.family, system = %name, "registered coordinate system");
        Ok(())
    }

    /// Adds an extension attribute that every array of this family carries.
    pub fn register_attribute(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(family = self.family, attribute = %name, "registered attribute");
        self.write().attributes.insert(name);
    }

    /// Returns the layout of the system called `name`.
    pub fn system(&self, name: &str) -> Result<Arc<SystemDef>> {
        let tables = self.read();
        tables
            .systems
            .get(name)
            .cloned()
            .ok_or_else(|| self.unknown_system(&tables, name))
    }

    #[must_use]
    pub fn has_system(&self, name: &str) -> bool {
        self.read().systems.contains_key(name)
    }

    /// Names of all registered systems, sorted.
    #[must_use]
    pub fn system_names(&self) -> Vec<String> {
        self.read().systems.keys().cloned().collect()
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.read().attributes.contains(name)
    }

    /// Names of all registered extension attributes, sorted.
    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.read().attributes.iter().cloned().collect()
    }

    fn unknown_system(&self, tables: &Tables<A>, name: &str) -> GeoError {
        GeoError::UnknownSystem {
            family: self.family,
            system: name.to_string(),
            valid: tables.systems.keys().cloned().collect(),
        }
    }

    /// Finds the shortest chain of direct conversions leading from `from` to `to`.
    ///
    /// The result is memoized until the next registration. Converting a system into itself
    /// takes no hops.
    pub fn find_conversion_hops(&self, from: &str, to: &str) -> Result<Arc<[Hop]>> {
        let key = (from.to_string(), to.to_string());
        {
            let tables = self.read();
            for name in [from, to] {
                if !tables.systems.contains_key(name) {
                    return Err(self.unknown_system(&tables, name));
                }
            }
            if let Some(hops) = tables.conversion_hops.get(&key) {
                return Ok(Arc::clone(hops));
            }
        }

        let hops: Arc<[Hop]> = self.search(from, to)?.into();
        tracing::debug!(
            family = self.family,
            from,
            to,
            hops = ?hops,
            "found conversion path"
        );
        // racing searches compute the same path, so the last write wins harmlessly
        self.write().conversion_hops.insert(key, Arc::clone(&hops));
        Ok(hops)
    }

    fn search(&self, from: &str, to: &str) -> Result<Vec<Hop>> {
        let tables = self.read();
        let mut came_from: HashMap<&str, &str> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = BTreeSet::from([from]);

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut hops = Vec::new();
                let mut node = to;
                while let Some(&previous) = came_from.get(node) {
                    hops.push((previous.to_string(), node.to_string()));
                    node = previous;
                }
                hops.reverse();
                return Ok(hops);
            }
            let Some(neighbours) = tables.conversions.get(current) else {
                continue;
            };
            for next in neighbours.keys() {
                if seen.insert(next.as_str()) {
                    came_from.insert(next.as_str(), current);
                    queue.push_back(next.as_str());
                }
            }
        }

        Err(GeoError::UnknownConversion {
            family: self.family,
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    fn direct(&self, from: &str, to: &str) -> Option<Converter<A>> {
        self.read()
            .conversions
            .get(from)
            .and_then(|targets| targets.get(to))
            .cloned()
    }
}

impl<A: CoordinateArray> Registry<A> {
    /// Converts `array` into the system called `target`.
    ///
    /// Arrays already in `target` are returned as a copy. Otherwise a direct conversion is used
    /// if one is registered; if not, the memoized shortest path is applied hop by hop, and every
    /// intermediate result is a complete array so that attributes travel along.
    pub fn convert(&self, array: &A, target: &str) -> Result<A> {
        let target_def = self.system(target)?;
        let from = array.system_def().name();
        if from == target {
            return Ok(array.clone());
        }

        if let Some(f) = self.direct(from, target) {
            tracing::trace!(family = self.family, from, to = target, "direct conversion");
            return Self::apply(&f, array, target_def);
        }

        let hops = self.find_conversion_hops(from, target)?;
        let mut current = array.clone();
        for (hop_from, hop_to) in hops.iter() {
            // converters run outside the lock since they may consult other registries
            let f = self
                .direct(hop_from, hop_to)
                .ok_or_else(|| GeoError::UnknownConversion {
                    family: self.family,
                    from: hop_from.clone(),
                    to: hop_to.clone(),
                })?;
            tracing::trace!(family = self.family, from = %hop_from, to = %hop_to, "conversion hop");
            current = Self::apply(&f, &current, self.system(hop_to)?)?;
        }
        Ok(current)
    }

    /// Runs one converter and wraps its output, rejecting values of the wrong shape.
    fn apply(f: &Converter<A>, array: &A, system: Arc<SystemDef>) -> Result<A> {
        let values = f(array)?;
        if values.nrows() != array.num_obs() {
            return Err(GeoError::LengthMismatch {
                operation: "to_system",
                left: array.num_obs(),
                right: values.nrows(),
            });
        }
        system.check_shape(A::TYPE_NAME, values.nrows(), values.ncols())?;
        Ok(array.rewrap(values, system))
    }
}

impl<A> std::fmt::Debug for Registry<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.read();
        f.debug_struct("Registry")
            .field("family", &self.family)
            .field("systems", &tables.systems.keys().collect::<Vec<_>>())
            .field("attributes", &tables.attributes)
            .finish()
    }
}
