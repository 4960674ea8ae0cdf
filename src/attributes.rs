use crate::error::{GeoError, Result};
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The value of an extension attribute.
///
/// Extension attributes are registered per array family with
/// [`Registry::register_attribute`](crate::registry::Registry::register_attribute), and every
/// array of that family then reports them (unset ones as `None`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttributeValue {
    /// One number shared by every observation.
    Scalar(f64),
    /// One number per observation.
    Array(DVector<f64>),
    /// A label shared by every observation, eg a station name.
    Text(String),
}

impl AttributeValue {
    /// Number of values held; scalars and text count as one.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) | Self::Text(_) => 1,
            Self::Array(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<DVector<f64>> for AttributeValue {
    fn from(values: DVector<f64>) -> Self {
        Self::Array(values)
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Array(DVector::from_vec(values))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

/// The extension attributes set on one array.
///
/// Which names are allowed is decided by the registry of the array's family, so this type only
/// stores values; the arrays check names and lengths before inserting.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    pub(crate) fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    /// Stores `value` under `name` after checking that it fits an array of `num_obs` rows.
    ///
    /// `registered` is the outcome of looking `name` up in the family registry.
    pub(crate) fn set(
        &mut self,
        type_name: &'static str,
        registered: bool,
        num_obs: usize,
        name: &str,
        value: AttributeValue,
    ) -> Result<()> {
        if !registered {
            return Err(GeoError::AttributeNotFound {
                type_name,
                key: name.to_string(),
            });
        }
        if value.len() != 1 && value.len() != num_obs {
            return Err(GeoError::InvalidAttributeValue {
                attribute: name.to_string(),
                expected: num_obs,
                got: value.len(),
            });
        }
        self.0.insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.0.remove(name)
    }

    /// Drops per-observation values that do not fit an array of `num_obs` rows.
    pub(crate) fn fit_to(&mut self, num_obs: usize) {
        self.0
            .retain(|_, value| value.len() == 1 || value.len() == num_obs);
    }

    /// Every name in `registered`, with its value if one is set.
    pub(crate) fn report(&self, registered: Vec<String>) -> BTreeMap<String, Option<AttributeValue>> {
        registered
            .into_iter()
            .map(|name| {
                let value = self.0.get(&name).cloned();
                (name, value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeValue, Attributes};
    use crate::error::GeoError;
    use nalgebra::DVector;
    use rstest::rstest;

    #[rstest]
    #[case(AttributeValue::Scalar(1.), true)]
    #[case(AttributeValue::from("ALGO"), true)]
    #[case(AttributeValue::from(vec![1., 2., 3.]), true)]
    #[case(AttributeValue::from(vec![1., 2.]), false)]
    #[case(AttributeValue::Array(DVector::zeros(0)), false)]
    fn values_must_fit_the_array(#[case] value: AttributeValue, #[case] fits: bool) {
        let mut attributes = Attributes::default();
        let result = attributes.set("Position", true, 3, "time", value.clone());
        if fits {
            assert_eq!(result, Ok(()));
            assert_eq!(attributes.get("time"), Some(&value));
        } else {
            assert!(matches!(
                result,
                Err(GeoError::InvalidAttributeValue { expected: 3, .. })
            ));
            assert_eq!(attributes.get("time"), None);
        }
    }

    #[test]
    fn unregistered_names_are_rejected() {
        let mut attributes = Attributes::default();
        assert_eq!(
            attributes.set("PositionDelta", false, 1, "epoch", 1.0.into()),
            Err(GeoError::AttributeNotFound {
                type_name: "PositionDelta",
                key: "epoch".into(),
            })
        );
    }

    #[test]
    fn report_lists_every_registered_name() {
        let mut attributes = Attributes::default();
        attributes
            .set("Position", true, 1, "station", "OSLS".into())
            .unwrap();
        let report = attributes.report(vec!["station".into(), "time".into()]);
        assert_eq!(report["station"], Some(AttributeValue::from("OSLS")));
        assert_eq!(report["time"], None);
    }

    #[test]
    fn display() {
        insta::assert_snapshot!(AttributeValue::from(vec![1., 2.5]), @"[1, 2.5]");
        insta::assert_snapshot!(AttributeValue::from("OSLS"), @r#""OSLS""#);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_roundtrip() {
        let value = AttributeValue::from(vec![1., 2.]);
        let yaml = serde_yaml::to_string(&value).unwrap();
        let back: AttributeValue = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, value);
    }
}
