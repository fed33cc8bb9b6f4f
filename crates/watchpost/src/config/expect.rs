use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Bound on a measured cardinality (number of matched nodes, matches or
/// array elements)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min(i64),
    Max(i64),
    Count(i64),
}

impl Bound {
    /// Compare a measured cardinality against the bound
    pub fn check(&self, measured: i64) -> Result<(), String> {
        match *self {
            Bound::Min(min) if measured < min => {
                Err(format!("min actual: {measured} < expected: {min}"))
            }
            Bound::Max(max) if measured > max => {
                Err(format!("max actual: {measured} > expected: {max}"))
            }
            Bound::Count(count) if measured != count => {
                Err(format!("count actual: {measured} != expected: {count}"))
            }
            _ => Ok(()),
        }
    }
}

/// Assertion on what a selector extracts from a response body.
///
/// Exactly one mode is active. An expectation without any mode cannot be
/// constructed, the config layer rejects empty or mixed tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExpectationDef", into = "ExpectationDef")]
pub enum Expectation {
    Cardinality(Bound),
    Contains(String),
    Equals(String),
}

/// Wire form of an expectation: a table with one of the keys set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpectationDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    equals: Option<String>,
}

impl TryFrom<ExpectationDef> for Expectation {
    type Error = ConfigError;

    fn try_from(def: ExpectationDef) -> Result<Self, Self::Error> {
        let mut modes = Vec::with_capacity(1);
        if let Some(min) = def.min {
            modes.push(("min", Expectation::Cardinality(Bound::Min(min))));
        }
        if let Some(max) = def.max {
            modes.push(("max", Expectation::Cardinality(Bound::Max(max))));
        }
        if let Some(count) = def.count {
            modes.push(("count", Expectation::Cardinality(Bound::Count(count))));
        }
        if let Some(contains) = def.contains {
            modes.push(("contains", Expectation::Contains(contains)));
        }
        if let Some(equals) = def.equals {
            modes.push(("equals", Expectation::Equals(equals)));
        }

        match modes.len() {
            0 => Err(ConfigError::EmptyExpectation),
            1 => Ok(modes.remove(0).1),
            _ => Err(ConfigError::AmbiguousExpectation(
                modes.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", "),
            )),
        }
    }
}

impl From<Expectation> for ExpectationDef {
    fn from(expectation: Expectation) -> Self {
        let mut def = ExpectationDef::default();
        match expectation {
            Expectation::Cardinality(Bound::Min(min)) => def.min = Some(min),
            Expectation::Cardinality(Bound::Max(max)) => def.max = Some(max),
            Expectation::Cardinality(Bound::Count(count)) => def.count = Some(count),
            Expectation::Contains(contains) => def.contains = Some(contains),
            Expectation::Equals(equals) => def.equals = Some(equals),
        }
        def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_bound() {
        assert!(Bound::Min(3).check(4).is_ok());
        assert!(Bound::Min(4).check(4).is_ok());
        assert_eq!(Bound::Min(5).check(4).unwrap_err(), "min actual: 4 < expected: 5");
    }

    #[test]
    fn test_max_bound() {
        assert!(Bound::Max(5).check(4).is_ok());
        assert!(Bound::Max(4).check(4).is_ok());
        assert_eq!(Bound::Max(3).check(4).unwrap_err(), "max actual: 4 > expected: 3");
    }

    #[test]
    fn test_count_bound() {
        assert!(Bound::Count(3).check(3).is_ok());
        assert_eq!(Bound::Count(3).check(4).unwrap_err(), "count actual: 4 != expected: 3");
        assert!(Bound::Count(3).check(2).is_err());
    }

    #[test]
    fn test_bound_sweep() {
        for limit in -2..5 {
            for measured in -2..5 {
                assert_eq!(Bound::Min(limit).check(measured).is_ok(), measured >= limit);
                assert_eq!(Bound::Max(limit).check(measured).is_ok(), measured <= limit);
                assert_eq!(Bound::Count(limit).check(measured).is_ok(), measured == limit);
            }
        }
    }

    #[test]
    fn test_single_mode_table() {
        let expectation: Expectation = toml::from_str("min = 2").unwrap();
        assert_eq!(expectation, Expectation::Cardinality(Bound::Min(2)));

        let expectation: Expectation = toml::from_str("equals = \"world\"").unwrap();
        assert_eq!(expectation, Expectation::Equals("world".to_string()));
    }

    #[test]
    fn test_empty_table_is_rejected() {
        let err = toml::from_str::<Expectation>("").unwrap_err();
        assert!(err.to_string().contains("no mode"), "{err}");
    }

    #[test]
    fn test_mixed_table_is_rejected() {
        let err = toml::from_str::<Expectation>("min = 1\nequals = \"x\"").unwrap_err();
        assert!(err.to_string().contains("min, equals"), "{err}");
    }
}
