//! Extractors pulling a cardinality or a value out of a response body, and
//! the evaluator comparing what was extracted against an [`Expectation`].

pub mod css;
pub mod jsonpath;
pub mod regex;

use crate::config::Expectation;

/// What a selector found in a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedValue {
    /// Number of matched nodes or elements
    Cardinality(usize),
    Text(String),
    /// The selector matched something that can be neither counted nor
    /// compared, e.g. a JSON number
    Unsupported(&'static str),
}

/// Apply an expectation to an extracted value
pub fn evaluate(value: &ExtractedValue, expectation: &Expectation) -> Result<(), String> {
    match (value, expectation) {
        (ExtractedValue::Cardinality(n), Expectation::Cardinality(bound)) => {
            bound.check(i64::try_from(*n).unwrap_or(i64::MAX))
        }
        (ExtractedValue::Text(actual), Expectation::Equals(expected)) => {
            if actual == expected {
                Ok(())
            } else {
                Err(format!("actual: {actual} != expected: {expected}"))
            }
        }
        (ExtractedValue::Text(actual), Expectation::Contains(expected)) => {
            if actual.contains(expected.as_str()) {
                Ok(())
            } else {
                Err(format!("actual: {actual} does not contain expected: {expected}"))
            }
        }
        (ExtractedValue::Text(_), Expectation::Cardinality(_)) => {
            Err("result is a string and has no cardinality".to_string())
        }
        (ExtractedValue::Cardinality(_), _) => Err("result is not a string".to_string()),
        (ExtractedValue::Unsupported(kind), _) => {
            Err(format!("result of type {kind} can not be compared"))
        }
    }
}
