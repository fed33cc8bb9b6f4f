use regex::bytes::Regex;

use crate::config::Expectation;

/// Run a regular expression over the raw body.
///
/// The cardinality is the number of non-overlapping matches; `equals` needs
/// one match identical to the expected string, `contains` needs one match
/// containing it.
pub fn check(body: &[u8], selector: &str, expectation: &Expectation) -> Result<(), String> {
    let regex =
        Regex::new(selector).map_err(|_| format!("could not compile regex '{selector}'"))?;

    let mut matches = regex.find_iter(body).map(|m| m.as_bytes());

    match expectation {
        Expectation::Cardinality(bound) => {
            let measured = i64::try_from(matches.count()).unwrap_or(i64::MAX);
            bound.check(measured).map_err(|info| format!("{selector}: {info}"))
        }
        Expectation::Equals(expected) => {
            if matches.any(|m| m == expected.as_bytes()) {
                Ok(())
            } else {
                Err(format!("could not find regex result equals '{expected}' for '{selector}'"))
            }
        }
        Expectation::Contains(expected) => {
            if matches.any(|m| String::from_utf8_lossy(m).contains(expected.as_str())) {
                Ok(())
            } else {
                Err(format!("could not find regex result contains '{expected}' for '{selector}'"))
            }
        }
    }
}
