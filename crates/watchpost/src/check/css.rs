use scraper::{Html, Selector};

use super::{ExtractedValue, evaluate};
use crate::config::Expectation;

/// Parse a response body as an HTML document
pub fn parse_document(body: &[u8]) -> Result<Html, String> {
    let text = std::str::from_utf8(body)
        .map_err(|e| format!("could not read response body as markup: {e}"))?;
    Ok(Html::parse_document(text))
}

/// Match a CSS selector.
///
/// Cardinality expectations see the number of matched nodes, text
/// expectations see the concatenated text of every matched node.
pub fn extract(
    document: &Html,
    selector: &str,
    expectation: &Expectation,
) -> Result<ExtractedValue, String> {
    let parsed =
        Selector::parse(selector).map_err(|e| format!("invalid selector {selector} : {e}"))?;
    let selection = document.select(&parsed);

    Ok(match expectation {
        Expectation::Cardinality(_) => ExtractedValue::Cardinality(selection.count()),
        Expectation::Contains(_) | Expectation::Equals(_) => {
            ExtractedValue::Text(selection.flat_map(|element| element.text()).collect())
        }
    })
}

pub fn check(document: &Html, selector: &str, expectation: &Expectation) -> Result<(), String> {
    let value = extract(document, selector, expectation)?;
    evaluate(&value, expectation).map_err(|info| format!("{selector}: {info}"))
}
