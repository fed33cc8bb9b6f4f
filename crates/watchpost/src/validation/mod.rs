//! Ordered rule pipeline applied to every check of every call.
//!
//! Each rule is independent and side-effect free. It inspects the shared
//! [`CheckContext`] and is a no-op when the check does not populate the field
//! governing it. The order of [`RULES`] only decides the order of errors.

pub mod rules;

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::config::{Call, Check};
use crate::types::ProbeError;

pub use rules::{
    ContentTypeRule, CssRule, DurationRule, HeadersRule, JsonPathRule, MatchReplyRule,
    RedirectRule, RegexRule, StatusCodeRule,
};

/// Everything a rule may look at for one check of one call
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub status: StatusCode,
    pub headers: &'a HeaderMap,
    /// Full response body, read once per call and shared by every check
    pub body: &'a [u8],
    /// Time from sending the request until the response head arrived
    pub duration: Duration,
    pub check: &'a Check,
    pub call: &'a Call,
}

impl CheckContext<'_> {
    /// Header value as a string, empty when absent or not visible ASCII
    pub fn header(&self, name: &str) -> &str {
        self.headers.get(name).and_then(|value| value.to_str().ok()).unwrap_or("")
    }
}

/// A single validation capability
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError>;
}

/// The fixed evaluation order
pub static RULES: &[&dyn Rule] = &[
    &StatusCodeRule,
    &HeadersRule,
    &RedirectRule,
    &ContentTypeRule,
    &DurationRule,
    &JsonPathRule,
    &CssRule,
    &RegexRule,
    &MatchReplyRule,
];

/// Run every rule against the context and collect what they report
pub fn check_response(ctx: &CheckContext<'_>) -> Vec<ProbeError> {
    RULES.iter().flat_map(|rule| rule.evaluate(ctx)).collect()
}
