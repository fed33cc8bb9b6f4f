use reqwest::header::{CONTENT_TYPE, LOCATION};

use super::{CheckContext, Rule};
use crate::check::{css, jsonpath, regex};
use crate::config::CONTENT_TYPE_JSON;
use crate::types::{ErrorKind, ProbeError};

/// Length of the body previews in reply mismatch messages
const REPLY_PREVIEW_CHARS: usize = 20;

pub struct StatusCodeRule;

impl Rule for StatusCodeRule {
    fn name(&self) -> &'static str {
        "status_code"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        match ctx.check.status_code {
            Some(expected) if ctx.status.as_u16() != expected => vec![ProbeError::new(
                ErrorKind::WrongHttpStatusCode,
                format!("unexpected status code: {}, expected: {expected}", ctx.status.as_u16()),
            )],
            _ => Vec::new(),
        }
    }
}

pub struct HeadersRule;

impl Rule for HeadersRule {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        ctx.check
            .headers
            .iter()
            .filter_map(|(name, expected)| {
                let actual = ctx.header(name);
                (actual != expected).then(|| {
                    ProbeError::new(
                        ErrorKind::HeaderMismatch,
                        format!("header {name}: \"{actual}\", expected: \"{expected}\""),
                    )
                })
            })
            .collect()
    }
}

pub struct RedirectRule;

impl Rule for RedirectRule {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        let Some(expected) = ctx.check.redirect.as_deref() else {
            return Vec::new();
        };
        if !ctx.headers.contains_key(LOCATION) {
            return Vec::new();
        }

        let actual = ctx.header(LOCATION.as_str());
        if actual == expected {
            Vec::new()
        } else {
            vec![ProbeError::new(
                ErrorKind::RedirectMismatch,
                format!("unexpected redirect to \"{actual}\", expected: \"{expected}\""),
            )]
        }
    }
}

pub struct ContentTypeRule;

impl Rule for ContentTypeRule {
    fn name(&self) -> &'static str {
        "content_type"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        let Some(expected) = ctx.check.content_type.as_deref() else {
            return Vec::new();
        };

        let actual = ctx.header(CONTENT_TYPE.as_str());
        if actual == expected {
            Vec::new()
        } else {
            vec![ProbeError::new(
                ErrorKind::UnexpectedContentType,
                format!("unexpected Content-Type: \"{actual}\", expected: \"{expected}\""),
            )]
        }
    }
}

pub struct DurationRule;

impl Rule for DurationRule {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        match ctx.check.max_duration() {
            Some(max) if ctx.duration > max => vec![ProbeError::new(
                ErrorKind::ServerTooSlow,
                format!("call duration {:?} exceeded {max:?}", ctx.duration),
            )],
            _ => Vec::new(),
        }
    }
}

pub struct JsonPathRule;

impl JsonPathRule {
    /// The check's content type wins over the call's, JSON is the default
    fn data_content_type<'a>(ctx: &CheckContext<'a>) -> &'a str {
        ctx.check
            .content_type
            .as_deref()
            .or(ctx.call.content_type.as_deref())
            .unwrap_or(CONTENT_TYPE_JSON)
    }
}

pub(crate) fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(CONTENT_TYPE_JSON))
}

impl Rule for JsonPathRule {
    fn name(&self) -> &'static str {
        "json_path"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        if ctx.check.json_path.is_empty() {
            return Vec::new();
        }

        let content_type = Self::data_content_type(ctx);
        if !is_json(content_type) {
            return ctx
                .check
                .json_path
                .keys()
                .map(|_| {
                    ProbeError::new(
                        ErrorKind::NotImplemented,
                        format!("data contentType: {content_type} is not supported (yet?)"),
                    )
                })
                .collect();
        }

        let document = jsonpath::parse_document(ctx.body);
        ctx.check
            .json_path
            .iter()
            .filter_map(|(selector, expectation)| {
                let outcome = match &document {
                    Ok(document) => jsonpath::check(document, selector, expectation),
                    Err(info) => Err(info.clone()),
                };
                outcome.err().map(|info| ProbeError::new(ErrorKind::JsonPathError, info))
            })
            .collect()
    }
}

pub struct CssRule;

impl Rule for CssRule {
    fn name(&self) -> &'static str {
        "css"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        if ctx.check.css.is_empty() {
            return Vec::new();
        }

        let document = match css::parse_document(ctx.body) {
            Ok(document) => document,
            Err(info) => return vec![ProbeError::new(ErrorKind::GoQuery, info)],
        };

        ctx.check
            .css
            .iter()
            .filter_map(|(selector, expectation)| {
                css::check(&document, selector, expectation)
                    .err()
                    .map(|info| ProbeError::new(ErrorKind::GoQueryMismatch, info))
            })
            .collect()
    }
}

pub struct RegexRule;

impl Rule for RegexRule {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        ctx.check
            .regex
            .iter()
            .filter_map(|(selector, expectation)| {
                regex::check(ctx.body, selector, expectation)
                    .err()
                    .map(|info| ProbeError::new(ErrorKind::RegexError, info))
            })
            .collect()
    }
}

pub struct MatchReplyRule;

fn preview(text: &str) -> String {
    if text.chars().count() > REPLY_PREVIEW_CHARS {
        let head: String = text.chars().take(REPLY_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

impl Rule for MatchReplyRule {
    fn name(&self) -> &'static str {
        "match_reply"
    }

    fn evaluate(&self, ctx: &CheckContext<'_>) -> Vec<ProbeError> {
        let Some(expected) = ctx.check.match_reply.as_deref() else {
            return Vec::new();
        };

        let expected = expected.trim();
        let body = String::from_utf8_lossy(ctx.body);
        let actual = body.trim();
        if actual == expected {
            Vec::new()
        } else {
            vec![ProbeError::new(
                ErrorKind::ReplyMismatch,
                format!(
                    "reply mismatch, expected: \"{}\", got: \"{}\"",
                    preview(expected),
                    preview(actual)
                ),
            )]
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use reqwest::StatusCode;
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::*;
    use crate::config::{Bound, Call, Check, Expectation};

    struct Fixture {
        status: StatusCode,
        headers: HeaderMap,
        body: Vec<u8>,
        duration: Duration,
        call: Call,
    }

    impl Fixture {
        fn new(body: &str) -> Self {
            Self {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: body.as_bytes().to_vec(),
                duration: Duration::from_millis(10),
                call: Call::default(),
            }
        }

        fn header(mut self, name: &'static str, value: &'static str) -> Self {
            self.headers.insert(name, HeaderValue::from_static(value));
            self
        }

        fn run(&self, rule: &dyn Rule, check: &Check) -> Vec<ProbeError> {
            let ctx = CheckContext {
                status: self.status,
                headers: &self.headers,
                body: &self.body,
                duration: self.duration,
                check,
                call: &self.call,
            };
            rule.evaluate(&ctx)
        }
    }

    #[test]
    fn test_status_code() {
        let fixture = Fixture::new("");
        let ok = Check { status_code: Some(200), ..Check::default() };
        assert!(fixture.run(&StatusCodeRule, &ok).is_empty());

        let wrong = Check { status_code: Some(201), ..Check::default() };
        let errs = fixture.run(&StatusCodeRule, &wrong);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::WrongHttpStatusCode);
        assert!(errs[0].error.contains("200") && errs[0].error.contains("201"));
    }

    #[test]
    fn test_each_header_mismatch_is_reported() {
        let fixture = Fixture::new("").header("x-served-by", "edge-1").header("cache", "hit");
        let check = Check {
            headers: BTreeMap::from([
                ("X-Served-By".to_string(), "edge-1".to_string()),
                ("Cache".to_string(), "miss".to_string()),
                ("X-Missing".to_string(), "yes".to_string()),
            ]),
            ..Check::default()
        };

        let errs = fixture.run(&HeadersRule, &check);
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.kind == ErrorKind::HeaderMismatch));
    }

    #[test]
    fn test_redirect() {
        let check = Check { redirect: Some("https://example.com/new".into()), ..Check::default() };

        let moved = Fixture::new("").header("location", "https://example.com/new");
        assert!(moved.run(&RedirectRule, &check).is_empty());

        let elsewhere = Fixture::new("").header("location", "https://evil.example.com/");
        let errs = elsewhere.run(&RedirectRule, &check);
        assert_eq!(errs[0].kind, ErrorKind::RedirectMismatch);

        let none = Fixture::new("");
        assert!(none.run(&RedirectRule, &check).is_empty());
    }

    #[test]
    fn test_content_type_is_verbatim() {
        let fixture = Fixture::new("").header("content-type", "application/json; charset=utf-8");
        let check = Check { content_type: Some("application/json".into()), ..Check::default() };
        let errs = fixture.run(&ContentTypeRule, &check);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::UnexpectedContentType);
    }

    #[test]
    fn test_duration() {
        let mut fixture = Fixture::new("");
        fixture.duration = Duration::from_millis(200);

        let slow = Check { max_duration_ms: Some(100), ..Check::default() };
        let errs = fixture.run(&DurationRule, &slow);
        assert_eq!(errs[0].kind, ErrorKind::ServerTooSlow);
        assert!(errs[0].error.contains("200ms") && errs[0].error.contains("100ms"));

        let fine = Check { max_duration_ms: Some(300), ..Check::default() };
        assert!(fixture.run(&DurationRule, &fine).is_empty());
    }

    #[test]
    fn test_json_path() {
        let check = Check {
            json_path: BTreeMap::from([(
                "$.hello".to_string(),
                Expectation::Equals("world".to_string()),
            )]),
            ..Check::default()
        };

        assert!(Fixture::new(r#"{"hello":"world"}"#).run(&JsonPathRule, &check).is_empty());

        let errs = Fixture::new(r#"{"hello":"mars"}"#).run(&JsonPathRule, &check);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::JsonPathError);
    }

    #[test]
    fn test_json_path_unsupported_content_type() {
        let mut fixture = Fixture::new("<xml/>");
        fixture.call.content_type = Some("text/xml".into());
        let check = Check {
            json_path: BTreeMap::from([
                ("$.a".to_string(), Expectation::Cardinality(Bound::Min(1))),
                ("$.b".to_string(), Expectation::Cardinality(Bound::Min(1))),
            ]),
            ..Check::default()
        };

        let errs = fixture.run(&JsonPathRule, &check);
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.kind == ErrorKind::NotImplemented));
    }

    #[test]
    fn test_json_path_accepts_charset_parameter() {
        let check = Check {
            content_type: Some("application/json; charset=utf-8".into()),
            json_path: BTreeMap::from([(
                "$.list".to_string(),
                Expectation::Cardinality(Bound::Count(2)),
            )]),
            ..Check::default()
        };
        assert!(Fixture::new(r#"{"list":[1,2]}"#).run(&JsonPathRule, &check).is_empty());
    }

    #[test]
    fn test_css() {
        let check = Check {
            css: BTreeMap::from([
                ("li".to_string(), Expectation::Cardinality(Bound::Count(2))),
                ("h1".to_string(), Expectation::Equals("Shop".to_string())),
            ]),
            ..Check::default()
        };

        let page = Fixture::new("<h1>Shop</h1><ul><li>a</li><li>b</li></ul>");
        assert!(page.run(&CssRule, &check).is_empty());

        let broken = Fixture::new("<h1>Closed</h1>");
        let errs = broken.run(&CssRule, &check);
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| e.kind == ErrorKind::GoQueryMismatch));
    }

    #[test]
    fn test_css_unreadable_body() {
        let mut fixture = Fixture::new("");
        fixture.body = vec![0xff, 0xfe];
        let check = Check {
            css: BTreeMap::from([("p".to_string(), Expectation::Cardinality(Bound::Min(1)))]),
            ..Check::default()
        };
        let errs = fixture.run(&CssRule, &check);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::GoQuery);
    }

    #[test]
    fn test_regex_compile_error() {
        let check = Check {
            regex: BTreeMap::from([("[".to_string(), Expectation::Cardinality(Bound::Min(1)))]),
            ..Check::default()
        };
        let errs = Fixture::new("body").run(&RegexRule, &check);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::RegexError);
        assert!(errs[0].error.contains("'['"));
    }

    #[test]
    fn test_match_reply_trims_and_truncates() {
        let check = Check { match_reply: Some("  pong \n".into()), ..Check::default() };
        assert!(Fixture::new("\npong").run(&MatchReplyRule, &check).is_empty());

        let check = Check { match_reply: Some("a".repeat(30)), ..Check::default() };
        let errs = Fixture::new(&"b".repeat(25)).run(&MatchReplyRule, &check);
        assert_eq!(errs[0].kind, ErrorKind::ReplyMismatch);
        assert_eq!(
            errs[0].error,
            format!("reply mismatch, expected: \"{}...\", got: \"{}...\"", "a".repeat(20), "b".repeat(20))
        );
    }

    #[test]
    fn test_preview_keeps_short_text() {
        assert_eq!(preview("short"), "short");
        assert_eq!(preview(&"x".repeat(20)), "x".repeat(20));
        assert_eq!(preview(&"x".repeat(21)), format!("{}...", "x".repeat(20)));
    }
}
