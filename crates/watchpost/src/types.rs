use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Closed set of error classes a poll cycle can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "endpointInvalid")]
    InvalidEndpoint,
    #[serde(rename = "dns")]
    Dns,
    #[serde(rename = "dnsConfig")]
    DnsConfig,
    #[serde(rename = "tlsCertificateInvalid")]
    TlsCertificateInvalid,
    #[serde(rename = "tlsHostNameError")]
    TlsHostNameError,
    #[serde(rename = "tlsSystemRootsError")]
    TlsSystemRootsError,
    /// Wire name keeps the historical spelling, the corrected one is accepted
    #[serde(rename = "tlsUnknownAutority", alias = "tlsUnknownAuthority")]
    TlsUnknownAuthority,
    #[serde(rename = "clientError")]
    ClientError,
    #[serde(rename = "unknownError")]
    UnknownError,
    #[serde(rename = "wrongHTTPStatus")]
    WrongHttpStatusCode,
    #[serde(rename = "certificateIsExpiring")]
    CertificateIsExpiring,
    #[serde(rename = "unexpectedContentType")]
    UnexpectedContentType,
    #[serde(rename = "sessionFail")]
    SessionFail,
    #[serde(rename = "goqueryMismatch")]
    GoQueryMismatch,
    #[serde(rename = "goQueryGeneralError")]
    GoQuery,
    #[serde(rename = "jsonPathError")]
    JsonPathError,
    #[serde(rename = "regexError")]
    RegexError,
    #[serde(rename = "headerMismatch")]
    HeaderMismatch,
    #[serde(rename = "redirectMismatch")]
    RedirectMismatch,
    #[serde(rename = "replyMismatch")]
    ReplyMismatch,
    #[serde(rename = "serverTooSlow")]
    ServerTooSlow,
    #[serde(rename = "notImplemented")]
    NotImplemented,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidEndpoint => "endpointInvalid",
            ErrorKind::Dns => "dns",
            ErrorKind::DnsConfig => "dnsConfig",
            ErrorKind::TlsCertificateInvalid => "tlsCertificateInvalid",
            ErrorKind::TlsHostNameError => "tlsHostNameError",
            ErrorKind::TlsSystemRootsError => "tlsSystemRootsError",
            ErrorKind::TlsUnknownAuthority => "tlsUnknownAutority",
            ErrorKind::ClientError => "clientError",
            ErrorKind::UnknownError => "unknownError",
            ErrorKind::WrongHttpStatusCode => "wrongHTTPStatus",
            ErrorKind::CertificateIsExpiring => "certificateIsExpiring",
            ErrorKind::UnexpectedContentType => "unexpectedContentType",
            ErrorKind::SessionFail => "sessionFail",
            ErrorKind::GoQueryMismatch => "goqueryMismatch",
            ErrorKind::GoQuery => "goQueryGeneralError",
            ErrorKind::JsonPathError => "jsonPathError",
            ErrorKind::RegexError => "regexError",
            ErrorKind::HeaderMismatch => "headerMismatch",
            ErrorKind::RedirectMismatch => "redirectMismatch",
            ErrorKind::ReplyMismatch => "replyMismatch",
            ErrorKind::ServerTooSlow => "serverTooSlow",
            ErrorKind::NotImplemented => "notImplemented",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a check inside a session, rendered as `@call[i].check[j]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub call: usize,
    pub check: usize,
}

impl Location {
    pub fn new(call: usize, check: usize) -> Self {
        Self { call, check }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@call[{}].check[{}]", self.call, self.check)
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid location '{s}'");

        let rest = s.strip_prefix("@call[").ok_or_else(invalid)?;
        let (call, rest) = rest.split_once("].check[").ok_or_else(invalid)?;
        let check = rest.strip_suffix(']').ok_or_else(invalid)?;

        Ok(Self {
            call: call.parse().map_err(|_| invalid())?,
            check: check.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A single problem found during one poll cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeError {
    /// Human readable description
    pub error: String,

    #[serde(rename = "type")]
    pub kind: ErrorKind,

    /// Annotation of the check that produced this error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ProbeError {
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self { error: error.into(), kind, comment: None, location: None }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// Outcome of one poll cycle for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Id of the service that was probed
    pub id: String,

    /// Start of the poll cycle
    pub timestamp: DateTime<Utc>,

    /// Wall clock time of the whole cycle, in milliseconds on the wire
    #[serde(rename = "runtime", with = "duration_millis")]
    pub run_time: Duration,

    /// Whether the connection failure reported itself as a timeout
    pub timeout: bool,

    pub errors: Vec<ProbeError>,
}

impl ProbeResult {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            run_time: Duration::ZERO,
            timeout: false,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, kind: ErrorKind, error: impl Into<String>) {
        self.errors.push(ProbeError::new(kind, error));
    }

    pub fn push(&mut self, error: ProbeError) {
        self.errors.push(error);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Stamp the wall clock run time measured from `self.timestamp`
    pub fn finish(&mut self) {
        self.run_time = (Utc::now() - self.timestamp).to_std().unwrap_or_default();
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
