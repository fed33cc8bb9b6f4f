use url::Url;

use super::{CONTENT_TYPE_JSON, Call, ConfigError};

/// Upper bound on the poll interval (24 hours)
const MAX_INTERVAL_SECONDS: u64 = 86_400;

/// Parse an endpoint; only absolute http(s) URLs with a host can be probed
pub fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint(format!("{raw:?}: {reason}"));

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }

    Ok(url)
}

pub fn check_interval(seconds: u64) -> Result<(), ConfigError> {
    match seconds {
        0 => Err(ConfigError::InvalidInterval("must be at least 1 second".into())),
        s if s > MAX_INTERVAL_SECONDS => {
            Err(ConfigError::InvalidInterval(format!("{s}s is longer than 24 hours")))
        }
        _ => Ok(()),
    }
}

/// The call at `index` must compose against the endpoint and encode its data
pub fn check_call(endpoint: &Url, index: usize, call: &Call) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCall { index, reason };

    endpoint
        .join(&call.uri)
        .map_err(|e| invalid(format!("uri {}: {e}", call.uri)))?;

    if let Some(scheme) = call.scheme.as_deref() {
        if !matches!(scheme, "http" | "https") {
            return Err(invalid(format!("unsupported scheme override {scheme}")));
        }
    }

    if call.data.is_some() && call.content_type() != CONTENT_TYPE_JSON {
        return Err(invalid(format!("cannot encode data as {}", call.content_type())));
    }

    Ok(())
}
