//! Executes a service's ordered calls and validates every response.

use std::time::Instant;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::Call;
use crate::types::{Location, ProbeResult};
use crate::validation::rules::is_json;
use crate::validation::{CheckContext, check_response};

/// Identifies the monitor to the probed services
pub fn user_agent() -> String {
    format!("Watchpost Service Monitor/{}", env!("CARGO_PKG_VERSION"))
}

/// A call that could not be executed at all
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("call {index}: invalid uri '{uri}': {source}")]
    InvalidUri {
        index: usize,
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("call {index}: cannot switch to scheme '{scheme}'")]
    InvalidScheme { index: usize, scheme: String },

    #[error("call {index}: invalid method '{method}'")]
    InvalidMethod { index: usize, method: String },

    #[error("call {index}: invalid header '{name}'")]
    InvalidHeader { index: usize, name: String },

    #[error("call {index}: cannot encode data as {content_type}: {reason}")]
    Encode { index: usize, content_type: String, reason: String },

    #[error("call {index}: request failed: {source}")]
    Request {
        index: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("call {index}: reading body failed: {source}")]
    Body {
        index: usize,
        #[source]
        source: reqwest::Error,
    },
}

/// Overlay the call's path and query onto the endpoint
pub fn call_url(endpoint: &Url, index: usize, call: &Call) -> Result<Url, SessionError> {
    let joined = endpoint.join(&call.uri).map_err(|source| SessionError::InvalidUri {
        index,
        uri: call.uri.clone(),
        source,
    })?;

    let mut url = endpoint.clone();
    url.set_path(joined.path());
    url.set_query(joined.query());

    if let Some(scheme) = call.scheme.as_deref().filter(|s| !s.is_empty()) {
        url.set_scheme(scheme).map_err(|_| SessionError::InvalidScheme {
            index,
            scheme: scheme.to_string(),
        })?;
    }

    Ok(url)
}

fn request_headers(index: usize, call: &Call) -> Result<HeaderMap, SessionError> {
    let mut headers = HeaderMap::new();
    if let Ok(agent) = HeaderValue::from_str(&user_agent()) {
        headers.insert(USER_AGENT, agent);
    }

    if call.data.is_some() {
        let value = HeaderValue::from_str(call.content_type()).map_err(|_| {
            SessionError::InvalidHeader { index, name: CONTENT_TYPE.to_string() }
        })?;
        headers.insert(CONTENT_TYPE, value);
    }

    for (name, value) in &call.headers {
        let invalid = || SessionError::InvalidHeader { index, name: name.clone() };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(name, value);
    }

    Ok(headers)
}

fn request_body(index: usize, call: &Call) -> Result<Option<Vec<u8>>, SessionError> {
    let Some(data) = &call.data else {
        return Ok(None);
    };

    let content_type = call.content_type();
    if !is_json(content_type) {
        return Err(SessionError::Encode {
            index,
            content_type: content_type.to_string(),
            reason: "only JSON payloads are supported".into(),
        });
    }

    serde_json::to_vec(data).map(Some).map_err(|e| SessionError::Encode {
        index,
        content_type: content_type.to_string(),
        reason: e.to_string(),
    })
}

/// Run every call of `session` against `endpoint`, appending validation
/// errors to `result`.
///
/// The client carries the cookie jar, so callers create one per cycle.
pub async fn run_session(
    client: &Client,
    endpoint: &Url,
    session: &[Call],
    result: &mut ProbeResult,
) -> Result<(), SessionError> {
    for (index, call) in session.iter().enumerate() {
        let url = call_url(endpoint, index, call)?;
        let method = Method::from_bytes(call.method().as_bytes()).map_err(|_| {
            SessionError::InvalidMethod { index, method: call.method().to_string() }
        })?;

        let mut request = client.request(method, url.clone()).headers(request_headers(index, call)?);
        if let Some(body) = request_body(index, call)? {
            request = request.body(body);
        }

        let started = Instant::now();
        let response =
            request.send().await.map_err(|source| SessionError::Request { index, source })?;
        let duration = started.elapsed();

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|source| SessionError::Body { index, source })?;

        debug!(
            service_id = %result.id,
            call = index,
            %url,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Call completed"
        );

        for (check_index, check) in call.check.iter().enumerate() {
            let ctx = CheckContext {
                status,
                headers: &headers,
                body: &body,
                duration,
                check,
                call,
            };

            let comment = check
                .comment
                .clone()
                .filter(|c| !c.is_empty())
                .or_else(|| call.comment.clone());
            let location = Location::new(index, check_index);

            for error in check_response(&ctx) {
                result.push(error.with_comment(comment.clone()).at(location));
            }
        }
    }

    Ok(())
}
