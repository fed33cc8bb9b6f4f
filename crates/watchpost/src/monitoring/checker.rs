use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, redirect};
use tracing::{debug, warn};
use url::Host;

use super::dial::{CONNECT_TIMEOUT, DialFailure, Dialer, Endpoint};
use super::session::run_session;
use crate::config::ServiceSpec;
use crate::types::{ErrorKind, ProbeResult};

/// One poll cycle against one service
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, spec: &ServiceSpec) -> ProbeResult;
}

/// Network checker: DNS pre-check, dial, then the HTTP session
#[derive(Debug, Clone, Default)]
pub struct HttpChecker {
    dialer: Dialer,
}

impl HttpChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialer(dialer: Dialer) -> Self {
        Self { dialer }
    }

    fn record_failure(result: &mut ProbeResult, failure: DialFailure) {
        debug!(service_id = %result.id, error = %failure, "Connection failed");
        result.timeout = failure.is_timeout();
        result.push(failure.to_probe_error());
    }

    fn build_client(&self, endpoint: &Endpoint, addrs: &[SocketAddr]) -> reqwest::Result<Client> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(5));

        // verify the session handshake against the roots the dial trusted
        if let Some(config) = self.dialer.tls_config() {
            builder = builder.use_preconfigured_tls(config.clone());
        }

        // reuse the pre-check addresses instead of resolving again
        if let Host::Domain(domain) = &endpoint.host {
            builder = builder.resolve_to_addrs(domain, addrs);
        }

        builder.build()
    }

    async fn probe(&self, spec: &ServiceSpec, result: &mut ProbeResult) {
        let endpoint = match Endpoint::parse(&spec.endpoint) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                result.add_error(ErrorKind::InvalidEndpoint, e);
                return;
            }
        };

        let addrs = match self.dialer.resolve(&endpoint).await {
            Ok(addrs) => addrs,
            Err(failure) => return Self::record_failure(result, failure),
        };

        match self.dialer.dial(&endpoint, &addrs, spec.tls_warning()).await {
            Ok(warnings) => result.errors.extend(warnings),
            Err(failure) => return Self::record_failure(result, failure),
        }

        let client = match self.build_client(&endpoint, &addrs) {
            Ok(client) => client,
            Err(e) => {
                result.add_error(ErrorKind::ClientError, format!("could not build client: {e}"));
                return;
            }
        };

        if let Err(e) = run_session(&client, &endpoint.url, &spec.session, result).await {
            warn!(service_id = %spec.id, error = %e, "Session failed");
            result.add_error(ErrorKind::SessionFail, e.to_string());
        }
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self, spec: &ServiceSpec) -> ProbeResult {
        let mut result = ProbeResult::new(&spec.id);
        self.probe(spec, &mut result).await;
        result.finish();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Call, Check};
    use crate::testing::{Reply, localhost_cert, serve, serve_tls};
    use rustls::RootCertStore;

    fn checker() -> HttpChecker {
        HttpChecker::with_dialer(Dialer::with_roots(RootCertStore::empty()).unwrap())
    }

    fn trusting_localhost() -> HttpChecker {
        let mut roots = RootCertStore::empty();
        roots.add(localhost_cert()).unwrap();
        HttpChecker::with_dialer(Dialer::with_roots(roots).unwrap())
    }

    fn tls_spec(id: &str, port: u16) -> ServiceSpec {
        ServiceSpec::new(id, format!("https://localhost:{port}"))
            .with_call(Call::get("/secure").with_check(Check {
                status_code: Some(200),
                ..Check::default()
            }))
    }

    #[tokio::test]
    async fn test_untrusted_certificate_skips_session() {
        let (addr, recorded) = serve_tls(|_| Reply::json("{}")).await;

        let result = checker().check(&tls_spec("self-signed", addr.port())).await;
        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert_eq!(result.errors[0].kind, ErrorKind::TlsUnknownAuthority);
        assert!(!result.timeout);
        assert!(recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_trusts_the_dial_roots() {
        let (addr, recorded) = serve_tls(|_| Reply::json(r#"{"ok":true}"#)).await;

        let result = trusting_localhost().check(&tls_spec("pinned", addr.port())).await;
        assert!(result.is_ok(), "{:?}", result.errors);
        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].path, "/secure");
    }

    #[tokio::test]
    async fn test_invalid_endpoint_short_circuits() {
        let spec = ServiceSpec::new("broken", "::not-a-url");
        let result = checker().check(&spec).await;

        assert_eq!(result.id, "broken");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::InvalidEndpoint);
        assert!(!result.timeout);
    }

    #[tokio::test]
    async fn test_healthy_service() {
        let (addr, recorded) = serve(|_| Reply::json(r#"{"hello":"world"}"#)).await;
        let spec = ServiceSpec::new("api", format!("http://{addr}"))
            .with_call(Call::get("/health").with_check(Check {
                status_code: Some(200),
                ..Check::default()
            }));

        let result = checker().check(&spec).await;
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.run_time > Duration::ZERO);
        assert_eq!(recorded.lock().unwrap()[0].path, "/health");
    }

    #[tokio::test]
    async fn test_refused_connection_skips_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let spec = ServiceSpec::new("down", format!("http://{addr}"))
            .with_call(Call::get("/").with_check(Check { status_code: Some(200), ..Check::default() }));

        let result = checker().check(&spec).await;
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::UnknownError);
    }

    #[tokio::test]
    async fn test_session_failure_is_recorded() {
        let (addr, _) = serve(|_| Reply::json("{}")).await;
        let spec = ServiceSpec::new("bad-call", format!("http://{addr}"))
            .with_call(Call { method: Some("NOT A METHOD".into()), ..Call::get("/") });

        let result = checker().check(&spec).await;
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::SessionFail);
    }
}
