//! DNS pre-check and TCP/TLS dialing with connection failure classification.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rustls::pki_types::ServerName;
use rustls::{CertificateError, ClientConfig, RootCertStore};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use url::{Host, Url};

use super::certs::CertificateWarnings;
use crate::types::{ErrorKind, ProbeError};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a connection to a service could not be established
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DialFailure {
    #[error("lookup {host}: {reason}")]
    Dns { host: String, reason: String, timeout: bool },

    #[error("lookup {host}: resolver returned no addresses")]
    DnsConfig { host: String },

    #[error("tls: certificate is not valid for {host}: {reason}")]
    TlsHostName { host: String, reason: String },

    #[error("tls: certificate signed by unknown authority: {0}")]
    TlsUnknownAuthority(String),

    #[error("tls: certificate invalid: {0}")]
    TlsCertificateInvalid(String),

    #[error("tls: failed to load system roots: {0}")]
    TlsSystemRoots(String),

    #[error("dial {target}: {reason}")]
    Unknown { target: String, reason: String, timeout: bool },
}

impl DialFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DialFailure::Dns { .. } => ErrorKind::Dns,
            DialFailure::DnsConfig { .. } => ErrorKind::DnsConfig,
            DialFailure::TlsHostName { .. } => ErrorKind::TlsHostNameError,
            DialFailure::TlsUnknownAuthority(_) => ErrorKind::TlsUnknownAuthority,
            DialFailure::TlsCertificateInvalid(_) => ErrorKind::TlsCertificateInvalid,
            DialFailure::TlsSystemRoots(_) => ErrorKind::TlsSystemRootsError,
            DialFailure::Unknown { .. } => ErrorKind::UnknownError,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DialFailure::Dns { timeout: true, .. } | DialFailure::Unknown { timeout: true, .. }
        )
    }

    pub fn to_probe_error(&self) -> ProbeError {
        ProbeError::new(self.kind(), self.to_string())
    }
}

/// A parsed service endpoint ready to be dialed
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: Url,
    pub host: Host<String>,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| format!("invalid endpoint {raw}: {e}"))?;
        let host = url
            .host()
            .map(|host| host.to_owned())
            .ok_or_else(|| format!("endpoint {raw} has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| format!("endpoint {raw} has no port for scheme {}", url.scheme()))?;

        Ok(Self { url, host, port })
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "https"
    }

    fn host_name(&self) -> String {
        match &self.host {
            Host::Domain(domain) => domain.clone(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        }
    }
}

/// Dialer shared by every watcher.
///
/// The root store is loaded once; a failure to load it only affects TLS
/// endpoints.
#[derive(Clone)]
pub struct Dialer {
    tls: Result<Arc<ClientConfig>, String>,
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer").field("tls_ready", &self.tls.is_ok()).finish()
    }
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialer {
    /// Create a dialer trusting the platform's root certificates
    pub fn new() -> Self {
        let tls = load_client_config().inspect_err(|e| {
            warn!("TLS endpoints will fail, system roots unavailable: {}", e);
        });
        Self { tls }
    }

    /// Create a dialer trusting only the given roots
    pub fn with_roots(roots: RootCertStore) -> Result<Self, String> {
        Ok(Self { tls: build_client_config(roots).map(Arc::new) })
    }

    /// TLS settings shared with the session client, absent without roots
    pub fn tls_config(&self) -> Option<&ClientConfig> {
        self.tls.as_deref().ok()
    }

    /// Resolve the endpoint host before dialing
    pub async fn resolve(&self, endpoint: &Endpoint) -> Result<Vec<SocketAddr>, DialFailure> {
        let domain = match &endpoint.host {
            Host::Ipv4(ip) => return Ok(vec![SocketAddr::new((*ip).into(), endpoint.port)]),
            Host::Ipv6(ip) => return Ok(vec![SocketAddr::new((*ip).into(), endpoint.port)]),
            Host::Domain(domain) => domain.as_str(),
        };

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain, endpoint.port))
            .await
            .map_err(|e| lookup_failed(domain, &e))?
            .collect();

        if addrs.is_empty() {
            return Err(DialFailure::DnsConfig { host: domain.to_string() });
        }
        Ok(addrs)
    }

    /// Connect to the endpoint; for TLS endpoints complete the handshake and
    /// report certificates expiring within `tls_warning`
    pub async fn dial(
        &self,
        endpoint: &Endpoint,
        addrs: &[SocketAddr],
        tls_warning: Duration,
    ) -> Result<Vec<ProbeError>, DialFailure> {
        let target = format!("{}:{}", endpoint.host_name(), endpoint.port);

        let tcp = within(CONNECT_TIMEOUT, "connect", &target, TcpStream::connect(addrs))
            .await?
            .map_err(|e| classify_io(&target, &e))?;

        if !endpoint.is_tls() {
            return Ok(Vec::new());
        }

        let config = self.tls.clone().map_err(DialFailure::TlsSystemRoots)?;
        let host = endpoint.host_name();
        let server_name = ServerName::try_from(host.clone()).map_err(|e| {
            DialFailure::TlsHostName { host: host.clone(), reason: e.to_string() }
        })?;

        let connector = TlsConnector::from(config);
        let handshake = connector.connect(server_name, tcp);
        let stream = within(TLS_HANDSHAKE_TIMEOUT, "tls handshake", &target, handshake)
            .await?
            .map_err(|e| classify_tls(&host, &target, &e))?;

        let mut warnings = CertificateWarnings::new();
        if let Some(chain) = stream.get_ref().1.peer_certificates() {
            warnings.inspect_chain(chain, Utc::now(), tls_warning);
        }
        Ok(warnings.into_errors())
    }
}

/// Run `step` with a deadline; running out is a timeout failure of the dial
async fn within<T>(
    limit: Duration,
    step: &str,
    target: &str,
    future: impl Future<Output = T>,
) -> Result<T, DialFailure> {
    timeout(limit, future).await.map_err(|_| DialFailure::Unknown {
        target: target.to_string(),
        reason: format!("{step} timed out after {limit:?}"),
        timeout: true,
    })
}

fn load_client_config() -> Result<Arc<ClientConfig>, String> {
    let loaded = rustls_native_certs::load_native_certs();
    for error in &loaded.errors {
        debug!("Error while loading a native root certificate: {}", error);
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    if added == 0 {
        return Err(format!(
            "no usable root certificates ({ignored} unparsable, {} load errors)",
            loaded.errors.len()
        ));
    }

    build_client_config(roots).map(Arc::new)
}

fn build_client_config(roots: RootCertStore) -> Result<ClientConfig, String> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| e.to_string())?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

fn lookup_failed(host: &str, error: &io::Error) -> DialFailure {
    DialFailure::Dns {
        host: host.to_string(),
        reason: error.to_string(),
        timeout: error.kind() == io::ErrorKind::TimedOut,
    }
}

fn classify_io(target: &str, error: &io::Error) -> DialFailure {
    DialFailure::Unknown {
        target: target.to_string(),
        reason: error.to_string(),
        timeout: error.kind() == io::ErrorKind::TimedOut,
    }
}

fn classify_tls(host: &str, target: &str, error: &io::Error) -> DialFailure {
    let Some(tls_error) = error.get_ref().and_then(|inner| inner.downcast_ref::<rustls::Error>())
    else {
        return classify_io(target, error);
    };

    match tls_error {
        rustls::Error::InvalidCertificate(
            cert_error @ (CertificateError::NotValidForName
            | CertificateError::NotValidForNameContext { .. }),
        ) => DialFailure::TlsHostName { host: host.to_string(), reason: cert_error.to_string() },
        rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer) => {
            DialFailure::TlsUnknownAuthority(tls_error.to_string())
        }
        rustls::Error::InvalidCertificate(_) => {
            DialFailure::TlsCertificateInvalid(tls_error.to_string())
        }
        other => DialFailure::Unknown {
            target: target.to_string(),
            reason: other.to_string(),
            timeout: false,
        },
    }
}
