//! Certificate expiry inspection for negotiated TLS sessions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use tracing::debug;
use x509_parser::prelude::parse_x509_certificate;

use crate::types::{ErrorKind, ProbeError};

/// Expiry warnings keyed by certificate subject.
///
/// Recording the same subject twice replaces the earlier warning in place, so
/// chains that repeat a certificate produce a single entry.
#[derive(Debug, Default)]
pub struct CertificateWarnings {
    entries: Vec<(String, ProbeError)>,
}

impl CertificateWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning if `not_after - now` is below the threshold
    pub fn record(
        &mut self,
        subject: &str,
        not_after: DateTime<Utc>,
        now: DateTime<Utc>,
        threshold: Duration,
    ) {
        let left = not_after - now;
        let Ok(threshold_delta) = chrono::TimeDelta::from_std(threshold) else {
            return;
        };
        if left >= threshold_delta {
            return;
        }

        let error = ProbeError::new(
            ErrorKind::CertificateIsExpiring,
            format!(
                "cert CN=\"{subject}\" is expiring in less than {}h: {not_after}, left: {} hours",
                threshold.as_secs() / 3600,
                left.num_hours()
            ),
        );

        match self.entries.iter_mut().find(|(known, _)| known == subject) {
            Some((_, existing)) => *existing = error,
            None => self.entries.push((subject.to_string(), error)),
        }
    }

    /// Inspect every certificate of a peer chain
    pub fn inspect_chain(
        &mut self,
        chain: &[CertificateDer<'_>],
        now: DateTime<Utc>,
        threshold: Duration,
    ) {
        for der in chain {
            let cert = match parse_x509_certificate(der.as_ref()) {
                Ok((_, cert)) => cert,
                Err(e) => {
                    debug!("Skipping unparsable peer certificate: {}", e);
                    continue;
                }
            };

            let subject = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or_default()
                .to_string();

            let Some(not_after) = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            else {
                continue;
            };

            self.record(&subject, not_after, now, threshold);
        }
    }

    pub fn into_errors(self) -> Vec<ProbeError> {
        self.entries.into_iter().map(|(_, error)| error).collect()
    }
}
