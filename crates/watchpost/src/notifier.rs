//! Abstract notification channels.
//!
//! Delivery (SMTP, webhooks, SMS gateways) lives outside the engine. A
//! channel is active iff a notifier was configured for it.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Mail,
    Slack,
    Sms,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Mail, Channel::Slack, Channel::Sms];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Mail => write!(f, "mail"),
            Channel::Slack => write!(f, "slack"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Delivery contract for one channel
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// A service started failing or its set of failures changed
    async fn notify_errors(&self, service_id: &str, summary: &str) -> Result<()>;

    /// A service that was failing is healthy again
    async fn notify_resolved(&self, service_id: &str) -> Result<()>;
}

/// The configured channels, absent ones are skipped
#[derive(Clone, Default)]
pub struct Notifiers {
    pub mail: Option<Arc<dyn Notifier>>,
    pub slack: Option<Arc<dyn Notifier>>,
    pub sms: Option<Arc<dyn Notifier>>,
}

impl Notifiers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, notifier: Arc<dyn Notifier>) -> Self {
        match channel {
            Channel::Mail => self.mail = Some(notifier),
            Channel::Slack => self.slack = Some(notifier),
            Channel::Sms => self.sms = Some(notifier),
        }
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn Notifier>> {
        match channel {
            Channel::Mail => self.mail.as_ref(),
            Channel::Slack => self.slack.as_ref(),
            Channel::Sms => self.sms.as_ref(),
        }
    }

    /// Configured channels in a fixed order
    pub fn configured(&self) -> impl Iterator<Item = (Channel, &Arc<dyn Notifier>)> {
        Channel::ALL.into_iter().filter_map(|channel| self.get(channel).map(|n| (channel, n)))
    }
}

impl fmt::Debug for Notifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifiers")
            .field("mail", &self.mail.is_some())
            .field("slack", &self.slack.is_some())
            .field("sms", &self.sms.is_some())
            .finish()
    }
}
