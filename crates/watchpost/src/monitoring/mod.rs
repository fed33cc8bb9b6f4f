//! The per-service probing pipeline: dial, session, notification and the
//! watcher loop tying them together.

pub mod certs;
pub mod checker;
pub mod dial;
pub mod notify;
pub mod scheduler;
pub mod session;

pub use checker::{Checker, HttpChecker};
pub use dial::{DialFailure, Dialer, Endpoint};
pub use scheduler::{NotifiedFlags, Watcher, WatcherReport, WatcherState};
pub use session::{SessionError, run_session, user_agent};
