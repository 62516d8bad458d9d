//! # groker-core
//!
//! Diagnostic logic for checking an SMTP server end to end.
//!
//! This crate provides:
//! - **Transport selection** - plaintext, implicit SSL or STARTTLS, and the port to use
//! - **Profiles** - named connection settings persisted as JSON
//! - **Credentials** - password resolution with an interactive fallback
//! - **Message building** - the fixed diagnostic e-mail
//! - **Fault reporting** - a closed set of failure kinds and how each is logged
//! - **Session** - the connect, secure, authenticate, send and close sequence

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod credentials;
mod fault;
pub mod message;
pub mod profile;
pub mod report;
pub mod session;
pub mod transport;

pub use credentials::{Credentials, resolve_credentials};
pub use fault::{AuthFailure, Fault, Result, SendFailure, Step, StoreError, exit_code};
pub use message::MessageSpec;
pub use profile::{JsonFileStore, Profile, ProfileStore, Profiles, save_profile};
pub use report::{Entry, MemorySink, ReportSink, Reporter, Severity, TracingSink};
pub use session::{Attempt, ConnectionConfig, Outcome, Session, SessionState};
pub use transport::{Mode, Transport, TransportRequest};
