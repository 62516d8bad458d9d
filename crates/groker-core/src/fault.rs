//! The closed set of ways a run can fail.
//!
//! Each variant is built where the failure happens, so the reporter never has
//! to guess what kind of failure it is looking at.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use groker_smtp::RefusedRecipient;
use thiserror::Error;

/// Result type alias using [`Fault`].
pub type Result<T> = std::result::Result<T, Fault>;

/// Exit code for a clean run, including dry runs and partial refusals.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for any connection, TLS, authentication or send failure.
pub const EXIT_SESSION_FAILURE: u8 = 1;
/// Exit code when the profile store cannot be read or parsed.
pub const EXIT_PROFILE_STORE: u8 = 3;
/// Exit code when the requested profile does not exist.
pub const EXIT_PROFILE_NOT_FOUND: u8 = 4;

/// The step of the run a fault belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Profile and credential resolution, before any network activity.
    Setup,
    /// TCP connect, implicit SSL handshake, greeting and EHLO.
    Connect,
    /// STARTTLS upgrade.
    Secure,
    /// SMTP AUTH.
    Auth,
    /// Mail transaction.
    Send,
    /// QUIT.
    Close,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Connect => "connect",
            Self::Secure => "secure",
            Self::Auth => "auth",
            Self::Send => "send",
            Self::Close => "close",
        })
    }
}

/// Why the profile store could not be used.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file exists but could not be read.
    #[error("cannot read file: {0}")]
    Read(#[source] std::io::Error),

    /// The file is not a JSON object of profiles.
    #[error("invalid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    /// Writing the file failed.
    #[error("cannot write file: {0}")]
    Write(#[source] std::io::Error),

    /// The profiles could not be serialized.
    #[error("cannot encode profiles: {0}")]
    Encode(#[source] serde_json::Error),
}

/// What went wrong during authentication.
#[derive(Debug, Error)]
pub enum AuthFailure {
    /// The server rejected the login, or offered nothing we can use.
    #[error(transparent)]
    Server(groker_smtp::Error),

    /// A credential field was missing or could not be obtained.
    #[error("{field}: {reason}")]
    Field {
        /// The offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// Ways the mail transaction can fail.
#[derive(Debug, Error)]
pub enum SendFailure {
    /// The message as a whole was rejected (DATA or end of data).
    #[error("message rejected: {0}")]
    Message(groker_smtp::Error),

    /// Recipients were refused and nothing was sent: every one of them, or
    /// those refused before the server shut down (421).
    #[error("{} recipient(s) refused", .0.len())]
    Recipients(Vec<RefusedRecipient>),
}

/// A classified failure of the run.
#[derive(Debug, Error)]
pub enum Fault {
    /// The server could not be reached or would not talk to us.
    #[error("unable to connect to mail host {host}:{port}: {source}")]
    Connection {
        /// Target host.
        host: String,
        /// Target port.
        port: u16,
        /// Underlying failure.
        source: groker_smtp::Error,
    },

    /// STARTTLS was unavailable, refused, or the handshake failed.
    #[error("TLS upgrade failed: {0}")]
    SecureUpgrade(groker_smtp::Error),

    /// Login did not succeed.
    #[error("authentication failed for user '{user}': {reason}")]
    Authentication {
        /// The user we tried to log in as.
        user: String,
        /// Why it failed.
        reason: AuthFailure,
    },

    /// The mail transaction failed.
    #[error("send failed: {0}")]
    Send(SendFailure),

    /// The server would not accept the envelope sender.
    #[error("sender {sender} refused: {code} {reason}")]
    SenderPolicy {
        /// The refused sender.
        sender: String,
        /// Reply code to `MAIL FROM`.
        code: u16,
        /// The server's stated reason.
        reason: String,
    },

    /// Anything else, as field/reason pairs.
    #[error("{}", format_details(.details))]
    Generic {
        /// Field name to reason.
        details: BTreeMap<String, String>,
    },

    /// The profile store could not be read or written.
    #[error("profile store {}: {source}", .path.display())]
    ProfileStore {
        /// Path of the store file.
        path: PathBuf,
        /// Underlying failure.
        source: StoreError,
    },

    /// The requested profile is not in the store.
    #[error("saved profile '{0}' does not exist")]
    ProfileNotFound(String),
}

fn format_details(details: &BTreeMap<String, String>) -> String {
    details
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Fault {
    /// Creates a generic fault with a single field.
    #[must_use]
    pub fn generic(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Generic {
            details: BTreeMap::from([(field.into(), reason.into())]),
        }
    }

    /// The step this fault belongs to.
    #[must_use]
    pub const fn step(&self) -> Step {
        match self {
            Self::Connection { .. } => Step::Connect,
            Self::SecureUpgrade(_) => Step::Secure,
            Self::Authentication { .. } => Step::Auth,
            Self::Send(_) | Self::SenderPolicy { .. } => Step::Send,
            Self::Generic { .. } | Self::ProfileStore { .. } | Self::ProfileNotFound(_) => {
                Step::Setup
            }
        }
    }

    /// Process exit code for this fault.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::ProfileStore { .. } => EXIT_PROFILE_STORE,
            Self::ProfileNotFound(_) => EXIT_PROFILE_NOT_FOUND,
            _ => EXIT_SESSION_FAILURE,
        }
    }
}

/// Process exit code for the outcome of a run.
#[must_use]
pub fn exit_code<T>(result: &Result<T>) -> u8 {
    result.as_ref().map_or_else(Fault::exit_code, |_| EXIT_SUCCESS)
}
