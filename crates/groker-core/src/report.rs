//! Turning replies and faults into log lines.
//!
//! [`classify`] decides what gets said about a [`Fault`] and how loudly; a
//! [`ReportSink`] decides where it goes. The session only ever talks to a
//! [`Reporter`], which ties the two together.

use std::cell::RefCell;
use std::fmt;

use groker_smtp::{Error as SmtpError, RefusedRecipient, Reply};
use tracing::{debug, error, info, trace, warn};

use crate::fault::{AuthFailure, Fault, SendFailure, Step};

/// Separator between reply lines in a protocol trace.
const TRACE_SEPARATOR: &str = " - ";

/// How loud a line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Internal detail, normally hidden.
    Trace,
    /// Protocol traces and progress detail.
    Debug,
    /// Normal progress.
    Info,
    /// Something the operator should look at.
    Warning,
    /// A failure limited to part of the run.
    Error,
    /// A failure that ends the run.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

/// One classified log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// How loud.
    pub severity: Severity,
    /// Which step it is about.
    pub step: Step,
    /// The text.
    pub text: String,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(severity: Severity, step: Step, text: impl Into<String>) -> Self {
        Self {
            severity,
            step,
            text: text.into(),
        }
    }
}

/// Destination for report entries.
pub trait ReportSink {
    /// Writes one entry.
    fn emit(&self, entry: Entry);
}

/// Sends entries to the `tracing` subscriber installed at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, entry: Entry) {
        let Entry {
            severity,
            step,
            text,
        } = entry;
        match severity {
            Severity::Trace => trace!(%step, "{text}"),
            Severity::Debug => debug!(%step, "{text}"),
            Severity::Info => info!(%step, "{text}"),
            Severity::Warning => warn!(%step, "{text}"),
            Severity::Error => error!(%step, "{text}"),
            Severity::Critical => error!(%step, critical = true, "{text}"),
        }
    }
}

/// Keeps entries in memory, for inspection after a run.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: RefCell<Vec<Entry>>,
}

impl MemorySink {
    /// Everything emitted so far.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.borrow().clone()
    }

    /// Entries at or above `severity`.
    #[must_use]
    pub fn at_least(&self, severity: Severity) -> Vec<Entry> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.severity >= severity)
            .cloned()
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, entry: Entry) {
        self.entries.borrow_mut().push(entry);
    }
}

/// Writes progress, protocol traces and classified faults to a sink.
#[derive(Debug, Default)]
pub struct Reporter<S = TracingSink> {
    sink: S,
}

impl<S: ReportSink> Reporter<S> {
    /// Creates a reporter writing to `sink`.
    pub const fn new(sink: S) -> Self {
        Self { sink }
    }

    /// The underlying sink.
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Emits a single line.
    pub fn say(&self, severity: Severity, step: Step, text: impl Into<String>) {
        self.sink.emit(Entry::new(severity, step, text));
    }

    /// Emits the protocol trace of a server reply.
    pub fn reply(&self, step: Step, reply: &Reply) {
        self.say(Severity::Debug, step, protocol_trace(reply));
    }

    /// Emits a classified fault.
    pub fn fault(&self, fault: &Fault) {
        for entry in classify(fault) {
            self.sink.emit(entry);
        }
    }

    /// Emits recipients refused during an otherwise successful send.
    pub fn refused(&self, refused: &[RefusedRecipient]) {
        for entry in classify_refused(refused) {
            self.sink.emit(entry);
        }
    }
}

/// Formats a reply as `code - line - line`.
#[must_use]
pub fn protocol_trace(reply: &Reply) -> String {
    std::iter::once(reply.code.to_string())
        .chain(reply.message.iter().filter(|l| !l.is_empty()).cloned())
        .collect::<Vec<_>>()
        .join(TRACE_SEPARATOR)
}

/// Entries for a refused-recipient list: a header, then one line per recipient.
#[must_use]
pub fn classify_refused(refused: &[RefusedRecipient]) -> Vec<Entry> {
    if refused.is_empty() {
        return Vec::new();
    }

    let mut entries = Vec::with_capacity(refused.len() + 1);
    entries.push(Entry::new(
        Severity::Error,
        Step::Send,
        "One or more recipients failed.",
    ));
    entries.extend(refused.iter().map(|r| {
        Entry::new(
            Severity::Error,
            Step::Send,
            format!("{}: {}", r.recipient, r.reply),
        )
    }));
    entries
}

/// Decides what to say about a fault.
///
/// The first entry names the failing step; the rest carry the detail. Text
/// the server sent us is passed through as-is.
#[must_use]
pub fn classify(fault: &Fault) -> Vec<Entry> {
    let step = fault.step();
    let headline = |text: String| Entry::new(Severity::Error, step, text);

    match fault {
        Fault::Connection { host, port, source } => vec![
            headline(format!("Unable to connect to mail host: {host}:{port}")),
            server_detail(step, source),
        ],
        Fault::SecureUpgrade(source) => vec![
            headline("STARTTLS negotiation failed".into()),
            server_detail(step, source),
        ],
        Fault::Authentication { user, reason } => {
            let head = headline(format!("Authentication failed for user '{user}'"));
            match reason {
                AuthFailure::Server(source) => vec![head, server_detail(step, source)],
                AuthFailure::Field { field, reason } => vec![
                    head,
                    Entry::new(Severity::Error, step, format!("{field}: {reason}")),
                ],
            }
        }
        Fault::Send(SendFailure::Recipients(refused)) => classify_refused(refused),
        Fault::Send(SendFailure::Message(source)) => vec![
            headline("Message rejected by server".into()),
            server_detail(step, source),
        ],
        Fault::SenderPolicy {
            sender,
            code,
            reason,
        } => vec![
            headline(format!("Failed to meet sender restrictions for {sender}.")),
            Entry::new(Severity::Error, step, format!("{code} {reason}")),
        ],
        Fault::Generic { details } => details
            .iter()
            .map(|(key, value)| Entry::new(Severity::Error, step, format!("{key}: {value}")))
            .collect(),
        Fault::ProfileStore { path, source } => vec![
            Entry::new(
                Severity::Critical,
                step,
                format!("Error reading profiles file: {}", path.display()),
            ),
            Entry::new(Severity::Critical, step, format!("Details: {source}")),
        ],
        Fault::ProfileNotFound(name) => vec![Entry::new(
            Severity::Critical,
            step,
            format!("Saved profile '{name}' does not exist"),
        )],
    }
}

/// A server-reported error verbatim, otherwise the error's own message.
fn server_detail(step: Step, source: &SmtpError) -> Entry {
    let text = match source {
        SmtpError::SmtpError { code, message } => format!("{code} {message}"),
        other => other.to_string(),
    };
    Entry::new(Severity::Critical, step, text)
}
