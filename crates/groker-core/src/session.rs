//! One SMTP conversation, from connect to close.
//!
//! A [`Session`] walks strictly forward through [`SessionState`]:
//!
//! ```text
//! Disconnected → Connected → SecureIfRequested → AuthenticatedIfRequired → Sent | DryRun → Closed
//! ```
//!
//! Any failure is classified, reported, and followed straight by `Closed`.
//! STARTTLS always completes before credentials are sent.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use groker_smtp::connection::{connect, connect_tls_with, default_tls_config};
use groker_smtp::rustls::ClientConfig;
use groker_smtp::{
    Authenticated, Client, Connected, Error as SmtpError, RefusedRecipient, Reply, SmtpConnection,
};

use crate::credentials::Credentials;
use crate::fault::{AuthFailure, Fault, Result, SendFailure, Step};
use crate::message::MessageSpec;
use crate::report::{ReportSink, Reporter, Severity};
use crate::transport::{Mode, Transport};

/// Bound on connect, TLS handshake and greeting.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Name announced in EHLO unless configured otherwise.
pub const DEFAULT_CLIENT_NAME: &str = "localhost";

/// Where to connect and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// SMTP host name or address.
    pub host: String,
    /// Resolved mode and port.
    pub transport: Transport,
    /// Bound on the connect step.
    pub timeout: Duration,
    /// Name sent with EHLO/HELO.
    pub client_name: String,
}

impl ConnectionConfig {
    /// Creates a config with the default timeout and client name.
    #[must_use]
    pub fn new(host: impl Into<String>, transport: Transport) -> Self {
        Self {
            host: host.into(),
            transport,
            timeout: DEFAULT_TIMEOUT,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the EHLO name.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }
}

/// What to do once connected.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Log in with these, if present.
    pub credentials: Option<Credentials>,
    /// The message and its envelope.
    pub message: MessageSpec,
    /// Stop before sending.
    pub dry_run: bool,
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Nothing opened yet.
    Disconnected,
    /// Greeting and EHLO done.
    Connected,
    /// STARTTLS done, or not needed.
    SecureIfRequested,
    /// Logged in, or not needed.
    AuthenticatedIfRequired,
    /// The message was accepted for at least one recipient.
    Sent,
    /// Stopped before sending, as asked.
    DryRun,
    /// Connection released.
    Closed,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The message went out. Recipients the server refused are listed.
    Sent {
        /// Refused recipients, possibly none.
        refused: Vec<RefusedRecipient>,
    },
    /// Dry run: no message sent.
    DryRun,
}

enum Live {
    Connected(Client<Connected>),
    Authenticated(Client<Authenticated>),
}

impl Live {
    async fn quit(self) -> groker_smtp::Result<Reply> {
        match self {
            Self::Connected(client) => client.quit().await,
            Self::Authenticated(client) => client.quit().await,
        }
    }
}

/// A single SMTP conversation.
pub struct Session<'r, S: ReportSink> {
    config: ConnectionConfig,
    tls: Arc<ClientConfig>,
    reporter: &'r Reporter<S>,
    live: Option<Live>,
    history: Vec<SessionState>,
}

impl<'r, S: ReportSink> Session<'r, S> {
    /// Creates a disconnected session. Server certificates must chain to the
    /// Mozilla root set.
    pub fn new(config: ConnectionConfig, reporter: &'r Reporter<S>) -> Self {
        Self {
            config,
            tls: default_tls_config(),
            reporter,
            live: None,
            history: vec![SessionState::Disconnected],
        }
    }

    /// Uses these TLS settings for implicit SSL and STARTTLS instead.
    #[must_use]
    pub fn with_tls_config(mut self, tls: Arc<ClientConfig>) -> Self {
        self.tls = tls;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.history
            .last()
            .copied()
            .unwrap_or(SessionState::Disconnected)
    }

    /// Every state passed through, in order.
    #[must_use]
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Runs the whole conversation once.
    ///
    /// Every failure is reported before this returns, and the connection is
    /// always closed.
    ///
    /// # Errors
    ///
    /// Returns the [`Fault`] that stopped the run.
    pub async fn run(&mut self, attempt: &Attempt) -> Result<Outcome> {
        if self.state() != SessionState::Disconnected {
            return Err(Fault::generic("session", "a session can only be run once"));
        }

        let result = self.drive(attempt).await;
        if let Err(fault) = &result {
            self.reporter.fault(fault);
        }
        self.close().await;
        result
    }

    async fn drive(&mut self, attempt: &Attempt) -> Result<Outcome> {
        self.connect().await?;
        self.secure().await?;
        self.authenticate(attempt.credentials.as_ref()).await?;

        let rendered = attempt.message.render(Utc::now());
        self.say(
            Severity::Debug,
            Step::Send,
            format!("Sending Message:\n{rendered}"),
        );

        if attempt.dry_run {
            self.say(Severity::Info, Step::Send, "Dry-run enabled. No message sent");
            self.advance(SessionState::DryRun);
            return Ok(Outcome::DryRun);
        }

        self.send(&attempt.message, rendered.as_bytes()).await
    }

    async fn connect(&mut self) -> Result<()> {
        let ConnectionConfig {
            host,
            transport: Transport { mode, port },
            timeout,
            client_name,
        } = self.config.clone();
        let tls = Arc::clone(&self.tls);

        self.say(
            Severity::Debug,
            Step::Connect,
            format!("Opening SMTP connection to: {host}:{port}"),
        );
        if mode == Mode::ImplicitSsl {
            self.say(Severity::Debug, Step::Connect, "SSL Connection in use");
        }

        let opening = async {
            let stream = if mode == Mode::ImplicitSsl {
                connect_tls_with(&host, port, tls).await?
            } else {
                connect(&host, port).await?
            };
            Client::from_stream(stream).await
        };

        let connection_fault = |source| Fault::Connection {
            host: host.clone(),
            port,
            source,
        };

        let mut client = match tokio::time::timeout(timeout, opening).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(connection_fault(e)),
            Err(_) => return Err(connection_fault(SmtpError::Timeout(timeout.as_secs()))),
        };
        self.say(
            Severity::Debug,
            Step::Connect,
            format!("Server greeting: {}", client.server_info().greeting),
        );

        let ehlo = client.ehlo(&client_name).await;
        self.live = Some(Live::Connected(client));
        let reply = ehlo.map_err(connection_fault)?;
        self.reporter.reply(Step::Connect, &reply);

        self.advance(SessionState::Connected);
        Ok(())
    }

    async fn secure(&mut self) -> Result<()> {
        if self.config.transport.mode != Mode::ExplicitTls {
            self.advance(SessionState::SecureIfRequested);
            return Ok(());
        }

        self.say(Severity::Debug, Step::Secure, "TLS in use: sending STARTTLS");
        let client = self.take_connected(Step::Secure)?;
        match client
            .starttls_with(&self.config.host, Arc::clone(&self.tls))
            .await
        {
            Ok((client, reply)) => {
                self.reporter.reply(Step::Secure, &reply);
                self.live = Some(Live::Connected(client));
                self.advance(SessionState::SecureIfRequested);
                Ok(())
            }
            Err(failure) => {
                let (error, client) = failure.into_parts();
                self.live = client.map(Live::Connected);
                Err(Fault::SecureUpgrade(error))
            }
        }
    }

    async fn authenticate(&mut self, credentials: Option<&Credentials>) -> Result<()> {
        let Some(credentials) = credentials else {
            self.advance(SessionState::AuthenticatedIfRequired);
            return Ok(());
        };

        let client = self.take_connected(Step::Auth)?;
        if !client.is_encrypted() {
            self.say(
                Severity::Warning,
                Step::Auth,
                "Authenticating over an unencrypted connection",
            );
        }
        self.say(
            Severity::Debug,
            Step::Auth,
            format!("Authenticating as user: {}", credentials.username()),
        );

        match client
            .authenticate(credentials.username(), credentials.password())
            .await
        {
            Ok((client, reply)) => {
                self.reporter.reply(Step::Auth, &reply);
                self.live = Some(Live::Authenticated(client));
                self.advance(SessionState::AuthenticatedIfRequired);
                Ok(())
            }
            Err(failure) => {
                let (error, client) = failure.into_parts();
                self.live = client.map(Live::Connected);
                Err(Fault::Authentication {
                    user: credentials.username().to_string(),
                    reason: AuthFailure::Server(error),
                })
            }
        }
    }

    async fn send(&mut self, message: &MessageSpec, rendered: &[u8]) -> Result<Outcome> {
        let from = message.sender();
        let to = message.recipients();

        let sent = match self.live.as_mut() {
            Some(Live::Connected(client)) => client.send_mail(from, to, rendered).await,
            Some(Live::Authenticated(client)) => client.send_mail(from, to, rendered).await,
            None => return Err(lost_connection(Step::Send)),
        };

        match sent {
            Ok(refused) => {
                self.say(
                    Severity::Info,
                    Step::Send,
                    "Successfully sent email for one or more recipients.",
                );
                self.reporter.refused(&refused);
                self.advance(SessionState::Sent);
                Ok(Outcome::Sent { refused })
            }
            Err(SmtpError::SenderRefused {
                code,
                message,
                sender,
            }) => Err(Fault::SenderPolicy {
                sender,
                code,
                reason: message,
            }),
            Err(SmtpError::RecipientsRefused(refused)) => {
                Err(Fault::Send(SendFailure::Recipients(refused)))
            }
            Err(e) => Err(Fault::Send(SendFailure::Message(e))),
        }
    }

    /// Ends the conversation. Errors here are swallowed so they can never
    /// hide the fault that got us here; they show up only at trace level.
    async fn close(&mut self) {
        if let Some(live) = self.live.take() {
            match live.quit().await {
                Ok(_) => self.say(
                    Severity::Debug,
                    Step::Close,
                    "Closing connection to SMTP host",
                ),
                Err(e) => self.say(
                    Severity::Trace,
                    Step::Close,
                    format!("Ignoring error while closing: {e}"),
                ),
            }
        }
        self.advance(SessionState::Closed);
    }

    fn take_connected(&mut self, step: Step) -> Result<Client<Connected>> {
        match self.live.take() {
            Some(Live::Connected(client)) => Ok(client),
            other => {
                self.live = other;
                Err(lost_connection(step))
            }
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(next > self.state(), "session states only move forward");
        self.history.push(next);
    }

    fn say(&self, severity: Severity, step: Step, text: impl Into<String>) {
        self.reporter.say(severity, step, text);
    }
}

fn lost_connection(step: Step) -> Fault {
    Fault::generic(step.to_string(), "no usable connection for this step")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportRequest;

    #[test]
    fn config_defaults() {
        let config = ConnectionConfig::new("mx.test", TransportRequest::default().resolve());
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.client_name, "localhost");

        let config = config
            .with_timeout(Duration::from_secs(1))
            .with_client_name("client.test");
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.client_name, "client.test");
    }

    #[test]
    fn states_are_ordered() {
        assert!(SessionState::Disconnected < SessionState::Connected);
        assert!(SessionState::AuthenticatedIfRequired < SessionState::Sent);
        assert!(SessionState::DryRun < SessionState::Closed);
    }
}
