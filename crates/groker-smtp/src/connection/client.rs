//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream, default_tls_config};
use crate::command::Command;
use crate::error::{Error, RefusedRecipient, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_rustls::rustls::ClientConfig;
use tracing::{debug, trace};

/// Upper bound on lines in a single reply.
const MAX_REPLY_LINES: usize = 256;

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Connected {}
    impl Sealed for super::Authenticated {}
}

/// States from which a mail transaction may start.
pub trait Ready: sealed::Sealed {}
impl Ready for Connected {}
impl Ready for Authenticated {}

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    client_name: String,
    _state: PhantomData<State>,
}

/// A failed state transition.
///
/// When the failure left the connection usable (the server said no, rather
/// than the socket dying mid-handshake) the client comes back so the caller
/// can still end the session with `QUIT`.
#[derive(Debug)]
pub struct Failure<S> {
    error: Error,
    client: Option<Client<S>>,
}

impl<S> Failure<S> {
    const fn recoverable(error: Error, client: Client<S>) -> Self {
        Self {
            error,
            client: Some(client),
        }
    }

    const fn lost(error: Error) -> Self {
        Self {
            error,
            client: None,
        }
    }

    /// Splits into the error and the client, if the connection survived.
    #[must_use]
    pub fn into_parts(self) -> (Error, Option<Client<S>>) {
        (self.error, self.client)
    }
}

impl<S> From<Failure<S>> for Error {
    fn from(failure: Failure<S>) -> Self {
        failure.error
    }
}

/// Result of a consuming transition: the next-state client plus the server
/// reply that accepted it.
pub type Transition<Next, S> = std::result::Result<(Client<Next>, Reply), Failure<S>>;

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;

    /// Returns true once the connection is encrypted.
    fn is_encrypted(&self) -> bool;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn is_encrypted(&self) -> bool {
        self.stream.is_tls()
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        if !greeting.is_success() {
            return Err(Error::from_reply(&greeting));
        }

        Ok(Self {
            stream,
            server_info: ServerInfo {
                greeting: greeting.message_text(),
                extensions: Vec::new(),
            },
            client_name: String::from("localhost"),
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities, falling back to HELO
    /// when the server rejects EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if both EHLO and HELO are rejected.
    pub async fn ehlo(&mut self, client_name: &str) -> Result<Reply> {
        client_name.clone_into(&mut self.client_name);

        let reply = self.send_command(Command::Ehlo(client_name)).await?;

        if reply.is_success() {
            // First line is the server's greeting, the rest are extensions
            self.server_info.extensions =
                reply.message.iter().skip(1).map(|l| Extension::parse(l)).collect();
            debug!(
                "Server extensions: {}",
                self.server_info
                    .extensions
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            return Ok(reply);
        }

        trace!("EHLO rejected with {}, trying HELO", reply.code);
        let reply = self.send_command(Command::Helo(client_name)).await?;

        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }

        self.server_info.extensions.clear();
        Ok(reply)
    }

    /// Upgrades the connection to TLS using STARTTLS, then repeats EHLO.
    /// The server certificate must chain to the Mozilla root set.
    ///
    /// The returned reply is the server's answer to `STARTTLS`.
    ///
    /// # Errors
    ///
    /// Fails if STARTTLS is not advertised or refused (client returned), or if
    /// the TLS handshake fails (connection lost).
    pub async fn starttls(self, hostname: &str) -> Transition<Connected, Connected> {
        self.starttls_with(hostname, default_tls_config()).await
    }

    /// Like [`Client::starttls`], with the given client TLS settings.
    ///
    /// # Errors
    ///
    /// As for [`Client::starttls`].
    pub async fn starttls_with(
        mut self,
        hostname: &str,
        config: Arc<ClientConfig>,
    ) -> Transition<Connected, Connected> {
        if !self.server_info.supports_starttls() {
            return Err(Failure::recoverable(
                Error::NotSupported("STARTTLS".into()),
                self,
            ));
        }

        let sent = self.send_command(Command::StartTls).await;
        let reply = match sent {
            Ok(reply) if reply.is_success() => reply,
            Ok(reply) => return Err(Failure::recoverable(Error::from_reply(&reply), self)),
            Err(e) => return Err(Failure::recoverable(e, self)),
        };

        let Self {
            stream,
            server_info,
            client_name,
            ..
        } = self;

        let stream = stream
            .upgrade_to_tls(hostname, config)
            .await
            .map_err(Failure::lost)?;

        let mut client = Self {
            stream,
            server_info,
            client_name,
            _state: PhantomData,
        };

        // Capabilities may differ once encrypted
        let name = client.client_name.clone();
        if let Err(e) = client.ehlo(&name).await {
            return Err(Failure::recoverable(e, client));
        }

        Ok((client, reply))
    }

    /// Authenticates with the most preferred mechanism the server offers.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotSupported`] when AUTH or a usable mechanism is
    /// missing, or with the server's reply when the credentials are rejected.
    pub async fn authenticate(
        mut self,
        username: &str,
        password: &str,
    ) -> Transition<Authenticated, Connected> {
        if !self.server_info.supports_auth() {
            return Err(Failure::recoverable(
                Error::NotSupported("the AUTH extension".into()),
                self,
            ));
        }

        let Some(mechanism) = AuthMechanism::negotiate(&self.server_info.auth_mechanisms()) else {
            let offered = self.server_info.advertised_auth().join(" ");
            let offered = if offered.is_empty() { "none" } else { &offered };
            let error = Error::NotSupported(format!("a usable AUTH mechanism (offered: {offered})"));
            return Err(Failure::recoverable(error, self));
        };

        trace!("Authenticating with AUTH {}", mechanism.as_str());
        let outcome = match mechanism {
            AuthMechanism::Plain => self.auth_plain(username, password).await,
            AuthMechanism::Login => self.auth_login(username, password).await,
        };

        match outcome {
            Ok(reply) => Ok((
                Client {
                    stream: self.stream,
                    server_info: self.server_info,
                    client_name: self.client_name,
                    _state: PhantomData,
                },
                reply,
            )),
            Err(e) => Err(Failure::recoverable(e, self)),
        }
    }

    async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Reply> {
        // PLAIN response: \0username\0password
        let credentials = format!("\0{username}\0{password}");
        let cmd = Command::Auth(
            AuthMechanism::Plain,
            Some(BASE64.encode(credentials.as_bytes())),
        );

        let reply = self.send_command(cmd).await?;
        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(reply)
    }

    async fn auth_login(&mut self, username: &str, password: &str) -> Result<Reply> {
        let mut reply = self
            .send_command(Command::Auth(AuthMechanism::Login, None))
            .await?;
        for secret in [username, password] {
            if reply.code != ReplyCode::AUTH_CONTINUE {
                return Err(Error::from_reply(&reply));
            }
            reply = self
                .send_command(Command::AuthResponse(BASE64.encode(secret.as_bytes())))
                .await?;
        }

        if !reply.is_success() {
            return Err(Error::from_reply(&reply));
        }
        Ok(reply)
    }
}

impl<S: Ready> Client<S> {
    /// Runs one complete mail transaction: `MAIL FROM`, one `RCPT TO` per
    /// recipient, then `DATA` with the dot-stuffed message.
    ///
    /// Recipients the server refuses are collected rather than aborting the
    /// transaction; the message goes to everyone else. The refused list is
    /// returned on success and is empty when every recipient was accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::SenderRefused`] when `MAIL FROM` is rejected.
    /// - [`Error::RecipientsRefused`] when no recipient is accepted, or the
    ///   server shuts down (421) mid-envelope.
    /// - [`Error::SmtpError`] when `DATA` or the message itself is rejected.
    pub async fn send_mail(
        &mut self,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<Vec<RefusedRecipient>> {
        if recipients.is_empty() {
            return Err(Error::Protocol("No recipients given".into()));
        }

        let reply = self.send_command(Command::MailFrom(from)).await?;
        if reply.code != ReplyCode::OK {
            if reply.code != ReplyCode::SERVICE_UNAVAILABLE {
                self.reset().await;
            }
            return Err(Error::SenderRefused {
                code: reply.code.as_u16(),
                message: reply.message_text(),
                sender: from.to_string(),
            });
        }

        let mut refused = Vec::new();
        for to in recipients {
            let reply = self.send_command(Command::RcptTo(to)).await?;
            if reply.code == ReplyCode::OK || reply.code == ReplyCode::FORWARD {
                continue;
            }
            let closing = reply.code == ReplyCode::SERVICE_UNAVAILABLE;
            refused.push(RefusedRecipient {
                recipient: to.to_string(),
                reply,
            });
            if closing {
                return Err(Error::RecipientsRefused(refused));
            }
        }

        if refused.len() == recipients.len() {
            self.reset().await;
            return Err(Error::RecipientsRefused(refused));
        }

        let reply = self.send_command(Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(self.data_rejected(&reply).await);
        }

        self.stream.write_all(&dot_stuff(message)).await?;
        let reply = read_reply(&mut self.stream).await?;
        trace!("S: {reply}");
        if reply.code != ReplyCode::OK {
            return Err(self.data_rejected(&reply).await);
        }

        Ok(refused)
    }

    async fn data_rejected(&mut self, reply: &Reply) -> Error {
        if reply.code != ReplyCode::SERVICE_UNAVAILABLE {
            self.reset().await;
        }
        Error::from_reply(reply)
    }

    /// Best-effort RSET after a refused transaction; its outcome never
    /// replaces the error being reported.
    async fn reset(&mut self) {
        if let Err(e) = self.send_command(Command::Rset).await {
            trace!("RSET failed: {e}");
        }
    }
}

// Common implementation for all states
impl<S> Client<S> {
    async fn send_command(&mut self, cmd: Command<'_>) -> Result<Reply> {
        trace!("C: {}", cmd.verb());
        self.stream.write_all(&cmd.to_wire()).await?;
        let reply = read_reply(&mut self.stream).await?;
        trace!("S: {reply}");
        Ok(reply)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<Reply> {
        let reply = self.send_command(Command::Quit).await?;

        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(Error::from_reply(&reply));
        }

        Ok(reply)
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
        if lines.len() >= MAX_REPLY_LINES {
            return Err(Error::Protocol(format!(
                "Reply exceeds {MAX_REPLY_LINES} lines"
            )));
        }
    }

    parse_reply(&lines)
}

/// Normalizes line endings to CRLF, escapes leading dots and appends the
/// terminating `.` line.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);

    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b".\r\n");
    out
}
