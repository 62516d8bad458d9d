//! The byte stream under a client: plain TCP or rustls over TCP.

use std::io;
use std::sync::{Arc, LazyLock};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::error::{Error, Result};

/// Longest reply line accepted before the server is considered broken.
const MAX_LINE_LENGTH: usize = 8192;

/// Client TLS settings, trusting the Mozilla root set.
static TLS_CONFIG: LazyLock<Arc<ClientConfig>> = LazyLock::new(|| {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
});

trait Io: AsyncBufRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncBufRead + AsyncWrite + Unpin + Send> Io for T {}

/// A buffered connection to the server.
#[derive(Debug)]
pub enum SmtpStream {
    /// Unencrypted.
    Tcp(BufStream<TcpStream>),
    /// Encrypted, by implicit TLS or after STARTTLS.
    Tls(Box<BufStream<TlsStream<TcpStream>>>),
}

impl SmtpStream {
    fn io(&mut self) -> &mut dyn Io {
        match self {
            Self::Tcp(s) => s,
            Self::Tls(s) => s.as_mut(),
        }
    }

    /// Reads one line as raw bytes, without its terminator.
    ///
    /// Never buffers more than [`MAX_LINE_LENGTH`] bytes, whether or not a
    /// newline ever arrives.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionClosed`] on EOF, [`Error::Protocol`] for an
    /// oversized line, or the I/O error.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let io = self.io();
        let mut line = Vec::new();
        loop {
            let available = io.fill_buf().await?;
            if available.is_empty() {
                if line.is_empty() {
                    return Err(Error::ConnectionClosed);
                }
                break;
            }

            let (chunk, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => (&available[..=end], true),
                None => (available, false),
            };
            if line.len() + chunk.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol(format!(
                    "Reply line exceeds {MAX_LINE_LENGTH} bytes"
                )));
            }
            line.extend_from_slice(chunk);
            let used = chunk.len();
            io.consume(used);
            if complete {
                break;
            }
        }

        let end = line
            .iter()
            .rposition(|b| !matches!(b, b'\r' | b'\n'))
            .map_or(0, |i| i + 1);
        line.truncate(end);
        Ok(line)
    }

    /// Writes and flushes `data`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let io = self.io();
        io.write_all(data).await?;
        io.flush().await?;
        Ok(())
    }

    /// True once the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Runs the TLS handshake over this TCP stream. Anything the server sent
    /// ahead of the handshake is discarded.
    ///
    /// # Errors
    ///
    /// Fails if already encrypted, if `hostname` is not a valid server name,
    /// or if the handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str, config: Arc<ClientConfig>) -> Result<Self> {
        match self {
            Self::Tcp(buffered) => handshake(hostname, buffered.into_inner(), config).await,
            Self::Tls(_) => Err(Error::Protocol("Already using TLS".into())),
        }
    }
}

/// Opens a plain TCP connection.
///
/// # Errors
///
/// Returns the I/O error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    let tcp = TcpStream::connect((hostname, port)).await?;
    Ok(SmtpStream::Tcp(BufStream::new(tcp)))
}

/// Opens a TCP connection and runs TLS before anything else (SMTPS),
/// trusting the Mozilla root set.
///
/// # Errors
///
/// Returns the I/O or TLS error if either step fails.
pub async fn connect_tls(hostname: &str, port: u16) -> Result<SmtpStream> {
    connect_tls_with(hostname, port, default_tls_config()).await
}

/// Like [`connect_tls`], with the given client settings.
///
/// # Errors
///
/// Returns the I/O or TLS error if either step fails.
pub async fn connect_tls_with(
    hostname: &str,
    port: u16,
    config: Arc<ClientConfig>,
) -> Result<SmtpStream> {
    let tcp = TcpStream::connect((hostname, port)).await?;
    handshake(hostname, tcp, config).await
}

/// Client TLS settings trusting the Mozilla root set.
#[must_use]
pub fn default_tls_config() -> Arc<ClientConfig> {
    Arc::clone(&TLS_CONFIG)
}

async fn handshake(
    hostname: &str,
    tcp: TcpStream,
    config: Arc<ClientConfig>,
) -> Result<SmtpStream> {
    let name = ServerName::try_from(hostname.to_owned())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {hostname}")))?;

    let tls = TlsConnector::from(config)
        .connect(name, tcp)
        .await
        .map_err(handshake_error)?;
    Ok(SmtpStream::Tls(Box::new(BufStream::new(tls))))
}

/// tokio-rustls wraps rustls failures in `io::Error`; unwrap them so a
/// rejected certificate is not mistaken for a network problem.
fn handshake_error(e: io::Error) -> Error {
    if !e.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
        return Error::Io(e);
    }
    let kind = e.kind();
    match e.into_inner().map(|inner| inner.downcast::<rustls::Error>()) {
        Some(Ok(tls)) => Error::Tls(*tls),
        Some(Err(other)) => Error::Io(io::Error::new(kind, other)),
        None => Error::Io(kind.into()),
    }
}
