//! Transport selection: which connection mode to use, and on which port.

use std::fmt;

/// Submission port, used when none is given.
pub const DEFAULT_PORT: u16 = 587;

/// Conventional port for implicit SSL (smtps).
pub const SSL_PORT: u16 = 465;

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No encryption.
    Plaintext,
    /// TLS from the first byte, before the greeting.
    ImplicitSsl,
    /// Plaintext connect, then STARTTLS.
    ExplicitTls,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plaintext => "plaintext",
            Self::ImplicitSsl => "SSL",
            Self::ExplicitTls => "STARTTLS",
        })
    }
}

/// The operator's transport flags, before resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportRequest {
    /// `--ssl`
    pub ssl: bool,
    /// `--tls`
    pub tls: bool,
    /// `--port`, `None` when left at the default.
    pub port: Option<u16>,
}

/// A resolved mode and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    /// Connection mode.
    pub mode: Mode,
    /// Port to connect to.
    pub port: u16,
}

impl TransportRequest {
    /// Resolves the flags into a mode and port.
    ///
    /// SSL wins over TLS. With SSL and no explicit port the port becomes 465;
    /// an explicit port is always kept.
    #[must_use]
    pub const fn resolve(self) -> Transport {
        if self.ssl {
            let port = match self.port {
                Some(port) => port,
                None => SSL_PORT,
            };
            return Transport {
                mode: Mode::ImplicitSsl,
                port,
            };
        }

        let port = match self.port {
            Some(port) => port,
            None => DEFAULT_PORT,
        };
        let mode = if self.tls {
            Mode::ExplicitTls
        } else {
            Mode::Plaintext
        };
        Transport { mode, port }
    }
}

impl Transport {
    /// True when the connection is upgraded with STARTTLS.
    #[must_use]
    pub const fn use_tls(self) -> bool {
        matches!(self.mode, Mode::ExplicitTls)
    }

    /// True when the connection uses implicit SSL.
    #[must_use]
    pub const fn use_ssl(self) -> bool {
        matches!(self.mode, Mode::ImplicitSsl)
    }
}
