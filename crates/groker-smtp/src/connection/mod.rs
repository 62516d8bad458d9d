//! SMTP connection management with type-state pattern.

mod client;
mod stream;

pub use client::{Authenticated, Client, Connected, Failure, Ready, SmtpConnection, Transition};
pub use stream::{SmtpStream, connect, connect_tls, connect_tls_with, default_tls_config};

use crate::types::{AuthMechanism, Extension};

/// What the server told us about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Full greeting text.
    pub greeting: String,
    /// Supported extensions, in the order advertised.
    pub extensions: Vec<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if the AUTH extension was advertised at all.
    #[must_use]
    pub fn supports_auth(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Auth(_)))
    }

    /// Every AUTH mechanism name the server advertised.
    #[must_use]
    pub fn advertised_auth(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .filter_map(|ext| match ext {
                Extension::Auth(names) => Some(names.iter().map(String::as_str)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Advertised mechanisms this client can use, in advertised order.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.advertised_auth()
            .into_iter()
            .filter_map(AuthMechanism::parse)
            .collect()
    }
}
