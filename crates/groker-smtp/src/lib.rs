//! # groker-smtp
//!
//! A small SMTP client built for diagnosing mail servers rather than bulk
//! delivery: every step of the conversation is observable and every failure
//! comes back as a distinct [`Error`] variant.
//!
//! ## Features
//!
//! - **Type-state connection management**: `Client<Connected>` and
//!   `Client<Authenticated>` gate which commands are available
//! - **TLS support**: Both implicit TLS (port 465) and STARTTLS
//! - **Authentication**: PLAIN and LOGIN, negotiated from the EHLO reply
//! - **One-shot delivery**: `send_mail` reports refused recipients
//!   individually instead of failing the whole transaction
//!
//! ## Quick Start
//!
//! ```ignore
//! use groker_smtp::{Address, Client};
//! use groker_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> groker_smtp::Result<()> {
//!     let stream = connect("smtp.example.com", 587).await?;
//!     let mut client = Client::from_stream(stream).await?;
//!     client.ehlo("client.example.com").await?;
//!
//!     let (client, _) = client.starttls("smtp.example.com").await?;
//!     let (mut client, _) = client.authenticate("user@example.com", "password").await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = [Address::new("recipient@example.com")?];
//!     let refused = client
//!         .send_mail(&from, &to, b"Subject: Test\r\n\r\nHello, World!\r\n")
//!         .await?;
//!     assert!(refused.is_empty());
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐  starttls()   ┌──────────────┐
//! │  Connected   │ ────────────→ │  Connected   │ (encrypted)
//! └──────────────┘               └──────────────┘
//!        │ authenticate()               │ authenticate()
//!        ↓                              ↓
//! ┌──────────────┐
//! │Authenticated │ ── send_mail() ──→ Authenticated
//! └──────────────┘
//! ```
//!
//! `send_mail` and `quit` are available from either state.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Failure, Ready, ServerInfo, SmtpConnection, Transition,
};
pub use error::{Error, RefusedRecipient, Result};
pub use parser::decode_text;
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyClass, ReplyCode};

/// The rustls version used for [`connection::connect_tls_with`] and
/// [`Client::starttls_with`] settings.
pub use tokio_rustls::rustls;
