//! Login credentials and interactive password resolution.

use std::fmt;
use std::io;

use crate::fault::{AuthFailure, Fault, Result};
use crate::profile::Profile;

/// A username and password for SMTP AUTH.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password. Never log this.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Works out the credentials for a profile.
///
/// Returns `None` when the profile does not authenticate. When it does but
/// carries no password, `prompt` is called once with the prompt text and
/// its answer is used for this run only.
///
/// # Errors
///
/// Returns an authentication fault if the profile wants auth without a user,
/// or if the prompt fails.
pub fn resolve_credentials<F>(profile: &Profile, prompt: F) -> Result<Option<Credentials>>
where
    F: FnOnce(&str) -> io::Result<String>,
{
    if !profile.auth {
        return Ok(None);
    }

    let Some(user) = profile.user.as_deref().filter(|u| !u.is_empty()) else {
        return Err(Fault::Authentication {
            user: String::new(),
            reason: AuthFailure::Field {
                field: "user",
                reason: "authentication is enabled but no user is set".into(),
            },
        });
    };

    let password = match profile.password.as_deref() {
        Some(password) if !password.is_empty() => password.to_string(),
        _ => prompt(&format!("Enter a password for SMTP user '{user}': ")).map_err(|e| {
            Fault::Authentication {
                user: user.to_string(),
                reason: AuthFailure::Field {
                    field: "password",
                    reason: format!("could not read password: {e}"),
                },
            }
        })?,
    };

    Ok(Some(Credentials::new(user, password)))
}
