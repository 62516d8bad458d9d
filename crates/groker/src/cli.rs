//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use groker_core::{Fault, Profile, TransportRequest};

/// Test an SMTP server: connect, secure, authenticate, and send a test message.
#[derive(Parser, Debug)]
#[command(name = "groker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Upgrade the connection with STARTTLS
    #[arg(short = 'T', long)]
    pub tls: bool,

    /// Use an implicit SSL connection. Takes precedence over --tls
    #[arg(short = 'S', long)]
    pub ssl: bool,

    /// SMTP server port [default: 587, or 465 with --ssl]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Connect and authenticate, but do not send a message
    #[arg(short, long)]
    pub dry_run: bool,

    /// Show more output: -v adds protocol traces, -vv adds source locations
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Use the saved profile with this name
    #[arg(long, value_name = "NAME", conflicts_with_all = ["host", "user", "password", "sender", "recipient", "save"])]
    pub profile: Option<String>,

    /// SMTP server hostname or IP address
    #[arg(short = 'H', long, required_unless_present = "profile")]
    pub host: Option<String>,

    /// SMTP user. Giving a user enables authentication
    #[arg(short, long)]
    pub user: Option<String>,

    /// SMTP password. Prompted for when a user is given without one
    #[arg(short = 'P', long)]
    pub password: Option<String>,

    /// Sender email address
    #[arg(short, long, required_unless_present = "profile")]
    pub sender: Option<String>,

    /// Recipient email address. Can be given more than once
    #[arg(short, long, required_unless_present = "profile")]
    pub recipient: Vec<String>,

    /// Save these settings as a profile with this name
    #[arg(long, value_name = "NAME")]
    pub save: Option<String>,

    /// Profiles file [default: <config dir>/groker/profiles.json]
    #[arg(long, value_name = "PATH")]
    pub profiles: Option<PathBuf>,

    /// Seconds to wait for the connection and greeting
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Name to announce in EHLO
    #[arg(long, value_name = "NAME", default_value = "localhost")]
    pub ehlo_name: String,
}

impl Cli {
    /// The transport flags as given.
    pub const fn transport_request(&self) -> TransportRequest {
        TransportRequest {
            ssl: self.ssl,
            tls: self.tls,
            port: self.port,
        }
    }

    /// Builds a profile from the connection arguments.
    ///
    /// # Errors
    ///
    /// Returns a generic fault naming each missing argument.
    pub fn profile_from_args(&self) -> Result<Profile, Fault> {
        match (&self.host, &self.sender) {
            (Some(host), Some(sender)) if !self.recipient.is_empty() => Ok(Profile::new(
                host.clone(),
                self.user.clone(),
                self.password.clone(),
                sender.clone(),
                self.recipient.clone(),
            )),
            _ => {
                let missing = [
                    ("host", self.host.is_none()),
                    ("sender", self.sender.is_none()),
                    ("recipient", self.recipient.is_empty()),
                ];
                Err(Fault::Generic {
                    details: missing
                        .into_iter()
                        .filter(|(_, absent)| *absent)
                        .map(|(field, _)| (field.to_string(), "is required".to_string()))
                        .collect(),
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;
    use groker_core::{Mode, Transport};

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("groker").chain(args.iter().copied()))
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn full_argument_set() {
        let cli = parse(&[
            "-H", "mx.test", "-u", "ops", "-s", "ops@x.com", "-r", "a@x.com", "-r", "b@x.com",
            "-T", "-vv",
        ])
        .unwrap();

        assert_eq!(cli.recipient, ["a@x.com", "b@x.com"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.transport_request().resolve(),
            Transport {
                mode: Mode::ExplicitTls,
                port: 587
            }
        );

        let profile = cli.profile_from_args().unwrap();
        assert!(profile.auth);
        assert_eq!(profile.password, None);
    }

    #[test]
    fn profile_stands_alone() {
        let cli = parse(&["--profile", "office", "-S"]).unwrap();
        assert_eq!(cli.profile.as_deref(), Some("office"));
        assert_eq!(cli.transport_request().resolve().port, 465);
        assert!(cli.profile_from_args().is_err());
    }

    #[test]
    fn connection_arguments_required_without_profile() {
        let err = parse(&["-H", "mx.test", "-s", "ops@x.com"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn save_conflicts_with_profile() {
        let err = parse(&["--profile", "office", "--save", "other"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn timeout_must_be_positive() {
        let with_timeout = |seconds| {
            parse(&["-H", "h", "-s", "a@x.com", "-r", "b@x.com", "--timeout", seconds])
        };
        let err = with_timeout("0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(with_timeout("1").unwrap().timeout, 1);

        let cli = parse(&["-H", "h", "-s", "a@x.com", "-r", "b@x.com"]).unwrap();
        assert_eq!(cli.timeout, 5);
    }

    #[test]
    fn explicit_port_survives_ssl() {
        let cli = parse(&["-H", "h", "-s", "a@x.com", "-r", "b@x.com", "-S", "-p", "587"]).unwrap();
        assert_eq!(
            cli.transport_request().resolve(),
            Transport {
                mode: Mode::ImplicitSsl,
                port: 587
            }
        );
    }
}
