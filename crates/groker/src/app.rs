//! Wiring from parsed arguments to a finished session.

use std::io;
use std::time::Duration;

use groker_core::{
    Attempt, ConnectionConfig, JsonFileStore, MessageSpec, Outcome, ProfileStore, ReportSink,
    Reporter, Result, Session, resolve_credentials, save_profile,
};
use tracing::{debug, info};

use crate::cli::Cli;

/// Runs one diagnostic attempt. Every fault is reported before returning.
///
/// # Errors
///
/// Returns the fault that ended the run.
pub async fn run<S, F>(cli: &Cli, reporter: &Reporter<S>, prompt: F) -> Result<Outcome>
where
    S: ReportSink,
    F: FnOnce(&str) -> io::Result<String>,
{
    let (config, attempt) = match prepare(cli, prompt) {
        Ok(prepared) => prepared,
        Err(fault) => {
            reporter.fault(&fault);
            return Err(fault);
        }
    };

    Session::new(config, reporter).run(&attempt).await
}

/// Everything that happens before the network: profile, transport,
/// message and credentials.
///
/// A profile is only saved once its addresses are known to be valid, and
/// always before any password prompt.
fn prepare<F>(cli: &Cli, prompt: F) -> Result<(ConnectionConfig, Attempt)>
where
    F: FnOnce(&str) -> io::Result<String>,
{
    let store = match &cli.profiles {
        Some(path) => JsonFileStore::new(path),
        None => JsonFileStore::default_location(),
    };
    let mut profiles = store.load()?;
    let profile = match &cli.profile {
        Some(name) => profiles.get(name)?.clone(),
        None => cli.profile_from_args()?,
    };

    let transport = cli.transport_request().resolve();
    debug!("Transport: {} on port {}", transport.mode, transport.port);
    let config = ConnectionConfig::new(profile.host.clone(), transport)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_client_name(cli.ehlo_name.clone());
    let message = MessageSpec::diagnostic(&profile.sender, &profile.recipient, &config)?;

    if let Some(name) = &cli.save {
        save_profile(&store, &mut profiles, name, profile.clone())?;
        info!("Saved profile '{name}'");
    }

    let credentials = resolve_credentials(&profile, prompt)?;

    Ok((
        config,
        Attempt {
            credentials,
            message,
            dry_run: cli.dry_run,
        },
    ))
}
