//! `groker` - SMTP connectivity and delivery tester
//!
//! Connects to a mail server, optionally secures the link and logs in, then
//! sends a short test message so every step can be checked end to end.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;
mod cli;

use std::process::ExitCode;

use clap::Parser;
use groker_core::{Reporter, TracingSink, exit_code};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let reporter = Reporter::new(TracingSink);
    let result = app::run(&cli, &reporter, |text: &str| rpassword::prompt_password(text)).await;
    ExitCode::from(exit_code(&result))
}

/// Installs the global subscriber. `RUST_LOG` wins over `-v` when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "groker={level},groker_core={level},groker_smtp={level}"
        ))
    });
    let locations = verbose >= 2;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_file(locations)
                .with_line_number(locations),
        )
        .init();
}
