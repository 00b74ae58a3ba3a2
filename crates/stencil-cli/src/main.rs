//! stencil CLI entry point.
//!
//! Usage:
//!   stencil render page --data page.json   # Render to stdout
//!   stencil check page                     # Parse and link only
//!   stencil vars page                      # List expected variables

use std::env;
use std::io;
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing on stderr (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match stencil_cli::run(&args, &mut out) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!("Run 'stencil --help' for usage.");
            ExitCode::FAILURE
        }
    }
}
