//! stencil CLI: render, check and inspect templates from the shell.
//!
//! ```text
//! stencil render <template> [--data <file.json>] [--dir <root>] [--dev]
//! stencil check  <template> [--dir <root>]
//! stencil vars   <template> [--dir <root>]
//! ```
//!
//! Every subcommand also accepts `--config <file>` in place of the default
//! `~/.config/stencil/config.toml`.

pub mod config;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use stencil_kernel::{Value, VarMap};

pub use config::{Config, Delimiters, Escape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Render,
    Check,
    Vars,
}

/// A parsed subcommand with its flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub command: Command,
    pub template: String,
    pub data: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub dev: bool,
    pub config: Option<PathBuf>,
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Help,
    Version,
    Run(Options),
}

/// Parse arguments, not including the program name.
pub fn parse_args(args: &[String]) -> Result<Invocation> {
    let command = match args.first().map(String::as_str) {
        None | Some("--help" | "-h" | "help") => return Ok(Invocation::Help),
        Some("--version" | "-V") => return Ok(Invocation::Version),
        Some("render") => Command::Render,
        Some("check") => Command::Check,
        Some("vars") => Command::Vars,
        Some(other) => bail!("Unknown command: {other}"),
    };

    let mut template = None;
    let mut data = None;
    let mut dir = None;
    let mut dev = false;
    let mut config = None;

    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        let mut value = |flag: &str| {
            rest.next()
                .map(PathBuf::from)
                .with_context(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(Invocation::Help),
            "--data" if command == Command::Render => data = Some(value("--data")?),
            "--dev" if command == Command::Render => dev = true,
            "--dir" => dir = Some(value("--dir")?),
            "--config" => config = Some(value("--config")?),
            flag if flag.starts_with('-') => bail!("Unknown option for {command:?}: {flag}"),
            name if template.is_none() => template = Some(name.to_string()),
            extra => bail!("Unexpected argument: {extra}"),
        }
    }

    let template = template.context("Missing template name")?;
    Ok(Invocation::Run(Options {
        command,
        template,
        data,
        dir,
        dev,
        config,
    }))
}

/// Run the CLI, writing command output to `out` and flushing it.
pub fn run(args: &[String], out: &mut dyn Write) -> Result<ExitCode> {
    match parse_args(args)? {
        Invocation::Help => out.write_all(help().as_bytes())?,
        Invocation::Version => writeln!(
            out,
            "stencil {} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("STENCIL_GIT_HASH")
        )?,
        Invocation::Run(options) => {
            let config = match &options.config {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            execute(&options, config, out)?;
        }
    }
    out.flush().context("Failed to flush output")?;
    Ok(ExitCode::SUCCESS)
}

/// Run a subcommand against `config`, after applying the flags in
/// `options`.
pub fn execute(options: &Options, mut config: Config, out: &mut dyn Write) -> Result<()> {
    if let Some(dir) = &options.dir {
        config.root = dir.clone();
    }
    config.development |= options.dev;
    tracing::debug!(?config, template = %options.template, "running {:?}", options.command);

    let set = config.build_set()?;
    let template = set
        .get_template(&options.template)
        .with_context(|| format!("Failed to load {}", options.template))?;

    match options.command {
        Command::Render => {
            let context = match &options.data {
                Some(path) => read_data(path)?,
                None => Value::Null,
            };
            set.execute(&template, out, &VarMap::new(), context)
                .with_context(|| format!("Failed to render {}", template.name()))?;
        }
        Command::Check => writeln!(out, "ok {}", template.name())?,
        Command::Vars => {
            for name in set.template_variables(&template) {
                writeln!(out, "{name}")?;
            }
        }
    }
    Ok(())
}

/// Load the render context from a JSON file.
fn read_data(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data from {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
    Ok(Value::from(json))
}

pub fn help() -> String {
    format!(
        r#"stencil v{}

Usage:
  stencil render <template> [OPTIONS]   Render a template to stdout
  stencil check <template> [OPTIONS]    Parse and link a template
  stencil vars <template> [OPTIONS]     List variables the template expects

Options:
  --dir <root>         Template root directory (default: config or ".")
  --config <file>      Config file (default: ~/.config/stencil/config.toml)
  -h, --help           Show this help
  -V, --version        Show version

Render Options:
  --data <file.json>   JSON value used as the template context
  --dev                Development mode: always reload templates

Logging goes to stderr and follows RUST_LOG.
"#,
        env!("CARGO_PKG_VERSION")
    )
}
