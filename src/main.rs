//! Guardrails CLI entry point.
//!
//! Validates queries given as arguments, or one per stdin line, and prints one
//! JSON verdict per line on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use query_guardrails::{GuardrailsValidator, ValidationResult};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    NaturalLanguage,
    Sql,
}

#[derive(Debug, Parser)]
#[command(name = "query-guardrails", version, about = "Validate queries against a guardrails policy")]
struct Cli {
    /// Guardrails policy file (YAML).
    #[arg(long, env = "GUARDRAILS_CONFIG", default_value = "config/guardrails.yaml")]
    config: PathBuf,

    /// How to interpret each query.
    #[arg(long, value_enum, default_value_t = Mode::NaturalLanguage)]
    mode: Mode,

    /// Print the allowed tables and their columns, then exit.
    #[arg(long)]
    list_tables: bool,

    /// Queries to validate. Read from stdin, one per line, when omitted.
    queries: Vec<String>,
}

#[derive(Serialize)]
struct Verdict<'a> {
    query: &'a str,
    #[serde(flatten)]
    result: &'a ValidationResult,
}

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let validator = GuardrailsValidator::load(&cli.config).with_context(|| {
        format!(
            "refusing to start without a usable guardrails policy ({})",
            cli.config.display()
        )
    })?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.list_tables {
        for (name, table) in validator.config().tables() {
            let entry = serde_json::json!({
                "table": name,
                "description": table.description,
                "allowed_columns": table.allowed_columns,
            });
            writeln!(out, "{}", entry)?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut rejected = 0usize;
    let mut check = |query: &str, out: &mut dyn Write| -> Result<()> {
        let result = match cli.mode {
            Mode::NaturalLanguage => validator.validate_natural_language(query),
            Mode::Sql => validator.validate_sql(query),
        };
        if !result.is_safe() {
            rejected += 1;
        }
        serde_json::to_writer(&mut *out, &Verdict { query, result: &result })?;
        writeln!(out)?;
        Ok(())
    };

    if cli.queries.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line.context("failed to read query from stdin")?;
            if line.trim().is_empty() {
                continue;
            }
            check(&line, &mut out)?;
        }
    } else {
        for query in &cli.queries {
            check(query, &mut out)?;
        }
    }

    info!("Validation finished, {} rejected", rejected);

    Ok(if rejected == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("query_guardrails=info,warn"));

    // JSON to stderr; stdout carries the verdicts
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
