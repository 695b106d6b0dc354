use email_gatekeeper::models::audit::HistoryFilter;
use email_gatekeeper::{ValidationEvent, ValidationOrchestrator, ValidatorConfig};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Email Gatekeeper Entry Point
///
/// Reads one address per line from stdin, prints the structural outcome at
/// once and the MX verification result when it arrives. Lines starting with
/// `:` are commands:
/// - `:history [all|valid|invalid] [search]` prints the audit log, newest first
/// - `:export [all|valid|invalid] [search]` writes the view to a CSV file in the working directory
/// - `:stats` prints valid/invalid counts
///
/// # Configuration
/// - `EMAIL_GATEKEEPER_*` environment variables, optionally from a `.env` file
/// - `RUST_LOG` controls log output on stderr (default `info`)
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ValidatorConfig::from_env()?;
    info!(db_path = %config.db_path, pool_size = config.pool_size, "starting email gatekeeper");

    let (orchestrator, mut events) = ValidationOrchestrator::from_config(&config).await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ValidationEvent::Verified(report) if report.has_mail_exchange_record() => {
                    println!("{}: MX record found", report.email)
                }
                ValidationEvent::Verified(report) => {
                    println!("{}: domain has no MX record", report.email)
                }
                ValidationEvent::PersistenceFailed { email, error } => {
                    eprintln!("{email}: attempt not recorded: {error}")
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.strip_prefix(':') {
            Some(command) => run_command(&orchestrator, command).await,
            None => {
                let outcome = orchestrator.submit(line).await;
                if outcome.is_structurally_valid() {
                    println!("{line}: checking MX records");
                } else {
                    println!("{line}: {}", outcome.reason());
                }
                if let Some(suggestion) = outcome.suggestion {
                    println!("{line}: did you mean {suggestion}?");
                }
            }
        }
    }

    orchestrator.shutdown().await;
    printer.await?;
    Ok(())
}

async fn run_command(orchestrator: &ValidationOrchestrator, command: &str) {
    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let mut filter = HistoryFilter::All;
    let mut search = String::new();
    for word in words {
        match word.parse::<HistoryFilter>() {
            Ok(parsed) if search.is_empty() => filter = parsed,
            _ => search = word.to_string(),
        }
    }

    match name {
        "history" => match orchestrator.query_history(filter, &search).await {
            Ok(records) => {
                for record in records {
                    let mx = match record.verification {
                        Some(true) => "yes",
                        Some(false) => "no",
                        None => "-",
                    };
                    println!(
                        "{:>5} {} {:<40} valid={} mx={}",
                        record.id, record.timestamp, record.email, record.structurally_valid, mx
                    );
                }
            }
            Err(e) => eprintln!("history unavailable: {e}"),
        },
        "export" => match orchestrator.export_history(filter, &search, Path::new(".")).await {
            Ok(path) => println!("saved {}", path.display()),
            Err(e) => eprintln!("export failed: {e}"),
        },
        "stats" => match orchestrator.compute_stats().await {
            Ok(stats) => println!("valid={} invalid={}", stats.valid_count, stats.invalid_count),
            Err(e) => eprintln!("stats unavailable: {e}"),
        },
        other => eprintln!("unknown command :{other}"),
    }
}
