//! RxSentinel command-line interface.
//!
//! Verifies prescription documents against the eight compliance checks using
//! the built-in (fictional) reference registries, runs the demo scenarios,
//! and inspects exported case documents.
//!
//! Usage:
//!   rxsentinel verify prescription.txt --out cases/
//!   rxsentinel scenario all
//!   rxsentinel inspect cases/<case_id>.json
//!   rxsentinel history cases/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rxsentinel_checks::{
    build_service, scenarios, CaseRecord, InMemoryRecordStore, JsonFileRecordStore,
    MockReferenceData,
};
use rxsentinel_contracts::{
    case::{CaseId, CaseResult},
    check::{CheckKind, CheckStatus},
};
use rxsentinel_core::traits::RecordStore;
use rxsentinel_policy::PipelineConfig;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

// ── CLI definition ────────────────────────────────────────────────────────────

/// RxSentinel: multi-check prescription verification.
#[derive(Parser)]
#[command(
    name = "rxsentinel",
    about = "Prescription verification pipeline",
    long_about = "Runs license, DEA, state, controlled substance, dosage, BUD,\n\
                  compounding, and documentation checks over a prescription and\n\
                  produces an auditable approval decision."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a prescription document (JSON or labelled text).
    Verify {
        document: PathBuf,
        /// Pipeline TOML; the built-in policy when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory to write the case document to.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Case id; a random one when omitted.
        #[arg(long)]
        case_id: Option<String>,
        /// Print the full case document as JSON instead of a report.
        #[arg(long)]
        json: bool,
    },
    /// Run a built-in scenario by name, or `all`.
    Scenario {
        name: String,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate an exported case document and its audit hash chain.
    Inspect { path: PathBuf },
    /// List the cases stored in a directory.
    History { dir: PathBuf },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for scheduling detail.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Verify {
            document,
            config,
            out,
            case_id,
            json,
        } => verify(&document, config.as_deref(), out, case_id, json).await,
        Command::Scenario { name, config } => run_scenarios(&name, config.as_deref()).await,
        Command::Inspect { path } => inspect(&path),
        Command::History { dir } => history(dir).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("rxsentinel: {e}");
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>) -> CliResult<PipelineConfig> {
    Ok(match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::builtin()?,
    })
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn verify(
    document: &Path,
    config: Option<&Path>,
    out: Option<PathBuf>,
    case_id: Option<String>,
    json: bool,
) -> CliResult<bool> {
    let config = load_config(config)?;
    let bytes = std::fs::read(document)
        .map_err(|e| format!("cannot read '{}': {e}", document.display()))?;
    let store: Arc<dyn RecordStore> = match out {
        Some(dir) => Arc::new(JsonFileRecordStore::new(dir)?),
        None => Arc::new(InMemoryRecordStore::new()),
    };
    let service = build_service(&config, Arc::new(MockReferenceData::new()), store)?;

    let case_id = case_id.map_or_else(CaseId::new, |id| CaseId::from(id.as_str()));
    let submission = service.process(&bytes, case_id).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&submission.result)?);
    } else {
        print_report(&submission.result);
    }
    match submission.saved_as {
        Ok(_) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

async fn run_scenarios(name: &str, config: Option<&Path>) -> CliResult<bool> {
    let config = load_config(config)?;
    let selected: Vec<scenarios::Scenario> = if name == "all" {
        scenarios::all()
    } else {
        let scenario = scenarios::find(name).ok_or_else(|| {
            let known: Vec<&str> = scenarios::all().iter().map(|s| s.name).collect();
            format!("unknown scenario '{name}' (known: {}, all)", known.join(", "))
        })?;
        vec![scenario]
    };

    let mut all_matched = true;
    for scenario in &selected {
        println!("━━ {} ━━ {}", scenario.name, scenario.description);
        let submission = scenarios::run(scenario, &config).await?;
        print_report(&submission.result);

        let matched = submission.result.approval_status == scenario.expected;
        all_matched &= matched;
        println!(
            "expected {}: {}\n",
            scenario.expected,
            if matched { "ok" } else { "MISMATCH" }
        );
    }
    Ok(all_matched)
}

fn inspect(path: &Path) -> CliResult<bool> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {e}", path.display()))?;
    let document: serde_json::Value = serde_json::from_str(&contents)?;

    let report = rxsentinel_verify::verify_case_document(&document);
    if report.passed() {
        println!("document: ok ({})", report.schema_id);
    } else {
        for violation in &report.violations {
            println!(
                "document: [{}] {} {}",
                violation.severity, violation.rule_id, violation.message
            );
        }
    }

    let chain_ok = match serde_json::from_value::<CaseResult>(document) {
        Ok(case) => match rxsentinel_audit::verify_chain(case.case_id.as_str(), &case.audit_trail) {
            Ok(()) => {
                println!("audit chain: ok ({} entries)", case.audit_trail.len());
                true
            }
            Err(violation) => {
                println!("audit chain: BROKEN ({violation:?})");
                false
            }
        },
        Err(e) => {
            println!("audit chain: not checked ({e})");
            false
        }
    };

    Ok(report.passed() && chain_ok)
}

async fn history(dir: PathBuf) -> CliResult<bool> {
    let records = JsonFileRecordStore::new(dir)?.list().await?;
    if records.is_empty() {
        println!("no cases stored");
        return Ok(true);
    }
    println!(
        "{:<38} {:<13} {:>6} {:>5} {:>5}  prescriber / patient",
        "case", "decision", "conf", "crit", "warn"
    );
    for CaseRecord {
        case_id,
        approval_status,
        confidence_score,
        critical_alerts,
        warning_alerts,
        prescriber,
        patient,
    } in records
    {
        println!(
            "{:<38} {:<13} {:>6.2} {:>5} {:>5}  {} / {}",
            case_id.as_str(),
            approval_status.as_str(),
            confidence_score,
            critical_alerts,
            warning_alerts,
            prescriber.as_deref().unwrap_or("-"),
            patient.as_deref().unwrap_or("-"),
        );
    }
    Ok(true)
}

// ── Report ────────────────────────────────────────────────────────────────────

fn print_report(case: &CaseResult) {
    println!("case {}", case.case_id);
    println!(
        "decision: {}  confidence: {:.2}",
        case.approval_status, case.confidence_score
    );

    if !case.check_results.is_empty() {
        println!();
        for kind in CheckKind::ALL {
            match case.check_results.get(&kind) {
                Some(result) => println!(
                    "  {:<32} {:<12} {:.2}",
                    kind.label(),
                    status_label(result.status),
                    result.confidence
                ),
                None => println!("  {:<32} {:<12}", kind.label(), "missing"),
            }
        }
    }

    if !case.alerts.is_empty() {
        println!();
        for alert in &case.alerts {
            let source = alert.source_check.map_or("pipeline", |k| k.label());
            println!("  [{}] {}: {}", alert.severity, source, alert.message);
        }
    }

    println!();
    println!("{}", case.case_summary);
    println!("audit trail: {} entries", case.audit_trail.len());
}

fn status_label(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warning => "WARNING",
        CheckStatus::Inconclusive => "INCONCLUSIVE",
    }
}
