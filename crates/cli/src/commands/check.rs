use std::path::PathBuf;
use vpnscope_core::{
    config::{AppConfig, SourceKind},
    key::Key,
    metrics::MetricsCollector,
    runtime::VpnScopeRuntime,
    source::SourceOutcome,
    verdict::{AlgorithmMethod, Verdict},
};

use super::utils::{init_logging, print_error, print_warning, CliError, CliResult};

pub struct CheckOptions {
    pub keys: Vec<String>,
    pub config: Option<PathBuf>,
    pub algorithm: Option<AlgorithmMethod>,
    pub json: bool,
    pub metrics: bool,
}

fn load_config(path: Option<&PathBuf>) -> CliResult<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| CliError::Config(e.to_string()))
}

/// Drops `plugin` entries: the command line has no host to supply them.
fn offline_sources(config: &mut AppConfig) {
    config.sources.retain(|source| {
        let keep = source.kind != SourceKind::Plugin;
        if !keep {
            print_warning(&format!("Skipping plugin source {}: not available offline", source.name));
        }
        keep
    });
}

pub async fn check_keys(options: CheckOptions) -> CliResult<()> {
    let mut config = load_config(options.config.as_ref())?;
    init_logging(&config.logging);
    offline_sources(&mut config);
    if config.sources.is_empty() {
        print_warning("No sources configured; every verdict will be unverified");
    }

    let metrics =
        if options.metrics { MetricsCollector::with_prometheus() } else { MetricsCollector::new() };
    let runtime = VpnScopeRuntime::builder().with_config(config).with_metrics(metrics).build()?;

    let mut verdicts = Vec::with_capacity(options.keys.len());
    let mut invalid = 0usize;
    for raw in &options.keys {
        let key: Key = match raw.parse() {
            Ok(key) => key,
            Err(e) => {
                print_error(&format!("{raw}: {e}"));
                invalid += 1;
                continue;
            }
        };

        let orchestrator = runtime.orchestrator();
        let verdict = match options.algorithm {
            Some(AlgorithmMethod::Consensus) => orchestrator.check_consensus(&key).await,
            Some(AlgorithmMethod::Cascade) => orchestrator.check_cascade(&key).await,
            None => orchestrator.check(&key).await,
        };
        if !options.json {
            print_verdict(&verdict);
        }
        verdicts.push(verdict);
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&verdicts)?);
    }

    if options.metrics {
        if let Some(rendered) = runtime.metrics().render() {
            println!("{rendered}");
        }
    }

    runtime.shutdown();

    if invalid > 0 {
        return Err(CliError::Check(format!("{invalid} invalid key(s)")));
    }
    Ok(())
}

fn outcome_label(outcome: &SourceOutcome) -> String {
    match outcome {
        SourceOutcome::Positive => "positive".to_string(),
        SourceOutcome::Negative => "negative".to_string(),
        SourceOutcome::Failed { reason, hard: true } => format!("failed (hard): {reason}"),
        SourceOutcome::Failed { reason, hard: false } => format!("failed: {reason}"),
        SourceOutcome::TimedOut => "timed out".to_string(),
    }
}

pub fn format_verdict(verdict: &Verdict) -> String {
    let status = if !verdict.is_verified() {
        "UNVERIFIED"
    } else if verdict.flagged {
        "FLAGGED"
    } else {
        "CLEAN"
    };

    let mut out = format!(
        "{}: {status} ({}, confidence {:.2}, {}/{} positive{})",
        verdict.key,
        verdict.algorithm,
        verdict.confidence,
        verdict.positive_count(),
        verdict.contributing_count(),
        if verdict.from_cache { ", cached" } else { "" },
    );
    for result in &verdict.results {
        out.push_str(&format!(
            "\n  {}: {} ({}ms)",
            result.source,
            outcome_label(&result.outcome),
            result.elapsed_ms
        ));
    }
    out
}

fn print_verdict(verdict: &Verdict) {
    println!("{}", format_verdict(verdict));
}
