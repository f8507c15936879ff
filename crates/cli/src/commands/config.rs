use clap::Subcommand;
use std::path::Path;
use vpnscope_core::config::{AppConfig, SourceKind};

use super::utils::{print_error, print_info, print_success, print_warning, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show the effective configuration (file plus environment overrides)
    Show {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file } => show_config(&file),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
    }
}

pub const SAMPLE_CONFIG: &str = r#"# vpnscope configuration
# Every value below is optional; omitted values use the compiled defaults.
# Any scalar can be overridden with VPNSCOPE__SECTION__FIELD environment variables.

environment = "development"

[logging]
level = "info"
format = "pretty"

[orchestrator]
source_timeout_ms = 5000
check_ceiling_ms = 10000
max_concurrent_dispatches = 4
dedup_inflight = true

[verdict]
# "consensus" or "cascade"
algorithm = "consensus"
min_consensus = 0.6
cascade_sequential = false

[cache]
enabled = true
ttl_seconds = 3600
max_entries = 10000

[health]
# "cooldown" skips a source for cooldown_seconds after a hard failure;
# "disable" excludes it until it is re-enabled.
hard_failure_policy = "cooldown"
cooldown_seconds = 300

[quota]
reset_interval_seconds = 86400

[analytics]
batch_ceiling_seconds = 40
max_concurrent_checks = 4

# Offline list of known VPN exits and leaked accounts, one IP or UUID per line.
[[sources]]
name = "local"
kind = "blocklist"
path = "config/blocklist.txt"

# Sources implemented by the host application are configured by name.
# [[sources]]
# name = "teoh"
# kind = "plugin"
# daily_quota = 1000
# max_concurrency = 2
"#;

fn load(file: &str) -> CliResult<AppConfig> {
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

fn enabled_label(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = load(file)?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    for source in &config.sources {
        if let (SourceKind::Blocklist, Some(path)) = (source.kind, &source.path) {
            if !path.exists() {
                print_warning(&format!(
                    "Blocklist for source {} not found: {}",
                    source.name,
                    path.display()
                ));
            }
        }
    }

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Environment: {}", config.environment);
    println!(
        "  Verdict: {} (min consensus {})",
        config.verdict.algorithm, config.verdict.min_consensus
    );
    println!("  Sources: {}", config.sources.len());
    println!("  Cache: {}", enabled_label(config.cache.enabled));

    Ok(())
}

fn show_config(file: &str) -> CliResult<()> {
    let config = load(file)?;

    println!("Configuration from {file}:");
    println!("  Environment: {}", config.environment);

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    println!("\n[Orchestrator]");
    println!("  Source Timeout: {}ms", config.orchestrator.source_timeout_ms);
    println!("  Check Ceiling: {}ms", config.orchestrator.check_ceiling_ms);
    println!("  Max Concurrent Dispatches: {}", config.orchestrator.max_concurrent_dispatches);
    println!("  In-flight De-duplication: {}", enabled_label(config.orchestrator.dedup_inflight));

    println!("\n[Verdict]");
    println!("  Algorithm: {}", config.verdict.algorithm);
    println!("  Min Consensus: {}", config.verdict.min_consensus);
    println!("  Sequential Cascade: {}", config.verdict.cascade_sequential);

    println!("\n[Cache]");
    println!("  Enabled: {}", config.cache.enabled);
    println!("  TTL: {}s", config.cache.ttl_seconds);
    println!("  Max Entries: {}", config.cache.max_entries);

    println!("\n[Health]");
    println!("  Hard Failure Policy: {:?}", config.health.hard_failure_policy);
    println!("  Cooldown: {}s", config.health.cooldown_seconds);

    println!("\n[Quota]");
    println!("  Reset Interval: {}s", config.quota.reset_interval_seconds);

    println!("\n[Analytics]");
    println!("  Batch Ceiling: {}s", config.analytics.batch_ceiling_seconds);
    println!("  Max Concurrent Checks: {}", config.analytics.max_concurrent_checks);

    println!("\n[Sources] ({} configured)", config.sources.len());
    for source in &config.sources {
        let kind = match source.kind {
            SourceKind::Blocklist => "blocklist",
            SourceKind::Plugin => "plugin",
        };
        println!("  {} ({kind}, {})", source.name, enabled_label(source.enabled));
        if let Some(path) = &source.path {
            println!("    Path: {}", path.display());
        }
        if let Some(quota) = source.daily_quota {
            println!("    Daily Quota: {quota}");
        }
        if let Some(max_concurrency) = source.max_concurrency {
            println!("    Max Concurrency: {max_concurrency}");
        }
    }

    Ok(())
}

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Remember to:");
    print_info("  1. Create the blocklist file referenced by the `local` source");
    print_info("  2. Add `plugin` entries for sources your host application supplies");

    Ok(())
}
