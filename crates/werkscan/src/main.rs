//! Werkscan diagnostic launcher.
//!
//! Standalone utilities for exercising the scan engine against scripted
//! environments: capability probe reports, device listings, and full
//! scenario replay with the session event trace.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;
use werkscan_engine::capability::pick_rear_device;
use werkscan_engine::strategy;
use werkscan_engine::{EventSink, ScanConfig, Scanner, SessionEvent, SessionOutcome};
use werkscan_testkit::{CallbackRecorder, Scenario};

mod logging;

#[derive(Parser, Debug)]
#[command(name = "werkscan", about = "Diagnostic harness for the werkscan engine")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the capability report and viable strategy chain for a scenario
    Probe {
        /// Scenario JSON file; defaults to a bare environment
        scenario: Option<PathBuf>,
    },
    /// List the cameras a scenario enumerates and the selection bias
    Devices {
        /// Scenario JSON file
        scenario: PathBuf,
    },
    /// Replay a scenario through the engine and report the terminal outcome.
    /// Exit code: 0 detected, 1 failed, 2 closed without a result.
    Replay {
        /// Scenario JSON file
        scenario: PathBuf,
        /// Close the session after this many seconds without settlement
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
        /// Scan config overrides (toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Emit the event trace and outcome as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Probe { scenario } => {
            let scenario = load_scenario_or_default(scenario.as_deref())?;
            probe(&scenario);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Devices { scenario } => {
            let scenario = Scenario::from_path(&scenario)?;
            devices(&scenario);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Replay {
            scenario,
            timeout_secs,
            config,
            json,
        } => {
            let scenario = Scenario::from_path(&scenario)?;
            let overrides = config.as_deref().map(load_config_override).transpose()?;
            replay(scenario, overrides, timeout_secs, json).await
        }
    }
}

fn load_scenario_or_default(path: Option<&Path>) -> Result<Scenario> {
    match path {
        Some(path) => Scenario::from_path(path),
        None => Ok(Scenario::default()),
    }
}

fn load_config_override(path: &Path) -> Result<ScanConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn probe(scenario: &Scenario) {
    let caps = scenario.capabilities;
    println!("Capabilities:");
    println!("  secure_context:         {}", caps.secure_context);
    println!("  has_media_stream:       {}", caps.has_media_stream);
    println!("  has_native_decoder:     {}", caps.has_native_decoder);
    println!("  has_enumerate_devices:  {}", caps.has_enumerate_devices);
    println!("  live capture:           {}", caps.supports_live_capture());

    let viable = strategy::select(strategy::chain(), &caps);
    let chain: Vec<&str> = viable.iter().map(|s| s.id().as_str()).collect();
    println!("Strategy chain: {}", chain.join(" -> "));
}

fn devices(scenario: &Scenario) {
    if scenario.devices.is_empty() {
        println!("No cameras enumerated; a generic facing request would be used.");
        return;
    }
    let preferred = pick_rear_device(&scenario.devices).map(|d| d.id.clone());
    println!("{:<20} {:<28} {:<8} {}", "ID", "LABEL", "FACING", "");
    for device in &scenario.devices {
        let marker = if preferred.as_deref() == Some(device.id.as_str()) {
            "<- preferred"
        } else {
            ""
        };
        println!(
            "{:<20} {:<28} {:<8} {}",
            device.id, device.label, device.facing, marker
        );
    }
}

async fn replay(
    scenario: Scenario,
    overrides: Option<ScanConfig>,
    timeout_secs: u64,
    json: bool,
) -> Result<ExitCode> {
    let rig = scenario.build();
    let config = overrides.unwrap_or_else(|| rig.config.clone());
    let scanner = Scanner::new(rig.platform.clone(), rig.fetch.clone(), config);
    let recorder = CallbackRecorder::new();
    let sink = if json {
        EventSink::new(|event| {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{}", line);
            }
        })
    } else {
        EventSink::new(|event| println!("{}", render_event(event)))
    };

    let handle = scanner
        .open_scan_with_events(recorder.callbacks(), sink)
        .await;
    let outcome = match tokio::time::timeout(Duration::from_secs(timeout_secs), handle.join()).await
    {
        Ok(Some(outcome)) => outcome,
        Ok(None) => SessionOutcome::Closed,
        Err(_) => {
            warn!(timeout_secs, "scenario did not settle; closing the session");
            handle.shutdown().await;
            SessionOutcome::Closed
        }
    };

    if json {
        println!("{}", render_outcome_json(&outcome));
    } else {
        println!("{}", render_outcome(&outcome));
    }
    Ok(match outcome {
        SessionOutcome::Detected(_) => ExitCode::SUCCESS,
        SessionOutcome::Failed(_) => ExitCode::from(1),
        SessionOutcome::Closed => ExitCode::from(2),
    })
}

fn render_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Probed { capabilities } => format!(
            "probed: media_stream={} native_decoder={} enumerate={}",
            capabilities.has_media_stream,
            capabilities.has_native_decoder,
            capabilities.has_enumerate_devices
        ),
        SessionEvent::StrategySelected { strategy } => format!("strategy: {}", strategy),
        SessionEvent::Streaming { strategy } => format!("streaming: {}", strategy),
        SessionEvent::SuppressedError { strategy, message } => {
            format!("suppressed ({}): {}", strategy, message)
        }
        SessionEvent::FallingBack { strategy, kind } => {
            format!("falling back from {} ({})", strategy, kind)
        }
        SessionEvent::AttemptError { error } => format!("attempt error: {}", error),
    }
}

fn render_outcome(outcome: &SessionOutcome) -> String {
    match outcome {
        SessionOutcome::Detected(result) => {
            format!("DETECTED {} (via {})", result.value, result.source)
        }
        SessionOutcome::Failed(error) => format!("FAILED {}: {}", error.kind, error.message),
        SessionOutcome::Closed => "CLOSED without a result".to_string(),
    }
}

fn render_outcome_json(outcome: &SessionOutcome) -> String {
    let value = match outcome {
        SessionOutcome::Detected(result) => serde_json::json!({
            "outcome": "detected",
            "value": result.value,
            "source": result.source,
        }),
        SessionOutcome::Failed(error) => serde_json::json!({
            "outcome": "failed",
            "kind": error.kind,
            "message": error.message,
            "strategy": error.strategy,
        }),
        SessionOutcome::Closed => serde_json::json!({ "outcome": "closed" }),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use werkscan_engine::{Capabilities, ErrorKind, ScanError, ScanResult, Strategy};

    #[test]
    fn config_override_parses_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fps = 24\nframe_error_tolerance = 3").unwrap();
        file.flush().unwrap();

        let config = load_config_override(file.path()).unwrap();
        assert_eq!(config.fps, 24);
        assert_eq!(config.frame_error_tolerance, 3);
        assert_eq!(config.scan_box, Some(250));
    }

    #[test]
    fn outcome_rendering_covers_all_arms() {
        let detected = SessionOutcome::Detected(ScanResult {
            value: "CH-1".to_string(),
            source: Strategy::FileFallback,
        });
        assert!(render_outcome(&detected).contains("CH-1"));
        assert!(render_outcome_json(&detected).contains("\"detected\""));

        let failed = SessionOutcome::Failed(ScanError::new(
            ErrorKind::PermissionDenied,
            "denied",
            Strategy::NativeDetector,
        ));
        assert!(render_outcome(&failed).contains("permission_denied"));
        assert!(render_outcome_json(&SessionOutcome::Closed).contains("closed"));
    }

    #[test]
    fn default_probe_scenario_is_file_fallback_only() {
        let scenario = load_scenario_or_default(None).unwrap();
        assert_eq!(scenario.capabilities, Capabilities::default());
        let viable = strategy::select(strategy::chain(), &scenario.capabilities);
        assert_eq!(viable.len(), 1);
    }
}
