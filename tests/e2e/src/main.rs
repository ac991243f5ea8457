//! End-to-End Test Runner for the log hub

use anyhow::Result;
use clap::Parser;
use loghub_e2e_tests::{
    framework::{TestConfig, TestFramework},
    scenarios::{RelayRestartTest, SinkToViewerTest},
    TestResult,
};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Test scenario to run
    #[arg(short, long, default_value = "all")]
    scenario: String,

    /// Test timeout in seconds
    #[arg(short, long, default_value_t = 120)]
    timeout: u64,

    /// Output results to file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Events emitted by the sink_to_viewer scenario
    #[arg(long, default_value_t = 20)]
    events: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("loghub_e2e_tests={}", log_level).parse()?)
                .add_directive(format!("message_sink={}", log_level).parse()?)
                .add_directive(format!("relay_core={}", log_level).parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting log hub E2E suite");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let framework = TestFramework::new(TestConfig {
        timeout_secs: args.timeout,
        verbose: args.verbose,
        ..TestConfig::default()
    })?;

    let sink_to_viewer = SinkToViewerTest {
        events: args.events,
        ..SinkToViewerTest::default()
    };

    let results = match args.scenario.as_str() {
        "sink" | "sink_to_viewer" => vec![framework.run_scenario(sink_to_viewer).await?],
        "restart" | "relay_restart" => {
            vec![framework.run_scenario(RelayRestartTest::default()).await?]
        }
        "all" => vec![
            framework.run_scenario(sink_to_viewer).await?,
            framework.run_scenario(RelayRestartTest::default()).await?,
        ],
        _ => {
            error!("Unknown test scenario: {}", args.scenario);
            return Ok(());
        }
    };

    print_results_summary(&results);

    if let Some(output_path) = args.output {
        save_results_to_file(&results, &output_path).await?;
        info!("Results saved to: {}", output_path.display());
    }

    if !results.iter().all(|r| r.success) {
        error!("Some tests failed");
        std::process::exit(1);
    }

    info!("All tests passed");
    Ok(())
}

fn print_results_summary(results: &[TestResult]) {
    println!("\n═══════════════════════════════════════");
    println!("        TEST RESULTS SUMMARY");
    println!("═══════════════════════════════════════");

    let passed = results.iter().filter(|r| r.success).count();
    println!("Total Tests: {}", results.len());
    println!("Passed:      {} ✓", passed);
    println!("Failed:      {} ✗", results.len() - passed);
    println!();

    for result in results {
        let status = if result.success { "✓ PASS" } else { "✗ FAIL" };
        println!(
            "{} {} ({} ms)",
            status,
            result.scenario_name,
            result.duration.as_millis()
        );

        if let Some(ref error) = result.error_message {
            println!("      Error: {}", error);
        }

        println!(
            "      Emitted: {} | Received: {} in {} batches | Connect attempts: {}",
            result.metrics.events_emitted,
            result.metrics.messages_received,
            result.metrics.batches_received,
            result.metrics.connect_attempts
        );
        println!();
    }

    println!("═══════════════════════════════════════");
}

async fn save_results_to_file(results: &[TestResult], path: &PathBuf) -> Result<()> {
    let json_output = serde_json::json!({
        "test_run": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "total_tests": results.len(),
            "passed_tests": results.iter().filter(|r| r.success).count(),
            "failed_tests": results.iter().filter(|r| !r.success).count(),
        },
        "results": results
    });

    tokio::fs::write(path, serde_json::to_string_pretty(&json_output)?).await?;
    Ok(())
}
