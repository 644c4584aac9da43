use clap::Parser;
use humanize_bytes::humanize_bytes_binary;
use indicatif::{ProgressBar, ProgressStyle};
use mimalloc::MiMalloc;
use rampr_core::{
    DEFAULT_LOGIN_URL, LoginScenario, RunConfig, RunReport, RunSummary, StatsSnapshot,
    run_iterations, run_load_test,
};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

mod cli;

/// Exit status when any threshold is crossed.
const THRESHOLDS_FAILED_EXIT: u8 = 99;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            match tracing_subscriber::EnvFilter::try_from_default_env() {
                Ok(filter) => filter,
                Err(_) => tracing_subscriber::EnvFilter::new("info"),
            },
        )
        .init();

    let args = cli::Args::parse();

    if args.once {
        let snapshot = run_iterations(&LoginScenario::default(), 1).await?;
        print_checks(&snapshot);
        return Ok(ExitCode::SUCCESS);
    }

    let config = match &args.options {
        Some(path) => {
            info!("Loading options from {}", path.display());
            RunConfig::from_yaml_file(path)?
        }
        None => RunConfig::default(),
    };
    let total = config.total_duration();

    if args.output == cli::OutputFormat::Text {
        println!("Running {:.0}s ramp @ {}", total.as_secs_f64(), DEFAULT_LOGIN_URL);
        for (idx, stage) in config.stages.iter().enumerate() {
            println!(
                "  stage {}: {:?} -> {} VUs",
                idx + 1,
                stage.duration,
                stage.target
            );
        }
        for threshold in &config.thresholds {
            println!("  threshold {}", threshold);
        }
    }

    let pb = if args.output == cli::OutputFormat::Text && !args.no_progress {
        let pb = ProgressBar::new(total.as_secs().max(1));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}]",
            )?
            .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let pb_clone = pb.clone();
    let mut last_requests = 0;
    let mut last_elapsed = Duration::ZERO;

    let report = run_load_test(
        config,
        Arc::new(LoginScenario::default()),
        Some(move |p: StatsSnapshot| {
            let interval_secs = (p.elapsed.saturating_sub(last_elapsed)).as_secs_f64();
            let current_rps = if interval_secs > 0.0 {
                (p.total_requests - last_requests) as f64 / interval_secs
            } else {
                0.0
            };
            last_requests = p.total_requests;
            last_elapsed = p.elapsed;

            if let Some(pb) = &pb_clone {
                pb.set_position(p.elapsed.as_secs());
                pb.set_message(format!(
                    "VUs: {} | Iters: {} | RPS: {:.0} | Recv: {}",
                    p.active_vus,
                    p.iterations,
                    current_rps,
                    humanize_bytes_binary!(p.total_bytes_received),
                ));
            }
        }),
    )
    .await?;

    if let Some(pb) = pb {
        pb.finish_with_message("Done!");
    }

    match args.output {
        cli::OutputFormat::Text => print_report(&report),
        cli::OutputFormat::Json => {
            println!("{}", serde_json::to_string(&RunSummary::from_report(&report))?);
        }
    }
    std::io::stdout().flush().ok();

    if report.thresholds_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(THRESHOLDS_FAILED_EXIT))
    }
}

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

fn fmt_ms(ms: f64) -> String {
    if ms >= 1_000.0 {
        format!("{:.2}s", ms / 1_000.0)
    } else if ms >= 1.0 {
        format!("{:.2}ms", ms)
    } else {
        format!("{:.2}us", ms * 1_000.0)
    }
}

fn print_checks(snapshot: &StatsSnapshot) {
    for check in &snapshot.checks {
        println!(
            "  {} {:<20} {:>6.2}%  ✓ {} ✗ {}",
            mark(check.fails == 0),
            check.name,
            check.pass_rate() * 100.0,
            check.passes,
            check.fails
        );
    }
}

fn print_report(report: &RunReport) {
    let summary = RunSummary::from_report(report);
    let lat = &summary.http_req_duration;

    println!();
    print_checks(&report.snapshot);
    println!();
    println!(
        "  http_req_duration   avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
        fmt_ms(lat.avg),
        fmt_ms(lat.min),
        fmt_ms(lat.med),
        fmt_ms(lat.max),
        fmt_ms(lat.p90),
        fmt_ms(lat.p95),
        fmt_ms(lat.p99)
    );
    println!(
        "  http_req_failed     {:.2}%",
        summary.http_req_failed_rate * 100.0
    );
    println!(
        "  http_reqs           {} ({:.2}/s)",
        summary.http_reqs,
        summary.http_reqs as f64 / summary.duration_secs.max(f64::EPSILON)
    );
    println!("  iterations          {}", summary.iterations);
    println!(
        "  data_received       {}",
        humanize_bytes_binary!(summary.data_received_bytes)
    );

    if !summary.status_counts.is_empty() {
        println!();
        println!("  Status breakdown");
        for (status, count) in &summary.status_counts {
            println!("    {}: {}", status, count);
        }
    }

    if !summary.errors.is_empty() {
        println!();
        println!("  Errors");
        for (err, count) in &summary.errors {
            println!("    {} - {}", err, count);
        }
    }

    if !summary.thresholds.is_empty() {
        println!();
        println!("  Thresholds");
        for t in &summary.thresholds {
            let observed = t
                .observed
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "n/a".to_owned());
            println!(
                "    {} {}: {} (observed {})",
                mark(t.passed),
                t.metric,
                t.expression,
                observed
            );
        }
    }
}
