use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use taskblame::{
    cli::{BlameArgs, Cli, Command, HeatArgs, PollingArgs},
    config::Config,
    heat::{self, HeatReport, Window},
    ingest::{load_task_trace, now_micros, parse_time_arg},
    polling::{self, PollingChecker},
    report::BlameReport,
    time_attribution::AttributionError,
};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn time_arg(raw: Option<&str>, flag: &str) -> Result<Option<i64>> {
    raw.map(|value| {
        parse_time_arg(value).with_context(|| {
            format!(
                "Invalid value for --{}: '{}' (expected seconds since epoch or 'YYYY-MM-DD HH:MM:SS')",
                flag, value
            )
        })
    })
    .transpose()
}

fn run_blame(args: BlameArgs, config: &Config) -> Result<()> {
    let now = time_arg(args.now.as_deref(), "now")?.unwrap_or_else(now_micros);
    let selection = args.metric.unwrap_or(config.blame.metric);

    let loaded = load_task_trace(&args.export_dir, &config.export, &args.uuid)?;
    let attribution = match loaded.trace.attribute(now) {
        Ok(attribution) => attribution,
        Err(e @ AttributionError::NothingToAttribute { .. }) => {
            println!("{}", e);
            return Ok(());
        }
    };

    let report = BlameReport {
        task_id: &attribution.task_id,
        metrics: &attribution.metrics,
        selection,
        blamed_seconds: attribution.blamed_seconds(),
    };
    println!("{}", report.render(args.format)?.trim_end());
    Ok(())
}

fn run_heat(args: HeatArgs, config: &Config) -> Result<()> {
    let now = time_arg(args.now.as_deref(), "now")?.unwrap_or_else(now_micros);
    let window = Window::new(
        time_arg(args.from.as_deref(), "from")?,
        time_arg(args.to.as_deref(), "to")?,
        now,
    );
    if window.from > window.to {
        anyhow::bail!("--from must not be after --to");
    }
    let limit = args.items_limit.unwrap_or(config.heat.items_limit);
    if limit == 0 {
        anyhow::bail!("Invalid value for --items-limit: 0 (must be >= 1)");
    }

    let (steps, dropped) = heat::load_steps(&args.steps_file, window, now)?;
    let report = HeatReport::build(&steps, window.to);
    print!("{}", report.summary(limit));

    let output = args.output.unwrap_or_else(|| {
        let mut name = args.steps_file.clone().into_os_string();
        name.push(".worker_load.csv");
        PathBuf::from(name)
    });
    std::fs::write(&output, report.to_csv())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Load timeline of {} steps ({} unusable rows skipped) written to {}",
        steps.len(),
        dropped,
        output.display()
    );
    Ok(())
}

fn run_polling(args: PollingArgs, config: &Config) -> Result<()> {
    let mut polling_config = config.polling.clone();
    if let Some(secs) = args.rounding_error {
        polling_config.rounding_error_secs = secs;
    }

    let multiplier = match args.multiplier {
        Some(m) if m > 0 => m,
        _ => {
            let settings = args.path.join(polling::SETTINGS_TABLE);
            if settings.is_file() {
                polling::read_multiplier(&settings)?.unwrap_or(1)
            } else {
                1
            }
        }
    };
    let max_delay = PollingChecker::max_delay(&polling_config, multiplier);
    tracing::info!(multiplier, max_delay, "polling limits");
    let checker = PollingChecker::new(max_delay)?;

    let files = polling::log_files(&args.path);
    if files.is_empty() {
        anyhow::bail!("No known log file found under {}", args.path.display());
    }
    for file in files {
        println!("Processing file {}", file.display());
        for gap in checker.check_file(&file)? {
            println!("{}", gap);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = Config::load(args.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");

    match args.command {
        Command::Blame(blame) => run_blame(blame, &config),
        Command::Heat(heat) => run_heat(heat, &config),
        Command::Polling(polling) => run_polling(polling, &config),
    }
}
