//! lamco-input-pipeline
//!
//! Entry point for the pipeline binary. Without a subcommand the service runs
//! until Ctrl-C, reading nothing but timer fires and logging every launch;
//! `replay` drives it from a recorded script and `check` validates the
//! configuration documents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_input_pipeline::config::{load_exclude_keys, AbilityLaunchConfig, Config};
use lamco_input_pipeline::dispatch::{LoggingDispatcher, RecordingDispatcher};
use lamco_input_pipeline::key_command::ExcludeKey;
use lamco_input_pipeline::replay::{parse_script, ScriptRunner};
use lamco_input_pipeline::service::{spawn_service, InputService, ServiceOutput};
use lamco_input_pipeline::timer::ManualTimerService;

/// Command-line arguments for lamco-input-pipeline
#[derive(Parser, Debug)]
#[command(name = "lamco-input-pipeline")]
#[command(version, about = "Input event conditioning pipeline", long_about = None)]
pub struct Args {
    /// Service configuration file path
    #[arg(short, long, env = "LAMCO_INPUT_CONFIG", default_value = "/etc/lamco-input/config.toml")]
    pub config: String,

    /// Ability launch configuration (overrides the service configuration)
    #[arg(short, long, env = "LAMCO_INPUT_ABILITIES")]
    pub abilities: Option<PathBuf>,

    /// Exclude-keys configuration (overrides the service configuration)
    #[arg(short, long)]
    pub exclude_keys: Option<PathBuf>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a JSON Lines event script on a virtual clock
    Replay {
        /// Script path
        script: PathBuf,
    },
    /// Validate the configuration documents and print a summary
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config).or_else(|e| {
        eprintln!("Failed to load config: {e:#}, using defaults");
        Ok::<_, anyhow::Error>(Config::default_config())
    })?;

    let _log_guard = init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-input-pipeline v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {}", env!("BUILD_DATE"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");
    debug!("Config: {:?}", config);

    let abilities_path = args.abilities.clone().or_else(|| config.service.ability_config.clone());
    let exclude_path = args
        .exclude_keys
        .clone()
        .or_else(|| config.service.exclude_keys_config.clone());

    match &args.command {
        Some(Command::Check) => check(&config, abilities_path.as_deref(), exclude_path.as_deref()),
        Some(Command::Replay { script }) => replay(
            &config,
            abilities_path.as_deref(),
            exclude_path.as_deref(),
            script,
        ),
        None => run(&config, abilities_path.as_deref(), exclude_path.as_deref()).await,
    }
}

fn load_abilities(path: Option<&Path>) -> lamco_input_pipeline::Result<AbilityLaunchConfig> {
    match path {
        Some(path) => AbilityLaunchConfig::load(path),
        None => Err(lamco_input_pipeline::InputError::ConfigEmpty(
            "no ability launch configuration given".to_string(),
        )),
    }
}

fn load_excludes(path: Option<&Path>) -> Vec<ExcludeKey> {
    let Some(path) = path else {
        return Vec::new();
    };
    load_exclude_keys(path).unwrap_or_else(|e| {
        warn!("Ignoring exclude keys: {}", e);
        Vec::new()
    })
}

fn check(config: &Config, abilities: Option<&Path>, excludes: Option<&Path>) -> Result<()> {
    config.validate().context("Service configuration is invalid")?;
    println!("service configuration: ok");

    if let Some(path) = abilities {
        let launch = AbilityLaunchConfig::load(path)
            .with_context(|| format!("Ability configuration {} is invalid", path.display()))?;
        let gestures = &launch.gestures;
        println!("abilities: {}", path.display());
        println!("  shortcuts:   {}", launch.patterns.shortcuts.len());
        println!("  sequences:   {}", launch.patterns.sequences.len());
        println!("  repeat keys: {}", launch.patterns.repeat_keys.len());
        println!(
            "  gestures:    single_knuckle={} double_knuckle={} two_finger={} three_finger_tap={}",
            gestures.single_knuckle.is_some(),
            gestures.double_knuckle.is_some(),
            gestures.two_finger.is_some(),
            gestures.three_finger_tap.is_some()
        );
        let ids = launch.business_ids();
        if !ids.is_empty() {
            println!("  business ids: {}", ids.join(", "));
        }
    }

    if let Some(path) = excludes {
        let keys = load_exclude_keys(path)
            .with_context(|| format!("Exclude-keys configuration {} is invalid", path.display()))?;
        println!("exclude keys: {}", keys.len());
    }

    Ok(())
}

fn replay(
    config: &Config,
    abilities: Option<&Path>,
    excludes: Option<&Path>,
    script: &Path,
) -> Result<()> {
    let content = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read script: {}", script.display()))?;
    let records = parse_script(&content)?;
    info!("Replaying {} records from {}", records.len(), script.display());

    let dispatcher = Arc::new(RecordingDispatcher::new());
    let mut service = InputService::new(
        config,
        ManualTimerService::with_capacity(config.service.timer_capacity),
        dispatcher.clone(),
    );
    service.load_abilities(load_abilities(abilities), load_excludes(excludes));

    let report = ScriptRunner::new(service, dispatcher).run(&records);

    for launch in &report.launches {
        println!(
            "launch  {:<16} {}/{} delay={}ms",
            launch.source.to_string(),
            launch.ability.bundle_name,
            launch.ability.ability_name,
            launch.delay_ms
        );
    }
    for output in &report.outputs {
        match output {
            ServiceOutput::Key(event) => println!(
                "key     {:>10}us code={} {}",
                event.action_time, event.key_code, event.action
            ),
            ServiceOutput::Touch(event) => println!(
                "touch   {:>10}us pointer={} ({:.2}, {:.2}) {:?}",
                event.action_time, event.pointer_id, event.display_x, event.display_y, event.kind
            ),
            ServiceOutput::Pointer(event) => println!(
                "pointer {:>10}us pointer={} {:?}",
                event.action_time, event.pointer_id, event.action
            ),
        }
    }

    let stats = &report.stats;
    println!(
        "records={} late={} launches={} outputs={} timer_fires={}",
        report.records,
        report.late_records,
        report.launches.len(),
        report.outputs.len(),
        stats.timer_fires
    );
    Ok(())
}

async fn run(config: &Config, abilities: Option<&Path>, excludes: Option<&Path>) -> Result<()> {
    let (out_tx, mut out_rx) = mpsc::channel(config.service.event_queue_capacity.max(1));
    let handle = spawn_service(
        config,
        load_abilities(abilities),
        load_excludes(excludes),
        Arc::new(LoggingDispatcher),
        out_tx,
    );

    let drain = tokio::spawn(async move {
        while let Some(output) = out_rx.recv().await {
            debug!("Downstream: {:?}", output);
        }
    });

    info!("Input service running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let stats = handle.shutdown().await?;
    drain.await.context("Output drain task failed")?;
    let key_launches = stats.key_command.shortcut_launches
        + stats.key_command.sequence_launches
        + stats.key_command.repeat_launches;
    info!(
        "Input service stopped after {} events ({} key launches)",
        stats.events, key_launches
    );
    Ok(())
}

fn init_logging(
    args: &Args,
    config: &Config,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_input_pipeline={level},lamco_input_pipeline::resample=info,warn",
            level = log_level
        ))
    });

    // Rolling file from the configuration, else an explicit --log-file
    let (file_writer, guard) = match (&config.logging.log_dir, &args.log_file) {
        (Some(dir), _) => {
            let appender = tracing_appender::rolling::daily(dir, "lamco-input-pipeline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        (None, Some(path)) => {
            let file = File::create(path).with_context(|| format!("Failed to create {path}"))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        (None, None) => (None, None),
    };

    match (args.log_format.as_str(), file_writer) {
        ("json", Some(writer)) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout))
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init(),
        ("compact", Some(writer)) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stdout))
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init(),
        (_, Some(writer)) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stdout))
            .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
            .init(),
        ("json", None) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        ("compact", None) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        (_, None) => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }

    Ok(guard)
}
