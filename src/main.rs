//! Sensor MIDI mapper
//!
//! Reads JSON-lines sensor frames and control commands (stdin or a file),
//! maps them to MIDI on every display tick and autosaves the mapping preset.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sensor_midi_mapper::command::{self, CommandEffect, InputLine};
use sensor_midi_mapper::config::{AppConfig, PresetWatcher};
use sensor_midi_mapper::paths::AppPaths;
use sensor_midi_mapper::preset::persistence::{load_from_file, PresetSaver, PresetSaverHandle};
use sensor_midi_mapper::preset::{self, ImportedPreset};
use sensor_midi_mapper::transport::{LogTransport, MidiTransport, MidirTransport};
use sensor_midi_mapper::{DeviceRegistry, MapperApp, SensorKey};

/// How often the output port list is re-checked for hot-plugging
const PORT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Sensor MIDI Mapper - turn Hitloop sensor frames into MIDI CC and notes
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the data directory)
    #[arg(short, long, env = "MAPPER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// MIDI output port (overrides config and preset)
    #[arg(short, long, env = "MIDI_OUTPUT")]
    output: Option<String>,

    /// JSON-lines input file (stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Preset file (overrides config)
    #[arg(long)]
    preset: Option<PathBuf>,

    /// Log MIDI instead of opening an output port
    #[arg(long)]
    dry_run: bool,

    /// List available MIDI output ports
    #[arg(long)]
    list_ports: bool,

    /// Validate a preset file and print a summary
    #[arg(long, value_name = "FILE")]
    check_preset: Option<PathBuf>,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let paths = AppPaths::detect();
    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());

    info!("Starting sensor MIDI mapper v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", config_path.display());

    if args.init_config {
        paths.ensure_directories()?;
        AppConfig::default().save(&config_path).await?;
        info!("Default configuration written to {}", config_path.display());
        return Ok(());
    }

    if let Some(path) = &args.check_preset {
        return check_preset(path).await;
    }

    let mut config = AppConfig::load_or_default(&config_path).await?;
    if let Some(output) = &args.output {
        config.midi.output_port = Some(output.clone());
    }
    if let Some(input) = &args.input {
        config.input.path = Some(input.clone());
    }
    if let Some(preset) = &args.preset {
        config.preset.path = Some(preset.clone());
    }
    config.validate().context("Invalid configuration after CLI overrides")?;

    if args.list_ports {
        return list_ports(&config.midi.client_name);
    }

    let preset_path = config.preset.path.clone().unwrap_or_else(|| paths.preset.clone());
    run(config, preset_path, args.dry_run).await?;

    info!("Sensor MIDI mapper shutdown complete");
    Ok(())
}

/// Output side of the binary: a real port or the dry-run logger
enum Output {
    Midi(MidirTransport),
    Log(LogTransport),
}

impl Output {
    fn transport(&self) -> &dyn MidiTransport {
        match self {
            Output::Midi(midi) => midi,
            Output::Log(log) => log,
        }
    }

    /// Open `wanted` and record the outcome on the app
    fn select(&self, app: &mut MapperApp, wanted: Option<String>) {
        match self {
            Output::Log(_) => {
                app.select_output(wanted);
            }
            Output::Midi(midi) => match midi.select_output(wanted.as_deref()) {
                Ok(port) => {
                    app.select_output(port.map(|p| p.id));
                }
                Err(e) => {
                    // Keep the choice so it is retried when the port appears
                    warn!("Failed to open MIDI output: {}", e);
                    app.select_output(wanted);
                }
            },
        }
    }

    /// Clear a vanished port, reopen the wanted one when it comes back
    fn refresh(&self, app: &MapperApp) {
        let Output::Midi(midi) = self else {
            return;
        };
        if let Err(e) = midi.refresh() {
            debug!("MIDI port refresh failed: {}", e);
            return;
        }
        let wanted = app.selected_output_id();
        if wanted.is_some() && midi.selected_output_id().is_none() {
            if let Err(e) = midi.select_output(wanted) {
                debug!("MIDI output still unavailable: {}", e);
            }
        }
    }
}

async fn run(config: AppConfig, preset_path: PathBuf, dry_run: bool) -> Result<()> {
    let mut app = MapperApp::new(Duration::from_millis(config.engine.debounce_ms));

    match load_from_file(&preset_path).await {
        Ok(Some(imported)) => {
            app.reload_preset(imported);
        }
        Ok(None) => info!("No preset at {}, starting empty", preset_path.display()),
        Err(e) => warn!("Ignoring unreadable preset: {:#}", e),
    }

    let output = if dry_run {
        info!("Dry run: MIDI is logged, not sent");
        Output::Log(LogTransport)
    } else {
        Output::Midi(MidirTransport::new(config.midi.client_name.clone()))
    };
    let wanted = config
        .midi
        .output_port
        .clone()
        .or_else(|| app.selected_output_id().map(str::to_string));
    output.select(&mut app, wanted);

    let saver = config
        .preset
        .autosave
        .then(|| PresetSaver::spawn(&preset_path, config.preset.autosave_debounce_ms));

    let mut watcher = if config.preset.watch {
        match PresetWatcher::new(&preset_path) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("Preset hot reload disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let mut lines = open_input(config.input.path.as_deref()).await?.lines();
    let mut input_open = true;

    let mut registry = DeviceRegistry::new();
    let device_timeout = Duration::from_millis(config.engine.device_timeout_ms);

    let mut tick = tokio::time::interval(config.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut port_refresh = tokio::time::interval(PORT_REFRESH_INTERVAL);
    port_refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(
        "Mapping at {} Hz (edit debounce {} ms)",
        config.engine.tick_hz, config.engine.debounce_ms
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = Instant::now();
                if !device_timeout.is_zero() {
                    registry.prune_stale(now, device_timeout);
                }
                app.tick(&registry, output.transport(), now);
                autosave(&mut app, saver.as_ref()).await;
            }

            line = lines.next_line(), if input_open => {
                match line {
                    Ok(Some(line)) => handle_line(&mut app, &mut registry, &output, &line).await,
                    Ok(None) => {
                        info!("Input closed; devices will time out");
                        input_open = false;
                    }
                    Err(e) => {
                        error!("Input read failed: {}", e);
                        input_open = false;
                    }
                }
            }

            Some(imported) = next_reload(&mut watcher) => {
                if app.reload_preset(imported) {
                    info!("Preset reloaded from {}", preset_path.display());
                    let wanted = app.selected_output_id().map(str::to_string);
                    output.select(&mut app, wanted);
                    // Reload is not a local edit; do not write it back
                    app.take_dirty();
                }
            }

            _ = port_refresh.tick() => {
                output.refresh(&app);
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping mapper");
                break;
            }
        }
    }

    app.shutdown(output.transport());
    if let Some(saver) = &saver {
        if app.take_dirty() {
            if let Err(e) = saver.save(app.preset()).await {
                warn!("Final preset save not queued: {:#}", e);
            }
        }
        if let Err(e) = saver.flush().await {
            warn!("Final preset flush failed: {:#}", e);
        }
        saver.shutdown();
    }

    Ok(())
}

async fn handle_line(
    app: &mut MapperApp,
    registry: &mut DeviceRegistry,
    output: &Output,
    line: &str,
) {
    let now = Instant::now();
    let parsed = match command::parse_line(line) {
        Ok(Some(parsed)) => parsed,
        Ok(None) => return,
        Err(e) => {
            warn!("Skipping input line: {}", e);
            return;
        }
    };

    let command = match parsed {
        InputLine::Frame(frame) => {
            registry.upsert(frame, now);
            return;
        }
        InputLine::Command(command) => command,
    };

    match command.apply(app, now) {
        CommandEffect::Done | CommandEffect::Edited(_) => {}
        CommandEffect::SelectOutput(wanted) => output.select(app, wanted),
        CommandEffect::Import(path) => match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                if app.import_preset(&json).is_ok() {
                    let wanted = app.selected_output_id().map(str::to_string);
                    output.select(app, wanted);
                }
            }
            Err(e) => error!("Failed to read preset {}: {}", path.display(), e),
        },
        CommandEffect::Export(path) => {
            let result = match app.export_preset() {
                Ok(json) => tokio::fs::write(&path, json).await.map_err(anyhow::Error::from),
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => info!("Preset exported to {}", path.display()),
                Err(e) => error!("Preset export to {} failed: {:#}", path.display(), e),
            }
        }
    }
}

async fn autosave(app: &mut MapperApp, saver: Option<&PresetSaverHandle>) {
    let Some(saver) = saver else {
        return;
    };
    if app.take_dirty() {
        if let Err(e) = saver.save(app.preset()).await {
            warn!("Preset autosave not queued: {:#}", e);
        }
    }
}

async fn next_reload(watcher: &mut Option<PresetWatcher>) -> Option<ImportedPreset> {
    match watcher {
        Some(w) => w.next_preset().await,
        None => std::future::pending().await,
    }
}

async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            info!("Reading sensor frames from {}", path.display());
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            info!("Reading sensor frames from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

fn list_ports(client_name: &str) -> Result<()> {
    let outputs = MidirTransport::new(client_name)
        .list_outputs()
        .context("Failed to enumerate MIDI outputs")?;

    println!("\n=== MIDI Output Ports ===");
    if outputs.is_empty() {
        println!("  (none)");
    }
    for (i, port) in outputs.iter().enumerate() {
        println!("  [{}] {}", i, port.name);
    }
    Ok(())
}

async fn check_preset(path: &Path) -> Result<()> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read preset file: {}", path.display()))?;
    let imported = preset::import_json(&json)
        .with_context(|| format!("Invalid preset file: {}", path.display()))?;

    println!("\n=== Preset {} ===", path.display());
    println!(
        "  Output: {}",
        imported.selected_output_id.as_deref().unwrap_or("(none)")
    );
    for (device_id, mappings) in imported.store.iter() {
        let enabled: Vec<&str> = mappings
            .enabled_keys()
            .into_iter()
            .map(|k: SensorKey| k.as_str())
            .collect();
        println!("  {}: enabled [{}]", device_id, enabled.join(", "));
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
