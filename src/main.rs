use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use field_session::audio::default_playback_device;
use field_session::{
    allowed_import_extensions, format_clock, AudioLibraryManager, AudioRoute, AudioSource, CaptureEngine, Config,
    FocusSession, JsonSettingsStore, JsonlSessionHistory, LibraryStore, PlaybackDevice, QualityTier, SessionGoal,
    SessionHistory, SessionStats, SettingsStore, SoundCategory, SystemAudioRoute, TimerState, TrimRequest, Trimmer,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "field")]
#[command(about = "Focus timer with ambience, goal chimes and a recordable sound library")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/field")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List ambience and chime options for the current quality tier
    Library,

    /// Show or change the quality tier
    Quality {
        /// lossless or compressed
        tier: Option<QualityTier>,
    },

    /// Record into the RAW partition
    Record {
        /// Duration to record in seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,

        /// Replay this file instead of the microphone
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Trim a recording or imported file into the library
    Trim {
        source: PathBuf,

        /// Range start in seconds
        #[arg(long, default_value = "0")]
        start: f64,

        /// Range end in seconds (default: end of source)
        #[arg(long)]
        end: Option<f64>,

        /// Library name (default: FIELD_<timestamp>)
        #[arg(long)]
        name: Option<String>,

        /// Add as a chime instead of an ambience
        #[arg(long)]
        chime: bool,
    },

    /// Run a focus session until the goal or Ctrl+C
    Timer {
        /// Goal in minutes, 0 for open-ended (default from config)
        #[arg(short, long)]
        minutes: Option<u64>,
    },

    /// Totals over the session history
    Stats,
}

struct App {
    config: Config,
    store: LibraryStore,
    settings: Arc<dyn SettingsStore>,
    route: Arc<dyn AudioRoute>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let store = LibraryStore::new(config.storage.root_path());
        store.setup()?;
        let settings: Arc<dyn SettingsStore> = Arc::new(JsonSettingsStore::new(config.storage.settings_path()));

        Ok(Self {
            config,
            store,
            settings,
            route: Arc::new(SystemAudioRoute),
        })
    }

    fn history(&self) -> Arc<dyn SessionHistory> {
        Arc::new(JsonlSessionHistory::new(self.config.storage.history_path()))
    }

    async fn library(&self, device: Arc<dyn PlaybackDevice>) -> Result<Arc<AudioLibraryManager>> {
        let manager = AudioLibraryManager::new(
            self.store.clone(),
            self.config.storage.bundled_path(),
            Arc::clone(&self.settings),
            device,
            Arc::clone(&self.route),
        )
        .await?;
        Ok(Arc::new(manager))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("Failed to load configuration")?;
    let app = App::new(config)?;

    info!("Library root: {}", app.store.root().display());

    match cli.command {
        Command::Library => list_library(&app).await,
        Command::Quality { tier } => quality(&app, tier).await,
        Command::Record { seconds, input } => record(&app, seconds, input).await,
        Command::Trim {
            source,
            start,
            end,
            name,
            chime,
        } => trim(&app, source, start, end, name, chime).await,
        Command::Timer { minutes } => timer(&app, minutes).await,
        Command::Stats => stats(&app).await,
    }
}

async fn list_library(app: &App) -> Result<()> {
    let library = app.library(default_playback_device()?).await?;
    let snapshot = library.snapshot();

    println!("Quality: {}", snapshot.tier);
    for category in SoundCategory::ALL {
        let selected = snapshot.selected(category);
        println!("\n{} (selected: {})", category, selected.name);
        for option in snapshot.options(category) {
            let marker = if option == selected { "*" } else { " " };
            println!(" {} {:<24} {}", marker, option.name, option.source.describe());
        }
    }
    Ok(())
}

async fn quality(app: &App, tier: Option<QualityTier>) -> Result<()> {
    match tier {
        Some(tier) => {
            let library = app.library(default_playback_device()?).await?;
            library.set_quality_tier(tier).await?;
            let snapshot = library.snapshot();
            println!(
                "Quality set to {}: {} ambience, {} chime options",
                tier,
                snapshot.ambience_options.len(),
                snapshot.chime_options.len()
            );
        }
        None => {
            let tier = app.settings.load_quality_tier().await?;
            println!("Quality: {}", tier);
            println!("Importable: {}", allowed_import_extensions(tier).join(", "));
        }
    }
    Ok(())
}

async fn record(app: &App, seconds: u64, input: Option<PathBuf>) -> Result<()> {
    let source = match input {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };

    let engine = CaptureEngine::new(
        app.store.clone(),
        Arc::clone(&app.settings),
        Arc::clone(&app.route),
        Arc::new(app.config.encoders()),
        source,
        app.config.capture_config(),
    );

    let target = engine.start_recording().await?;
    info!("Recording to {} for {} seconds", target.display(), seconds);

    let mut status_rx = engine.subscribe();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                print!("\r{}  {:>7.1} dB", format_clock(status.elapsed), status.level_db);
                std::io::Write::flush(&mut std::io::stdout()).ok();
            }
        }
    }
    println!();

    match engine.stop_recording().await? {
        Some(take) => println!(
            "Saved {} ({:.1}s, {})",
            take.path.display(),
            take.duration.as_secs_f64(),
            take.tier
        ),
        None => warn!("Nothing was recorded"),
    }
    Ok(())
}

async fn trim(
    app: &App,
    source: PathBuf,
    start: f64,
    end: Option<f64>,
    name: Option<String>,
    chime: bool,
) -> Result<()> {
    let device = default_playback_device()?;
    let library = app.library(Arc::clone(&device)).await?;
    let trimmer = Trimmer::new(library, Arc::new(app.config.encoders()), device, Arc::clone(&app.route));

    let info = trimmer.probe(&source).await?;
    let start = Duration::try_from_secs_f64(start).context("Invalid start")?;
    let end = match end {
        Some(end) => Duration::try_from_secs_f64(end).context("Invalid end")?,
        None => info.duration,
    };

    let request = TrimRequest::new(
        source,
        start,
        end,
        name.unwrap_or_else(|| TrimRequest::default_name(Utc::now())),
        if chime { SoundCategory::Chime } else { SoundCategory::Ambience },
    );

    let outcome = trimmer.trim(request).await?;
    println!(
        "Added {} \"{}\" ({:.2}s, {}) at {}",
        if chime { "chime" } else { "ambience" },
        outcome.option.name,
        outcome.duration.as_secs_f64(),
        outcome.tier,
        outcome.path.display()
    );
    Ok(())
}

async fn timer(app: &App, minutes: Option<u64>) -> Result<()> {
    let library = app.library(default_playback_device()?).await?;
    let session = FocusSession::new(
        app.config.session_config(),
        Arc::new(field_session::timer::SystemClock),
        Arc::clone(&library),
        app.history(),
    );
    if let Some(minutes) = minutes {
        session.set_goal(SessionGoal::from_minutes(minutes)).await;
    }

    let mut snapshot_rx = session.subscribe();
    session.start().await;

    let mut last_second = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Interrupted");
                break;
            }
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshot_rx.borrow_and_update().clone();
                let shown = snapshot.remaining.unwrap_or(snapshot.elapsed);
                if last_second != Some(shown.as_secs()) {
                    last_second = Some(shown.as_secs());
                    print!("\r{}", format_clock(shown));
                    std::io::Write::flush(&mut std::io::stdout()).ok();
                }
                if snapshot.state == TimerState::Finished {
                    println!();
                    // Let the chime ring out
                    while library.is_chime_playing().await {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                    break;
                }
            }
        }
    }

    if let Some(recorded) = session.stop().await? {
        info!("Session recorded: {}", format_clock(recorded));
    }
    Ok(())
}

async fn stats(app: &App) -> Result<()> {
    let sessions = app.history().sessions().await?;
    let stats = SessionStats::from_sessions(&sessions);

    println!("Sessions: {}", stats.total_sessions);
    println!("Total: {:.1} minutes", stats.total_minutes());
    println!("Longest: {}", format_clock(Duration::from_secs_f64(stats.longest_session_secs)));
    for day in &stats.daily {
        println!(
            "  {}  {:>3} sessions  {:>6.1} min",
            day.date,
            day.sessions,
            day.duration_secs / 60.0
        );
    }
    Ok(())
}
