use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use feedcast::config::{self, Config};
use feedcast::device::{self, DeviceStore};
use feedcast::item::SettingsUpdate;
use feedcast::source::{HttpSource, ItemSource};

#[derive(Parser)]
#[command(
    name = "feedcast",
    version = env!("FEEDCAST_LONG_VERSION"),
    about = "A one-at-a-time paper feed with narrated summaries"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Feed service base URL (e.g. http://127.0.0.1:8000/api)
    #[arg(long, global = true)]
    server: Option<String>,

    /// User id on the feed service
    #[arg(long, global = true)]
    user: Option<u64>,

    /// Browse without playing audio
    #[arg(long, global = true)]
    no_audio: bool,

    /// Log output file path (enables logging in the viewer)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// List saved bookmarks
    Bookmarks,
    /// Search papers
    Search {
        /// Search terms
        query: String,
    },
    /// Show or change generation settings
    Settings {
        /// Narration voice number
        #[arg(long)]
        voice: Option<u32>,

        /// Extra instructions for summary generation
        #[arg(long)]
        prompt: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        let file = match std::fs::File::create(log_path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        };
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if cli.command.is_some() {
        env_logger::init();
    }
    // viewer mode + no --log → logger not initialized (the terminal is in raw mode)

    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(&config::CliOverrides {
        server: cli.server,
        user: cli.user,
        no_audio: cli.no_audio,
    });
    let config = cfg.resolve();

    let result = match cli.command {
        Some(Command::Bookmarks) => open_device()
            .and_then(|d| cmd_bookmarks(&config, &d)),
        Some(Command::Search { query }) => open_device()
            .and_then(|d| cmd_search(&config, &d, &query)),
        Some(Command::Settings { voice, prompt }) => open_device().and_then(|d| {
            cmd_settings(
                &config,
                &d,
                SettingsUpdate {
                    character_voice: voice,
                    additional_prompt: prompt,
                },
            )
        }),
        None => open_device().and_then(|mut d| cmd_view(&config, &mut d)),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn open_device() -> Result<DeviceStore> {
    let path = device::device_path().context("cannot locate a state directory (HOME unset?)")?;
    DeviceStore::open(&path)
}

fn http_source(config: &Config, device: &DeviceStore) -> HttpSource {
    HttpSource::new(
        &config.server.base_url,
        config.server.timeout,
        device.device_id(),
        config.server.voice_type,
    )
}

fn cmd_view(config: &Config, device: &mut DeviceStore) -> Result<()> {
    let source: Arc<dyn ItemSource> = Arc::new(http_source(config, device));
    if !config.playback_enabled {
        return feedcast::viewer::run(config, source, feedcast::audio::SilentOutput::new(), device);
    }

    #[cfg(feature = "audio")]
    match feedcast::audio::RodioOutput::open() {
        Ok(output) => return feedcast::viewer::run(config, source, output, device),
        Err(e) => warn!("audio unavailable, continuing silently: {e:#}"),
    }
    #[cfg(not(feature = "audio"))]
    warn!("built without the `audio` feature; playback is silent");

    feedcast::viewer::run(config, source, feedcast::audio::SilentOutput::new(), device)
}

fn cmd_bookmarks(config: &Config, device: &DeviceStore) -> Result<()> {
    let source = http_source(config, device);
    let bookmarks = source
        .fetch_bookmarks(config.server.user_id)
        .context("failed to fetch bookmarks")?;
    info!("cmd_bookmarks: {} bookmarks", bookmarks.len());
    if bookmarks.is_empty() {
        eprintln!("no bookmarks yet");
        return Ok(());
    }
    for b in &bookmarks {
        println!("{}", b.title);
        if !b.author.is_empty() {
            println!("  {}", b.author);
        }
        if !b.url.is_empty() {
            println!("  {}", b.url);
        }
        if !b.saved_at.is_empty() {
            println!("  saved {}", b.saved_at);
        }
    }
    Ok(())
}

fn cmd_search(config: &Config, device: &DeviceStore, query: &str) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        anyhow::bail!("search query is empty");
    }
    let source = http_source(config, device);
    let items = source
        .search_items(query)
        .with_context(|| format!("search for {query:?} failed"))?;
    eprintln!("{} result(s) for {query:?}:", items.len());
    for item in &items {
        let mark = if item.bookmarked { "★" } else { " " };
        println!("{mark} {}", item.title);
        let authors = item.author_line();
        if !authors.is_empty() {
            println!("  {authors}");
        }
        if !item.external_url.is_empty() {
            println!("  {}", item.external_url);
        }
    }
    Ok(())
}

fn cmd_settings(config: &Config, device: &DeviceStore, update: SettingsUpdate) -> Result<()> {
    let source = http_source(config, device);
    let user = config.server.user_id;
    let settings = if update.is_empty() {
        source.fetch_settings(user).context("failed to fetch settings")?
    } else {
        info!("cmd_settings: updating {update:?}");
        source
            .update_settings(user, &update)
            .context("failed to update settings")?
    };
    match settings.character_voice {
        Some(v) => println!("voice:  {v}"),
        None => println!("voice:  (default)"),
    }
    match settings.additional_prompt.as_deref() {
        Some(p) if !p.is_empty() => println!("prompt: {p}"),
        _ => println!("prompt: (none)"),
    }
    Ok(())
}
