mod action;
mod app;
mod components;
mod core;
mod mpv;
mod theme;
mod widgets;

use std::path::PathBuf;

use clap::Parser;
use player_proto::catalog::Catalog;
use player_proto::config::Config;
use player_proto::platform;

/// Terminal music player driving mpv over its IPC socket.
#[derive(Parser, Debug)]
#[command(name = "musicplayer", version, about)]
struct Args {
    /// Directory of playable files.
    #[arg(long, env = "SONGS_DIR")]
    songs_dir: Option<PathBuf>,

    /// Home directory for config, session and log.
    #[arg(long, env = "MUSICPLAYER_HOME")]
    home: Option<PathBuf>,

    /// Draw in place instead of on the alternate screen.
    #[arg(long)]
    tmux: bool,

    /// Start fresh instead of resuming the last session.
    #[arg(long)]
    no_restore: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let home = args.home.clone().unwrap_or_else(platform::default_home);

    let data_dir = platform::data_dir(&home);
    std::fs::create_dir_all(&data_dir)?;
    let log_path = platform::log_file(&home);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,player_tui=debug,player_proto=debug".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so the operator can tail it immediately.
    eprintln!("musicplayer log: {}", log_path.display());
    tracing::info!("musicplayer starting…");

    // ── Config + catalog ─────────────────────────────────────────────────────
    let mut config = Config::load_or_default(&home);
    if let Some(dir) = args.songs_dir {
        config.paths.songs_dir = dir;
    }
    let songs_dir = config.paths.songs_dir.clone();
    let mut catalog = Catalog::scan(&songs_dir)?;
    if catalog.is_empty() {
        anyhow::bail!("No songs found in {}/", songs_dir.display());
    }
    let playlists_dir = config.playlists_dir(&home);
    catalog.load_playlists(&playlists_dir);
    tracing::info!(
        "catalog: {} track(s) in {}, {} playlist(s)",
        catalog.len(),
        songs_dir.display(),
        catalog.playlist_count()
    );

    let mut core = core::PlayerCore::new(
        catalog,
        &config,
        playlists_dir,
        platform::session_file(&home),
    );

    // ── Terminal safety net ──────────────────────────────────────────────────
    let tmux = args.tmux;
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        app::restore_terminal(tmux);
        default_hook(info);
    }));

    // Before anything can start an engine.
    let mut signals = app::ShutdownSignals::register()?;

    // ── Resume last session ──────────────────────────────────────────────────
    if !args.no_restore {
        let record = core.load_session();
        tracing::debug!("session: loaded {:?} from {}", record, core.store_path().display());
        if let Some(name) = app::resume(&mut core, &record, &mut signals).await {
            tracing::info!("musicplayer exiting on {} during startup", name);
            return Ok(());
        }
    }

    app::App::new(core, signals, tmux, config.controls.tick_ms).run().await
}
