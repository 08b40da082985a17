//! Wires storage, surface host, engine and console into one view.

use std::fmt::Write as _;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;

use ambience_console::{spawn_console_thread, ConsoleCommand, ConsoleReply};
use ambience_core::{Catalog, CatalogKind, GeneratorRegistry, ParticleInstance};
use ambience_engine::{AmbientEngine, ConfigEditor, ConfigRepository};
use ambience_host::{FileStore, HeadlessHost, SharedStorage, TerminalHost};
use ambience_platform::{ConfigStore, Result, SurfaceHost, Viewport};
use tracing::{info, warn};

use crate::config::{AppConfig, StoreKind, SurfaceKind};

/// The surface host picked by configuration.
pub enum AppHost {
    Headless(HeadlessHost),
    Terminal(TerminalHost),
}

impl AppHost {
    fn inner(&mut self) -> &mut dyn SurfaceHost {
        match self {
            AppHost::Headless(host) => host,
            AppHost::Terminal(host) => host,
        }
    }
}

impl SurfaceHost for AppHost {
    fn attach(&mut self) -> Result<Viewport> {
        self.inner().attach()
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.inner().set_visible(visible)
    }

    fn present(&mut self, frame: &[ParticleInstance]) -> Result<()> {
        self.inner().present(frame)
    }

    fn detach(&mut self) -> Result<()> {
        self.inner().detach()
    }
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn ConfigStore>> {
    let store: Arc<dyn ConfigStore> = match config.store.kind {
        StoreKind::Memory => Arc::new(SharedStorage::new().open_view()),
        StoreKind::File => {
            info!(dir = %config.store.dir.display(), "using file store");
            Arc::new(FileStore::open(&config.store.dir)?)
        }
    };
    Ok(store)
}

fn open_host(config: &AppConfig) -> AppHost {
    let surface = config.surface;
    match surface.kind {
        SurfaceKind::Headless => AppHost::Headless(HeadlessHost::new(Viewport {
            width: surface.width,
            height: surface.height,
        })),
        SurfaceKind::Terminal => {
            AppHost::Terminal(TerminalHost::stdout(surface.width, surface.height))
        }
    }
}

fn repository(config: &AppConfig, store: Arc<dyn ConfigStore>) -> Result<ConfigRepository> {
    let mut repo = ConfigRepository::new(store);
    let tables = [
        (CatalogKind::Effects, &config.effects_catalog),
        (CatalogKind::Backgrounds, &config.backgrounds_catalog),
    ];
    for (kind, path) in tables {
        if let Some(path) = path {
            let source = std::fs::read_to_string(path)?;
            let catalog = Catalog::from_toml_str(kind, &source)?;
            info!(catalog = %kind, entries = catalog.entries().len(), "loaded catalog table");
            repo = repo.with_catalog(catalog);
        }
    }
    Ok(repo)
}

/// Runs the view until the console quits.
pub fn run(config: AppConfig) -> Result<()> {
    let store = open_store(&config)?;
    let repo = repository(&config, store)?;
    let registry = Arc::new(GeneratorRegistry::builtin());
    let mut engine =
        AmbientEngine::with_repository(repo, open_host(&config), registry, config.engine_config());
    engine.start()?;
    let editor = engine.editor();

    let console = spawn_console_thread(BufReader::new(std::io::stdin()), std::io::stderr());
    let tick = config.tick();
    info!(tick_ms = tick.as_millis() as u64, "view running, type `help` for commands");

    let mut last = Instant::now();
    'main: loop {
        while let Ok(command) = console.command_receiver.try_recv() {
            if command == ConsoleCommand::Quit {
                break 'main;
            }
            let reply = handle_command(&engine, &editor, command);
            if console.reply_sender.send(ConsoleReply::Print(reply)).is_err() {
                warn!("console closed");
                break 'main;
            }
        }

        let now = Instant::now();
        engine.pump(now - last);
        last = now;
        std::thread::sleep(tick);
    }

    engine.stop();
    info!("view stopped");
    Ok(())
}

fn handle_command(
    engine: &AmbientEngine<AppHost>,
    editor: &ConfigEditor,
    command: ConsoleCommand,
) -> String {
    let outcome = match command {
        ConsoleCommand::List(kind) => return list(editor.repository(), kind),
        ConsoleCommand::Status => return status(engine),
        ConsoleCommand::Enable(kind, id) => editor
            .set_active(kind, &id, true)
            .map(|_| format!("enabled {kind} {id}")),
        ConsoleCommand::Disable(kind, id) => editor
            .set_active(kind, &id, false)
            .map(|_| format!("disabled {kind} {id}")),
        ConsoleCommand::DisableAll => editor
            .disable_all()
            .map(|count| format!("disabled {count} entries")),
        ConsoleCommand::Set {
            catalog,
            id,
            field,
            value,
        } => editor
            .set_field(catalog, &id, &field, &value)
            .map(|_| format!("{catalog} {id}: {field} = {value}")),
        ConsoleCommand::Reset(kind, id) => {
            editor.reset(kind, &id).map(|_| format!("reset {kind} {id}"))
        }
        ConsoleCommand::Pause => editor.set_playing(false).map(|_| "paused".to_string()),
        ConsoleCommand::Play => editor.set_playing(true).map(|_| "playing".to_string()),
        ConsoleCommand::Mute => editor.set_muted(true).map(|_| "muted".to_string()),
        ConsoleCommand::Unmute => editor.set_muted(false).map(|_| "unmuted".to_string()),
        ConsoleCommand::Volume(volume) => editor
            .set_volume(volume)
            .map(|flags| format!("volume {:.2}", flags.volume)),
        ConsoleCommand::Help | ConsoleCommand::Quit => return String::new(),
    };
    outcome.unwrap_or_else(|err| format!("error: {err}"))
}

fn list(repo: &ConfigRepository, kind: Option<CatalogKind>) -> String {
    let kinds = match kind {
        Some(kind) => vec![kind],
        None => CatalogKind::ALL.to_vec(),
    };
    let mut out = String::new();
    for kind in kinds {
        let state = match repo.read_catalog(kind) {
            Ok(state) => state,
            Err(err) => return format!("error: {err}"),
        };
        let _ = writeln!(out, "{kind}s:");
        for entry in repo.catalog(kind).entries() {
            let active = state.get(&entry.id).is_some_and(|params| params.is_active);
            let mark = if active { '*' } else { ' ' };
            let _ = writeln!(out, " {mark} {:<16} {:<18} {:?}", entry.id, entry.name, entry.category);
        }
    }
    out.trim_end().to_string()
}

fn status(engine: &AmbientEngine<AppHost>) -> String {
    let playback = engine.playback();
    let manager = engine.manager();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "playback: {} (volume {:.2}{}), policy {:?}",
        if playback.playing { "playing" } else { "paused" },
        playback.volume,
        if playback.muted { ", muted" } else { "" },
        manager.pause_policy()
    );
    let particles = manager.surface().map_or(0, |surface| surface.element_count());
    let _ = writeln!(
        out,
        "running: {} instances, {} particles, {} timers",
        manager.running_count(),
        particles,
        manager.scheduler().pending()
    );
    for key in engine.running() {
        let _ = writeln!(out, "  {key}");
    }
    for cue in engine.audio_cues() {
        let _ = writeln!(out, "  audio {} at {:.2}", cue.key, cue.gain);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> AmbientEngine<AppHost> {
        let config = AppConfig {
            seed: Some(3),
            ..AppConfig::default()
        };
        let store = open_store(&config).unwrap();
        let repo = repository(&config, store).unwrap();
        let mut engine = AmbientEngine::with_repository(
            repo,
            open_host(&config),
            Arc::new(GeneratorRegistry::builtin()),
            config.engine_config(),
        );
        engine.start().unwrap();
        engine
    }

    #[test]
    fn console_commands_drive_the_engine() {
        let mut engine = engine();
        let editor = engine.editor();

        let reply = handle_command(
            &engine,
            &editor,
            ConsoleCommand::Enable(CatalogKind::Effects, "rain".into()),
        );
        assert_eq!(reply, "enabled effect rain");
        engine.pump(Duration::from_millis(100));
        assert!(status(&engine).contains("effect:rain"));
        assert!(list(editor.repository(), Some(CatalogKind::Effects)).contains("* rain"));

        let reply = handle_command(&engine, &editor, ConsoleCommand::DisableAll);
        assert_eq!(reply, "disabled 1 entries");
        engine.pump(Duration::from_millis(100));
        assert!(engine.running().is_empty());

        let reply = handle_command(&engine, &editor, ConsoleCommand::Pause);
        assert_eq!(reply, "paused");
        engine.pump(Duration::from_millis(100));
        assert!(status(&engine).starts_with("playback: paused"));
    }

    #[test]
    fn failed_commands_reply_with_the_error() {
        let engine = engine();
        let editor = engine.editor();
        let reply = handle_command(
            &engine,
            &editor,
            ConsoleCommand::Enable(CatalogKind::Effects, "volcano".into()),
        );
        assert!(reply.starts_with("error:"));
        let reply = handle_command(
            &engine,
            &editor,
            ConsoleCommand::Set {
                catalog: CatalogKind::Effects,
                id: "rain".into(),
                field: "size".into(),
                value: "huge".into(),
            },
        );
        assert!(reply.starts_with("error:"));
    }
}
