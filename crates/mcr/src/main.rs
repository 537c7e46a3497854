//! mcr - macrocorder CLI
//!
//! Record pointer/keyboard macros and play them back.
//!
//! Supported: macOS, Windows, Linux (X11)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, never, select, Receiver};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use macrocorder_core::input::{normalize_key, normalize_key_name};
use macrocorder_core::prelude::*;
use macrocorder_core::{ScreenHost, ScreenLookup};
use macrocorder_recorder::prelude::*;

/// How often the main thread services display queries while recording
const PUMP_INTERVAL: Duration = Duration::from_millis(10);
/// Raw events buffered for the hotkey watcher
const HOTKEY_QUEUE: usize = 1024;

#[derive(Parser)]
#[command(name = "mcr")]
#[command(about = "macrocorder - record and replay pointer/keyboard macros")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Debug logging. RUST_LOG overrides.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Config file (default: <config dir>/macrocorder/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record until the record hotkey or Ctrl+C
    Record {
        #[arg(short, long, default_value = "macro")]
        name: String,
        /// Write here instead of the macro directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Play a saved macro
    Play {
        file: String,
        /// Time divisor (2.0 plays twice as fast)
        #[arg(short, long)]
        speed: Option<f64>,
        /// Passes; 0 loops until stopped
        #[arg(short, long)]
        repeat: Option<u32>,
        /// Start the first pass at this action index
        #[arg(long, default_value = "0")]
        from: usize,
        /// Seconds to wait before starting
        #[arg(long, default_value = "2")]
        delay: u64,
    },
    /// List saved macros
    List,
    /// Show macro contents
    Show {
        file: String,
        #[arg(long)]
        all: bool,
    },
    /// Delete a macro
    Delete {
        file: String,
    },
    /// Print the effective configuration
    Config {
        /// Write the defaults to the config file if it does not exist
        #[arg(long)]
        init: bool,
    },
}

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

struct Ctx {
    json: bool,
    config: AppConfig,
    config_path: Option<PathBuf>,
}

impl Ctx {
    /// Progress text; suppressed in JSON mode
    fn status(&self, msg: impl AsRef<str>) {
        if !self.json {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn done<T: Serialize>(&self, data: T, human: impl FnOnce(&T)) {
        if self.json {
            print_json(&Output::ok(data));
        } else {
            human(&data);
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json;
    let result = load_config(cli.config).and_then(|ctx| {
        let ctx = Ctx { json, ..ctx };
        match cli.command {
            Commands::Record { name, output } => record(&ctx, &name, output.as_deref()),
            Commands::Play { file, speed, repeat, from, delay } => play(&ctx, &file, speed, repeat, from, delay),
            Commands::List => list(&ctx),
            Commands::Show { file, all } => show(&ctx, &file, all),
            Commands::Delete { file } => delete(&ctx, &file),
            Commands::Config { init } => config(&ctx, init),
        }
    });

    if let Err(e) = result {
        if json {
            let err = e
                .downcast_ref::<Error>()
                .cloned()
                .unwrap_or_else(|| Error::new(ErrorCode::Unknown, e.to_string()));
            print_json(&Output::<()>::err(err));
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn load_config(path: Option<PathBuf>) -> Result<Ctx> {
    let (config, config_path) = match path {
        Some(p) => {
            let config = AppConfig::load(&p).unwrap_or_else(|e| {
                warn!(path = %p.display(), error = %e, "ignoring unreadable config");
                AppConfig::default()
            });
            (config, Some(p))
        }
        None => (AppConfig::load_or_default(), AppConfig::default_path()),
    };
    Ok(Ctx { json: false, config, config_path })
}

/// Fires once per Ctrl+C
fn interrupt_channel() -> Result<Receiver<()>> {
    let (tx, rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("installing Ctrl+C handler")?;
    Ok(rx)
}

fn is_hotkey(ev: &Stamped<RawEvent>, hotkey: &str) -> bool {
    match &ev.event {
        RawEvent::KeyRelease(k) => normalize_key(k).is_ok_and(|name| name == hotkey),
        _ => false,
    }
}

// ── Recording ───────────────────────────────────────────────────────────────

fn record(ctx: &Ctx, name: &str, output: Option<&Path>) -> Result<()> {
    let store = MacroStore::new().context("opening macro directory")?;
    let source = Arc::new(RdevSource::new());

    // Monitor enumeration must run on this thread; the capture thread asks
    // through the bridge and the loop below answers.
    let mut host: Option<ScreenHost<MonitorQuery>> = None;
    let screens: Arc<dyn ScreenLookup> = match &ctx.config.screens {
        Some(layout) => Arc::new(layout.clone()),
        None => {
            let (resolver, h) = ScreenResolver::bridge(MonitorQuery::new());
            host = Some(h);
            Arc::new(resolver)
        }
    };

    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let recorder = Recorder::new(
        ctx.config.recorder.clone(),
        ctx.config.ignore_keys(),
        source.clone(),
        screens,
    )
    .on_action(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let hotkey = normalize_key_name(&ctx.config.hotkeys.record_toggle)?;
    let (keys_tx, keys_rx) = bounded(HOTKEY_QUEUE);
    let _hotkeys = source.subscribe(keys_tx).context("watching the record hotkey")?;
    let interrupt = interrupt_channel()?;

    recorder.start().context("starting capture")?;
    ctx.status(format!("Recording '{}' ({} or Ctrl+C to stop)", name, hotkey));

    let mut shown = 0;
    loop {
        if let Some(host) = &host {
            host.pump();
        }
        let stop = select! {
            recv(interrupt) -> _ => true,
            recv(keys_rx) -> ev => ev.is_ok_and(|ev| is_hotkey(&ev, &hotkey)),
            default(PUMP_INTERVAL) => false,
        };
        if stop {
            break;
        }
        let n = count.load(Ordering::Relaxed);
        if n != shown && !ctx.json {
            shown = n;
            eprint!("\r{} actions", n);
            io::stderr().flush()?;
        }
    }

    // Keep answering display queries while the capture thread drains
    let actions = std::thread::scope(|s| {
        let stopping = s.spawn(|| recorder.stop());
        while !stopping.is_finished() {
            if let Some(host) = &host {
                host.pump();
            }
            std::thread::sleep(PUMP_INTERVAL);
        }
        stopping.join()
    })
    .map_err(|_| Error::capture_failed("capture shutdown panicked"))?;
    if !ctx.json && shown > 0 {
        eprintln!();
    }

    let target = match output {
        Some(p) => storage::normalize_path(p),
        None => store.new_recording_path(name),
    };
    let path = storage::save(&target, &actions)
        .ok_or_else(|| Error::storage(format!("Could not write {}", target.display())))?;
    if storage::save(store.autosave_path(), &actions).is_none() {
        warn!("autosave skipped");
    }
    info!(path = %path.display(), actions = actions.len(), "recording saved");

    let summary = MacroSummary::new(path, &actions);
    ctx.done(summary, |s| {
        println!("{} actions recorded", s.actions);
        println!("Saved: {}", s.path.display());
    });
    Ok(())
}

// ── Playback ────────────────────────────────────────────────────────────────

enum Signal {
    Step(usize, Action),
    Finished,
    Stop,
    Idle,
}

fn play(ctx: &Ctx, file: &str, speed: Option<f64>, repeat: Option<u32>, from: usize, delay: u64) -> Result<()> {
    let store = MacroStore::new().context("opening macro directory")?;
    let path = store.path_for(file);
    let actions = storage::load(&path);
    if actions.is_empty() {
        return Err(Error::storage(format!("No actions in {}", path.display())).into());
    }

    let opts = PlayOptions {
        speed: speed.unwrap_or(ctx.config.playback.speed),
        repeat: repeat.unwrap_or(ctx.config.playback.repeat),
        start_offset: from,
    };
    let hotkey = normalize_key_name(&ctx.config.hotkeys.play_toggle)?;

    // The hotkey is a convenience; playback works without capture access
    let source = RdevSource::new();
    let (keys_tx, keys_rx) = bounded(HOTKEY_QUEUE);
    let (_hotkeys, keys_rx) = match source.subscribe(keys_tx) {
        Ok(sub) => (Some(sub), keys_rx),
        Err(e) => {
            warn!(error = %e, "play hotkey unavailable");
            (None, never())
        }
    };
    let interrupt = interrupt_channel()?;

    let repeat_label = if opts.repeat == 0 { "until stopped".to_string() } else { format!("x{}", opts.repeat) };
    ctx.status(format!(
        "Playing {} ({} actions) at {}x, {}",
        path.display(),
        actions.len(),
        opts.speed,
        repeat_label
    ));
    if delay > 0 {
        ctx.status(format!("Starting in {} seconds... ({} or Ctrl+C to stop)", delay, hotkey));
        std::thread::sleep(Duration::from_secs(delay));
    }

    let player = Player::new(enigo_factory());
    let events = player.play_events(actions, opts).context("starting playback")?;
    let mut steps = 0usize;
    let mut stopped = false;

    loop {
        let signal = select! {
            recv(events) -> ev => match ev {
                Ok(PlaybackEvent::Step { index, action }) => Signal::Step(index, action),
                Ok(PlaybackEvent::Done) | Err(_) => Signal::Finished,
            },
            recv(interrupt) -> _ => Signal::Stop,
            recv(keys_rx) -> ev => {
                if ev.is_ok_and(|ev| is_hotkey(&ev, &hotkey)) { Signal::Stop } else { Signal::Idle }
            }
        };
        match signal {
            Signal::Step(index, action) => {
                steps += 1;
                if !ctx.json {
                    eprint!("\r#{} {}        ", index, action.kind_name());
                    io::stderr().flush()?;
                }
            }
            Signal::Finished => break,
            // Done still arrives on `events` after the worker exits
            Signal::Stop => {
                stopped = true;
                player.stop();
            }
            Signal::Idle => {}
        }
    }
    if !ctx.json && steps > 0 {
        eprintln!();
    }

    #[derive(Serialize)]
    struct PlaySummary {
        path: PathBuf,
        steps: usize,
        stopped: bool,
    }
    ctx.done(PlaySummary { path, steps, stopped }, |s| {
        let how = if s.stopped { "Stopped" } else { "Done" };
        println!("{}: {} steps played", how, s.steps);
    });
    Ok(())
}

// ── Library ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MacroSummary {
    path: PathBuf,
    actions: usize,
    kinds: BTreeMap<&'static str, usize>,
    /// Sum of recorded durations, seconds
    duration: f64,
}

impl MacroSummary {
    fn new(path: PathBuf, actions: &[Action]) -> Self {
        let mut kinds = BTreeMap::new();
        for a in actions {
            *kinds.entry(a.kind_name()).or_insert(0) += 1;
        }
        let duration = actions.iter().map(Action::duration).sum::<f64>();
        Self {
            path,
            actions: actions.len(),
            kinds,
            duration: (duration * 1000.0).round() / 1000.0,
        }
    }
}

fn list(ctx: &Ctx) -> Result<()> {
    let store = MacroStore::new().context("opening macro directory")?;
    let files = store.list()?;
    ctx.done(files, |files| {
        if files.is_empty() {
            println!("No macros saved in {}", store.path().display());
        } else {
            for f in files {
                println!("{}", f);
            }
        }
    });
    Ok(())
}

fn show(ctx: &Ctx, file: &str, all: bool) -> Result<()> {
    let store = MacroStore::new().context("opening macro directory")?;
    let path = store.path_for(file);
    if !path.exists() {
        return Err(Error::storage(format!("File not found: {}", path.display())).into());
    }
    let tree = storage::load_tree(&path);
    let actions = macrocorder_core::flatten(&tree);
    let (groups, grouped) = tree
        .iter()
        .filter(|n| matches!(n, ActionNode::Group { .. }))
        .fold((0, 0), |(g, n), node| (g + 1, n + node.count_actions()));

    #[derive(Serialize)]
    struct ShowOutput {
        #[serde(flatten)]
        summary: MacroSummary,
        groups: usize,
        grouped: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        items: Option<Vec<Action>>,
    }
    let out = ShowOutput {
        summary: MacroSummary::new(path, &actions),
        groups,
        grouped,
        items: all.then(|| actions.clone()),
    };

    ctx.done(out, |out| {
        let s = &out.summary;
        println!("File: {}", s.path.display());
        println!(
            "Actions: {} ({} in {} top-level groups)",
            s.actions, out.grouped, out.groups
        );
        let kinds: Vec<String> = s.kinds.iter().map(|(k, n)| format!("{} {}", n, k)).collect();
        println!("Summary: {}", kinds.join(", "));
        println!("Recorded time: {:.3}s", s.duration);
        if let Some(items) = &out.items {
            for (i, a) in items.iter().enumerate() {
                println!("{}: {}", i, describe(a));
            }
        }
    });
    Ok(())
}

fn describe(a: &Action) -> String {
    let body = match &a.kind {
        ActionKind::Move { path, duration, screen } => {
            format!("move {} points {:.3}s on {}", path.len(), duration, screen)
        }
        ActionKind::Drag { button, path, duration, screen } => {
            format!("drag {} {} points {:.3}s on {}", button, path.len(), duration, screen)
        }
        ActionKind::Click { button, x, y, screen, .. } => {
            format!("click {} at ({}, {}) on {}", button, x, y, screen)
        }
        ActionKind::Key { key, duration } => format!("key {} {:.3}s", key, duration),
    };
    if a.comment.is_empty() {
        body
    } else {
        format!("{}  # {}", body, a.comment)
    }
}

fn delete(ctx: &Ctx, file: &str) -> Result<()> {
    let store = MacroStore::new().context("opening macro directory")?;
    store.delete(file)?;
    ctx.done(serde_json::json!({ "deleted": file }), |_| println!("Deleted: {}", file));
    Ok(())
}

fn config(ctx: &Ctx, init: bool) -> Result<()> {
    if init {
        let path = ctx
            .config_path
            .clone()
            .ok_or_else(|| Error::config("No config directory on this platform"))?;
        if path.exists() {
            ctx.status(format!("Keeping existing {}", path.display()));
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, serde_json::to_string_pretty(&AppConfig::default())?)?;
            ctx.status(format!("Wrote {}", path.display()));
        }
    }

    #[derive(Serialize)]
    struct ConfigOutput<'a> {
        path: Option<&'a Path>,
        config: &'a AppConfig,
        ignore_keys: Vec<String>,
    }
    let mut ignore_keys: Vec<String> = ctx.config.ignore_keys().into_iter().collect();
    ignore_keys.sort();
    let out = ConfigOutput {
        path: ctx.config_path.as_deref(),
        config: &ctx.config,
        ignore_keys,
    };
    if ctx.json {
        print_json(&Output::ok(&out));
    } else {
        print_json(&out.config);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn play_flags_parse() {
        let cli = Cli::parse_from(["mcr", "play", "demo", "-s", "2", "-r", "0", "--from", "3", "--json"]);
        assert!(cli.json);
        match cli.command {
            Commands::Play { file, speed, repeat, from, .. } => {
                assert_eq!(file, "demo");
                assert_eq!(speed, Some(2.0));
                assert_eq!(repeat, Some(0));
                assert_eq!(from, 3);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn hotkey_matches_release_only() {
        let f9 = KeyInput::named("Key.f9");
        assert!(is_hotkey(&Stamped::now(RawEvent::KeyRelease(f9.clone())), "f9"));
        assert!(!is_hotkey(&Stamped::now(RawEvent::KeyPress(f9)), "f9"));
        assert!(!is_hotkey(&Stamped::now(RawEvent::KeyRelease(KeyInput::char('a'))), "f9"));
    }

    #[test]
    fn summary_counts_kinds() {
        let actions = vec![
            Action::new(ActionKind::Key { key: "a".into(), duration: 0.1 }),
            Action::new(ActionKind::Key { key: "b".into(), duration: 0.2 }),
            Action::new(ActionKind::Click {
                button: Button::Left,
                x: 1.0,
                y: 1.0,
                duration: 0.05,
                screen: "Main".into(),
            }),
        ];
        let s = MacroSummary::new(PathBuf::from("m.json"), &actions);
        assert_eq!(s.actions, 3);
        assert_eq!(s.kinds["key"], 2);
        assert_eq!(s.kinds["click"], 1);
        assert_eq!(s.duration, 0.35);
    }
}
