//! File watching and the rebuild loop.
//!
//! A [`SourceWatcher`] turns filesystem notifications into [`WatchEvent`]s on
//! a channel; a [`Pipeline`] consumes them, running at most one build pass at
//! a time and cancelling it as soon as a newer change arrives.

use crate::cancel::CancelToken;
use crate::config;
use crate::engine::{BuildOutput, Engine};
use crate::error::{ConfigError, EngineError, ScanWarning};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
const TICK: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchEvent {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug)]
pub enum PassOutcome {
    Built(BuildOutput),
    Failed(EngineError),
}

/// Keeps the underlying notify watcher alive; dropping it stops the events.
pub struct SourceWatcher {
    _inner: Box<dyn Watcher>,
}

/// Starts watching `roots` recursively and forwards every relevant change to
/// `tx`. Events whose paths all match `ignore` are dropped.
pub fn spawn_watcher(
    roots: &[PathBuf],
    ignore: &[String],
    poll: Option<Duration>,
    tx: Sender<WatchEvent>,
) -> notify::Result<SourceWatcher> {
    let ignore_set = build_ignore_set(ignore);
    let base = env::current_dir().unwrap_or_default();
    let handler = move |result: notify::Result<notify::Event>| match result {
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_))
                || should_ignore_event(&event.paths, ignore_set.as_ref(), &base)
            {
                return;
            }
            let _ = tx.send(WatchEvent { paths: event.paths });
        }
        Err(err) => log::warn!("watch error: {}", err),
    };

    let mut watcher: Box<dyn Watcher> = match poll {
        Some(interval) => Box::new(notify::PollWatcher::new(
            handler,
            notify::Config::default().with_poll_interval(interval),
        )?),
        None => Box::new(notify::recommended_watcher(handler)?),
    };

    if roots.is_empty() {
        watcher.watch(Path::new("."), RecursiveMode::Recursive)?;
    } else {
        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }
    }

    Ok(SourceWatcher { _inner: watcher })
}

/// Directories to watch for a set of content globs, one per distinct root.
pub fn watch_roots(patterns: &[String]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();

    for pattern in patterns {
        let root = glob_root(pattern);
        let normalized = if root.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            root
        };
        if seen.insert(normalized.clone()) {
            roots.push(normalized);
        }
    }

    roots
}

/// Longest directory prefix of `pattern` that contains no glob syntax.
pub fn glob_root(pattern: &str) -> PathBuf {
    let first_meta = pattern.find(['*', '?', '[', '{']);

    let Some(first_meta) = first_meta else {
        if pattern.ends_with('/') || pattern.ends_with('\\') {
            return PathBuf::from(pattern);
        }
        let path = Path::new(pattern);
        if path.extension().is_some() {
            return path.parent().unwrap_or(Path::new(".")).to_path_buf();
        }
        return path.to_path_buf();
    };

    let prefix = &pattern[..first_meta];
    match prefix.rfind(['/', '\\']) {
        Some(idx) if idx > 0 => PathBuf::from(&prefix[..idx]),
        Some(_) => PathBuf::from("/"),
        None => PathBuf::from("."),
    }
}

fn build_ignore_set(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                let warning = ScanWarning::InvalidGlob {
                    pattern: pattern.clone(),
                    reason: err.to_string(),
                };
                log::warn!("{}", warning);
            }
        }
    }
    builder.build().ok()
}

fn should_ignore_event(paths: &[PathBuf], ignore_set: Option<&GlobSet>, base: &Path) -> bool {
    let Some(ignore_set) = ignore_set else {
        return false;
    };
    if paths.is_empty() {
        return false;
    }
    paths.iter().all(|path| {
        let relative = path.strip_prefix(base).unwrap_or(path);
        ignore_set.is_match(path) || ignore_set.is_match(relative)
    })
}

struct InFlight {
    cancel: CancelToken,
    handle: JoinHandle<Result<BuildOutput, EngineError>>,
}

/// Config file re-read before every pass.
struct ConfigSource {
    path: PathBuf,
    content: Vec<String>,
}

/// Sequential, cancellable rebuild loop.
///
/// Passes hold a read lock on the engine for their whole run. The config is
/// only reloaded between passes, when nothing holds it.
pub struct Pipeline {
    engine: Arc<RwLock<Engine>>,
    source: Option<ConfigSource>,
    debounce: Duration,
}

impl Pipeline {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            source: None,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Reload `path` before each pass. Non-empty `content` replaces the
    /// file's content globs, as on the command line.
    pub fn with_config_source(mut self, path: impl Into<PathBuf>, content: Vec<String>) -> Self {
        self.source = Some(ConfigSource {
            path: path.into(),
            content,
        });
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Runs an initial pass, then one pass per burst of events until `events`
    /// disconnects and the last pass has finished.
    ///
    /// A new event cancels the pass in flight; the next pass starts once the
    /// cancelled one has returned and the debounce window has elapsed. Only
    /// passes that ran to completion uncancelled reach `sink`.
    pub fn run<F>(&self, events: Receiver<WatchEvent>, mut sink: F)
    where
        F: FnMut(PassOutcome),
    {
        let mut in_flight: Option<InFlight> = None;
        let mut pending = true;
        let mut last_event: Option<Instant> = None;
        let mut connected = true;

        loop {
            if let Some(pass) = in_flight.take_if(|pass| pass.handle.is_finished()) {
                self.finish(pass, &mut sink);
            }

            let settled = last_event.is_none_or(|at| at.elapsed() >= self.debounce);
            if pending && settled && in_flight.is_none() {
                pending = false;
                match self.reload() {
                    Ok(()) => in_flight = Some(self.start()),
                    Err(err) => sink(PassOutcome::Failed(err.into())),
                }
            }

            if !connected {
                if in_flight.is_none() && !pending {
                    break;
                }
                thread::sleep(TICK);
                continue;
            }

            match events.recv_timeout(TICK) {
                Ok(event) => {
                    log::debug!("change detected in {} path(s)", event.paths.len());
                    if let Some(pass) = in_flight.as_ref() {
                        pass.cancel.cancel();
                    }
                    pending = true;
                    last_event = Some(Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => connected = false,
            }
        }
    }

    fn reload(&self) -> Result<(), ConfigError> {
        let Some(source) = self.source.as_ref() else {
            return Ok(());
        };
        let config = config::load_with_content(&source.path, &source.content)?;
        if self.engine.write().reconfigure(config)? {
            log::info!("reloaded configuration from {}", source.path.display());
        }
        Ok(())
    }

    fn start(&self) -> InFlight {
        let cancel = CancelToken::new();
        let engine = Arc::clone(&self.engine);
        let token = cancel.clone();
        let handle = thread::spawn(move || engine.read().build(&token));
        InFlight { cancel, handle }
    }

    fn finish<F>(&self, pass: InFlight, sink: &mut F)
    where
        F: FnMut(PassOutcome),
    {
        match pass.handle.join() {
            Ok(Ok(_)) if pass.cancel.is_cancelled() => log::debug!("discarding superseded pass"),
            Ok(Ok(output)) => sink(PassOutcome::Built(output)),
            Ok(Err(err)) if err.is_cancelled() => log::debug!("pass cancelled"),
            Ok(Err(err)) => sink(PassOutcome::Failed(err)),
            Err(_) => log::error!("build pass panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PassOutcome, Pipeline, WatchEvent, glob_root, should_ignore_event, watch_roots};
    use crate::config::{self, Config};
    use crate::engine::{Engine, EngineOptions};
    use crate::error::{ConfigError, EngineError};
    use crate::scanner::ScanOptions;
    use globset::{Glob, GlobSetBuilder};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::channel;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn options_for(dir: &TempDir) -> EngineOptions {
        EngineOptions {
            scan: ScanOptions {
                base_path: dir.path().to_path_buf(),
                ..ScanOptions::default()
            },
            ..EngineOptions::default()
        }
    }

    fn engine_for(dir: &TempDir) -> Engine {
        Engine::with_options(Config::new(["*.html"]), options_for(dir)).expect("engine")
    }

    /// Runs a pipeline over `dir` whose config file is rewritten to
    /// `edited` shortly after the first pass.
    fn run_with_config_edit(dir: &TempDir, initial: &str, edited: &'static str) -> Vec<PassOutcome> {
        let config_path = dir.path().join("jitwind.toml");
        fs::write(&config_path, initial).expect("write config");
        let engine = Engine::with_options(
            config::load(&config_path).expect("initial config"),
            options_for(dir),
        )
        .expect("engine");

        let (tx, rx) = channel();
        let edit_path = config_path.clone();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            fs::write(&edit_path, edited).expect("rewrite config");
            tx.send(WatchEvent {
                paths: vec![edit_path],
            })
            .expect("send");
        });

        let mut outcomes = Vec::new();
        Pipeline::new(engine)
            .with_config_source(config_path, Vec::new())
            .with_debounce(Duration::from_millis(20))
            .run(rx, |outcome| outcomes.push(outcome));
        writer.join().expect("writer thread");
        outcomes
    }

    #[test]
    fn glob_root_stops_at_first_wildcard() {
        assert_eq!(glob_root("src/**/*.rs"), PathBuf::from("src"));
        assert_eq!(glob_root("packages/app/src/*.html"), PathBuf::from("packages/app/src"));
        assert_eq!(glob_root("*.html"), PathBuf::from("."));
        assert_eq!(glob_root("templates/index.html"), PathBuf::from("templates"));
        assert_eq!(glob_root("static/"), PathBuf::from("static/"));
    }

    #[test]
    fn watch_roots_are_deduplicated() {
        let roots = watch_roots(&[
            "src/**/*.rs".to_string(),
            "src/*.html".to_string(),
            "index.html".to_string(),
        ]);
        assert_eq!(roots, vec![PathBuf::from("src"), PathBuf::from(".")]);
    }

    #[test]
    fn events_touching_only_ignored_paths_are_dropped() {
        let mut builder = GlobSetBuilder::new();
        builder.add(Glob::new("dist/app.css").expect("glob"));
        let set = builder.build().expect("glob set");
        let base = Path::new("/project");

        assert!(should_ignore_event(
            &[PathBuf::from("/project/dist/app.css")],
            Some(&set),
            base
        ));
        assert!(!should_ignore_event(
            &[
                PathBuf::from("/project/dist/app.css"),
                PathBuf::from("/project/src/main.rs"),
            ],
            Some(&set),
            base
        ));
        assert!(!should_ignore_event(&[], Some(&set), base));
        assert!(!should_ignore_event(&[PathBuf::from("/a")], None, base));
    }

    #[test]
    fn runs_initial_pass_and_stops_on_disconnect() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("index.html"), r#"<p class="z-10">"#).expect("write");
        let (tx, rx) = channel::<WatchEvent>();
        drop(tx);

        let mut outcomes = Vec::new();
        Pipeline::new(engine_for(&dir)).run(rx, |outcome| outcomes.push(outcome));
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            PassOutcome::Built(output) => assert!(output.stylesheet.to_css().contains(".z-10")),
            PassOutcome::Failed(err) => panic!("unexpected failure: {}", err),
        }
    }

    #[test]
    fn rebuilds_after_a_change_event() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("index.html"), r#"<p class="z-10">"#).expect("write");
        let (tx, rx) = channel();
        let path = dir.path().join("index.html");

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            fs::write(&path, r#"<p class="z-10 opacity-50">"#).expect("write");
            tx.send(WatchEvent { paths: vec![path] }).expect("send");
        });

        let mut outcomes = Vec::new();
        Pipeline::new(engine_for(&dir))
            .with_debounce(Duration::from_millis(20))
            .run(rx, |outcome| outcomes.push(outcome));
        writer.join().expect("writer thread");

        let last = match outcomes.last() {
            Some(PassOutcome::Built(output)) => output,
            other => panic!("expected a built pass, got {:?}", other),
        };
        assert!(last.stylesheet.to_css().contains(".opacity-50"));
    }

    #[test]
    fn config_edit_is_applied_on_the_next_pass() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("index.html"), r#"<p class="flex-2 z-10">"#).expect("write");
        let outcomes = run_with_config_edit(
            &dir,
            "content = [\"*.html\"]\n",
            "content = [\"*.html\"]\n[theme.extend.flex]\n2 = \"2 2 0%\"\n",
        );

        let css = outcomes
            .iter()
            .map(|outcome| match outcome {
                PassOutcome::Built(output) => output.stylesheet.to_css(),
                PassOutcome::Failed(err) => panic!("unexpected failure: {}", err),
            })
            .collect::<Vec<_>>();
        let last = css.last().expect("at least one pass");
        assert!(last.contains(".flex-2 {\n  flex: 2 2 0%;\n}"));
        if css.len() > 1 {
            assert!(!css[0].contains("flex-2"));
        }
    }

    #[test]
    fn invalid_config_edit_is_reported_and_skips_the_pass() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("index.html"), r#"<p class="z-10">"#).expect("write");
        let outcomes = run_with_config_edit(
            &dir,
            "content = [\"*.html\"]\n",
            "content = [\"*.html\"]\n[theme.extend.scale]\n400 = \"huge\"\n",
        );

        assert!(matches!(
            outcomes.last(),
            Some(PassOutcome::Failed(EngineError::Config(ConfigError::InvalidToken { .. })))
        ));
    }

    #[test]
    fn burst_of_events_yields_one_rebuild() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("index.html"), r#"<p class="z-10">"#).expect("write");
        let (tx, rx) = channel();
        for _ in 0..5 {
            tx.send(WatchEvent::default()).expect("send");
        }
        drop(tx);

        let mut outcomes = Vec::new();
        Pipeline::new(engine_for(&dir))
            .with_debounce(Duration::from_millis(50))
            .run(rx, |outcome| outcomes.push(outcome));
        assert!(!outcomes.is_empty() && outcomes.len() <= 2);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, PassOutcome::Built(_))));
    }
}
