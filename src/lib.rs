pub mod cache;
pub mod cancel;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod scanner;
pub mod theme;
pub mod variants;
pub mod watch;

pub use cache::CacheStats;
pub use cancel::CancelToken;
pub use config::{Config, DarkMode, Mode};
pub use emitter::Stylesheet;
pub use engine::{BuildOutput, Engine, EngineOptions};
pub use error::{Cancelled, ConfigError, EngineError, ScanWarning};
pub use theme::Category;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use watch::{PassOutcome, Pipeline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan {
        inputs: Vec<String>,
        config: Option<String>,
        ignore: Vec<String>,
    },
    Build {
        inputs: Vec<String>,
        out: Option<String>,
        minify: bool,
        config: Option<String>,
        ignore: Vec<String>,
    },
    Watch {
        inputs: Vec<String>,
        out: Option<String>,
        minify: bool,
        config: Option<String>,
        ignore: Vec<String>,
        poll: bool,
        poll_interval_ms: u64,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub message: String,
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct BuildOptions {
    inputs: Vec<String>,
    out: Option<String>,
    minify: bool,
    config: Option<String>,
    ignore: Vec<String>,
}

pub fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Scan {
            inputs,
            config,
            ignore,
        } => run_scan(inputs, config, ignore),
        Command::Build {
            inputs,
            out,
            minify,
            config,
            ignore,
        } => run_build(BuildOptions {
            inputs,
            out,
            minify,
            config,
            ignore,
        }),
        Command::Watch {
            inputs,
            out,
            minify,
            config,
            ignore,
            poll,
            poll_interval_ms,
        } => run_watch(
            BuildOptions {
                inputs,
                out,
                minify,
                config,
                ignore,
            },
            poll.then(|| Duration::from_millis(poll_interval_ms)),
        ),
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

pub fn run_from_env() -> Result<(), CliError> {
    let command = parse_args(env::args().skip(1))?;
    run(command)
}

pub fn parse_args<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut iter = args.into_iter();
    let Some(cmd) = iter.next() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "scan" => parse_scan_args(iter.collect()),
        "build" => parse_build_args(iter.collect()),
        "watch" => parse_watch_args(iter.collect()),
        "-h" | "--help" | "help" => Ok(Command::Help),
        _ => Err(CliError {
            message: format!("unknown command: {}", cmd),
        }),
    }
}

/// Flags shared by every subcommand, collected in one pass.
#[derive(Debug, Default)]
struct ParsedFlags {
    inputs: Vec<String>,
    out: Option<String>,
    minify: bool,
    config: Option<String>,
    ignore: Vec<String>,
    poll: bool,
    poll_interval_ms: Option<u64>,
}

fn parse_flags(command: &str, args: Vec<String>) -> Result<ParsedFlags, CliError> {
    let mut flags = ParsedFlags::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out" | "--output" | "-o" if command != "scan" => {
                flags.out = Some(flag_value(command, "--output", iter.next())?);
            }
            "--config" | "-c" => {
                flags.config = Some(flag_value(command, "--config", iter.next())?);
            }
            "--ignore" | "-I" => {
                flags.ignore.push(flag_value(command, "--ignore", iter.next())?);
            }
            "--minify" if command != "scan" => {
                flags.minify = true;
            }
            "--poll" if command == "watch" => {
                flags.poll = true;
            }
            "--poll-interval" if command == "watch" => {
                let value = flag_value(command, "--poll-interval", iter.next())?;
                flags.poll = true;
                flags.poll_interval_ms = Some(parse_u64_arg(&value, "--poll-interval")?);
            }
            "--poll" | "--poll-interval" => {
                return Err(CliError {
                    message: format!("{} is only supported with watch", arg),
                });
            }
            value if value.starts_with('-') && value.len() > 1 => {
                return Err(CliError {
                    message: format!("{} does not accept {}", command, value),
                });
            }
            value => {
                flags.inputs.push(value.to_string());
            }
        }
    }

    Ok(flags)
}

fn flag_value(command: &str, flag: &str, value: Option<String>) -> Result<String, CliError> {
    value.ok_or_else(|| CliError {
        message: format!("{} requires a value for {}", command, flag),
    })
}

fn parse_scan_args(args: Vec<String>) -> Result<Command, CliError> {
    let flags = parse_flags("scan", args)?;
    Ok(Command::Scan {
        inputs: flags.inputs,
        config: flags.config,
        ignore: flags.ignore,
    })
}

fn parse_build_args(args: Vec<String>) -> Result<Command, CliError> {
    let flags = parse_flags("build", args)?;
    Ok(Command::Build {
        inputs: flags.inputs,
        out: flags.out,
        minify: flags.minify,
        config: flags.config,
        ignore: flags.ignore,
    })
}

fn parse_watch_args(args: Vec<String>) -> Result<Command, CliError> {
    let flags = parse_flags("watch", args)?;
    Ok(Command::Watch {
        inputs: flags.inputs,
        out: flags.out,
        minify: flags.minify,
        config: flags.config,
        ignore: flags.ignore,
        poll: flags.poll,
        poll_interval_ms: flags.poll_interval_ms.unwrap_or(500),
    })
}

fn parse_u64_arg(value: &str, flag: &str) -> Result<u64, CliError> {
    value.parse::<u64>().map_err(|_| CliError {
        message: format!("{} requires a positive integer, got '{}'", flag, value),
    })
}

/// Explicit `--config`, else `jitwind.toml` when present.
fn config_path(explicit: Option<&str>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(PathBuf::from(path)),
        None => {
            let default = Path::new(config::DEFAULT_CONFIG_PATH);
            default.is_file().then(|| default.to_path_buf())
        }
    }
}

/// Loads the config file when there is one, else builds a bare configuration
/// over the command-line globs.
fn load_config(path: Option<&Path>, inputs: &[String]) -> Result<Config, CliError> {
    let config = match path {
        Some(path) => {
            log::debug!("loading config from {}", path.display());
            config::load_with_content(path, inputs)?
        }
        None if inputs.is_empty() => {
            return Err(CliError {
                message: format!(
                    "no content to scan: pass at least one glob or create {}",
                    config::DEFAULT_CONFIG_PATH
                ),
            });
        }
        None => {
            let config = Config::new(inputs.iter().cloned());
            config.validate()?;
            config
        }
    };
    Ok(config)
}

fn create_engine(options: &BuildOptions) -> Result<Engine, CliError> {
    let path = config_path(options.config.as_deref());
    let config = load_config(path.as_deref(), &options.inputs)?;
    let mut engine_options = EngineOptions {
        minify: options.minify,
        ..EngineOptions::default()
    };
    engine_options.scan.ignore = options.ignore.clone();
    if let Some(out) = options.out.as_ref() {
        engine_options.scan.ignore.push(out.clone());
    }
    Ok(Engine::with_options(config, engine_options)?)
}

fn run_scan(
    inputs: Vec<String>,
    config: Option<String>,
    ignore: Vec<String>,
) -> Result<(), CliError> {
    let engine = create_engine(&BuildOptions {
        inputs,
        out: None,
        minify: false,
        config,
        ignore,
    })?;
    let scan = engine.scan(&CancelToken::new()).map_err(EngineError::from)?;
    for warning in &scan.warnings {
        log::warn!("{}", warning);
    }

    let mut classes = scan
        .candidates
        .iter()
        .filter(|candidate| engine.resolve(&candidate.text).is_some())
        .map(|candidate| candidate.text.as_str())
        .collect::<Vec<_>>();
    classes.sort_unstable();

    for class in &classes {
        println!("{}", class);
    }

    log::info!(
        "scanned {} files, found {} classes",
        scan.files_scanned,
        classes.len()
    );

    Ok(())
}

fn run_build(options: BuildOptions) -> Result<(), CliError> {
    let engine = create_engine(&options)?;
    let output = engine.build(&CancelToken::new())?;
    write_output(options.out.as_deref(), &output)?;
    engine.close();
    Ok(())
}

fn write_output(out: Option<&str>, output: &BuildOutput) -> Result<(), CliError> {
    let css = output.stylesheet.to_css();
    match out {
        Some(path) => {
            let path = Path::new(path);
            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|err| CliError {
                    message: format!("failed to create {}: {}", parent.display(), err),
                })?;
            }
            fs::write(path, css).map_err(|err| CliError {
                message: format!("failed to write {}: {}", path.display(), err),
            })?;
            log::info!(
                "wrote {} rules from {} files to {}",
                output.stylesheet.len(),
                output.files_scanned,
                path.display()
            );
        }
        None => print!("{}", css),
    }
    Ok(())
}

fn run_watch(options: BuildOptions, poll: Option<Duration>) -> Result<(), CliError> {
    let engine = create_engine(&options)?;
    let source = config_path(options.config.as_deref());
    let (tx, rx) = channel();

    let mut roots = watch::watch_roots(&engine.config().content);
    if let Some(path) = source.as_deref() {
        let root = watch::glob_root(&path.to_string_lossy());
        let root = if root.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            root
        };
        if !roots.contains(&root) {
            roots.push(root);
        }
    }

    let mut ignore = options.ignore.clone();
    if let Some(out) = options.out.as_ref() {
        ignore.push(out.clone());
    }
    let _watcher = watch::spawn_watcher(&roots, &ignore, poll, tx).map_err(|err| CliError {
        message: format!("failed to start watcher: {}", err),
    })?;

    if poll.is_some() {
        log::info!("watching for changes (polling, press Ctrl+C to stop)...");
    } else {
        log::info!("watching for changes (press Ctrl+C to stop)...");
    }

    let mut pipeline = Pipeline::new(engine);
    if let Some(path) = source {
        pipeline = pipeline.with_config_source(path, options.inputs.clone());
    }

    let out = options.out.clone();
    pipeline.run(rx, |outcome| match outcome {
        PassOutcome::Built(output) => {
            if let Err(err) = write_output(out.as_deref(), &output) {
                log::error!("{}", err.message);
            }
        }
        PassOutcome::Failed(err) => log::error!("build failed: {}", err),
    });

    Ok(())
}

pub fn print_help() {
    println!("jitwind");
    println!();
    println!("USAGE:");
    println!("  jitwind scan [--config <path>] [--ignore <glob>] [glob...]");
    println!(
        "  jitwind build [--output <path>] [--minify] [--config <path>] [--ignore <glob>] [glob...]"
    );
    println!(
        "  jitwind watch [--output <path>] [--minify] [--config <path>] [--ignore <glob>] [--poll] [--poll-interval <ms>] [glob...]"
    );
    println!();
    println!(
        "Globs given on the command line replace the configured content. Without --config,"
    );
    println!("{} is used when present.", config::DEFAULT_CONFIG_PATH);
    println!();
    println!("EXAMPLES:");
    println!("  jitwind scan \"src/**/*.rs\"");
    println!("  jitwind build --output dist/app.css \"src/**/*.{{rs,html}}\"");
    println!("  jitwind build -c jitwind.toml --minify -o dist/app.css");
    println!("  jitwind watch -I \"**/generated/**\" -o dist/app.css \"src/**/*.rs\"");
    println!("  jitwind watch --poll --poll-interval 250 -o dist/app.css");
}
