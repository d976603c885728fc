//! Bitferry CLI - file synchronization and backup automation.

use bitferry::cli::{Cli, Commands, CreateCommands, DeleteCommands, TaskCommands};
use bitferry::commands::{self, Output, TransferKind};
use bitferry::config::{self, ConfigOverrides, LOG_ENV, PASSWORD_ENV, ResolvedConfig};
use bitferry::exec::{ProcessExecutor, RcloneObscurer};
use bitferry::registry::{self, Context, Settings};
use bitferry::Result;
use clap::Parser;
use std::io::{self, BufRead};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;
    init_logging(cli.quiet, cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            if human {
                eprintln!("Error: {}", e);
            } else {
                eprintln!(r#"{{"error": "{}"}}"#, e);
            }
            process::exit(1);
        }
    }
}

/// Log to stderr. `-q`/`-v` win over `BITFERRY_LOG`, which wins over the `warn` default.
fn init_logging(quiet: bool, verbose: u8) {
    let flag_level = match (quiet, verbose) {
        (true, _) => Some("error"),
        (false, 0) => None,
        (false, 1) => Some("info"),
        (false, _) => Some("debug"),
    };
    let filter = match flag_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Restore, run the command, then commit.
///
/// A failing command aborts before commit. Returns false when restore,
/// commit or processing reported a problem.
fn run(cli: Cli) -> Result<bool> {
    let human = cli.human_readable;
    let overrides = ConfigOverrides {
        search_paths: cli.search_paths.clone(),
        scan_mounts: cli.no_mounts.then_some(false),
        rclone: cli.rclone.clone(),
        restic: cli.restic.clone(),
    };
    let resolved = config::resolve_config(&overrides)?;

    if matches!(cli.command, Commands::Config) {
        output(&commands::config(&resolved), human);
        return Ok(true);
    }

    let mut ctx = Context::new(Settings {
        simulate: cli.dry_run,
    });
    let roots = registry::candidate_roots(&resolved.search_paths(), resolved.scan_mounts.value);
    tracing::debug!("checking {} candidate volume root(s)", roots.len());
    let restored = ctx.restore(&roots);

    let processed = run_command(cli.command, &mut ctx, &resolved, human)?;

    let committed = ctx.commit();
    Ok(restored && processed && committed)
}

fn run_command(
    command: Commands,
    ctx: &mut Context,
    resolved: &ResolvedConfig,
    human: bool,
) -> Result<bool> {
    let obscurer = RcloneObscurer::new(resolved.rclone.value.clone());
    match command {
        Commands::Show => output(&commands::show(ctx), human),
        Commands::Config => output(&commands::config(resolved), human),
        Commands::Process { tags } => {
            let interrupted = interrupt_flag();
            let poll = || interrupted.load(Ordering::SeqCst);
            let result = commands::process(
                ctx,
                &tags,
                &resolved.tools(),
                &ProcessExecutor,
                &obscurer,
                &poll,
            )?;
            output(&result, human);
            return Ok(result.success());
        }
        Commands::Create { command } => match command {
            CreateCommands::Volume { root, force } => {
                output(&commands::create_volume(ctx, &root, force)?, human)
            }
            CreateCommands::Task { command } => {
                let created = match command {
                    TaskCommands::Copy(args) => {
                        let password = password_source(args.password.clone());
                        let kind = TransferKind::Copy;
                        commands::create_transfer(ctx, kind, &args, &password, &obscurer)?
                    }
                    TaskCommands::Update(args) => {
                        let password = password_source(args.password.clone());
                        let kind = TransferKind::Update;
                        commands::create_transfer(ctx, kind, &args, &password, &obscurer)?
                    }
                    TaskCommands::Synchronize(args) => {
                        let password = password_source(args.password.clone());
                        let kind = TransferKind::Synchronize;
                        commands::create_transfer(ctx, kind, &args, &password, &obscurer)?
                    }
                    TaskCommands::Equalize(args) => {
                        let password = password_source(args.password.clone());
                        let kind = TransferKind::Equalize;
                        commands::create_transfer(ctx, kind, &args, &password, &obscurer)?
                    }
                    TaskCommands::Backup(args) => {
                        let password = password_source(args.password.clone());
                        commands::create_backup(ctx, &args, &password, &obscurer)?
                    }
                    TaskCommands::Restore(args) => {
                        let password = password_source(args.password.clone());
                        commands::create_restore(ctx, &args, &password, &obscurer)?
                    }
                };
                output(&created, human)
            }
        },
        Commands::Delete { command } => match command {
            DeleteCommands::Volume { tags, wipe } => {
                output(&commands::delete_volumes(ctx, &tags, wipe)?, human)
            }
            DeleteCommands::Task { tags } => output(&commands::delete_tasks(ctx, &tags)?, human),
        },
    }
    Ok(true)
}

/// Set once Ctrl-C is received; processing stops before the next task.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || handler.store(true, Ordering::SeqCst)) {
        tracing::warn!("cannot install interrupt handler: {}", e);
    }
    flag
}

/// Password lookup: `--password`, then `BITFERRY_PASSWORD`, then one line of stdin.
fn password_source(explicit: Option<String>) -> impl Fn() -> Result<String> {
    move || {
        if let Some(password) = &explicit {
            return Ok(password.clone());
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                return Ok(password);
            }
        }
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
