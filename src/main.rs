mod background;
mod bypass;
mod config;
mod engine;
mod error;
mod ledger;
mod matcher;
mod models;
mod pomodoro;
mod protocol;
mod report;
mod schedule;
mod stats;
mod storage;
mod tab;
mod tui;
mod utils;

use anyhow::{bail, Result};
use background::Background;
use chrono::Local;
use clap::{Parser, Subcommand};
use fd_lock::RwLock;
use pomodoro::PomodoroAction;
use protocol::{Message, Response};
use report::Reporter;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use storage::Storage;
use tab::{TabSession, Unload, View, HEARTBEAT_INTERVAL_SECS};
use utils::{format_clock, format_expiry};

#[derive(Parser)]
#[command(name = "focusflow")]
#[command(about = "Site blocking, friction bypasses and a pomodoro timer for focused browsing", long_about = None)]
struct Cli {
    /// Directory holding settings and state (default ~/.focusflow)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background process: pomodoro ticks, bypass sweeps, dashboard
    Run {
        /// Skip the dashboard, stop with Ctrl-C
        #[arg(long)]
        headless: bool,
    },
    /// Ask whether a URL is blocked right now
    Check { url: String },
    /// Open a URL as a visible tab: friction prompt, heartbeats, countdown
    Browse { url: String },
    /// Record browsing time on a domain
    Heartbeat {
        domain: String,
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
    },
    /// Control the pomodoro timer
    Pomodoro {
        #[command(subcommand)]
        command: PomodoroCommand,
    },
    /// Manage temporary bypasses
    Bypass {
        #[command(subcommand)]
        command: BypassCommand,
    },
    /// Print today's and this week's browsing time
    Report,
    /// Show or toggle settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Send a raw JSON message and print the JSON reply
    Send { json: String },
}

#[derive(Subcommand)]
enum PomodoroCommand {
    Start,
    Pause,
    Skip,
    Reset,
    Status,
}

#[derive(Subcommand)]
enum BypassCommand {
    /// Grant a bypass for a fixed duration
    Grant {
        domain: String,
        /// e.g. 15m, 1h
        #[arg(short, long, default_value = "15m")]
        duration: String,
    },
    /// Grant the bypass a completed friction challenge earns
    Friction { domain: String },
    /// Remove a bypass
    Clear { domain: String },
    /// List live bypasses
    List,
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    Enable,
    Disable,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = matches!(cli.command, Commands::Run { headless: false });
    let default_level = if interactive { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let base_dir = match cli.data_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)?;
            dir
        }
        None => Storage::get_base_dir()?,
    };
    let mut background = Background::open(&base_dir)?;

    match cli.command {
        Commands::Run { headless } => {
            let lock_path = base_dir.join("run.lock");
            let lock_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(lock_path)?;

            let mut lock = RwLock::new(lock_file);
            let _guard = lock.try_write().map_err(|_| {
                anyhow::anyhow!("Another instance of FocusFlow is already running. Please close it before starting a new one.")
            })?;

            if headless {
                run_headless(&mut background)?;
            } else {
                tui::run_tui(&mut background)?;
                println!("\nSession ended by user.");
                Reporter::new(background.storage().clone()).report(Local::now())?;
            }
        }
        Commands::Check { url } => {
            emit(background.handle(Message::CheckBlocked(url)))?;
        }
        Commands::Browse { url } => {
            browse(&mut background, &url)?;
        }
        Commands::Heartbeat { domain, seconds } => {
            emit(background.handle(Message::Heartbeat { domain, seconds }))?;
        }
        Commands::Pomodoro { command } => {
            let message = match command {
                PomodoroCommand::Start => pomodoro_message(PomodoroAction::Start),
                PomodoroCommand::Pause => pomodoro_message(PomodoroAction::Pause),
                PomodoroCommand::Skip => pomodoro_message(PomodoroAction::Skip),
                PomodoroCommand::Reset => pomodoro_message(PomodoroAction::Reset),
                PomodoroCommand::Status => Message::GetPomodoroState,
            };
            match background.handle(message) {
                Response::Pomodoro(state) => println!(
                    "{} {}{} | {} today",
                    state.phase.label(),
                    format_clock(state.time_remaining_seconds),
                    if state.is_running { " (running)" } else { "" },
                    state.today_pomodoros
                ),
                other => emit(other)?,
            }
        }
        Commands::Bypass { command } => match command {
            BypassCommand::Grant { domain, duration } => {
                let duration = humantime::parse_duration(&duration)?;
                let minutes = u32::try_from(duration.as_secs().div_ceil(60))?;
                if minutes == 0 {
                    bail!("Bypass duration must be at least one minute");
                }
                emit(background.handle(Message::RequestBypass {
                    domain,
                    duration_minutes: minutes,
                }))?;
            }
            BypassCommand::Friction { domain } => {
                emit(background.handle(Message::FrictionCompleted { domain }))?;
            }
            BypassCommand::Clear { domain } => {
                emit(background.handle(Message::ClearBypass { domain }))?;
            }
            BypassCommand::List => {
                let bypasses = background.list_bypasses(Local::now())?;
                if bypasses.is_empty() {
                    println!("No active bypasses.");
                }
                for bypass in bypasses {
                    println!("{:<24} until {}", bypass.domain, format_expiry(bypass.expires_at));
                }
            }
        },
        Commands::Report => {
            Reporter::new(background.storage().clone()).report(Local::now())?;
        }
        Commands::Settings { command } => {
            let enabled = match command {
                SettingsCommand::Show => {
                    emit(background.handle(Message::GetSettings))?;
                    return Ok(());
                }
                SettingsCommand::Enable => true,
                SettingsCommand::Disable => false,
            };
            let mut settings = background.settings().clone();
            settings.enabled = enabled;
            emit(background.handle(Message::UpdateSettings(Box::new(settings))))?;
        }
        Commands::Send { json } => {
            println!("{}", background.handle_json(&json));
        }
    }

    Ok(())
}

fn pomodoro_message(action: PomodoroAction) -> Message {
    Message::PomodoroAction { action }
}

/// Prints a reply as JSON, turning an error reply into a failed exit.
fn emit(response: Response) -> Result<()> {
    if let Response::Error { error } = response {
        bail!(error);
    }
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_headless(background: &mut Background) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    log::info!("FocusFlow running headless, press Ctrl-C to stop");
    while running.load(Ordering::SeqCst) {
        if let Err(err) = background.tick(Local::now()) {
            log::error!("Tick failed: {:#}", err);
        }
        std::thread::sleep(StdDuration::from_secs(1));
    }
    log::info!("Stopped");
    Ok(())
}

/// Plays one browsing context in the terminal until the page is blocked or
/// the user presses Ctrl-C.
fn browse(background: &mut Background, url: &str) -> Result<()> {
    let mut tab = TabSession::new(background, url);
    tab.load(Local::now());

    if let View::Friction(challenge) = tab.view().clone() {
        println!("{} needs a moment of reflection.", tab.domain());
        let left = challenge.seconds_left(Local::now());
        if left > 0 {
            println!("Waiting {}s...", left);
            std::thread::sleep(StdDuration::from_secs(left));
        }
        let stdin = io::stdin();
        loop {
            let typed = match &challenge.phrase {
                Some(phrase) => {
                    print!("Type \"{}\" to continue: ", phrase);
                    io::stdout().flush()?;
                    let mut line = String::new();
                    if stdin.lock().read_line(&mut line)? == 0 {
                        println!("\nAbandoned.");
                        return Ok(());
                    }
                    line.trim().to_string()
                }
                None => String::new(),
            };
            match tab.complete_friction(&typed, Local::now()) {
                Ok(()) => break,
                Err(err) => println!("{}", err),
            }
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut last_view = None;
    while running.load(Ordering::SeqCst) {
        let view = tab.view().clone();
        if last_view.as_ref() != Some(&view) {
            match &view {
                View::Blocked { reason } => {
                    println!("Blocked: {}", reason);
                    return Ok(());
                }
                View::Countdown { remaining } => {
                    let marker = if view.is_warning() { " (almost out)" } else { "" };
                    println!("{} left today{}", format_clock(*remaining), marker);
                }
                View::Free => println!("Browsing {}, Ctrl-C to leave", tab.domain()),
                View::Loading | View::Friction(_) => {}
            }
            last_view = Some(view);
        }
        std::thread::sleep(StdDuration::from_secs(HEARTBEAT_INTERVAL_SECS));
        tab.heartbeat(true, Local::now());
    }

    tab.unload(Unload::Navigate, None);
    Ok(())
}
