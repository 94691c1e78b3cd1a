//! termbridge - run a shell through the terminal I/O bridge
//!
//! Starts a shell as a child process, pumps its output through a
//! `TerminalSession` and prints it with the configured theme. Lines typed on
//! stdin are forwarded to the shell.
//!
//! # Quick Start
//!
//! ```text
//! termbridge                      # Shell from config.toml, or /bin/sh
//! termbridge -s "bash -i"         # Custom shell command
//! termbridge -t dracula           # Pick a theme
//! termbridge --demo               # Render sample output, no shell
//! ```

mod ui;

use std::env;
use std::io::{self, BufRead};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use termbridge::config::{Config, Theme};
use termbridge::core::{Emulator, NullClient, ProcessChannel, PtySize, TerminalSession};

use crate::ui::ConsoleRenderer;

/// Command line options
#[derive(Default)]
struct Options {
    /// Shell command override
    shell: Option<String>,
    /// Theme override
    theme: Option<String>,
    /// Render sample output instead of running a shell
    demo: bool,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("termbridge {}", VERSION);
}

fn print_help() {
    eprintln!("termbridge {} - terminal I/O bridge for remote shells", VERSION);
    eprintln!();
    eprintln!("Usage: termbridge [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --shell <CMD>     Shell command (default: config.toml or /bin/sh)");
    eprintln!("  -t, --theme <NAME>    Color theme");
    eprintln!("      --themes          List available themes");
    eprintln!("      --demo            Render sample output and exit");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Lines read from stdin are sent to the shell. End stdin (Ctrl+D)");
    eprintln!("to close the shell's input and wait for it to exit.");
    eprintln!();
    eprintln!("Configuration: ~/.termbridge/config.toml");
    eprintln!("Log file:      ~/.termbridge/termbridge.log");
}

/// Parse command line arguments
fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "--themes" => {
                for name in Theme::list() {
                    println!("{}", name);
                }
                std::process::exit(0);
            }
            "-s" | "--shell" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing shell argument".to_string());
                }
                options.shell = Some(args[i].clone());
            }
            "-t" | "--theme" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing theme argument".to_string());
                }
                options.theme = Some(args[i].clone());
            }
            "--demo" => {
                options.demo = true;
            }
            arg => {
                return Err(format!("Unknown option: {}", arg));
            }
        }
        i += 1;
    }

    Ok(options)
}

/// Log to `~/.termbridge/termbridge.log`
fn init_logging(config: &Config) {
    let log_path = Config::data_dir()
        .map(|dir| dir.join("termbridge.log"))
        .unwrap_or_else(|| std::path::PathBuf::from("termbridge.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let options = match parse_args() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let mut config = Config::load();
    if let Some(shell) = options.shell {
        config.shell = Some(shell);
    }
    if let Some(theme) = options.theme {
        config.theme = theme;
    }

    init_logging(&config);
    info!("termbridge starting...");

    if options.demo {
        return run_demo(&config);
    }

    let status = run_shell(&config)?;
    info!("termbridge exiting with status {}", status);
    std::process::exit(if status < 0 { 1 } else { status });
}

/// Run the configured shell until it exits, returning its exit status
fn run_shell(config: &Config) -> anyhow::Result<i32> {
    let shell = config.shell.clone().unwrap_or_else(default_shell);
    info!("Launching shell: {}", shell);

    let channel = Arc::new(ProcessChannel::shell(&shell)?);
    let renderer = ConsoleRenderer::new(io::stdout(), config.theme());
    let (session, dispatcher) =
        TerminalSession::new(channel, renderer, Arc::new(NullClient), config.session.clone())?;

    let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
    session.start(PtySize::new(cols, rows))?;

    let dispatcher = thread::Builder::new()
        .name("dispatcher".to_string())
        .spawn(move || dispatcher.run())?;

    let session = Arc::new(session);
    {
        let session = session.clone();
        // Left detached: it may stay parked on stdin after the shell exits
        thread::Builder::new()
            .name("stdin".to_string())
            .spawn(move || forward_stdin(&session))?;
    }

    if dispatcher.join().is_err() {
        error!("Dispatcher thread panicked");
        session.finish_if_running();
    }

    Ok(session.exit_status().unwrap_or(-1))
}

fn forward_stdin(session: &TerminalSession) {
    for line in io::stdin().lock().lines() {
        let Ok(mut line) = line else {
            break;
        };
        line.push('\n');
        if !session.write(line.as_bytes()) {
            return;
        }
    }
    session.close_input();
}

fn default_shell() -> String {
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

/// Render canned output through the parser
fn run_demo(config: &Config) -> anyhow::Result<()> {
    println!("=== termbridge Demo Mode ({}) ===\n", config.theme);

    let demo_output = concat!(
        "\x1b[32mWelcome to termbridge!\x1b[0m\n",
        "\n",
        "This is \x1b[1mbold\x1b[0m and \x1b[4munderlined\x1b[0m text.\n",
        "Colors: \x1b[31mRed\x1b[0m \x1b[32mGreen\x1b[0m \x1b[34mBlue\x1b[0m\n",
        "Bright: \x1b[91mRed\x1b[0m \x1b[92mGreen\x1b[0m \x1b[94mBlue\x1b[0m\n",
        "Background: \x1b[30;43m warning \x1b[0m \x1b[97;41m error \x1b[0m\n",
        "\x1b[7mInverse text\x1b[0m\n",
        "Unicode: こんにちは世界\n",
        "\n",
        "user@host:~$ ",
    );

    let mut renderer = ConsoleRenderer::new(io::stdout(), config.theme());
    renderer.append(demo_output.as_bytes());

    println!("\n\nDemo complete.");
    Ok(())
}
