//! The converter daemon binary

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use twinax::{Config, ConverterError, Scheduler, SerialLink, StationConfig};

#[derive(Parser, Debug)]
#[command(
    name = "twinaxd",
    about = "IBM 5250 twinax terminal converter - host side"
)]
struct Args {
    /// Terminal definitions of the form ADDR[:DICT[:POLL[:CODEPAGE[:ADVANCED]]]]
    #[arg(value_name = "TERM-DEFINITION")]
    terminals: Vec<String>,

    /// Serial device file of the twinax converter
    #[arg(short = 't', long = "tty", default_value = "/dev/ttyACM0")]
    tty: PathBuf,

    /// Start with the keyboard clicker silent
    #[arg(short = 's', long)]
    silent: bool,

    /// Enable frame-level connection logging
    #[arg(short = 'c', long)]
    debug_connection: bool,

    /// Enable keystroke scancode logging
    #[arg(short = 'k', long)]
    debug_keystrokes: bool,

    /// Enable PTY input/output logging
    #[arg(short = 'i', long)]
    debug_io: bool,

    /// Run a full login per session instead of a plain shell
    #[arg(short = 'l', long)]
    login: bool,

    /// Program to run on each session PTY (default: $SHELL, then /bin/sh)
    #[arg(long)]
    shell: Option<PathBuf>,

    /// TERM value for session environments
    #[arg(long, default_value = "vt52")]
    term: String,

    /// TERMINFO directory carrying the converter's terminfo entry
    #[arg(long)]
    terminfo: Option<PathBuf>,
}

fn logging_filter(args: &Args) -> EnvFilter {
    let mut directives = String::from("info");
    if args.debug_connection {
        directives.push_str(",wire=debug,station=debug");
    }
    if args.debug_keystrokes {
        directives.push_str(",scancode=debug");
    }
    if args.debug_io {
        directives.push_str(",session=debug,display=debug");
    }
    EnvFilter::new(directives)
}

fn build_config(args: &Args) -> Result<Config, ConverterError> {
    let stations = if args.terminals.is_empty() {
        vec![StationConfig::new(0)]
    } else {
        args.terminals
            .iter()
            .map(|def| def.parse::<StationConfig>())
            .collect::<Result<_, _>>()
            .map_err(ConverterError::Config)?
    };

    let shell = if args.login {
        PathBuf::from("/bin/login")
    } else {
        args.shell.clone().unwrap_or_else(|| {
            std::env::var_os("SHELL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/bin/sh"))
        })
    };

    Ok(Config {
        serial_device: args.tty.clone(),
        stations,
        clicker_silent: args.silent,
        shell,
        term_name: args.term.clone(),
        terminfo_dir: args.terminfo.clone(),
    })
}

async fn run(args: Args) -> Result<(), ConverterError> {
    let config = build_config(&args)?;
    config.validate()?;

    let link = SerialLink::open(&config.serial_device).map_err(ConverterError::Serial)?;
    let mut scheduler = Scheduler::new(config, link)?;
    scheduler.run().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(logging_filter(&args))
        .init();

    if let Err(e) = run(args).await {
        eprintln!("twinaxd: {e}");
        std::process::exit(e.exit_code());
    }
}
