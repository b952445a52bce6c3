use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
    tty::IsTty,
};
use questlog::{
    config::{Config, ConfigStore, FileConfigStore},
    leveling::{compute_level_info, LevelInfo},
    runtime::{run_session_timer, CrosstermEventSource, FixedTicker, Runner},
    session::{
        elapsed_snapshot, parse_timestamp, ActiveSession, SessionSnapshot, SessionTimer,
        SystemClock, TimezonePolicy,
    },
    util::progress_bar,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
};

const BAR_WIDTH: usize = 20;

/// xp progress and live time-tracking for your quest log
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Level progress and live time-tracking session math for a gamified quest log. The backend stays authoritative for levels and session data; questlog only derives what to display."
)]
pub struct Cli {
    /// settings file to use instead of the platform config dir
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// show progress within the level the backend reports
    Level {
        /// current level (backend-authoritative)
        level: u32,
        /// cumulative xp total
        total_xp: u64,
        /// print json instead of text
        #[clap(long)]
        json: bool,
    },
    /// evaluate an active session once
    Session {
        /// session start timestamp as sent by the backend
        start: String,
        /// hourly rate (falls back to the saved default)
        #[clap(short = 'r', long)]
        rate: Option<f64>,
        /// evaluate against this instant instead of the clock
        #[clap(long)]
        now: Option<String>,
        /// how to read timestamps without a timezone marker
        #[clap(long, value_enum)]
        assume: Option<Assume>,
        /// print json instead of text
        #[clap(long)]
        json: bool,
    },
    /// live view of an active session, updated every second (q/esc to stop)
    Watch {
        /// session start timestamp as sent by the backend
        start: String,
        /// hourly rate (falls back to the saved default)
        #[clap(short = 'r', long)]
        rate: Option<f64>,
        /// how to read timestamps without a timezone marker
        #[clap(long, value_enum)]
        assume: Option<Assume>,
    },
    /// inspect or change saved preferences
    Config {
        #[clap(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum ConfigAction {
    /// print the current settings as json
    Show,
    /// print the settings file location
    Path,
    /// remember a default hourly rate
    SetRate { rate: f64 },
    /// forget the default hourly rate
    ClearRate,
    /// remember how to read timestamps without a timezone marker
    SetTimezone {
        #[clap(value_enum)]
        assume: Assume,
    },
    /// restore all defaults
    Reset,
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Assume {
    Utc,
    Local,
    Reject,
}

impl Assume {
    fn as_policy(&self) -> TimezonePolicy {
        match self {
            Assume::Utc => TimezonePolicy::AssumeUtc,
            Assume::Local => TimezonePolicy::AssumeLocal,
            Assume::Reject => TimezonePolicy::Reject,
        }
    }
}

impl Cli {
    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }
}

fn resolve_policy(cfg: &Config, assume: Option<Assume>) -> TimezonePolicy {
    assume
        .map(|a| a.as_policy())
        .unwrap_or(cfg.timezone_policy)
}

fn render_level(info: &LevelInfo) -> String {
    let percent = info.display_progress();
    format!(
        "Level {} {} {}%  {}/{} XP  ({} XP to next level)",
        info.level,
        progress_bar(percent, BAR_WIDTH),
        percent,
        info.display_current_xp(),
        info.next_level_xp,
        info.display_xp_to_next_level(),
    )
}

fn render_session(snapshot: &SessionSnapshot) -> String {
    format!("{}  earned {}", snapshot.duration, snapshot.earned_display())
}

fn main() {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let store = cli.config_store();
    let cfg = store.load();

    match cli.command.clone() {
        Command::Level {
            level,
            total_xp,
            json,
        } => {
            let info = compute_level_info(level, total_xp);
            if json {
                println!("{}", serde_json::to_string(&info)?);
            } else {
                println!("{}", render_level(&info));
            }
        }
        Command::Session {
            start,
            rate,
            now,
            assume,
            json,
        } => {
            let policy = resolve_policy(&cfg, assume);
            let now = match now {
                Some(ts) => parse_timestamp(&ts, policy)?,
                None => chrono::Utc::now(),
            };
            let snapshot = elapsed_snapshot(&start, now, cfg.hourly_rate_or(rate), policy)?;
            if json {
                println!("{}", serde_json::to_string(&snapshot)?);
            } else {
                println!("{}", render_session(&snapshot));
            }
        }
        Command::Watch {
            start,
            rate,
            assume,
        } => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }

            let session = ActiveSession::new(start, cfg.hourly_rate_or(rate));
            let timer = SessionTimer::new(session, resolve_policy(&cfg, assume));
            watch(timer)?;
        }
        Command::Config { action } => run_config(&store, cfg, action)?,
    }

    Ok(())
}

fn watch(mut timer: SessionTimer) -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;

    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::default());
    let mut stdout = io::stdout();
    let result = run_session_timer(&runner, &mut timer, &SystemClock, |snapshot| {
        let line = match snapshot {
            Some(s) => render_session(s),
            None => "--:--:--  waiting for a valid start time".to_string(),
        };
        queue!(
            stdout,
            MoveToColumn(0),
            Clear(ClearType::CurrentLine),
            Print(line)
        )?;
        stdout.flush()
    });

    disable_raw_mode()?;
    println!();

    let summary = result?;
    log::info!("watched session for {} ticks", summary.ticks);
    Ok(())
}

fn run_config(
    store: &FileConfigStore,
    mut cfg: Config,
    action: ConfigAction,
) -> Result<(), Box<dyn Error>> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            return Ok(());
        }
        ConfigAction::Path => {
            println!("{}", store.path().display());
            return Ok(());
        }
        ConfigAction::SetRate { rate } => cfg.default_hourly_rate = Some(rate),
        ConfigAction::ClearRate => cfg.default_hourly_rate = None,
        ConfigAction::SetTimezone { assume } => cfg.timezone_policy = assume.as_policy(),
        ConfigAction::Reset => cfg = Config::default(),
    }

    store.save(&cfg)?;
    Ok(())
}
