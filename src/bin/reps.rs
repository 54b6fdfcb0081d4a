//! reps CLI - Command-line interface for repcount
//!
//! Commands:
//! - count: Count reps from a keypoint or angle stream and record the session
//! - today: Show today's totals and goal progress
//! - report: Totals by day, week, or month
//! - latest: Show the most recent sessions
//! - profiles: Print the effective counter configuration
//! - doctor: Diagnose configuration and ledger health

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use log::warn;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use repcount::ledger::DailyLedger;
use repcount::pipeline::{SessionRunner, StreamFormat};
use repcount::report::{build_report, Interval};
use repcount::session::LogNotifier;
use repcount::types::ExerciseKind;
use repcount::{CounterConfig, RepError, DEFAULT_LEDGER_FILE, REPCOUNT_VERSION};

/// reps - Repetition counting for pose joint-angle streams
#[derive(Parser)]
#[command(name = "reps")]
#[command(version = REPCOUNT_VERSION)]
#[command(about = "Count exercise repetitions from pose keypoints", long_about = None)]
struct Cli {
    /// Ledger file holding one line per finished session
    #[arg(long, global = true, default_value = DEFAULT_LEDGER_FILE)]
    ledger: PathBuf,

    /// Counter configuration (JSON); built-in profiles when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count reps from a stream and append the session to the ledger
    Count {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "keypoints")]
        input_format: InputFormat,

        /// Exercises to track (comma-separated)
        #[arg(long, default_value = "push_up,squat,sit_up")]
        exercises: String,

        /// Hysteresis margin in degrees (overrides the config)
        #[arg(long)]
        margin: Option<f64>,

        /// Use the margin tuned for recorded video
        #[arg(long, conflicts_with = "margin")]
        recorded: bool,

        /// Count without writing to the ledger
        #[arg(long)]
        dry_run: bool,

        /// Do not flush output after each event
        #[arg(long)]
        no_flush: bool,
    },

    /// Show today's totals and goal progress
    Today {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Totals by interval
    Report {
        /// Interval to bucket by
        #[arg(long, value_enum, default_value = "today")]
        interval: ReportInterval,

        /// Anchor date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent sessions
    Latest {
        /// Number of sessions to show
        #[arg(short, default_value = "2")]
        n: usize,
    },

    /// Print the effective counter configuration as JSON
    Profiles,

    /// Diagnose configuration and ledger health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// One frame of COCO keypoints per line
    Keypoints,
    /// One object of pre-computed angles per line
    Angles,
}

#[derive(Clone, ValueEnum)]
enum ReportInterval {
    /// The anchor date
    Today,
    /// Each Monday-to-Sunday week of the anchor's month
    Weeks,
    /// Each month of the anchor's year
    Months,
}

impl From<InputFormat> for StreamFormat {
    fn from(value: InputFormat) -> Self {
        match value {
            InputFormat::Keypoints => StreamFormat::Keypoints,
            InputFormat::Angles => StreamFormat::Angles,
        }
    }
}

impl From<ReportInterval> for Interval {
    fn from(value: ReportInterval) -> Self {
        match value {
            ReportInterval::Today => Interval::Today,
            ReportInterval::Weeks => Interval::WeeksOfMonth,
            ReportInterval::Months => Interval::MonthsOfYear,
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RepsCliError> {
    let ledger = DailyLedger::new(&cli.ledger);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Count {
            input,
            input_format,
            exercises,
            margin,
            recorded,
            dry_run,
            no_flush,
        } => {
            let config = load_config(config_path)?;
            let config = match (margin, recorded) {
                (Some(margin), _) => config.with_margin(margin),
                (None, true) => config.with_margin(repcount::config::RECORDED_VIDEO_MARGIN),
                (None, false) => config,
            };
            cmd_count(
                ledger,
                &config,
                &input,
                input_format.into(),
                &exercises,
                dry_run,
                !no_flush,
            )
        }

        Commands::Today { json } => cmd_today(&ledger, &load_config(config_path)?, json),

        Commands::Report {
            interval,
            date,
            json,
        } => cmd_report(&ledger, interval.into(), date, json),

        Commands::Latest { n } => cmd_latest(&ledger, n),

        Commands::Profiles => {
            println!("{}", load_config(config_path)?.to_json()?);
            Ok(())
        }

        Commands::Doctor { json } => cmd_doctor(&ledger, config_path, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<CounterConfig, RepsCliError> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            Ok(CounterConfig::from_json(&json)?)
        }
        None => Ok(CounterConfig::default()),
    }
}

fn parse_exercises(list: &str) -> Result<Vec<ExerciseKind>, RepsCliError> {
    let kinds = list
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<ExerciseKind>, RepError>>()?;

    if kinds.is_empty() {
        return Err(RepsCliError::NoExercises);
    }
    Ok(kinds)
}

fn cmd_count(
    ledger: DailyLedger,
    config: &CounterConfig,
    input: &Path,
    format: StreamFormat,
    exercises: &str,
    dry_run: bool,
    flush: bool,
) -> Result<(), RepsCliError> {
    let tracked = parse_exercises(exercises)?;
    config.validate()?;

    let reader: Box<dyn BufRead> = if input.to_string_lossy() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(fs::File::open(input)?))
    };

    let mut runner =
        SessionRunner::open_today(ledger, config, &tracked)?.with_notifier(LogNotifier);
    let mut stdout = io::stdout();

    let streamed = runner.observe_stream(reader, format, |event| {
        let json = serde_json::to_string(event).map_err(io::Error::from)?;
        writeln!(stdout, "{}", json)?;
        if flush {
            stdout.flush()?;
        }
        Ok(())
    });
    if let Err(e) = &streamed {
        warn!("Input stream ended early: {}", e);
    }

    // Reps counted before a stream failure still belong in the ledger
    let record = if dry_run {
        runner.discard()
    } else {
        runner.finish()?
    };

    eprintln!(
        "{} {}",
        if dry_run { "Counted (not recorded):" } else { "Recorded:" },
        record
    );

    let stats = streamed?;
    if stats.skipped > 0 {
        eprintln!("Skipped {} of {} input lines", stats.skipped, stats.lines);
    }
    stdout.flush()?;

    Ok(())
}

fn cmd_today(
    ledger: &DailyLedger,
    config: &CounterConfig,
    json: bool,
) -> Result<(), RepsCliError> {
    let today = Local::now().date_naive();
    let totals = ledger.load_totals_for(today);

    let rows: Vec<TodayRow> = totals
        .iter()
        .map(|(kind, total)| TodayRow {
            exercise: *kind,
            total: *total,
            goal: config.goal(*kind),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("Today ({})", today.format("%A %m/%d/%y"));
        println!("==================");
        for row in &rows {
            match row.goal {
                Some(goal) => println!(
                    "  {:<9} {} / {}",
                    row.exercise.ledger_label(),
                    row.total,
                    goal
                ),
                None => println!("  {:<9} {}", row.exercise.ledger_label(), row.total),
            }
        }
    }

    Ok(())
}

fn cmd_report(
    ledger: &DailyLedger,
    interval: Interval,
    date: Option<NaiveDate>,
    json: bool,
) -> Result<(), RepsCliError> {
    let anchor = date.unwrap_or_else(|| Local::now().date_naive());
    let records = ledger.records()?;
    let report = build_report(&records, interval, anchor);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for bucket in &report {
            let counts: Vec<String> = bucket
                .totals
                .iter()
                .map(|(kind, total)| format!("{} {}", total, kind.ledger_label()))
                .collect();
            println!("{:<26} {}", bucket.label, counts.join(", "));
        }
    }

    Ok(())
}

fn cmd_latest(ledger: &DailyLedger, n: usize) -> Result<(), RepsCliError> {
    let records = ledger.latest(n)?;

    if records.is_empty() {
        println!("No exercise data found. Time to hit the floor!");
        return Ok(());
    }

    let blocks: Vec<String> = records
        .iter()
        .map(|record| {
            let mut lines = vec![record
                .timestamp
                .format(repcount::ledger::LEDGER_TIME_FORMAT)
                .to_string()];
            lines.extend(
                record
                    .counts
                    .iter()
                    .map(|(kind, count)| format!("{} {}", count, kind.ledger_label())),
            );
            lines.join("\n")
        })
        .collect();

    println!("{}", blocks.join("\n\n"));
    Ok(())
}

fn cmd_doctor(
    ledger: &DailyLedger,
    config_path: Option<&Path>,
    json: bool,
) -> Result<(), RepsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("repcount version {}", REPCOUNT_VERSION),
    });

    checks.push(config_check(config_path));

    if ledger.path().exists() {
        match ledger.records() {
            Ok(records) => checks.push(DoctorCheck {
                name: "ledger".to_string(),
                status: CheckStatus::Ok,
                message: format!("Ledger readable ({} sessions)", records.len()),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "ledger".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read ledger: {}", e),
            }),
        }
    } else {
        checks.push(DoctorCheck {
            name: "ledger".to_string(),
            status: CheckStatus::Warning,
            message: format!("Ledger {} does not exist yet", ledger.path().display()),
        });
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: REPCOUNT_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("reps Doctor Report");
        println!("==================");
        println!("Version: {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RepsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn config_check(path: Option<&Path>) -> DoctorCheck {
    let (status, message) = match path {
        None => (CheckStatus::Ok, "Using built-in profiles".to_string()),
        Some(path) => match load_config(Some(path)) {
            Ok(config) => (
                CheckStatus::Ok,
                format!(
                    "Config {} is valid ({} profiles)",
                    path.display(),
                    config.profiles.len()
                ),
            ),
            Err(e) => (
                CheckStatus::Error,
                format!("Config {}: {}", path.display(), CliError::from(e).message),
            ),
        },
    };

    DoctorCheck {
        name: "config".to_string(),
        status,
        message,
    }
}

// Error types

#[derive(Debug)]
enum RepsCliError {
    Io(io::Error),
    Rep(RepError),
    Json(serde_json::Error),
    NoExercises,
    DoctorFailed,
}

impl From<io::Error> for RepsCliError {
    fn from(e: io::Error) -> Self {
        RepsCliError::Io(e)
    }
}

impl From<RepError> for RepsCliError {
    fn from(e: RepError) -> Self {
        RepsCliError::Rep(e)
    }
}

impl From<serde_json::Error> for RepsCliError {
    fn from(e: serde_json::Error) -> Self {
        RepsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RepsCliError> for CliError {
    fn from(e: RepsCliError) -> Self {
        match e {
            RepsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RepsCliError::Rep(e @ RepError::InvalidProfile(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'reps profiles' to see a valid configuration".to_string()),
            },
            RepsCliError::Rep(e @ RepError::LedgerWrite(_)) => CliError {
                code: "LEDGER_WRITE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("The session was not recorded; check the ledger path".to_string()),
            },
            RepsCliError::Rep(
                e @ (RepError::UnknownExercise(_) | RepError::UntrackedProfile(_)),
            ) => CliError {
                code: "EXERCISE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Known exercises: push_up, squat, sit_up".to_string()),
            },
            RepsCliError::Rep(e) => CliError {
                code: "REPCOUNT_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            RepsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RepsCliError::NoExercises => CliError {
                code: "NO_EXERCISES".to_string(),
                message: "No exercises selected".to_string(),
                hint: Some("Pass --exercises push_up,squat".to_string()),
            },
            RepsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct TodayRow {
    exercise: ExerciseKind,
    total: u32,
    goal: Option<u32>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
