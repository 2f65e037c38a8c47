use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::PathBuf,
    process::ExitCode,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use unstamp::{
    progress::{completion_status, STATUS_CANCELLED_BY_USER, STATUS_FAILED},
    start_with,
    strip::display_name,
    CancellationFlag, CliOverrides, EncodingMode, FileProcessor, ProcessingHandle,
    ProcessingResult, TaskEvent, TaskOutcome, UnstampConfig, UnstampError,
};

type Result<T> = std::result::Result<T, UnstampError>;

const PROGRESS_STEPS: u64 = 1000;
const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "unstamp", author, version, about, long_about = None)]
struct Cli {
    /// Log file to strip in place
    file: PathBuf,

    /// Strip timestamps anywhere in a line, not only at its start
    #[arg(long, conflicts_with = "anchored")]
    anywhere: bool,

    /// Only strip a timestamp that begins the line (the default)
    #[arg(long)]
    anchored: bool,

    /// How to handle invalid UTF-8 sequences (failfast|lossy)
    #[arg(long)]
    encoding: Option<String>,

    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins if set
    #[arg(long)]
    log_level: Option<String>,

    /// Don't draw a progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Print the final counts as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn overrides(&self) -> Result<CliOverrides> {
        let anchored_to_start = if self.anywhere {
            Some(false)
        } else if self.anchored {
            Some(true)
        } else {
            None
        };
        let encoding_mode = self
            .encoding
            .as_deref()
            .map(str::parse::<EncodingMode>)
            .transpose()?;

        Ok(CliOverrides {
            anchored_to_start,
            encoding_mode,
            log_level: self.log_level.clone(),
        })
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = UnstampConfig::load_from(cli.config.as_deref())?.merge_with_cli(cli.overrides()?);
    init_logging(&config.log_level);

    let cancel = CancellationFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.cancel())
        .map_err(|e| UnstampError::config_error(format!("Failed to set Ctrl-C handler: {}", e)))?;

    info!(
        "Stripping {} (anchored: {})",
        cli.file.display(),
        config.anchored_to_start
    );
    let started = Instant::now();
    let handle = start_with(FileProcessor::from_config(&config), &cli.file, cancel)?;

    if cli.quiet {
        for _ in handle.events().iter() {}
    } else {
        show_progress(&handle);
    }

    let outcome = handle.wait();
    let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
    let file_name = display_name(&cli.file);

    match outcome {
        TaskOutcome::Completed(result) => {
            let status = completion_status(&file_name, &result);
            if result.files_changed {
                print_status(&status.green().to_string(), cli.json);
            } else {
                print_status(&status.yellow().to_string(), cli.json);
            }
            print_json(&result, cli.json);
            if !cli.quiet {
                eprintln!("Finished in {}", humantime::format_duration(elapsed));
            }
            Ok(ExitCode::SUCCESS)
        }
        TaskOutcome::Cancelled(result) => {
            print_status(&STATUS_CANCELLED_BY_USER.yellow().to_string(), cli.json);
            print_json(&result, cli.json);
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        TaskOutcome::Failed(e) => {
            print_status(&STATUS_FAILED.red().to_string(), cli.json);
            eprintln!("An error occurred: {}", e);
            Ok(ExitCode::from(EXIT_FAILED))
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn show_progress(handle: &ProcessingHandle) {
    let progress = ProgressBar::new(PROGRESS_STEPS);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    progress.set_message(handle.status());

    for event in handle.events().iter() {
        match event {
            TaskEvent::Progress(fraction) => {
                progress.set_position((fraction * PROGRESS_STEPS as f64).round() as u64)
            }
            TaskEvent::Status(status) => progress.set_message(status),
        }
    }

    progress.finish_and_clear();
}

/// Status goes to stdout, or to stderr when stdout carries JSON
fn print_status(status: &str, json: bool) {
    if json {
        eprintln!("{}", status);
    } else {
        println!("{}", status);
    }
}

fn print_json(result: &ProcessingResult, json: bool) {
    if !json {
        return;
    }
    match serde_json::to_string_pretty(result) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to serialize result: {}", e),
    }
}
