//! timekeeper CLI Entry Point
//!
//! Times a single command as one region of a run, with host sampling and the
//! configured writers.
//!
//! # Usage
//!
//! ```bash
//! # Time a command with the console report
//! timekeeper -- cargo test --release
//!
//! # Load settings from YAML and write results to a directory
//! timekeeper --config timekeeper.yaml --output results/ -- ./bench.sh
//!
//! # Post results and sample every second
//! timekeeper --post http://perf.example.com/api --interval 1 -- make check
//! ```

use std::env;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use colored::Colorize;
use log::{error, info, warn};

use timekeeper::keeper::{load_config, KeeperConfig, PostConfig, TimeKeeper};
use timekeeper::{APP_NAME, VERSION};

/// Exit code used when the command could not be run at all.
const LAUNCH_FAILURE: u8 = 127;

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    config_path: Option<PathBuf>,
    interval_secs: Option<f64>,
    no_monitor: bool,
    output: Option<PathBuf>,
    post_url: Option<String>,
    name: Option<String>,
    test_version: i64,
    verbose: bool,
    command: Vec<String>,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Wall-clock timing for test runs");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: timekeeper [OPTIONS] -- <COMMAND> [ARGS...]");
    println!();
    println!("Arguments:");
    println!("  <COMMAND> [ARGS...]  Command to run as one timed region");
    println!();
    println!("Options:");
    println!("  --config PATH        Load settings from a YAML file");
    println!("  --interval SECS      Seconds between host samples");
    println!("  --no-monitor         Disable host sampling");
    println!("  --output PATH        Write results to a file or directory");
    println!("  --post URL           Post results to an HTTP endpoint");
    println!("  --name NAME          Timer name (default: the command)");
    println!("  --test-version N     Timer version (default: 0)");
    println!("  --verbose            Enable debug logging");
    println!("  --help               Show this help message");
    println!("  --version            Show version information");
    println!();
    println!("Examples:");
    println!("  timekeeper -- cargo test");
    println!("  timekeeper --output results/ --interval 1 -- ./bench.sh");
}

/// Returns the value following an option, advancing the cursor.
fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--no-monitor" => config.no_monitor = true,
            "--verbose" | "-v" => config.verbose = true,
            "--config" => {
                config.config_path = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--output" => {
                config.output = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--post" => {
                config.post_url = Some(option_value(args, &mut i, arg)?.to_string());
            }
            "--name" => {
                config.name = Some(option_value(args, &mut i, arg)?.to_string());
            }
            "--interval" => {
                let value = option_value(args, &mut i, arg)?;
                config.interval_secs = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid interval value: {}", value))?,
                );
            }
            "--test-version" => {
                let value = option_value(args, &mut i, arg)?;
                config.test_version = value
                    .parse()
                    .map_err(|_| format!("Invalid version value: {}", value))?;
            }
            "--" => {
                config.command = args[i + 1..].to_vec();
                break;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                // First positional starts the command
                config.command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }

    if config.command.is_empty() {
        return Err("No command given".to_string());
    }

    Ok(config)
}

/// Builds run settings from the optional file plus flag overrides.
fn keeper_config(config: &Config) -> Result<KeeperConfig, Box<dyn std::error::Error>> {
    let mut settings = match &config.config_path {
        Some(path) => load_config(path)?,
        None => KeeperConfig::default(),
    };

    if let Some(interval) = config.interval_secs {
        settings.monitor.interval_secs = interval;
    }
    if config.no_monitor {
        settings.monitor.enabled = false;
    }
    if let Some(path) = &config.output {
        settings.output.file = Some(path.clone());
    }
    if let Some(url) = &config.post_url {
        settings.output.post = Some(PostConfig::new(url));
    }

    settings.validate()?;
    Ok(settings)
}

/// Runs the command under a timer. Returns its exit code.
fn run_timed(keeper: &TimeKeeper, config: &Config) -> Result<u8, Box<dyn std::error::Error>> {
    let program = &config.command[0];
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| config.command.join(" "));

    let timer = keeper.get_timer(name, config.test_version);
    timer.note("command", config.command.join(" "));

    info!("Running: {}", config.command.join(" "));
    timer.start()?;
    let status = Command::new(program).args(&config.command[1..]).status();
    timer.stop();

    let code = match status {
        Ok(status) => {
            // Killed by a signal: no code
            let code = status.code().unwrap_or(1);
            timer.note("exit_code", code);
            u8::try_from(code).unwrap_or(1)
        }
        Err(e) => {
            error!("Failed to run '{}': {}", program, e);
            timer.note("error", e.to_string());
            LAUNCH_FAILURE
        }
    };

    let runtime = timer.runtime_us().unwrap_or_default();
    if code == 0 {
        println!("{} {} ({} us)", "✓".green(), program.bold(), runtime);
    } else {
        println!(
            "{} {} exited with {} ({} us)",
            "✗".red(),
            program.bold(),
            code,
            runtime
        );
    }

    Ok(code)
}

/// Main application entry point.
fn run() -> Result<u8, Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let keeper = TimeKeeper::new(keeper_config(&config)?);

    if let Err(e) = keeper.start_monitor() {
        warn!("Monitoring disabled: {}", e);
    }

    let code = run_timed(&keeper, &config)?;

    if let Err(e) = keeper.finalize() {
        warn!("{}", e);
    }

    println!();
    keeper.write_report(&mut std::io::stdout())?;

    Ok(code)
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
