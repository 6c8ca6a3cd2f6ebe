//! SPDK Bridge CLI Application
//!
//! Command-line front-end for the spdk-bridge library. It adds:
//! - A host log sink (built-in, or loaded from a shared library)
//! - Admin command runs against a loopback channel
//! - TOML-driven runs combining both
//! - Text and JSON completion reports

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use spdk_bridge::{bridge_log, BridgeLogger, LogLevel};
use std::path::PathBuf;

mod admin;
mod callbacks;
mod config;
mod report;

use admin::AdminRunner;
use callbacks::SinkSource;
use config::{ChannelConfig, CommandConfig, OutputFormat};

/// SPDK Bridge - Drive the log trampoline and admin passthrough path
#[derive(Parser, Debug)]
#[command(name = "bridgectl")]
#[command(about = "Exercise the SPDK bridge log trampoline and admin passthrough", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Shared library exporting the host log callback (default: built-in sink)
    #[arg(long, value_name = "FILE", global = true)]
    sink_lib: Option<PathBuf>,

    /// Symbol name of the callback inside --sink-lib
    #[arg(long, value_name = "NAME", global = true, default_value = "bridge_host_log")]
    sink_symbol: String,

    /// Report format
    #[arg(long, value_enum, global = true)]
    format: Option<OutputFormat>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Emit messages through the log trampoline
    Log {
        /// Message text
        #[arg(required = true)]
        message: Vec<String>,

        /// Engine log level (error, warn, notice, info, debug)
        #[arg(short, long, default_value = "notice")]
        level: LogLevel,

        /// How many times to emit the message
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Worker threads emitting concurrently (default: one per core)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Send admin commands to a loopback channel and report completions
    Admin {
        /// Commands: identify, keep-alive, snapshot, or a raw opcode (0xC1)
        #[arg(required = true, value_parser = parse_command)]
        commands: Vec<CommandConfig>,

        /// Device name to open
        #[arg(short, long, default_value = "nvme0n1")]
        device: String,

        /// Open the device read-write
        #[arg(long)]
        writable: bool,

        /// Request slots in the channel's pool
        #[arg(long, default_value_t = 32)]
        pool_size: usize,
    },

    /// Run the messages and commands listed in a config file
    Run {
        /// Path to configuration file (config.toml)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
}

fn parse_command(s: &str) -> std::result::Result<CommandConfig, String> {
    match s {
        "identify" => Ok(CommandConfig::Identify),
        "keep-alive" => Ok(CommandConfig::KeepAlive),
        "snapshot" => Ok(CommandConfig::Snapshot),
        other => {
            let digits = other.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(digits, 16)
                .map(|opcode| CommandConfig::Custom {
                    opcode,
                    cdw10: 0,
                    cdw11: 0,
                })
                .map_err(|_| format!("unknown command '{}'", other))
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let sink = match &args.sink_lib {
        Some(path) => SinkSource::Library {
            path: path.clone(),
            symbol: args.sink_symbol.clone(),
        },
        None => SinkSource::Builtin,
    };

    match &args.command {
        Some(Command::Log {
            message,
            level,
            repeat,
            threads,
        }) => {
            init_logging(args.verbose, args.quiet);
            callbacks::install(&sink)?;
            log_mode(*level, &message.join(" "), *repeat, *threads)
        }
        Some(Command::Admin {
            commands,
            device,
            writable,
            pool_size,
        }) => {
            init_logging(args.verbose, args.quiet);
            callbacks::install(&sink)?;
            let channel = ChannelConfig {
                id: 0,
                pool_size: *pool_size,
                device: device.clone(),
                writable: *writable,
            };
            admin_mode(&channel, commands, args.format.unwrap_or_default())
        }
        Some(Command::Run { config }) => config_mode(config, &args, sink),
        None => {
            // No arguments - show help
            println!("SPDK Bridge - No command specified");
            println!("\nQuick Start:");
            println!("  bridgectl log --level notice \"hello from the host\"");
            println!("  bridgectl admin identify keep-alive 0xC1");
            println!("\nFor scripted runs:");
            println!("  bridgectl run --config config.toml");
            println!("\nUse --help for more options");
            Ok(())
        }
    }
}

/// Emit `message` `repeat` times, spread over a thread pool
fn log_mode(level: LogLevel, message: &str, repeat: usize, threads: Option<usize>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or(0))
        .build()
        .context("Failed to build log thread pool")?;

    log::debug!(
        "Emitting {} message(s) at {} on {} thread(s)",
        repeat,
        level,
        pool.current_num_threads()
    );

    pool.install(|| {
        (0..repeat).into_par_iter().for_each(|i| {
            if repeat == 1 {
                bridge_log!(level, "{}", message);
            } else {
                bridge_log!(level, "{} ({}/{})", message, i + 1, repeat);
            }
        })
    });
    Ok(())
}

fn admin_mode(channel: &ChannelConfig, commands: &[CommandConfig], format: OutputFormat) -> Result<()> {
    let report = AdminRunner::new(channel).run(commands)?;
    println!("{}", report::render(&report, format)?);

    if report.failed() > 0 {
        log::warn!("{} of {} command(s) failed", report.failed(), report.completions.len());
    }
    Ok(())
}

/// Config mode - log messages first, then the admin commands
fn config_mode(config_path: &PathBuf, args: &Args, sink: SinkSource) -> Result<()> {
    let config = config::load_config(config_path)?;

    // the command line overrides the config file's library
    let sink = match (sink, &config.logging.library) {
        (SinkSource::Builtin, Some(path)) => SinkSource::Library {
            path: path.clone(),
            symbol: config.logging.symbol.clone(),
        },
        (sink, _) => sink,
    };
    callbacks::install(&sink)?;

    if config.logging.forward {
        BridgeLogger::new(&config.bridge_config())
            .init()
            .context("Failed to install bridge logger")?;
    } else {
        init_logging(args.verbose, args.quiet);
    }
    log::info!("Configuration loaded from: {:?}", config_path);
    log::info!("Using bridge library v{}", spdk_bridge::VERSION);

    for message in &config.logging.messages {
        bridge_log!(config.logging.max_level, "{}", message);
    }

    if config.commands.is_empty() {
        log::info!("No [[commands]] in {:?}", config_path);
        return Ok(());
    }

    let format = args.format.unwrap_or(config.output.format);
    admin_mode(&config.channel, &config.commands, format)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
