//! sarlogd - System activity data collector.
//!
//! Samples kernel counters from /proc and /sys at a fixed interval and writes
//! them to a binary data file, a directory of daily files, and/or standard
//! output for a reporter reading the live stream.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use sarlog_core::collector::{Collector, RealFs};
use sarlog_core::sampler::{Sampler, SamplerConfig};
use sarlog_core::storage::{Activities, StoreOptions};

/// System activity data collector.
#[derive(Parser, Debug)]
#[command(name = "sarlogd", about = "System activity data collector", version)]
struct Args {
    /// Seconds between samples. Omitted or 0: write a single RESTART record
    /// (or the -C comment) and exit.
    interval: Option<u64>,

    /// Number of samples; unlimited when omitted.
    count: Option<u64>,

    /// Data file (or directory with --daily). `-` or omitted writes the
    /// binary stream to standard output.
    outfile: Option<String>,

    /// Insert a comment record.
    #[arg(short = 'C', long, value_name = "TEXT")]
    comment: Option<String>,

    /// Activities to collect (comma-separated: cpu, pcsw, irq, swap, paging,
    /// memory, ktables, sockets, queue, serial, irqcpu, netdev, disk, ALL).
    #[arg(short = 'S', long, default_value = "ALL", value_parser = Activities::parse_list)]
    activities: Activities,

    /// Truncate an existing data file whose layout does not match this
    /// machine instead of refusing to append.
    #[arg(short = 'F', long)]
    force: bool,

    /// Take an exclusive lock on the data file for every write.
    #[arg(short = 'L', long)]
    lock: bool,

    /// OUTFILE is a directory holding one `saDD` file per day, rotated at
    /// midnight.
    #[arg(short = 'D', long)]
    daily: bool,

    /// Also send the binary stream to standard output when writing a file.
    #[arg(long)]
    stdout: bool,

    /// Collect partitions as well as whole disks.
    #[arg(long)]
    partitions: bool,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Path to /sys filesystem (for testing/mocking).
    #[arg(long, default_value = "/sys")]
    sys_path: String,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Where ticks go.
#[derive(Debug, PartialEq)]
struct Outputs {
    file: Option<PathBuf>,
    stdout: bool,
}

impl Args {
    fn outputs(&self) -> Result<Outputs, String> {
        match self.outfile.as_deref() {
            None | Some("-") => {
                if self.daily {
                    return Err("--daily needs an output directory".to_string());
                }
                Ok(Outputs {
                    file: None,
                    stdout: true,
                })
            }
            Some(path) => Ok(Outputs {
                file: Some(PathBuf::from(path)),
                stdout: self.stdout,
            }),
        }
    }

    fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_secs(self.interval.unwrap_or(0)),
            count: self.count,
            comment: self.comment.clone(),
            activities: self.activities,
        }
    }

    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            force: self.force,
            lock: self.lock,
            daily: self.daily,
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
///
/// Logs always go to standard error: standard output may carry the binary
/// stream.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["sarlogd", "sarlog_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { 1 } else { 0 });
        }
    };
    init_logging(args.verbose, args.quiet);

    let outputs = match args.outputs() {
        Ok(outputs) => outputs,
        Err(message) => {
            eprintln!("sarlogd: {}", message);
            return ExitCode::from(1);
        }
    };

    info!(
        "sarlogd {} ({}) starting",
        env!("CARGO_PKG_VERSION"),
        sarlog_core::util::GIT_SHA
    );
    info!(
        interval = args.interval.unwrap_or(0),
        count = ?args.count,
        file = ?outputs.file,
        stdout = outputs.stdout,
        proc = %args.proc_path,
        "config"
    );

    let collector = Collector::new(RealFs::new(), &args.proc_path, &args.sys_path)
        .with_partitions(args.partitions);
    let stream: Option<Box<dyn Write + Send>> = if outputs.stdout {
        Some(Box::new(io::stdout()))
    } else {
        None
    };

    let mut sampler = match Sampler::new(
        collector,
        args.sampler_config(),
        outputs.file,
        stream,
        args.store_options(),
    ) {
        Ok(sampler) => sampler,
        Err(e) => {
            error!("{}", e);
            eprintln!("sarlogd: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    // Setup graceful shutdown
    let shutdown = sampler.shutdown_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        shutdown.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    match sampler.run() {
        Ok(()) => {
            info!(ticks = sampler.ticks(), "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(ticks = sampler.ticks(), "{}", e);
            eprintln!("sarlogd: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
