//! sarlog - System activity reporter.
//!
//! Prints rates and levels computed from pairs of samples, read from a data
//! file, from the collector's stream on standard input, or collected live.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, warn};
use tracing_subscriber::EnvFilter;

use sarlog_core::collector::{Collector, RealFs};
use sarlog_core::provider::{HistoryProvider, LiveProvider, SampleProvider};
use sarlog_core::report::{OutputFormat, ReportError, ReportOptions, Reporter};
use sarlog_core::select::Selection;
use sarlog_core::storage::Activities;

/// System activity reporter.
#[derive(Parser, Debug)]
#[command(name = "sarlog", about = "System activity reporter", version)]
struct Args {
    /// Seconds between live reports. Omitted or 0 without -f: one report
    /// covering the time since boot.
    interval: Option<u64>,

    /// Number of reports.
    count: Option<u64>,

    /// Read samples from a data file (`-` for the collector's stream on
    /// standard input) instead of collecting live.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// CPU utilisation (the default when nothing else is selected).
    #[arg(short = 'u')]
    cpu: bool,

    /// Per-CPU rows for the listed processors (e.g. `0,2-3` or `ALL`).
    #[arg(short = 'P', value_name = "LIST")]
    cpus: Option<Selection>,

    /// Interrupt rates; per-IRQ rows for the listed lines (`SUM` for the
    /// total only).
    #[arg(short = 'I', value_name = "LIST")]
    irqs: Option<String>,

    /// Task creation and context switches.
    #[arg(short = 'w')]
    pcsw: bool,

    /// Paging.
    #[arg(short = 'B')]
    paging: bool,

    /// Swapping.
    #[arg(short = 'W')]
    swapping: bool,

    /// Memory and swap space usage.
    #[arg(short = 'r')]
    memory: bool,

    /// Network interfaces.
    #[arg(short = 'n')]
    network: bool,

    /// Block devices.
    #[arg(short = 'd')]
    disks: bool,

    /// Every activity, all CPUs and all IRQs.
    #[arg(short = 'A')]
    all: bool,

    /// Additional activities by name (comma-separated, as in sarlogd -S).
    #[arg(short = 'S', long, value_parser = Activities::parse_list)]
    activities: Option<Activities>,

    /// Print `host;interval;timestamp;item;field;value` lines.
    #[arg(long)]
    delimited: bool,

    /// Report partitions as well as whole disks (live mode).
    #[arg(long)]
    partitions: bool,

    /// Path to /proc filesystem (live mode).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Path to /sys filesystem (live mode).
    #[arg(long, default_value = "/sys")]
    sys_path: String,

    /// Increase logging verbosity (-v for info, -vv for debug). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn report_options(&self) -> Result<ReportOptions, String> {
        let mut activities = self.activities.unwrap_or(Activities::empty());
        let flags = [
            (self.cpu || self.cpus.is_some(), Activities::CPU),
            (self.irqs.is_some(), Activities::IRQ),
            (self.pcsw, Activities::PCSW),
            (self.paging, Activities::PAGE),
            (self.swapping, Activities::SWAP),
            (self.memory, Activities::MEMORY),
            (self.network, Activities::NET_DEV),
            (self.disks, Activities::DISK),
            (self.all, Activities::ALL),
        ];
        for (set, flag) in flags {
            if set {
                activities.insert(flag);
            }
        }
        if activities.is_empty() {
            activities = Activities::CPU;
        }

        let irqs = match self.irqs.as_deref() {
            None if self.all => Some(Selection::All),
            None => None,
            Some(list) if list.eq_ignore_ascii_case("sum") => None,
            Some(list) => Some(list.parse::<Selection>()?),
        };
        let cpus = match &self.cpus {
            None if self.all => Some(Selection::All),
            other => other.clone(),
        };

        Ok(ReportOptions {
            activities,
            cpus,
            irqs,
            format: if self.delimited {
                OutputFormat::Delimited
            } else {
                OutputFormat::Text
            },
            count: self.count.filter(|&n| n > 0),
        })
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is WARN: the report itself goes to standard output.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["sarlog", "sarlog_core"] {
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

fn report_history(
    reporter: &mut Reporter<impl io::Write>,
    path: &Path,
    options: &ReportOptions,
) -> Result<(), ReportError> {
    let mut provider: Box<dyn SampleProvider> = if path == Path::new("-") {
        Box::new(HistoryProvider::from_reader(
            BufReader::new(io::stdin()),
            Path::new("-"),
        )?)
    } else {
        Box::new(HistoryProvider::open(path)?)
    };
    let missing = Activities::from_bits_truncate(
        options.activities.bits() & !provider.header().activities.bits(),
    );
    if !missing.is_empty() {
        warn!(activities = ?missing.names(), "not recorded in this file");
    }
    let reports = reporter.run(provider.as_mut())?;
    debug!(reports, "done");
    Ok(())
}

fn report_live(
    reporter: &mut Reporter<impl io::Write>,
    args: &Args,
    options: &ReportOptions,
) -> Result<(), ReportError> {
    let collector = Collector::new(RealFs::new(), &args.proc_path, &args.sys_path)
        .with_partitions(args.partitions);
    let interval = Duration::from_secs(args.interval.unwrap_or(0));
    let mut provider = LiveProvider::new(collector, options.activities, interval);

    if interval.is_zero() {
        return reporter.since_boot(&mut provider);
    }

    let shutdown = provider.shutdown_flag();
    if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }
    reporter.run(&mut provider)?;
    Ok(())
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

    let options = match args.report_options() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("sarlog: {}", message);
            return ExitCode::from(1);
        }
    };

    let mut reporter = Reporter::new(BufWriter::new(io::stdout()), options.clone());
    let result = match &args.file {
        Some(path) => report_history(&mut reporter, path, &options),
        None => report_live(&mut reporter, &args, &options),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        // The reader of our output went away.
        Err(ReportError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sarlog: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
