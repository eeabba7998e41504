use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use sarlog_core::storage::codec::{FILE_MAGIC_SIZE, ReadMode, read_frame};
use sarlog_core::storage::{
    FileHeader, FileMagic, Record, RecordKind, Sample, SessionReader, StoreError,
};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sarlog-dump", about = "Inspect sarlog data files", version)]
struct Cli {
    /// Data file written by sarlogd
    path: PathBuf,

    /// Output as JSON (one object per line)
    #[arg(long)]
    json: bool,
}

#[derive(Debug)]
enum DumpError {
    Store(StoreError),
    Io(io::Error),
}

impl DumpError {
    fn exit_code(&self) -> i32 {
        match self {
            DumpError::Store(e) => e.exit_code(),
            DumpError::Io(_) => 2,
        }
    }
}

impl std::fmt::Display for DumpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpError::Store(e) => write!(f, "{}", e),
            DumpError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl From<StoreError> for DumpError {
    fn from(e: StoreError) -> Self {
        DumpError::Store(e)
    }
}

impl From<io::Error> for DumpError {
    fn from(e: io::Error) -> Self {
        DumpError::Io(e)
    }
}

impl From<serde_json::Error> for DumpError {
    fn from(e: serde_json::Error) -> Self {
        DumpError::Io(e.into())
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(if e.use_stderr() { 1 } else { 0 });
        }
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match dump(&cli.path, cli.json, &mut out).and_then(|()| Ok(out.flush()?)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(DumpError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sarlog-dump: {}: {}", cli.path.display(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn fmt_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn kind_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Normal => "NORMAL",
        RecordKind::Restart => "RESTART",
        RecordKind::Comment => "COMMENT",
        RecordKind::EndOfRotation => "END-OF-ROTATION",
    }
}

// ── Record summaries ─────────────────────────────────────────────────────────

/// Entities in use in one sample: slots that carry data, not the
/// preallocated free ones.
#[derive(Serialize, Debug, Default, PartialEq)]
struct InUse {
    cpus: usize,
    irqs: usize,
    serials: usize,
    irqcpus: usize,
    ifaces: usize,
    disks: usize,
}

impl InUse {
    fn of(sample: &Sample) -> Self {
        Self {
            cpus: sample.cpus.iter().filter(|c| !c.is_zero()).count(),
            irqs: sample.irqs.iter().filter(|i| i.count > 0).count(),
            serials: sample.serials.iter().filter(|s| !s.is_free()).count(),
            irqcpus: sample
                .irqcpus
                .first()
                .map_or(0, |row| row.iter().filter(|e| !e.is_free()).count()),
            ifaces: sample.ifaces.iter().filter(|i| !i.is_free()).count(),
            disks: sample.disks.iter().filter(|d| !d.is_free()).count(),
        }
    }
}

#[derive(Serialize, Debug)]
struct RecordSummary {
    index: u64,
    #[serde(rename = "type")]
    kind: &'static str,
    time: String,
    epoch: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    in_use: Option<InUse>,
}

impl RecordSummary {
    fn new(index: u64, record: &Record, sample: &Sample) -> Self {
        let time = record.time();
        Self {
            index,
            kind: kind_name(record.kind()),
            time: time.clock(),
            epoch: time.epoch,
            comment: match record {
                Record::Comment(_, text) => Some(text.clone()),
                _ => None,
            },
            in_use: record.is_extended().then(|| InUse::of(sample)),
        }
    }
}

#[derive(Serialize)]
struct HeaderSummary<'a> {
    path: &'a Path,
    magic: &'a FileMagic,
    version: String,
    activities: Vec<&'static str>,
    header: &'a FileHeader,
}

// ── Dump ─────────────────────────────────────────────────────────────────────

fn read_magic(path: &Path) -> Result<FileMagic, StoreError> {
    let mut file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut buf = [0u8; FILE_MAGIC_SIZE];
    read_frame(&mut file, &mut buf, ReadMode::Hard, "file magic", path)?;
    Ok(FileMagic::decode(&buf))
}

fn dump(path: &Path, json: bool, out: &mut impl Write) -> Result<(), DumpError> {
    let magic = read_magic(path)?;
    let mut reader = SessionReader::open(path)?;
    let header = reader.header().clone();

    if json {
        let summary = HeaderSummary {
            path,
            magic: &magic,
            version: magic.version_string(),
            activities: header.activities.names(),
            header: &header,
        };
        serde_json::to_writer(&mut *out, &summary)?;
        writeln!(out)?;
    } else {
        print_header(out, path, &magic, &header)?;
    }

    let mut sample = Sample::with_counts(&header.counts);
    let mut index = 0;
    while let Some(record) = reader.next_record(&mut sample)? {
        let summary = RecordSummary::new(index, &record, &sample);
        if json {
            serde_json::to_writer(&mut *out, &summary)?;
            writeln!(out)?;
        } else {
            print_record(out, &summary)?;
        }
        index += 1;
    }
    if !json {
        writeln!(out, "{} records", index)?;
    }
    Ok(())
}

fn print_header(
    out: &mut impl Write,
    path: &Path,
    magic: &FileMagic,
    header: &FileHeader,
) -> io::Result<()> {
    let c = &header.counts;
    let host = &header.host;
    writeln!(out, "File:       {}", path.display())?;
    writeln!(
        out,
        "Magic:      {:#06x} format {:#06x}, written by version {}",
        magic.magic,
        magic.format_magic,
        magic.version_string()
    )?;
    writeln!(
        out,
        "Host:       {} {} ({}) {}",
        host.sysname, host.release, host.nodename, host.machine
    )?;
    writeln!(
        out,
        "Created:    {:04}-{:02}-{:02} ({} UTC)",
        1900 + header.year as u32,
        header.month,
        header.day,
        fmt_ts(header.time)
    )?;
    writeln!(out, "HZ:         {}", header.hz)?;
    writeln!(out, "Record:     {} bytes", header.stat_size)?;
    writeln!(out, "Activities: {}", header.activities.names().join(","))?;
    writeln!(
        out,
        "Counts:     cpu={} irq={} irqcpu={} serial={} iface={} disk={}",
        c.cpu_nr, c.irq_nr, c.irqcpu_nr, c.serial_nr, c.iface_nr, c.disk_nr
    )?;
    writeln!(out)?;
    writeln!(
        out,
        "{:>6}  {:<16}{:<10}{:>12}  {}",
        "#", "TYPE", "TIME", "EPOCH", "CONTENT"
    )
}

fn print_record(out: &mut impl Write, r: &RecordSummary) -> io::Result<()> {
    let content = match (&r.in_use, &r.comment) {
        (Some(n), _) => format!(
            "cpus={} irqs={} serials={} irqcpus={} ifaces={} disks={}",
            n.cpus, n.irqs, n.serials, n.irqcpus, n.ifaces, n.disks
        ),
        (None, Some(text)) => format!("{:?}", text),
        (None, None) => String::new(),
    };
    writeln!(
        out,
        "{:>6}  {:<16}{:<10}{:>12}  {}",
        r.index, r.kind, r.time, r.epoch, content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sarlog_core::storage::{
        Activities, DomainCounts, FileSpec, RecordTime, SessionWriter, StoreOptions,
    };
    use sarlog_core::util::HostIdentity;

    const T0: i64 = 1_700_049_600;

    fn write_file(path: &Path) {
        let counts = DomainCounts {
            cpu_nr: 2,
            disk_nr: 2,
            ..Default::default()
        };
        let spec = FileSpec {
            activities: Activities::CPU | Activities::DISK,
            counts,
            hz: 100,
            host: HostIdentity {
                sysname: "Linux".into(),
                release: "6.1.0".into(),
                nodename: "db1".into(),
                machine: "x86_64".into(),
            },
        };
        let mut writer =
            SessionWriter::open(Some(path.to_path_buf()), None, spec, StoreOptions::default(), T0)
                .unwrap();

        let mut sample = Sample::with_counts(&counts);
        sample.stat.time = RecordTime::from_epoch(T0);
        sample.cpus[0].user = 10;
        sample.disks[0].reset_to(8, 0);
        writer
            .write(&Record::Normal(sample.stat), &sample)
            .unwrap();
        writer
            .write(
                &Record::Comment(RecordTime::from_epoch(T0 + 1), "note".into()),
                &Sample::default(),
            )
            .unwrap();
        writer
            .write(&Record::Restart(RecordTime::from_epoch(T0 + 2)), &Sample::default())
            .unwrap();
    }

    fn dump_to_string(path: &Path, json: bool) -> String {
        let mut out = Vec::new();
        dump(path, json, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn text_dump_lists_header_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa14");
        write_file(&path);

        let text = dump_to_string(&path, false);
        assert!(text.contains("Host:       Linux 6.1.0 (db1) x86_64"));
        assert!(text.contains("Activities: cpu,disk"));
        assert!(text.contains("Counts:     cpu=2 irq=0 irqcpu=0 serial=0 iface=0 disk=2"));
        assert!(text.contains("NORMAL"));
        assert!(text.contains("cpus=1 irqs=0 serials=0 irqcpus=0 ifaces=0 disks=1"));
        assert!(text.contains("\"note\""));
        assert!(text.contains("RESTART"));
        assert!(text.ends_with("3 records\n"));
    }

    #[test]
    fn json_dump_is_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa14");
        write_file(&path);

        let text = dump_to_string(&path, true);
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["header"]["hz"], 100);
        assert_eq!(lines[0]["magic"]["magic"], 0xd596);
        assert_eq!(lines[1]["type"], "NORMAL");
        assert_eq!(lines[1]["in_use"]["disks"], 1);
        assert_eq!(lines[2]["comment"], "note");
        assert!(lines[3].get("in_use").is_none());
    }

    #[test]
    fn foreign_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk");
        std::fs::write(&path, vec![0x42u8; 512]).unwrap();

        let err = dump(&path, false, &mut Vec::new()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
