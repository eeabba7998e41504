//! Data file lifecycle: create or append, advisory locking, daily rotation,
//! and the optional live stream to a reporter.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{Datelike, Local, TimeZone};
use nix::errno::Errno;
use nix::fcntl::{FlockArg, flock};
use tracing::{debug, info, warn};

use super::codec::{
    FileHeader, Record, encode_tick, read_arrays, read_file_start, read_record, write_frame,
};
use super::error::StoreError;
use super::model::{Activities, DomainCounts, RecordTime, Sample};
use crate::util::HostIdentity;

const FILE_MODE: u32 = 0o644;
/// Attempts at closing a daily file whose lock another process holds.
const MARKER_ATTEMPTS: u32 = 3;
const MARKER_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Name of the daily data file for `epoch`: `saDD`, DD the local day of month.
pub fn daily_file_name(epoch: i64) -> String {
    let day = Local
        .timestamp_opt(epoch, 0)
        .earliest()
        .map_or(0, |dt| dt.day());
    format!("sa{day:02}")
}

/// How the output file is opened and maintained.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Truncate an existing file whose counts differ instead of appending.
    pub force: bool,
    /// Take an exclusive advisory lock around every write.
    pub lock: bool,
    /// The output path is a directory holding one `saDD` file per day.
    pub daily: bool,
}

/// What a new file header is built from.
#[derive(Debug, Clone)]
pub struct FileSpec {
    pub activities: Activities,
    pub counts: DomainCounts,
    pub hz: u32,
    pub host: HostIdentity,
}

impl FileSpec {
    fn header(&self, time: i64) -> FileHeader {
        FileHeader::new(
            self.activities,
            self.counts,
            self.hz,
            self.host.clone(),
            time,
        )
    }
}

/// Result of persisting one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The lock was held by someone else; the tick stays in memory only.
    SkippedLocked,
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

/// Tries to take the exclusive lock. `Ok(false)` when another holder has it.
fn try_lock(file: &File, path: &Path) -> Result<bool, StoreError> {
    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(true),
        Err(e) if e == Errno::EWOULDBLOCK => Ok(false),
        Err(e) => Err(StoreError::io(path, e.into())),
    }
}

fn unlock(file: &File, path: &Path) {
    if let Err(e) = flock(file.as_raw_fd(), FlockArg::Unlock) {
        warn!(path = %path.display(), error = %e, "failed to release lock");
    }
}

// ---------------------------------------------------------------------------
// Data file
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct DataFile {
    path: PathBuf,
    file: File,
    header: FileHeader,
    lock: bool,
}

impl DataFile {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// The lock is mandatory here: failing to take it is an error.
    fn open(
        path: &Path,
        spec: &FileSpec,
        options: &StoreOptions,
        now: i64,
    ) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .mode(FILE_MODE)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        if options.lock && !try_lock(&file, path)? {
            return Err(StoreError::Locked {
                path: path.to_path_buf(),
            });
        }
        let header = Self::prepare(&file, path, spec, options, now);
        if options.lock {
            unlock(&file, path);
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header: header?,
            lock: options.lock,
        })
    }

    /// Validates an existing header, or (re)writes a fresh one.
    fn prepare(
        file: &File,
        path: &Path,
        spec: &FileSpec,
        options: &StoreOptions,
        now: i64,
    ) -> Result<FileHeader, StoreError> {
        let len = file
            .metadata()
            .map_err(|e| StoreError::io(path, e))?
            .len();

        if len > 0 {
            match read_file_start(&mut &*file, path) {
                Ok(header) if options.daily && !header.same_day(now) => {
                    info!(path = %path.display(), "daily file is from another day, truncating");
                }
                Ok(header) if header.counts == spec.counts => {
                    info!(path = %path.display(), "appending to existing data file");
                    return Ok(header);
                }
                Ok(header) if options.force => {
                    warn!(
                        path = %path.display(),
                        file = ?header.counts,
                        live = ?spec.counts,
                        "domain counts differ, truncating file"
                    );
                }
                Ok(header) if header.counts.cpu_nr != spec.counts.cpu_nr => {
                    return Err(StoreError::CpuCountMismatch {
                        file: header.counts.cpu_nr,
                        live: spec.counts.cpu_nr,
                    });
                }
                Ok(header) => {
                    info!(
                        path = %path.display(),
                        file = ?header.counts,
                        live = ?spec.counts,
                        "appending with the file's domain counts"
                    );
                    return Ok(header);
                }
                Err(e) if options.force => {
                    warn!(path = %path.display(), error = %e, "unreadable data file, truncating");
                }
                Err(e) => return Err(e),
            }
            file.set_len(0).map_err(|e| StoreError::io(path, e))?;
        }

        let header = spec.header(now);
        let mut buf = Vec::new();
        header.encode_file_start(&mut buf);
        write_frame(&mut &*file, &buf, "file header", path)?;
        file.sync_all().map_err(|e| StoreError::io(path, e))?;
        info!(path = %path.display(), counts = ?header.counts, "created data file");
        Ok(header)
    }

    fn write(&mut self, record: &Record, sample: &Sample) -> Result<WriteOutcome, StoreError> {
        if self.lock && !try_lock(&self.file, &self.path)? {
            warn!(path = %self.path.display(), "data file locked, tick not persisted");
            return Ok(WriteOutcome::SkippedLocked);
        }

        let mut buf = Vec::new();
        encode_tick(
            &mut buf,
            record,
            sample,
            &self.header.counts,
            self.header.stat_size as usize,
        );
        let result = write_frame(&mut &self.file, &buf, "tick", &self.path).and_then(|()| {
            self.file
                .sync_all()
                .map_err(|e| StoreError::io(&self.path, e))
        });

        if self.lock {
            unlock(&self.file, &self.path);
        }
        result.map(|()| WriteOutcome::Written)
    }

    /// Closes the file with an end-of-rotation marker, retrying briefly while
    /// the lock is held elsewhere.
    fn write_end_of_rotation(&mut self, time: RecordTime) -> Result<WriteOutcome, StoreError> {
        let marker = Record::EndOfRotation(time);
        for attempt in 1..=MARKER_ATTEMPTS {
            if self.write(&marker, &Sample::default())? == WriteOutcome::Written {
                return Ok(WriteOutcome::Written);
            }
            if attempt < MARKER_ATTEMPTS {
                thread::sleep(MARKER_RETRY_DELAY);
            }
        }
        warn!(
            path = %self.path.display(),
            attempts = MARKER_ATTEMPTS,
            "end-of-rotation marker not written, file stayed locked"
        );
        Ok(WriteOutcome::SkippedLocked)
    }
}

// ---------------------------------------------------------------------------
// Live stream
// ---------------------------------------------------------------------------

struct StreamSink {
    writer: Box<dyn Write + Send>,
    header: FileHeader,
    name: PathBuf,
}

impl StreamSink {
    fn open(
        mut writer: Box<dyn Write + Send>,
        header: FileHeader,
        name: PathBuf,
    ) -> Result<Self, StoreError> {
        let mut buf = Vec::new();
        header.encode_file_start(&mut buf);
        write_frame(&mut writer, &buf, "file header", &name)?;
        writer.flush().map_err(|e| StoreError::io(&name, e))?;
        Ok(Self {
            writer,
            header,
            name,
        })
    }

    /// Writes a tick framed to the stream's own header. Flushed, not synced.
    fn write(&mut self, record: &Record, sample: &Sample) -> Result<(), StoreError> {
        let mut buf = Vec::new();
        encode_tick(
            &mut buf,
            record,
            sample,
            &self.header.counts,
            self.header.stat_size as usize,
        );
        write_frame(&mut self.writer, &buf, "tick", &self.name)?;
        self.writer
            .flush()
            .map_err(|e| StoreError::io(&self.name, e))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Output side of a sampling session: an optional data file (single or
/// daily-rotated) plus an optional live stream.
pub struct SessionWriter {
    spec: FileSpec,
    options: StoreOptions,
    /// File path, or the directory of daily files.
    output: Option<PathBuf>,
    file: Option<DataFile>,
    stream: Option<StreamSink>,
}

impl SessionWriter {
    /// Opens the outputs.
    ///
    /// When appending to an existing file, that file's counts and activities
    /// prevail; callers resize their buffers to [`SessionWriter::counts`].
    pub fn open(
        output: Option<PathBuf>,
        stream: Option<Box<dyn Write + Send>>,
        spec: FileSpec,
        options: StoreOptions,
        now: i64,
    ) -> Result<Self, StoreError> {
        let file = match &output {
            Some(out) => {
                let path = Self::file_path(out, &options, now);
                Some(DataFile::open(&path, &spec, &options, now)?)
            }
            None => None,
        };

        let stream = match stream {
            Some(writer) => {
                let header = match &file {
                    Some(f) => f.header.clone(),
                    None => spec.header(now),
                };
                Some(StreamSink::open(writer, header, PathBuf::from("-"))?)
            }
            None => None,
        };

        Ok(Self {
            spec,
            options,
            output,
            file,
            stream,
        })
    }

    fn file_path(output: &Path, options: &StoreOptions, epoch: i64) -> PathBuf {
        if options.daily {
            output.join(daily_file_name(epoch))
        } else {
            output.to_path_buf()
        }
    }

    /// Counts every tick is framed to.
    pub fn counts(&self) -> DomainCounts {
        if let Some(f) = &self.file {
            f.header.counts
        } else if let Some(s) = &self.stream {
            s.header.counts
        } else {
            self.spec.counts
        }
    }

    pub fn activities(&self) -> Activities {
        self.header().map_or(self.spec.activities, |h| h.activities)
    }

    pub fn header(&self) -> Option<&FileHeader> {
        self.file
            .as_ref()
            .map(|f| &f.header)
            .or(self.stream.as_ref().map(|s| &s.header))
    }

    /// Path of the data file currently open.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// Persists one tick group to the file and the stream.
    pub fn write(&mut self, record: &Record, sample: &Sample) -> Result<WriteOutcome, StoreError> {
        let mut outcome = WriteOutcome::Written;
        if let Some(file) = &mut self.file {
            outcome = file.write(record, sample)?;
        }
        if let Some(stream) = &mut self.stream {
            stream.write(record, sample)?;
        }
        debug!(kind = ?record.kind(), time = record.time().epoch, "tick written");
        Ok(outcome)
    }

    /// Persists one tick group to the data file only. Used for the second
    /// copy of a rotating tick, which the live stream already carries.
    pub fn write_file(
        &mut self,
        record: &Record,
        sample: &Sample,
    ) -> Result<WriteOutcome, StoreError> {
        match &mut self.file {
            Some(file) => file.write(record, sample),
            None => Ok(WriteOutcome::Written),
        }
    }

    /// Path of the next daily file when `epoch` belongs to another day than
    /// the open file.
    pub fn rotation_due(&self, epoch: i64) -> Option<PathBuf> {
        if !self.options.daily {
            return None;
        }
        let output = self.output.as_ref()?;
        let current = self.path()?;
        let next = Self::file_path(output, &self.options, epoch);
        (next != current).then_some(next)
    }

    /// Closes the current daily file with an end-of-rotation marker and opens
    /// `next` sized for `counts`.
    ///
    /// The caller writes the rotating tick to the old file before and to the
    /// new file after, so both files hold it. Returns `false` when `next` is
    /// locked by another process: the old file stays open and rotation is
    /// due again on the next tick.
    pub fn rotate(
        &mut self,
        next: &Path,
        counts: DomainCounts,
        time: RecordTime,
    ) -> Result<bool, StoreError> {
        let spec = FileSpec {
            counts,
            ..self.spec.clone()
        };
        let new = match DataFile::open(next, &spec, &self.options, time.epoch) {
            Ok(file) => file,
            Err(StoreError::Locked { path }) => {
                warn!(path = %path.display(), "next daily file locked, rotation deferred");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if let Some(mut old) = self.file.take() {
            old.write_end_of_rotation(time)?;
            info!(from = %old.path.display(), to = %next.display(), "rotating data file");
        }
        self.spec = spec;
        self.file = Some(new);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Sequential reader of a data file or live stream.
pub struct SessionReader<R: Read> {
    reader: R,
    path: PathBuf,
    header: FileHeader,
}

impl SessionReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
        Self::from_reader(BufReader::new(file), path)
    }
}

impl<R: Read> SessionReader<R> {
    /// Reads and validates the header from any byte source (e.g. stdin).
    pub fn from_reader(mut reader: R, name: &Path) -> Result<Self, StoreError> {
        let header = read_file_start(&mut reader, name)?;
        Ok(Self {
            reader,
            path: name.to_path_buf(),
            header,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Reads the next record; for a NORMAL record `sample` receives the stat
    /// record and the domain arrays. `None` at a clean end of data.
    pub fn next_record(&mut self, sample: &mut Sample) -> Result<Option<Record>, StoreError> {
        let Some(record) =
            read_record(&mut self.reader, self.header.stat_size as usize, &self.path)?
        else {
            return Ok(None);
        };
        if let Record::Normal(stat) = &record {
            sample.stat = *stat;
            read_arrays(&mut self.reader, &self.header.counts, sample, &self.path)?;
        }
        Ok(Some(record))
    }
}
