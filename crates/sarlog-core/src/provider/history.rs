//! History provider: sequential reading of recorded samples.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::storage::{FileHeader, Record, Sample, SessionReader};

use super::{Entry, ProviderError, SampleProvider};

/// Provider over a data file or a collector stream.
///
/// End-of-rotation markers are skipped: the next daily file continues the
/// series.
pub struct HistoryProvider<R: Read> {
    reader: SessionReader<R>,
}

impl HistoryProvider<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ProviderError> {
        Ok(Self {
            reader: SessionReader::open(path)?,
        })
    }
}

impl<R: Read> HistoryProvider<R> {
    /// Reads the header from any byte source, e.g. standard input.
    pub fn from_reader(reader: R, name: &Path) -> Result<Self, ProviderError> {
        Ok(Self {
            reader: SessionReader::from_reader(reader, name)?,
        })
    }
}

impl<R: Read> SampleProvider for HistoryProvider<R> {
    fn header(&self) -> &FileHeader {
        self.reader.header()
    }

    fn next_entry(&mut self, sample: &mut Sample) -> Result<Option<Entry>, ProviderError> {
        loop {
            let Some(record) = self.reader.next_record(sample)? else {
                return Ok(None);
            };
            return Ok(Some(match record {
                Record::Normal(_) => Entry::Sample,
                Record::Restart(time) => Entry::Restart(time),
                Record::Comment(time, text) => Entry::Comment(time, text),
                Record::EndOfRotation(_) => continue,
            }));
        }
    }

    fn is_live(&self) -> bool {
        false
    }
}
