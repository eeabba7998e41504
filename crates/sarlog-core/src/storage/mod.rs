pub mod codec;
pub mod error;
pub mod model;
pub mod session;
pub mod slots;

pub use codec::{FileHeader, FileMagic, Record, RecordKind};
pub use error::StoreError;
pub use model::{Activities, DomainCounts, RecordTime, Sample, StatRecord};
pub use session::{
    FileSpec, SessionReader, SessionWriter, StoreOptions, WriteOutcome, daily_file_name,
};
pub use slots::SampleSlots;
