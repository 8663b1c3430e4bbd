//! Disk overflow tier.

mod reaper;
mod record;
mod store;

pub use reaper::Reaper;
pub(crate) use reaper::SweepContext;
pub use record::{RECORD_EXT, decode_record, encode_record, key_file_stem};
pub use store::{DiskPut, DiskStore, PurgeReport};
