//! Write-ahead log
//!
//! Every versioned write lands here before it reaches the memtable. The log
//! is replayed on open and truncated once its contents sit in a segment.
//!
//! Each frame is `[LSN u64][CRC32 u32][Len u32][Data]`, where `Data` is the
//! bincode encoding of a [`WalEntry`] and the CRC covers `Data` only. LSNs
//! are consecutive; recovery keeps the longest valid prefix.

mod entry;
mod writer;
mod reader;
mod recovery;

pub use entry::{WalEntry, Operation, HEADER_SIZE, MAX_ENTRY_SIZE};
pub use writer::{WalFile, WalWriter};
pub use reader::{WalReader, WalIterator};
pub use recovery::{WalRecovery, RecoveryResult};
