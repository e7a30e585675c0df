//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! Every append is all-or-nothing on disk: if writing or syncing a frame
//! fails, the file is cut back to where the frame started, so later appends
//! never land behind a torn or unacknowledged frame. When that cut fails too,
//! the writer refuses further appends until the log is truncated.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, ShardError};
use super::reader::{Frame, WalReader};
use super::{Operation, WalEntry};

/// The file operations the writer needs
pub trait WalFile: Write + Send {
    fn sync_data(&self) -> io::Result<()>;
    fn sync_all(&self) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
    fn seek_to(&mut self, position: u64) -> io::Result<()>;
}

impl WalFile for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn sync_all(&self) -> io::Result<()> {
        File::sync_all(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(position)).map(|_| ())
    }
}

/// Writes entries to the WAL file
pub struct WalWriter<F: WalFile = File> {
    path: PathBuf,
    file: F,
    /// Bytes of complete frames in the file
    len: u64,
    /// LSN the next appended entry receives
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries appended since the last fsync
    unsynced: usize,
    /// A failed append could not be undone
    broken: bool,
}

impl WalWriter<File> {
    /// Open or create a WAL file
    ///
    /// Existing entries are scanned so new entries continue the LSN sequence.
    /// Anything after the last valid entry is cut off.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut next_lsn = 1;
        let mut valid_len = 0;

        if path.exists() {
            let mut reader = WalReader::open(path)?;
            while let Frame::Entry(entry, _) = reader.read_frame()? {
                next_lsn = entry.lsn + 1;
            }
            valid_len = reader.position();
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let file_len = file.metadata()?.len();
        if file_len > valid_len {
            tracing::warn!(
                "Discarding {} trailing WAL bytes in {}",
                file_len - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: valid_len,
            current_lsn: next_lsn,
            sync_strategy,
            unsynced: 0,
            broken: false,
        })
    }
}

impl<F: WalFile> WalWriter<F> {
    /// Start an empty log on an already opened file
    pub fn from_file(file: F, sync_strategy: WalSyncStrategy) -> Self {
        Self {
            path: PathBuf::new(),
            file,
            len: 0,
            current_lsn: 1,
            sync_strategy,
            unsynced: 0,
            broken: false,
        }
    }

    /// Append an operation to the WAL, returning its LSN
    ///
    /// With `EveryWrite` the entry is on disk when this returns. On error the
    /// entry is not in the log.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        if self.broken {
            return Err(ShardError::WalWrite(
                "log is unusable after a failed append could not be undone".into(),
            ));
        }

        let lsn = self.current_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;
        let start = self.len;

        let written = self
            .file
            .write_all(&bytes)
            .and_then(|_| self.file.flush());
        if let Err(e) = written {
            self.rollback(start);
            return Err(ShardError::WalWrite(format!("append of LSN {} failed: {}", lsn, e)));
        }

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced + 1 >= count.max(1),
        };
        if due {
            if let Err(e) = self.file.sync_data() {
                self.rollback(start);
                return Err(ShardError::WalWrite(format!("sync of LSN {} failed: {}", lsn, e)));
            }
            self.unsynced = 0;
        } else {
            self.unsynced += 1;
        }

        self.len = start + bytes.len() as u64;
        self.current_lsn += 1;
        Ok(lsn)
    }

    /// Cut the file back to `len`, or give up on it
    fn rollback(&mut self, len: u64) {
        let cut = self
            .file
            .set_len(len)
            .and_then(|_| self.file.seek_to(len));
        match cut {
            Ok(()) => self.len = len,
            Err(e) => {
                tracing::error!(
                    "Could not undo failed WAL append in {}: {}",
                    self.path.display(),
                    e
                );
                self.broken = true;
            }
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every entry (their effects are durable elsewhere) and restart at LSN 1
    ///
    /// Also makes a writer usable again after a failed rollback.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek_to(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.current_lsn = 1;
        self.unsynced = 0;
        self.broken = false;
        Ok(())
    }

    /// Get the current LSN (the one the next append receives)
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    /// Entries written but not yet fsynced
    pub fn pending_sync(&self) -> usize {
        self.unsynced
    }

    /// Bytes of complete frames in the log
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
