//! Manifest - segment generation bookkeeping
//!
//! Records which segment files make up the current generation, newest first,
//! so a restart reopens exactly the set that was live before the crash.
//!
//! ## File Format
//! ```text
//! [bincode(Manifest)][CRC32 of the bincode bytes: u32 LE]
//! ```
//!
//! The file is rewritten atomically: write `MANIFEST.tmp`, fsync, rename over
//! `MANIFEST`. A reader therefore sees either the old or the new manifest.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardError};

pub const MANIFEST_FILENAME: &str = "MANIFEST";
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Bumped on every flush and compaction
    pub generation: u64,
    /// Next segment id to hand out
    pub next_segment_id: u64,
    /// Live segment ids, newest first
    pub segments: Vec<u64>,
}

impl Manifest {
    /// Load `dir/MANIFEST`, or `None` if it does not exist
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        if bytes.len() < 4 {
            return Err(ShardError::Storage(format!(
                "manifest {} is truncated",
                path.display()
            )));
        }
        let (body, crc) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(ShardError::Storage(format!(
                "manifest checksum mismatch: expected {:08x}, got {:08x}",
                expected, actual
            )));
        }

        Ok(Some(bincode::deserialize(body)?))
    }

    /// Atomically replace `dir/MANIFEST` with this manifest
    pub fn save(&self, dir: &Path) -> Result<()> {
        let mut bytes = bincode::serialize(self)?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        let tmp_path = dir.join(MANIFEST_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, dir.join(MANIFEST_FILENAME))?;

        // Persist the rename itself; not every platform can open a directory
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
        Ok(())
    }

    /// Remove a leftover temp file from an interrupted save
    pub(crate) fn clean_tmp(dir: &Path) -> Result<()> {
        let tmp_path = dir.join(MANIFEST_TMP_FILENAME);
        if tmp_path.exists() {
            fs::remove_file(tmp_path)?;
        }
        Ok(())
    }
}
