//! Tunable consistency `{N, R, W}`
//!
//! `R + W > N` gives read-your-writes; it is the caller's choice and is not
//! enforced here. Levels that violate it are accepted and may return stale
//! reads. `is_strong()` tells the two apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Consistency {
    /// Replicas per key
    pub n: usize,
    /// Read acknowledgments required
    pub r: usize,
    /// Write acknowledgments required
    pub w: usize,
}

impl Consistency {
    /// Checked constructor: `1 <= r <= n` and `1 <= w <= n`
    pub fn new(n: usize, r: usize, w: usize) -> Result<Self> {
        let level = Self { n, r, w };
        level.validate()?;
        Ok(level)
    }

    /// `R = W = n / 2 + 1`
    pub fn majority(n: usize) -> Result<Self> {
        let q = n / 2 + 1;
        Self::new(n, q, q)
    }

    /// `R = W = N`
    pub fn all(n: usize) -> Result<Self> {
        Self::new(n, n, n)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(ShardError::InvalidConsistency("N must be at least 1".into()));
        }
        if self.r == 0 || self.r > self.n {
            return Err(ShardError::InvalidConsistency(format!(
                "R={} outside 1..={}",
                self.r, self.n
            )));
        }
        if self.w == 0 || self.w > self.n {
            return Err(ShardError::InvalidConsistency(format!(
                "W={} outside 1..={}",
                self.w, self.n
            )));
        }
        Ok(())
    }

    /// True if every read quorum overlaps every write quorum
    pub fn is_strong(&self) -> bool {
        self.r + self.w > self.n
    }
}

/// `"r/w/n"`, e.g. `"2/2/3"`
impl FromStr for Consistency {
    type Err = ShardError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 3 {
            return Err(ShardError::InvalidConsistency(format!(
                "expected r/w/n, got {:?}",
                s
            )));
        }
        let mut nums = [0usize; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.trim().parse().map_err(|_| {
                ShardError::InvalidConsistency(format!("not a number: {:?}", part))
            })?;
        }
        let [r, w, n] = nums;
        Self::new(n, r, w)
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.r, self.w, self.n)
    }
}
