//! TCP port allocation for spawned nodes.
//!
//! Every spawned LND needs three ports (p2p, REST, gRPC). Several test
//! processes may spawn nodes at the same time, so the counter lives in a file
//! shared by all of them and is only touched under an exclusive lock.

use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::{Result, TestkitError};

/// First port handed out by a fresh counter.
pub const FIRST_PORT: u16 = 60000;

/// Source of unused local ports.
pub trait PortAllocator: Send + Sync {
    /// Reserve `count` consecutive ports.
    ///
    /// Successive calls return increasing, non-overlapping ranges.
    fn allocate(&self, count: u16) -> Result<Range<u16>>;
}

/// Port counter persisted in a file.
#[derive(Clone, Debug)]
pub struct FilePortAllocator {
    state_path: PathBuf,
}

impl FilePortAllocator {
    /// Allocator backed by `state_path`.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// Allocator using `$XDG_DATA_HOME/lnpbp-testkit/ports`.
    pub fn in_data_dir() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| TestkitError::Io("no data directory for this user".to_string()))?;
        Ok(Self::new(dir.join("lnpbp-testkit").join("ports")))
    }

    /// Path of the counter file.
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn tmp_path(&self) -> PathBuf {
        self.state_path.with_extension("tmp")
    }

    fn lock_path(&self) -> PathBuf {
        self.state_path.with_extension("lock")
    }
}

impl PortAllocator for FilePortAllocator {
    fn allocate(&self, count: u16) -> Result<Range<u16>> {
        if let Some(dir) = self.state_path.parent() {
            fs::create_dir_all(dir)?;
        }

        // The counter file itself is replaced on every allocation, so the lock
        // is taken on a sibling file that never moves.
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;

        let text = match fs::read_to_string(&self.state_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let last_port = if text.trim().is_empty() {
            FIRST_PORT
        } else {
            text.trim()
                .parse::<u16>()
                .map_err(|e| TestkitError::invalid_data("port counter", e.to_string()))?
        };
        let next_port = last_port.checked_add(count).ok_or_else(|| {
            TestkitError::invariant(format!("port range exhausted at {}", last_port))
        })?;

        let tmp_path = self.tmp_path();
        {
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(next_port.to_string().as_bytes())?;
            tmp.sync_data()?;
        }
        fs::rename(&tmp_path, &self.state_path)?;
        FileExt::unlock(&lock)?;

        tracing::debug!(first = last_port, count, "allocated ports");
        Ok(last_port..next_port)
    }
}
