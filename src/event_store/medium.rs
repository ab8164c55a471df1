//! Durable media for the event log
//!
//! The store only needs four things from its medium: the committed length,
//! a full read at open, an append that is durable when it returns, and a
//! truncate to roll back a failed append.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only byte log backing an EventStore
pub trait LogMedium: Send {
    /// Committed length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole log
    fn read_all(&mut self) -> io::Result<Vec<u8>>;

    /// Append bytes; when this returns Ok they are durable
    ///
    /// On error some prefix of `bytes` may have reached the medium, and the
    /// caller is expected to `truncate` back to the previous length.
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Cut the log back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

/// File-backed log, fsynced on every append
pub struct FileLog {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileLog {
    /// Open (or create) the log file, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self { path, file, len })
    }
}

impl LogMedium for FileLog {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len as usize);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        // Sync to disk for durability
        self.file.sync_all()?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Non-durable log kept in memory (`:memory:` stores and tests)
#[derive(Debug, Default)]
pub struct MemoryLog {
    buf: Vec<u8>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing log content
    pub fn with_contents(buf: Vec<u8>) -> Self {
        Self { buf }
    }
}

impl LogMedium for MemoryLog {
    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.buf.clone())
    }

    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.buf.truncate(len as usize);
        Ok(())
    }

    fn describe(&self) -> String {
        ":memory:".to_string()
    }
}
