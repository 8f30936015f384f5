//! Read-only file-backed archive.
//!
//! Used on two paths: reloading a payload from the filename recorded at
//! load time, and the background fetch task, which opens its own reader so
//! the foreground archive's cursor is never shared across threads.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::error;

use crate::archive::Archive;
use crate::error::{ArchiveError, Result};

/// Loading archive over a file on disk.
#[derive(Debug)]
pub struct FileReaderArchive {
    file: File,
    path: PathBuf,
    pos: i64,
    lazy_loading: bool,
}

impl FileReaderArchive {
    /// Opens `path` for reading.
    ///
    /// With `silent` set, a missing file is reported only through the error
    /// value; otherwise it is also logged. Callers on the payload-fetch path
    /// open silently and escalate to a fatal themselves, with the path in
    /// the message.
    pub fn open(path: impl AsRef<Path>, silent: bool) -> Result<FileReaderArchive> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                if !silent {
                    error!("failed to open bulk data file '{}': {}", path.display(), err);
                }
                return Err(ArchiveError::MissingFile(path.to_path_buf()));
            }
        };
        Ok(FileReaderArchive { file, path: path.to_path_buf(), pos: 0, lazy_loading: false })
    }

    /// Marks the archive as allowing lazy payload loads, so deserialized
    /// instances attach by filename instead of reading everything up front.
    pub fn set_lazy_loading(&mut self, lazy: bool) {
        self.lazy_loading = lazy;
    }
}

impl Archive for FileReaderArchive {
    fn is_loading(&self) -> bool {
        true
    }

    fn allows_lazy_loading(&self) -> bool {
        self.lazy_loading
    }

    fn tell(&self) -> i64 {
        self.pos
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 {
            return Err(ArchiveError::Corrupt(format!("seek to negative offset {}", pos)));
        }
        self.file.seek(SeekFrom::Start(pos as u64))?;
        self.pos = pos;
        Ok(())
    }

    fn serialize(&mut self, data: &mut [u8]) -> Result<()> {
        self.file.read_exact(data)?;
        self.pos += data.len() as i64;
        Ok(())
    }

    fn filename(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
