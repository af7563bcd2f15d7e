// SplitStream Downloader - file_writer.rs

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Write handle shared by all segment workers.
///
/// Every write carries its own absolute offset, so workers never contend on
/// a cursor; the planner guarantees their ranges are disjoint.
#[derive(Debug, Clone)]
pub struct SharedFile {
    file: Arc<File>,
}

impl SharedFile {
    /// Opens (or creates) the staging file and reserves its full length.
    /// The file is never truncated, so bytes written by earlier runs stay
    /// in place for a resume.
    pub fn open(path: &Path, total: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len(total)?;
        Ok(Self {
            file: Arc::new(file),
        })
    }

    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(data, offset)
    }

    #[cfg(windows)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        let mut data = data;
        let mut offset = offset;
        while !data.is_empty() {
            match self.file.seek_write(data, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole buffer",
                    ))
                }
                Ok(n) => {
                    data = &data[n..];
                    offset += n as u64;
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
