use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::compress::decompress;
use crate::error::{Error, Result};
use crate::header::HEADER_SIZE;
use crate::logctx::LogContext;
use crate::verify::Verifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub dest: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

// Decode-then-use: the whole package is verified and the index unlocked
// before a single entry is written out. Existing files under `dest` are
// replaced.
pub fn extract(
    path: &Path,
    password: &str,
    dest: &Path,
    log: &LogContext,
) -> Result<ExtractReport> {
    let (header, index) = Verifier::new(log.child("verify")).unlock(path, password)?;

    let mut file = File::open(path)?;
    fs::create_dir_all(dest)?;

    let mut bytes = 0;
    for entry in index.files.iter() {
        let len = usize::try_from(entry.length)
            .map_err(|_| Error::format(format!("{:?} too large for this platform", entry.path)))?;
        let mut data = vec![0u8; len];
        file.seek(SeekFrom::Start(HEADER_SIZE as u64 + entry.offset))?;
        file.read_exact(&mut data)?;

        let plain = decompress(header.compression, &data, entry.original_size)?;

        // Paths were checked as plain relative '/' paths when the index was parsed
        let target = entry.path.split('/').fold(dest.to_path_buf(), |p, part| p.join(part));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &plain)?;

        debug!(target: log.target(), "EXTRACT: {} ({} bytes)", entry.path, plain.len());
        bytes += plain.len() as u64;
    }

    info!(
        target: log.target(),
        "extracted {} files ({} bytes) to {}",
        index.len(),
        bytes,
        dest.display()
    );

    Ok(ExtractReport {
        dest: dest.to_path_buf(),
        files: index.len(),
        bytes,
    })
}
