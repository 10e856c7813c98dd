use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use tempfile::NamedTempFile;
use time::OffsetDateTime;

use crate::compress::Compression;
use crate::config::Config;
use crate::crypto::{self, INDEX_AAD, IV_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::hash::Digest;
use crate::header::{self, Encryption, Header, Metadata, HEADER_SIZE};
use crate::key::{self, SALT_SIZE};
use crate::logctx::LogContext;
use crate::pack::PackWriter;
use crate::progress::{Progress, Throttle};
use crate::source::{detect_version, SourceFile, SourceTree};

pub struct BuildRequest<'a> {
    pub source_dir: &'a Path,
    pub output_path: &'a Path,
    pub password: &'a str,
    // EAIP release name, detected from the source path when unset
    pub version: Option<&'a str>,
    pub compression: Compression,
    // Replace an existing file at output_path instead of refusing
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub output_path: PathBuf,
    pub version: String,
    pub total_files: u32,
    pub airports_count: usize,
    pub original_size: u64,
    pub final_size: u64,
}

pub struct Builder {
    config: Config,
    log: LogContext,
    cancel: Arc<AtomicBool>,
}

impl Builder {
    pub fn new(config: Config, log: LogContext) -> Self {
        Builder {
            config,
            log,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    // Share a cancellation flag, setting it stops the build at the next file
    // batch and discards the partial output
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn pool(&self) -> Result<Option<rayon::ThreadPool>> {
        if self.config.jobs <= 1 {
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
            .map(Some)
            .map_err(|e| Error::Io(io::Error::other(e)))
    }

    pub fn create_package(
        &self,
        req: &BuildRequest,
        progress: &mut dyn Progress,
    ) -> Result<BuildReport> {
        let log = &self.log;

        // Everything that can be rejected is rejected before the output exists
        self.config.password.check(req.password)?;
        let iterations = self.config.iterations()?;

        let tree = SourceTree::scan(req.source_dir, log)?;

        let parent = match req.output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !parent.is_dir() {
            return Err(Error::validation(format!(
                "output directory {} does not exist",
                parent.display()
            )));
        }
        if tree.files.is_empty() {
            return Err(Error::validation(format!(
                "{} contains no files",
                req.source_dir.display()
            )));
        }

        let now = OffsetDateTime::now_utc();
        let version = match req.version {
            Some(v) if v.trim().is_empty() => {
                return Err(Error::validation("version must not be blank"))
            }
            Some(v) => v.trim().to_string(),
            None => detect_version(req.source_dir, now),
        };
        let airports_count = tree.airports_count();

        let mut metadata = Metadata::new();
        metadata.insert(header::META_EAIP_VERSION.to_string(), version.clone());
        metadata.insert(header::META_AIRPORTS.to_string(), airports_count.to_string());
        metadata.insert(header::META_KDF_ITERATIONS.to_string(), iterations.to_string());
        metadata.insert(
            header::META_GENERATOR.to_string(),
            format!("aipkg {}", env!("CARGO_PKG_VERSION")),
        );

        let mut template = Header {
            version_major: header::VERSION_MAJOR,
            version_minor: header::VERSION_MINOR,
            total_files: 0,
            total_data_size: 0,
            compression: req.compression.method(),
            encryption: Encryption::Aes256Gcm,
            created_timestamp: now.unix_timestamp(),
            metadata,
            index_offset: HEADER_SIZE as u64,
            index_length: TAG_SIZE as u64,
            index_iv: [0u8; IV_SIZE],
            master_salt: [0u8; SALT_SIZE],
            file_hash: Digest::from([0u8; 32]),
        };
        // Trial encode, metadata has to fit the header
        template.encode()?;

        if req.output_path.exists() && !req.overwrite {
            return Err(Error::validation(format!(
                "{} already exists",
                req.output_path.display()
            )));
        }

        info!(
            target: log.target(),
            "building {} from {} ({} files, {} airports, version {})",
            req.output_path.display(),
            req.source_dir.display(),
            tree.files.len(),
            airports_count,
            version
        );

        // The package is written next to its destination and only moved into
        // place once complete. Dropping the temp file on any early return
        // deletes the partial output and leaves output_path untouched.
        let tmp = NamedTempFile::new_in(parent)?;
        debug!(target: log.target(), "staging in {}", tmp.path().display());

        let mut throttle = Throttle::new(progress, log);
        let mut writer = PackWriter::begin(tmp)?;

        let total = tree.total_size();
        let mut done: u64 = 0;
        let pool = self.pool()?;
        let comp = req.compression;

        // Batches are compressed concurrently but written in plan order, so
        // offsets never depend on scheduling
        for batch in tree.files.chunks(self.config.jobs.max(1)) {
            self.check_cancel()?;

            let compressed: Vec<Result<(Vec<u8>, u64)>> = match pool.as_ref() {
                Some(pool) => pool.install(|| {
                    batch.par_iter().map(|src| compress_file(comp, src)).collect()
                }),
                None => batch.iter().map(|src| compress_file(comp, src)).collect(),
            };

            for (src, res) in batch.iter().zip(compressed) {
                let (data, original_size) = res?;
                let entry = writer.append(&src.rel, &data, original_size)?;
                debug!(
                    target: log.target(),
                    "PACK: {} {} -> {} @ {}",
                    entry.path,
                    entry.original_size,
                    entry.compressed_size,
                    entry.offset
                );

                done += original_size;
                let message = format!("Compressing {}", src.rel);
                throttle.report("compress", done, total.max(done), &message);
            }
        }
        self.check_cancel()?;

        let total = total.max(done);
        throttle.report("seal", done, total, "Encrypting index");

        let plain_index = writer.index().to_bytes()?;
        let salt = key::gen_salt();
        let iv = crypto::gen_iv();
        let master = key::derive(req.password, &salt, iterations)?;
        let sealed = crypto::encrypt(&plain_index, &master, &iv, INDEX_AAD)?;

        template.index_iv = iv;
        template.master_salt = salt;

        let total_files = writer.index().len();
        let original_size = writer.index().original_size();
        let payload_len = writer.payload_len();

        self.check_cancel()?;
        throttle.report("hash", done, total, "Computing file hash");

        let (tmp, header) = writer.finish(template, &sealed)?.finalize()?;
        tmp.as_file().sync_all()?;
        let final_size = tmp.as_file().metadata()?.len();
        self.check_cancel()?;

        // Rename is atomic within the directory, the path only ever holds a
        // complete package. Without overwrite the final link refuses to
        // replace anything that appeared while we were building.
        if req.overwrite {
            tmp.persist(req.output_path).map_err(|e| Error::Io(e.error))?;
        } else {
            tmp.persist_noclobber(req.output_path).map_err(|e| {
                if e.error.kind() == io::ErrorKind::AlreadyExists {
                    Error::validation(format!("{} already exists", req.output_path.display()))
                } else {
                    Error::Io(e.error)
                }
            })?;
        }

        throttle.report("done", total, total, "Done");

        info!(
            target: log.target(),
            "wrote {}: {} files, payload {} bytes, index {} bytes, file hash {}",
            req.output_path.display(),
            total_files,
            payload_len,
            sealed.len(),
            header.file_hash
        );

        Ok(BuildReport {
            output_path: req.output_path.to_path_buf(),
            version,
            total_files: header.total_files,
            airports_count,
            original_size,
            final_size,
        })
    }
}

fn compress_file(comp: Compression, src: &SourceFile) -> Result<(Vec<u8>, u64)> {
    let mut file = File::open(&src.path)?;
    Ok(comp.compress(&mut file)?)
}
