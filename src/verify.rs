use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, info, warn};

use crate::crypto::{self, INDEX_AAD};
use crate::error::{Error, Result};
use crate::hash::{hash_tail, Digest};
use crate::header::{Header, HEADER_SIZE};
use crate::index::PackageIndex;
use crate::key;
use crate::logctx::LogContext;

#[derive(Debug)]
pub enum AuthStatus {
    // No password given
    Skipped,
    Verified { entries: usize },
    Failed(Error),
}

// Only produced once the structure and file hash checked out
#[derive(Debug)]
pub struct VerifyReport {
    pub header: Header,
    pub file_size: u64,
    pub digest: Digest,
    pub auth: AuthStatus,
}

impl VerifyReport {
    pub fn integrity_ok(&self) -> bool {
        self.digest == *self.header.file_digest()
    }

    pub fn auth_ok(&self) -> bool {
        matches!(self.auth, AuthStatus::Verified { .. })
    }
}

pub struct Verifier {
    log: LogContext,
}

impl Verifier {
    pub fn new(log: LogContext) -> Self {
        Verifier { log }
    }

    pub fn verify(&self, path: &Path, password: Option<&str>) -> Result<VerifyReport> {
        let (mut file, header, file_size, digest) = self.open_checked(path)?;

        let auth = match password {
            None => AuthStatus::Skipped,
            Some(password) => match self.open_index(&mut file, &header, password) {
                Ok(index) => AuthStatus::Verified {
                    entries: index.len(),
                },
                Err(e) => {
                    warn!(target: self.log.target(), "{}: {}", path.display(), e);
                    AuthStatus::Failed(e)
                }
            },
        };

        Ok(VerifyReport {
            header,
            file_size,
            digest,
            auth,
        })
    }

    // Full check, hands back the decrypted index
    pub fn unlock(&self, path: &Path, password: &str) -> Result<(Header, PackageIndex)> {
        let (mut file, header, _, _) = self.open_checked(path)?;
        let index = self.open_index(&mut file, &header, password)?;
        Ok((header, index))
    }

    // Header, extent then file hash. Nothing here needs the password.
    fn open_checked(&self, path: &Path) -> Result<(File, Header, u64, Digest)> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut buf = Vec::with_capacity(HEADER_SIZE);
        (&mut file).take(HEADER_SIZE as u64).read_to_end(&mut buf)?;
        let header = Header::decode(&buf)?;
        header.check_extent(file_size)?;

        debug!(
            target: self.log.target(),
            "{}: {} files, payload {} bytes, index {}+{}",
            path.display(),
            header.total_files,
            header.total_data_size,
            header.index_offset,
            header.index_length
        );

        let (digest, hashed) = hash_tail(&mut file, HEADER_SIZE as u64)?;
        if hashed != file_size - HEADER_SIZE as u64 {
            return Err(Error::format(format!(
                "file changed while hashing, read {} of {} bytes",
                hashed,
                file_size - HEADER_SIZE as u64
            )));
        }

        let expected = header.file_digest();
        if digest != *expected {
            return Err(Error::Integrity {
                expected: expected.to_hex(),
                computed: digest.to_hex(),
            });
        }
        info!(target: self.log.target(), "{}: file hash ok ({})", path.display(), digest);

        Ok((file, header, file_size, digest))
    }

    fn open_index(&self, file: &mut File, header: &Header, password: &str) -> Result<PackageIndex> {
        let iterations = header.kdf_iterations()?;
        let master = key::derive(password, &header.master_salt, iterations)?;

        let len = usize::try_from(header.index_length)
            .map_err(|_| Error::format("index too large for this platform"))?;
        let mut sealed = vec![0u8; len];
        file.seek(SeekFrom::Start(header.index_offset))?;
        file.read_exact(&mut sealed)?;

        let plain = crypto::decrypt(&sealed, &master, &header.index_iv, INDEX_AAD)?;
        let index = PackageIndex::from_bytes(&plain)?;

        if index.len() != header.total_files as usize {
            return Err(Error::format(format!(
                "header says {} files, index has {}",
                header.total_files,
                index.len()
            )));
        }
        index.check_layout(header.total_data_size)?;

        info!(target: self.log.target(), "index ok, {} entries", index.len());
        Ok(index)
    }
}

#[cfg(test)]
mod test_verify {
    use super::*;
    use crate::builder::test_builder::{build_into, standard, PASSWORD};
    use crate::compress::Compression;
    use crate::header::{FILE_HASH_OFFSET, FILE_HASH_SIZE};
    use std::fs;
    use std::io::Cursor;

    fn verifier() -> Verifier {
        Verifier::new(LogContext::default().child("verify"))
    }

    // Rewrite the file hash so only the password check can catch a change
    fn rehash(bytes: &mut [u8]) {
        let (digest, _) = hash_tail(&mut Cursor::new(&*bytes), HEADER_SIZE as u64).unwrap();
        bytes[FILE_HASH_OFFSET..FILE_HASH_OFFSET + FILE_HASH_SIZE]
            .copy_from_slice(&Header::file_hash_field(&digest));
    }

    #[test]
    fn no_password() {
        let dir = tempfile::tempdir().unwrap();
        let (out, built) = build_into(dir.path(), standard());

        let report = verifier().verify(&out, None).unwrap();
        assert!(report.integrity_ok());
        assert!(!report.auth_ok());
        assert!(matches!(report.auth, AuthStatus::Skipped));
        assert_eq!(report.file_size, built.final_size);
        assert_eq!(report.header.total_files, 3);
    }

    #[test]
    fn right_password() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());

        let report = verifier().verify(&out, Some(PASSWORD)).unwrap();
        assert!(report.integrity_ok());
        assert!(report.auth_ok());
        assert!(matches!(report.auth, AuthStatus::Verified { entries: 3 }));
    }

    #[test]
    fn wrong_password_keeps_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());

        let report = verifier().verify(&out, Some("wrong")).unwrap();
        assert!(report.integrity_ok());
        assert!(!report.auth_ok());
        assert!(matches!(report.auth, AuthStatus::Failed(Error::Authentication)));

        let err = verifier().unlock(&out, "wrong").unwrap_err();
        assert!(matches!(err, Error::Authentication));
    }

    #[test]
    fn unlock_returns_index() {
        let dir = tempfile::tempdir().unwrap();
        let (out, built) = build_into(dir.path(), Compression::store());

        let (header, index) = verifier().unlock(&out, PASSWORD).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.original_size(), built.original_size);
        assert_eq!(header.total_data_size, built.original_size);
        index.check_layout(header.total_data_size).unwrap();
    }

    #[test]
    fn any_flipped_tail_byte() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());
        let pristine = fs::read(&out).unwrap();
        let tampered = dir.path().join("tampered.aipkg");

        for pos in HEADER_SIZE..pristine.len() {
            let mut bytes = pristine.clone();
            bytes[pos] ^= 0x01;
            fs::write(&tampered, &bytes).unwrap();

            let err = verifier().verify(&tampered, None).unwrap_err();
            assert!(matches!(err, Error::Integrity { .. }), "byte {}", pos);
        }
    }

    #[test]
    fn flipped_digest_byte() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());

        let mut bytes = fs::read(&out).unwrap();
        bytes[FILE_HASH_OFFSET] ^= 0x80;
        fs::write(&out, &bytes).unwrap();

        let err = verifier().verify(&out, Some(PASSWORD)).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }

    #[test]
    fn nonzero_padding() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());
        let pristine = fs::read(&out).unwrap();

        // Second half of the file_hash field, then the reserved tail
        for pos in [FILE_HASH_OFFSET + 32, FILE_HASH_OFFSET + 63, 414, 511] {
            let mut bytes = pristine.clone();
            bytes[pos] = 0xFF;
            fs::write(&out, &bytes).unwrap();

            let err = verifier().verify(&out, None).unwrap_err();
            assert!(matches!(err, Error::Format(_)), "byte {}", pos);
        }
    }

    #[test]
    fn extent_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());
        let pristine = fs::read(&out).unwrap();

        let truncated = &pristine[..pristine.len() - 1];
        fs::write(&out, truncated).unwrap();
        assert!(matches!(verifier().verify(&out, None), Err(Error::Format(_))));

        let mut extended = pristine.clone();
        extended.push(0);
        fs::write(&out, &extended).unwrap();
        assert!(matches!(verifier().verify(&out, None), Err(Error::Format(_))));

        // index_length claims one more byte than the file holds
        let mut doctored = pristine.clone();
        doctored[298] = doctored[298].wrapping_add(1);
        fs::write(&out, &doctored).unwrap();
        assert!(matches!(verifier().verify(&out, None), Err(Error::Format(_))));
    }

    #[test]
    fn short_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("short.aipkg");

        fs::write(&out, b"AIPKG\0\0\0\x01\x00").unwrap();
        assert!(matches!(verifier().verify(&out, None), Err(Error::Format(_))));

        fs::write(&out, b"").unwrap();
        assert!(matches!(verifier().verify(&out, None), Err(Error::Format(_))));
    }

    #[test]
    fn not_a_package() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("random.bin");
        fs::write(&out, vec![0x42u8; 4096]).unwrap();

        assert!(matches!(verifier().verify(&out, None), Err(Error::Format(_))));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = verifier().verify(&dir.path().join("nope.aipkg"), None).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn rehashed_index_tamper_fails_auth() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());

        let mut bytes = fs::read(&out).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        rehash(&mut bytes);
        fs::write(&out, &bytes).unwrap();

        let report = verifier().verify(&out, Some(PASSWORD)).unwrap();
        assert!(report.integrity_ok());
        assert!(matches!(report.auth, AuthStatus::Failed(Error::Authentication)));
    }

    #[test]
    fn rehashed_iteration_tamper_fails_auth() {
        let dir = tempfile::tempdir().unwrap();
        let (out, _) = build_into(dir.path(), standard());

        let mut bytes = fs::read(&out).unwrap();
        let mut header = Header::decode(&bytes).unwrap();
        header
            .metadata
            .insert(crate::header::META_KDF_ITERATIONS.to_string(), "1001".to_string());
        bytes[..HEADER_SIZE].copy_from_slice(&header.encode().unwrap());
        fs::write(&out, &bytes).unwrap();

        // metadata sits in front of the hashed range
        let report = verifier().verify(&out, Some(PASSWORD)).unwrap();
        assert!(report.integrity_ok());
        assert!(matches!(report.auth, AuthStatus::Failed(Error::Authentication)));
    }
}
