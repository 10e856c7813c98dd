use std::fmt;
use std::io::{copy, Read, Seek, SeekFrom};

use sha2::{Digest as _, Sha256};

pub const DIGEST_SIZE: usize = 32;

// Tail digests get streamed through in frames of this size
const CHUNK_SIZE: usize = 64 * 1024;

// SHA-256 of a byte range
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; DIGEST_SIZE]> for Digest {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

// Incremental digest, fed directly or used as an io::Write sink
pub struct ContentHasher {
    inner: Sha256,
    len: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        ContentHasher {
            inner: Sha256::new(),
            len: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    // Bytes fed so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> Digest {
        Digest(self.inner.finalize().into())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn hash_reader<R: Read>(data: &mut R) -> std::io::Result<Digest> {
    let mut hash = ContentHasher::new();
    copy(data, &mut hash)?;
    Ok(hash.finalize())
}

// Digest of everything from `start` up to EOF, returns the digest along
// with the number of bytes that went through it
pub fn hash_tail<R: Read + Seek>(data: &mut R, start: u64) -> std::io::Result<(Digest, u64)> {
    data.seek(SeekFrom::Start(start))?;

    let mut hash = ContentHasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match data.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => hash.update(&buf[..len]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let len = hash.len();
    Ok((hash.finalize(), len))
}

#[cfg(test)]
mod test_hash {
    use super::*;
    use std::io::Cursor;

    // sha256("abc")
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn known_vector() {
        let mut data = Cursor::new(b"abc".to_vec());
        assert_eq!(hash_reader(&mut data).unwrap().to_hex(), ABC);
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut hash = ContentHasher::new();
        hash.update(b"a");
        hash.update(b"");
        hash.update(b"bc");
        assert_eq!(hash.len(), 3);
        assert_eq!(hash.finalize().to_hex(), ABC);
    }

    #[test]
    fn tail_skips_prefix() {
        let mut data = Cursor::new(b"HEADERabc".to_vec());
        let (digest, len) = hash_tail(&mut data, 6).unwrap();

        assert_eq!(len, 3);
        assert_eq!(digest.to_hex(), ABC);
    }

    #[test]
    fn tail_spanning_chunks() {
        let body: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let mut prefixed = vec![0xAA; 512];
        prefixed.extend_from_slice(&body);

        let (tail, len) = hash_tail(&mut Cursor::new(prefixed), 512).unwrap();
        let whole = hash_reader(&mut &body[..]).unwrap();

        assert_eq!(len, body.len() as u64);
        assert_eq!(tail, whole);
    }

    #[test]
    fn tail_at_eof_is_empty_digest() {
        let mut data = Cursor::new(vec![1, 2, 3]);
        let (digest, len) = hash_tail(&mut data, 3).unwrap();

        assert_eq!(len, 0);
        assert_eq!(digest, ContentHasher::new().finalize());
    }
}
