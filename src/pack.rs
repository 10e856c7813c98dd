use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::hash::{hash_tail, Digest};
use crate::header::{Header, FILE_HASH_OFFSET, HEADER_SIZE};
use crate::index::{FileEntry, PackageIndex};

// Writes the package front to back:
//
//   1. begin     - zeroed header placeholder
//   2. append    - payload regions, one per file, recorded in the index
//   3. finish    - sealed index blob, then the real header with a zero file_hash
//   4. finalize  - hash [HEADER_SIZE, EOF) and patch only the file_hash field
//
// The hash can only be computed once every other byte is final, so step 4 is
// its own type rather than something that happens as a side effect of 3.
pub struct PackWriter<W: Read + Write + Seek> {
    inner: W,
    payload_len: u64,
    index: PackageIndex,
}

impl<W: Read + Write + Seek> PackWriter<W> {
    pub fn begin(mut inner: W) -> Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        inner.write_all(&[0u8; HEADER_SIZE])?;

        Ok(PackWriter {
            inner,
            payload_len: 0,
            index: PackageIndex::new(),
        })
    }

    pub fn append(&mut self, path: &str, data: &[u8], original_size: u64) -> Result<&FileEntry> {
        let entry = FileEntry {
            path: path.to_string(),
            offset: self.payload_len,
            length: data.len() as u64,
            original_size,
            compressed_size: data.len() as u64,
        };
        self.index.push(entry)?;

        self.inner.write_all(data)?;
        self.payload_len += data.len() as u64;

        // push() succeeded so there is a last entry
        self.index
            .files
            .last()
            .ok_or_else(|| Error::format("index lost its last entry"))
    }

    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    pub fn index(&self) -> &PackageIndex {
        &self.index
    }

    // Layout fields of `header` are filled in here, the caller supplies the
    // rest (algorithms, timestamp, metadata, iv, salt)
    pub fn finish(mut self, mut header: Header, sealed_index: &[u8]) -> Result<Unsealed<W>> {
        let total_files = u32::try_from(self.index.len())
            .map_err(|_| Error::format("too many files for one package"))?;

        header.total_files = total_files;
        header.total_data_size = self.payload_len;
        header.index_offset = HEADER_SIZE as u64 + self.payload_len;
        header.index_length = sealed_index.len() as u64;
        header.file_hash = Digest::from([0u8; 32]);

        let encoded = header.encode()?;

        self.inner.write_all(sealed_index)?;
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(&encoded)?;

        Ok(Unsealed {
            inner: self.inner,
            header,
        })
    }
}

// Every byte is on disk except the file_hash
pub struct Unsealed<W: Read + Write + Seek> {
    inner: W,
    header: Header,
}

impl<W: Read + Write + Seek> Unsealed<W> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn finalize(mut self) -> Result<(W, Header)> {
        self.inner.flush()?;

        let (digest, hashed) = hash_tail(&mut self.inner, HEADER_SIZE as u64)?;
        let expect = self.header.index_offset + self.header.index_length - HEADER_SIZE as u64;
        if hashed != expect {
            return Err(Error::format(format!(
                "hashed {} bytes after the header, layout says {}",
                hashed, expect
            )));
        }

        self.inner.seek(SeekFrom::Start(FILE_HASH_OFFSET as u64))?;
        self.inner.write_all(&Header::file_hash_field(&digest))?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;

        self.header.file_hash = digest;
        Ok((self.inner, self.header))
    }
}
