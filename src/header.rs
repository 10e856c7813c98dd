use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::num::NonZeroU32;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::compress::Method;
use crate::crypto::{IV_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::hash::{Digest, DIGEST_SIZE};
use crate::key::{self, SALT_SIZE};

pub const HEADER_SIZE: usize = 512;
pub const MAGIC: &[u8; 8] = b"AIPKG\0\0\0";

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

pub const METADATA_CAPACITY: usize = 256;
pub const FILE_HASH_SIZE: usize = 64;

// Fixed layout, every integer is little endian
//
//   0   magic              8
//   8   version_major      1
//   9   version_minor      1
//  10   total_files        4
//  14   total_data_size    8
//  22   compression_id     1
//  23   encryption_id      1
//  24   created_timestamp  8
//  32   metadata_length    2
//  34   metadata         256
// 290   index_offset       8
// 298   index_length       8
// 306   index_iv          12
// 318   master_salt       32
// 350   file_hash         64  (sha256 + 32 zero bytes)
// 414   reserved          98
const METADATA_OFFSET: usize = 34;
pub const FILE_HASH_OFFSET: usize = 350;
const RESERVED_OFFSET: usize = FILE_HASH_OFFSET + FILE_HASH_SIZE;

// Well known metadata keys
pub const META_EAIP_VERSION: &str = "eaip_version";
pub const META_AIRPORTS: &str = "airports_count";
pub const META_KDF_ITERATIONS: &str = "kdf_iterations";
pub const META_GENERATOR: &str = "generator";

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    // AES-256-GCM under a PBKDF2-HMAC-SHA256 master key
    Aes256Gcm,
}

impl Encryption {
    pub fn id(self) -> u8 {
        match self {
            Encryption::Aes256Gcm => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Encryption> {
        match id {
            1 => Some(Encryption::Aes256Gcm),
            _ => None,
        }
    }
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encryption::Aes256Gcm => write!(f, "AES-256-GCM"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version_major: u8,
    pub version_minor: u8,
    pub total_files: u32,
    pub total_data_size: u64,
    pub compression: Method,
    pub encryption: Encryption,
    pub created_timestamp: i64,
    pub metadata: Metadata,
    pub index_offset: u64,
    pub index_length: u64,
    pub index_iv: [u8; IV_SIZE],
    pub master_salt: [u8; SALT_SIZE],
    pub file_hash: Digest,
}

impl Header {
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let metadata = serde_json::to_vec(&self.metadata)
            .map_err(|e| Error::format(format!("metadata not serializable: {}", e)))?;
        if metadata.len() > METADATA_CAPACITY {
            return Err(Error::format(format!(
                "metadata is {} bytes, header holds at most {}",
                metadata.len(),
                METADATA_CAPACITY
            )));
        }

        let mut buf = [0u8; HEADER_SIZE];
        {
            let mut out = Cursor::new(&mut buf[..]);
            out.write_all(MAGIC)?;
            out.write_u8(self.version_major)?;
            out.write_u8(self.version_minor)?;
            out.write_u32::<LittleEndian>(self.total_files)?;
            out.write_u64::<LittleEndian>(self.total_data_size)?;
            out.write_u8(self.compression.id())?;
            out.write_u8(self.encryption.id())?;
            out.write_i64::<LittleEndian>(self.created_timestamp)?;
            out.write_u16::<LittleEndian>(metadata.len() as u16)?;
            out.write_all(&metadata)?;

            out.set_position((METADATA_OFFSET + METADATA_CAPACITY) as u64);
            out.write_u64::<LittleEndian>(self.index_offset)?;
            out.write_u64::<LittleEndian>(self.index_length)?;
            out.write_all(&self.index_iv)?;
            out.write_all(&self.master_salt)?;

            debug_assert_eq!(out.position() as usize, FILE_HASH_OFFSET);
            out.write_all(self.file_hash.as_bytes())?;
        }
        // Second half of file_hash and the reserved tail stay zero
        Ok(buf)
    }

    // Only ever looks at the first HEADER_SIZE bytes
    pub fn decode(bytes: &[u8]) -> Result<Header> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::format(format!(
                "header truncated, {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let bytes = &bytes[..HEADER_SIZE];
        let mut inp = Cursor::new(bytes);

        let mut magic = [0u8; 8];
        inp.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::format("bad magic, not an aipkg package"));
        }

        let version_major = inp.read_u8()?;
        let version_minor = inp.read_u8()?;
        if version_major != VERSION_MAJOR {
            return Err(Error::format(format!(
                "unsupported format version {}.{}",
                version_major, version_minor
            )));
        }

        let total_files = inp.read_u32::<LittleEndian>()?;
        let total_data_size = inp.read_u64::<LittleEndian>()?;

        let compression_id = inp.read_u8()?;
        let compression = Method::from_id(compression_id)
            .ok_or_else(|| Error::format(format!("unknown compression id {}", compression_id)))?;
        let encryption_id = inp.read_u8()?;
        let encryption = Encryption::from_id(encryption_id)
            .ok_or_else(|| Error::format(format!("unknown encryption id {}", encryption_id)))?;

        let created_timestamp = inp.read_i64::<LittleEndian>()?;

        let metadata_length = inp.read_u16::<LittleEndian>()? as usize;
        if metadata_length > METADATA_CAPACITY {
            return Err(Error::format(format!("metadata length {} out of range", metadata_length)));
        }
        let meta_area = &bytes[METADATA_OFFSET..METADATA_OFFSET + METADATA_CAPACITY];
        if meta_area[metadata_length..].iter().any(|b| *b != 0) {
            return Err(Error::format("non-zero bytes after metadata"));
        }
        let metadata: Metadata = if metadata_length == 0 {
            Metadata::new()
        } else {
            serde_json::from_slice(&meta_area[..metadata_length])
                .map_err(|e| Error::format(format!("metadata is not a json object: {}", e)))?
        };

        inp.set_position((METADATA_OFFSET + METADATA_CAPACITY) as u64);
        let index_offset = inp.read_u64::<LittleEndian>()?;
        let index_length = inp.read_u64::<LittleEndian>()?;

        let mut index_iv = [0u8; IV_SIZE];
        inp.read_exact(&mut index_iv)?;
        let mut master_salt = [0u8; SALT_SIZE];
        inp.read_exact(&mut master_salt)?;

        let mut file_hash = [0u8; DIGEST_SIZE];
        inp.read_exact(&mut file_hash)?;
        if bytes[FILE_HASH_OFFSET + DIGEST_SIZE..].iter().any(|b| *b != 0) {
            return Err(Error::format("non-zero bytes in file_hash padding or reserved area"));
        }
        debug_assert_eq!(FILE_HASH_OFFSET + DIGEST_SIZE + DIGEST_SIZE, RESERVED_OFFSET);

        // Layout sanity, nothing here needs the rest of the file
        if index_offset < HEADER_SIZE as u64 {
            return Err(Error::format(format!("index offset {} inside header", index_offset)));
        }
        if total_data_size != index_offset - HEADER_SIZE as u64 {
            return Err(Error::format(format!(
                "payload size {} disagrees with index offset {}",
                total_data_size, index_offset
            )));
        }
        if index_offset.checked_add(index_length).is_none() {
            return Err(Error::format("index range overflows"));
        }
        if index_length < TAG_SIZE as u64 {
            return Err(Error::format(format!("index length {} too short", index_length)));
        }

        Ok(Header {
            version_major,
            version_minor,
            total_files,
            total_data_size,
            compression,
            encryption,
            created_timestamp,
            metadata,
            index_offset,
            index_length,
            index_iv,
            master_salt,
            file_hash: Digest::from(file_hash),
        })
    }

    // The encrypted index has to end exactly at EOF
    pub fn check_extent(&self, file_len: u64) -> Result<()> {
        let end = self
            .index_offset
            .checked_add(self.index_length)
            .ok_or_else(|| Error::format("index range overflows"))?;
        if end != file_len {
            return Err(Error::format(format!(
                "index ends at {} but file is {} bytes",
                end, file_len
            )));
        }
        Ok(())
    }

    pub fn file_digest(&self) -> &Digest {
        &self.file_hash
    }

    // The full 64 byte on-disk field
    pub fn file_hash_field(digest: &Digest) -> [u8; FILE_HASH_SIZE] {
        let mut field = [0u8; FILE_HASH_SIZE];
        field[..DIGEST_SIZE].copy_from_slice(digest.as_bytes());
        field
    }

    pub fn kdf_iterations(&self) -> Result<NonZeroU32> {
        match self.metadata.get(META_KDF_ITERATIONS) {
            None => Ok(key::DEFAULT_ITERATIONS),
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|n| *n <= key::MAX_ITERATIONS)
                .and_then(NonZeroU32::new)
                .ok_or_else(|| Error::format(format!("bad kdf iteration count {:?}", v))),
        }
    }
}
