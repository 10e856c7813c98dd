use std::fmt;
use std::io::{copy, Read};

use serde::Deserialize;

use crate::error::{Error, Result};

// Codec tags as stored in the header
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Store,
    Gzip,
    Zstd,
}

impl Method {
    pub fn id(self) -> u8 {
        match self {
            Method::Store => 0,
            Method::Gzip => 1,
            Method::Zstd => 2,
        }
    }

    pub fn from_id(id: u8) -> Option<Method> {
        match id {
            0 => Some(Method::Store),
            1 => Some(Method::Gzip),
            2 => Some(Method::Zstd),
            _ => None,
        }
    }

    fn level_range(self) -> (u32, u32) {
        match self {
            Method::Store => (0, 0),
            Method::Gzip => (0, 9),
            Method::Zstd => (1, 22),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Store => write!(f, "none"),
            Method::Gzip => write!(f, "gzip"),
            Method::Zstd => write!(f, "zstd"),
        }
    }
}

// Effort presets
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Fast,
    Standard,
    Max,
}

impl Level {
    fn for_method(self, method: Method) -> u32 {
        match (method, self) {
            (Method::Store, _) => 0,
            (Method::Gzip, Level::Fast) => 1,
            (Method::Gzip, Level::Standard) => 6,
            (Method::Gzip, Level::Max) => 9,
            (Method::Zstd, Level::Fast) => 1,
            (Method::Zstd, Level::Standard) => 3,
            (Method::Zstd, Level::Max) => 19,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression {
    method: Method,
    level: u32,
}

impl Compression {
    pub fn store() -> Self {
        Compression {
            method: Method::Store,
            level: 0,
        }
    }

    pub fn preset(method: Method, level: Level) -> Self {
        Compression {
            method,
            level: level.for_method(method),
        }
    }

    pub fn new(method: Method, level: u32) -> Result<Self> {
        let (min, max) = method.level_range();
        if level < min || level > max {
            return Err(Error::validation(format!(
                "{} level must be within {}..={}, got {}",
                method, min, max, level
            )));
        }
        Ok(Compression { method, level })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    // Returns (compressed bytes, bytes read from the source)
    pub fn compress<R: Read>(&self, reader: &mut R) -> std::io::Result<(Vec<u8>, u64)> {
        match self.method {
            Method::Store => {
                let mut buf = Vec::new();
                let len = copy(reader, &mut buf)?;
                Ok((buf, len))
            }
            Method::Gzip => {
                let mut enc = flate2::write::GzEncoder::new(
                    Vec::new(),
                    flate2::Compression::new(self.level),
                );
                let len = copy(reader, &mut enc)?;
                Ok((enc.finish()?, len))
            }
            Method::Zstd => {
                let mut enc = zstd::stream::write::Encoder::new(Vec::new(), self.level as i32)?;
                let len = copy(reader, &mut enc)?;
                Ok((enc.finish()?, len))
            }
        }
    }
}

// Decode one payload region. The output is capped at `expected + 1` bytes so
// a lying entry can't balloon memory, then checked for the exact length.
pub fn decompress(method: Method, data: &[u8], expected: u64) -> Result<Vec<u8>> {
    let limit = expected.saturating_add(1);
    let mut out = Vec::new();

    let res = match method {
        Method::Store => (&data[..]).take(limit).read_to_end(&mut out),
        Method::Gzip => flate2::read::GzDecoder::new(data).take(limit).read_to_end(&mut out),
        Method::Zstd => zstd::stream::read::Decoder::new(data)
            .and_then(|dec| dec.take(limit).read_to_end(&mut out)),
    };
    res.map_err(|e| Error::format(format!("{} stream is corrupt: {}", method, e)))?;

    if out.len() as u64 != expected {
        return Err(Error::format(format!(
            "decoded {} bytes, index claims {}",
            out.len(),
            expected
        )));
    }
    Ok(out)
}
