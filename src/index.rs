use std::collections::HashSet;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const INDEX_VERSION: u32 = 1;

// One logical file inside the payload region. `offset` is relative to the
// first payload byte (right after the header).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub offset: u64,
    pub length: u64,
    pub original_size: u64,
    pub compressed_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PackageIndex {
    pub version: u32,
    pub files: Vec<FileEntry>,

    // Paths already in `files`, kept so push stays O(1)
    #[serde(skip)]
    paths: HashSet<String>,
}

impl PartialEq for PackageIndex {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.files == other.files
    }
}

impl Eq for PackageIndex {}

impl Default for PackageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageIndex {
    pub fn new() -> Self {
        PackageIndex {
            version: INDEX_VERSION,
            files: Vec::new(),
            paths: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn push(&mut self, entry: FileEntry) -> Result<()> {
        check_path(&entry.path)?;
        if self.paths.contains(&entry.path) {
            return Err(Error::format(format!("duplicate path {:?}", entry.path)));
        }
        self.paths.insert(entry.path.clone());
        self.files.push(entry);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::format(format!("index not serializable: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut index: PackageIndex = serde_json::from_slice(bytes)
            .map_err(|e| Error::format(format!("index is not valid json: {}", e)))?;

        if index.version != INDEX_VERSION {
            return Err(Error::format(format!("unsupported index version {}", index.version)));
        }

        let mut seen = HashSet::with_capacity(index.files.len());
        for f in index.files.iter() {
            check_path(&f.path)?;
            if !seen.insert(f.path.clone()) {
                return Err(Error::format(format!("duplicate path {:?}", f.path)));
            }
        }
        index.paths = seen;
        Ok(index)
    }

    // Every region must sit inside the payload and no two may overlap
    pub fn check_layout(&self, total_data_size: u64) -> Result<()> {
        let mut regions: Vec<(u64, u64, &str)> = Vec::with_capacity(self.files.len());

        for f in self.files.iter() {
            if f.length != f.compressed_size {
                return Err(Error::format(format!(
                    "{:?} length {} disagrees with compressed size {}",
                    f.path, f.length, f.compressed_size
                )));
            }
            let end = f
                .offset
                .checked_add(f.length)
                .filter(|end| *end <= total_data_size)
                .ok_or_else(|| Error::format(format!("{:?} lies outside the payload", f.path)))?;
            if end > f.offset {
                regions.push((f.offset, end, f.path.as_str()));
            }
        }

        regions.sort_unstable();
        for w in regions.windows(2) {
            if w[1].0 < w[0].1 {
                return Err(Error::format(format!("{:?} overlaps {:?}", w[0].2, w[1].2)));
            }
        }
        Ok(())
    }

    pub fn original_size(&self) -> u64 {
        self.files.iter().map(|f| f.original_size).sum()
    }
}

// Index paths are '/' separated, relative, and never climb out of the
// extraction root
fn check_path(path: &str) -> Result<()> {
    let bad = || Error::format(format!("unsafe entry path {:?}", path));

    if path.is_empty() || path.contains('\\') || path.contains('\0') {
        return Err(bad());
    }
    for part in path.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(bad());
        }
    }
    if !Path::new(path).components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(bad());
    }
    Ok(())
}

#[cfg(test)]
mod test_index {
    use super::*;

    fn entry(path: &str, offset: u64, length: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            offset,
            length,
            original_size: length * 3,
            compressed_size: length,
        }
    }

    fn sample() -> PackageIndex {
        let mut index = PackageIndex::new();
        index.push(entry("ZBAA/ADC.pdf", 0, 100)).unwrap();
        index.push(entry("ZBAA/SID.pdf", 100, 50)).unwrap();
        index.push(entry("ZSPD/ADC.pdf", 150, 10)).unwrap();
        index
    }

    #[test]
    fn bytes_roundtrip() {
        let index = sample();
        let bytes = index.to_bytes().unwrap();

        assert_eq!(PackageIndex::from_bytes(&bytes).unwrap(), index);
        assert_eq!(index.len(), 3);
        assert_eq!(index.original_size(), 480);
    }

    #[test]
    fn text_form() {
        let bytes = sample().to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        assert!(text.starts_with("{\"version\":1,\"files\":["));
        assert!(text.contains("\"path\":\"ZSPD/ADC.pdf\""));
    }

    #[test]
    fn malformed() {
        let cases: [&[u8]; 5] = [
            b"",
            b"\xff\xfe",
            b"[]",
            b"{\"version\":1}",
            b"{\"version\":2,\"files\":[]}",
        ];
        for bad in cases {
            assert!(matches!(PackageIndex::from_bytes(bad), Err(Error::Format(_))));
        }
    }

    #[test]
    fn duplicate_path() {
        let mut index = sample();
        assert!(matches!(index.push(entry("ZBAA/ADC.pdf", 160, 1)), Err(Error::Format(_))));

        // Also caught when parsing a doctored index
        index.files.push(entry("ZBAA/ADC.pdf", 160, 1));
        let bytes = index.to_bytes().unwrap();
        assert!(matches!(PackageIndex::from_bytes(&bytes), Err(Error::Format(_))));
    }

    #[test]
    fn parsed_index_still_rejects_duplicates() {
        let bytes = sample().to_bytes().unwrap();
        let mut index = PackageIndex::from_bytes(&bytes).unwrap();

        assert!(matches!(index.push(entry("ZSPD/ADC.pdf", 160, 1)), Err(Error::Format(_))));
        index.push(entry("ZSPD/SID.pdf", 160, 1)).unwrap();
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn many_entries() {
        let mut index = PackageIndex::new();
        for i in 0..20_000u64 {
            index.push(entry(&format!("ZB{:05}/chart.pdf", i), i, 1)).unwrap();
        }
        assert_eq!(index.len(), 20_000);
        assert!(matches!(index.push(entry("ZB00042/chart.pdf", 0, 1)), Err(Error::Format(_))));
        index.check_layout(20_000).unwrap();
    }

    #[test]
    fn unsafe_paths() {
        for p in ["", "/etc/passwd", "../up", "a/../../b", "a//b", "./a", "a\\b", "a/"] {
            let mut index = PackageIndex::new();
            assert!(matches!(index.push(entry(p, 0, 1)), Err(Error::Format(_))), "{:?}", p);
        }
    }

    #[test]
    fn layout_ok() {
        assert!(sample().check_layout(160).is_ok());
        assert!(sample().check_layout(1000).is_ok());
    }

    #[test]
    fn layout_out_of_bounds() {
        assert!(matches!(sample().check_layout(159), Err(Error::Format(_))));

        let mut index = PackageIndex::new();
        index.files.push(entry("a", u64::MAX, 2));
        assert!(matches!(index.check_layout(u64::MAX), Err(Error::Format(_))));
    }

    #[test]
    fn layout_overlap() {
        let mut index = sample();
        index.files.push(entry("ZSPD/SID.pdf", 155, 10));
        assert!(matches!(index.check_layout(1000), Err(Error::Format(_))));
    }

    #[test]
    fn layout_length_mismatch() {
        let mut index = sample();
        index.files[0].compressed_size = 99;
        assert!(matches!(index.check_layout(1000), Err(Error::Format(_))));
    }
}
