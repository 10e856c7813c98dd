use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use log::{debug, info};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::logctx::LogContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    // '/' separated, relative to the source root
    pub rel: String,
    pub size: u64,
}

// The planned content of one package, in the order it will be laid out
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    pub files: Vec<SourceFile>,
}

fn walk_error(e: ignore::Error) -> Error {
    let msg = e.to_string();
    Error::Io(e.into_io_error().unwrap_or_else(|| io::Error::other(msg)))
}

impl SourceTree {
    // Sorted walk so the same tree always yields the same package layout.
    // Nothing is filtered (no .gitignore etc) and symlinks are not followed.
    pub fn scan(root: &Path, log: &LogContext) -> Result<SourceTree> {
        if !root.is_dir() {
            return Err(Error::validation(format!(
                "source directory {} does not exist or is not a directory",
                root.display()
            )));
        }

        let walker = WalkBuilder::new(root)
            .follow_links(false)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let e = entry.map_err(walk_error)?;

            match e.file_type() {
                Some(ft) if ft.is_file() => {
                    let rel = relative_name(root, e.path())?;
                    let size = e.metadata().map_err(walk_error)?.len();
                    debug!(target: log.target(), "PLAN: {} ({} bytes)", rel, size);

                    files.push(SourceFile {
                        path: e.path().to_path_buf(),
                        rel,
                        size,
                    });
                }
                Some(ft) if ft.is_dir() => (),
                _ => info!(target: log.target(), "SKIP: {}", e.path().display()),
            }
        }

        Ok(SourceTree {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    // Top level directory -> number of files beneath it. Files sitting
    // directly in the root belong to no category.
    pub fn categories(&self) -> BTreeMap<&str, usize> {
        let mut ret = BTreeMap::new();
        for f in self.files.iter() {
            if let Some((top, _)) = f.rel.split_once('/') {
                *ret.entry(top).or_insert(0) += 1;
            }
        }
        ret
    }

    pub fn airports_count(&self) -> usize {
        self.categories().len()
    }
}

fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| Error::validation(format!("{} escapes the source root", path.display())))?;

    let mut parts = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(p) => parts.push(p.to_str().ok_or_else(|| {
                Error::validation(format!("{} is not valid utf-8", path.display()))
            })?),
            _ => return Err(Error::validation(format!("odd path {}", path.display()))),
        }
    }
    Ok(parts.join("/"))
}

// EAIP releases ship as "EAIP2025-07.V1.4/Terminal/...", use the nearest
// directory named like that, else fall back to the build month
pub fn detect_version(root: &Path, now: OffsetDateTime) -> String {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    for dir in root.ancestors() {
        if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
            if name.len() > 4 && name.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("EAIP")) {
                return name.to_string();
            }
        }
    }
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}
