// AIPKG secure chart packages
//
//   [0, 512)                    header, see `header`
//   [512, index_offset)         payload, one compressed region per file
//   [index_offset, EOF)         AES-256-GCM sealed json index
//
// The header carries a SHA-256 of everything after it, so a package can be
// integrity checked without the password.

pub mod builder;
pub mod compress;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod hash;
pub mod header;
pub mod index;
pub mod key;
pub mod logctx;
pub mod pack;
pub mod progress;
pub mod source;
pub mod verify;

pub use crate::builder::{BuildReport, BuildRequest, Builder};
pub use crate::compress::{Compression, Level, Method};
pub use crate::config::{Config, PasswordPolicy};
pub use crate::error::{Error, Result};
pub use crate::extract::{extract, ExtractReport};
pub use crate::header::Header;
pub use crate::index::{FileEntry, PackageIndex};
pub use crate::logctx::LogContext;
pub use crate::progress::{NoProgress, Progress, ProgressError};
pub use crate::verify::{AuthStatus, Verifier, VerifyReport};
