use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use aipkg::{Level, Method};

#[derive(Parser)]
#[command(name = "aipkg")]
#[command(about = "Build and verify encrypted AIPKG chart packages")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log verbosity
    #[arg(
        long,
        value_enum,
        ignore_case = true,
        env = "LOG_LEVEL",
        default_value_t = LogLevel::Info,
        global = true
    )]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Packs a chart directory into an encrypted package
    Build {
        /// Directory holding the charts, one subdirectory per airport
        source: PathBuf,

        /// Package to create
        output: PathBuf,

        #[command(flatten)]
        password: PasswordArgs,

        /// EAIP release name, detected from the source path otherwise
        #[arg(long)]
        eaip_version: Option<String>,

        /// Compression effort, store disables compression
        #[arg(short = 'c', long, value_enum)]
        compression: Option<CompressionChoice>,

        /// Codec used unless compression is store
        #[arg(long, value_enum)]
        codec: Option<CodecChoice>,

        /// Compression worker threads
        #[arg(long)]
        jobs: Option<usize>,

        /// Replace the output if it already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Checks a package's structure, file hash and optionally the password
    Verify {
        package: PathBuf,

        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Verifies a package then unpacks every file into a directory
    Extract {
        package: PathBuf,

        /// Destination directory, created if missing
        dest: PathBuf,

        #[command(flatten)]
        password: PasswordArgs,
    },
}

#[derive(Args)]
pub struct PasswordArgs {
    /// Package password
    #[arg(short, long, conflicts_with = "password_prompt")]
    pub password: Option<String>,

    /// Prompt for the password on the terminal
    #[arg(long)]
    pub password_prompt: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionChoice {
    Store,
    Fast,
    Standard,
    Max,
}

impl CompressionChoice {
    // None means store
    pub fn level(self) -> Option<Level> {
        match self {
            CompressionChoice::Store => None,
            CompressionChoice::Fast => Some(Level::Fast),
            CompressionChoice::Standard => Some(Level::Standard),
            CompressionChoice::Max => Some(Level::Max),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecChoice {
    Gzip,
    Zstd,
}

impl From<CodecChoice> for Method {
    fn from(c: CodecChoice) -> Method {
        match c {
            CodecChoice::Gzip => Method::Gzip,
            CodecChoice::Zstd => Method::Zstd,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> log::LevelFilter {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}
