use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use log::{error, warn};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use zeroize::Zeroizing;

use aipkg::{
    extract, AuthStatus, BuildReport, BuildRequest, Builder, Compression, Config, Error,
    LogContext, ProgressError, Result, Verifier, VerifyReport,
};

mod cli;
use crate::cli::{Cli, CodecChoice, Commands, CompressionChoice, PasswordArgs};

const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.into())
        .format_target(false)
        .init();

    let log = LogContext::default();
    match run(cli, &log).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cancelled) => {
            eprintln!("\nInterrupted, partial package removed");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            error!(target: log.target(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, log: &LogContext) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build {
            source,
            output,
            password,
            eaip_version,
            compression,
            codec,
            jobs,
            force,
        } => {
            let password = read_password(&password, true)?.ok_or_else(|| {
                Error::validation("build needs a password, use -p or --password-prompt")
            })?;
            let opts = BuildOpts {
                source,
                output,
                password,
                eaip_version,
                compression,
                codec,
                jobs,
                force,
            };
            let report = build(config, opts, log).await?;
            print_build(&report);
            Ok(())
        }
        Commands::Verify { package, password } => {
            let password = read_password(&password, false)?;
            let password = password.as_ref().map(|p| p.as_str());
            let report = Verifier::new(log.child("verify")).verify(&package, password)?;
            print_verify(&package, report)
        }
        Commands::Extract {
            package,
            dest,
            password,
        } => {
            let password = read_password(&password, false)?.ok_or_else(|| {
                Error::validation("extract needs a password, use -p or --password-prompt")
            })?;
            let report = extract(&package, password.as_str(), &dest, &log.child("extract"))?;
            println!(
                "Extracted {} files ({}) to {}",
                report.files,
                megabytes(report.bytes),
                report.dest.display()
            );
            Ok(())
        }
    }
}

struct BuildOpts {
    source: PathBuf,
    output: PathBuf,
    password: Zeroizing<String>,
    eaip_version: Option<String>,
    compression: Option<CompressionChoice>,
    codec: Option<CodecChoice>,
    jobs: Option<usize>,
    force: bool,
}

// The build runs on a blocking thread, ctrl-c flips its cancel flag and we
// wait for it to clean up after itself
async fn build(mut config: Config, opts: BuildOpts, log: &LogContext) -> Result<BuildReport> {
    if let Some(jobs) = opts.jobs {
        if jobs == 0 {
            return Err(Error::validation("--jobs must be at least 1"));
        }
        config.jobs = jobs;
    }
    if let Some(codec) = opts.codec {
        config.codec = codec.into();
    }
    let compression = match opts.compression.map(|c| c.level()) {
        None => config.compression(),
        Some(None) => Compression::store(),
        Some(Some(level)) => Compression::preset(config.codec, level),
    };

    let builder = Builder::new(config, log.child("build"));
    let cancel = builder.cancel_handle();

    let mut task = tokio::task::spawn_blocking(move || {
        let req = BuildRequest {
            source_dir: &opts.source,
            output_path: &opts.output,
            password: opts.password.as_str(),
            version: opts.eaip_version.as_deref(),
            compression,
            overwrite: opts.force,
        };
        builder.create_package(&req, &mut progress_bar)
    });

    let joined = tokio::select! {
        res = &mut task => res,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(target: log.target(), "interrupted, cancelling build");
            cancel.store(true, Ordering::SeqCst);
            task.await
        }
    };
    joined.map_err(|e| Error::Io(io::Error::other(e)))?
}

fn read_password(args: &PasswordArgs, confirm: bool) -> Result<Option<Zeroizing<String>>> {
    if let Some(p) = &args.password {
        return Ok(Some(Zeroizing::new(p.clone())));
    }
    if !args.password_prompt {
        return Ok(None);
    }

    let first = Zeroizing::new(rpassword::prompt_password("Password: ")?);
    if confirm {
        let again = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);
        if *first != *again {
            return Err(Error::validation("passwords do not match"));
        }
    }
    Ok(Some(first))
}

fn progress_bar(done: u64, total: u64, message: &str) -> std::result::Result<(), ProgressError> {
    let pct = if total == 0 { 100 } else { done.min(total) * 100 / total };

    let mut err = io::stderr().lock();
    write!(err, "\r[{:>3}%] {:<60.60}", pct, message)?;
    if done >= total {
        writeln!(err)?;
    }
    err.flush()?;
    Ok(())
}

fn megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

fn print_build(report: &BuildReport) {
    println!("Package created: {}", report.output_path.display());
    println!("  EAIP version:  {}", report.version);
    println!("  Files:         {}", report.total_files);
    println!("  Airports:      {}", report.airports_count);
    println!("  Original size: {}", megabytes(report.original_size));
    println!("  Package size:  {}", megabytes(report.final_size));
    if report.original_size > 0 {
        println!(
            "  Ratio:         {:.1}%",
            report.final_size as f64 * 100.0 / report.original_size as f64
        );
    }
}

fn print_verify(path: &Path, report: VerifyReport) -> Result<()> {
    let h = &report.header;
    let created = OffsetDateTime::from_unix_timestamp(h.created_timestamp)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| h.created_timestamp.to_string());

    println!("Package: {}", path.display());
    println!("  Format:      {}.{}", h.version_major, h.version_minor);
    println!("  Files:       {}", h.total_files);
    println!("  Data size:   {}", megabytes(h.total_data_size));
    println!("  File size:   {}", megabytes(report.file_size));
    println!("  Compression: {}", h.compression);
    println!("  Encryption:  {}", h.encryption);
    println!("  Created:     {}", created);
    for (k, v) in h.metadata.iter() {
        println!("  {}: {}", k, v);
    }
    println!("  File hash:   {}", report.digest);
    println!("Integrity: OK");

    match report.auth {
        AuthStatus::Skipped => {
            println!("Password: not checked");
            Ok(())
        }
        AuthStatus::Verified { entries } => {
            println!("Password: OK ({} index entries)", entries);
            Ok(())
        }
        AuthStatus::Failed(e) => {
            println!("Password: FAILED");
            Err(e)
        }
    }
}
