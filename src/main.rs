use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mediatest::ui::ProgressBar;
use mediatest::{
    DriveInfo, Engine, LogLevel, ProgressEvent, SessionHandle, TestMode, TestParams, TestPattern,
    WipeMethod, WipeParams,
};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::Disks;

#[derive(Parser)]
#[command(name = "mediatest")]
#[command(about = "Removable-media surface tester and secure-wipe tool")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List mounted volumes the tool can target
    List,

    /// Run a pattern write/verify test against a volume
    Test {
        /// Mount point, volume image, or block device path
        path: PathBuf,

        /// Number of passes
        #[arg(short, long, default_value = "1")]
        passes: u32,

        /// Write the 0xFF pattern
        #[arg(long)]
        ones: bool,

        /// Write the 0x00 pattern
        #[arg(long)]
        zeros: bool,

        /// Write fresh random data per chunk
        #[arg(long)]
        random: bool,

        /// Skip read-back verification
        #[arg(long)]
        no_verify: bool,

        /// Test the whole device instead of a free-space proxy file
        #[arg(long)]
        full_device: bool,

        /// Chunk size in MiB (1-256)
        #[arg(long, default_value = "32")]
        chunk_mb: u32,

        /// Adapt chunk size to observed throughput and faults
        #[arg(long)]
        adaptive: bool,

        /// Write the bad-sector report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Overwrite a volume with a standardized erase sequence
    Wipe {
        /// Mount point, volume image, or block device path
        path: PathBuf,

        /// Wipe method (simple, dod, gutmann, custom)
        #[arg(short, long, default_value = "simple")]
        method: String,

        /// Pass count for the custom method
        #[arg(long, default_value = "3")]
        passes: u32,

        /// Skip the final verification sweep
        #[arg(long)]
        no_verify: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,

        /// Write the bad-sector report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List => list_drives(),
        Commands::Test {
            path,
            passes,
            ones,
            zeros,
            random,
            no_verify,
            full_device,
            chunk_mb,
            adaptive,
            report,
        } => {
            let mut patterns = Vec::new();
            if ones {
                patterns.push(TestPattern::Ones);
            }
            if zeros {
                patterns.push(TestPattern::Zeros);
            }
            if random {
                patterns.push(TestPattern::Random);
            }

            let params = TestParams {
                passes,
                patterns,
                verify_on_write: !no_verify,
                mode: if full_device {
                    TestMode::FullDevice
                } else {
                    TestMode::FreeSpace
                },
                chunk_size_mb: chunk_mb,
                adaptive_chunk: adaptive,
                auto_format_requested: false,
                filesystem_hint: String::new(),
            };

            let drive = drive_for_path(&path)?;
            let engine = Engine::new();
            let handle = engine
                .start_test(&drive, params)
                .map_err(|e| anyhow!("failed to start test: {}", e))?;
            drive_session(&engine, handle, report.as_deref())
        }
        Commands::Wipe {
            path,
            method,
            passes,
            no_verify,
            yes,
            report,
        } => {
            let method = parse_method(&method)?;
            let drive = drive_for_path(&path)?;

            if !yes && !confirm_wipe(&drive) {
                println!("Aborted.");
                return Ok(());
            }

            let params = WipeParams {
                method,
                passes,
                verify: !no_verify,
            };
            let engine = Engine::new();
            let handle = engine
                .start_wipe(&drive, params)
                .map_err(|e| anyhow!("failed to start wipe: {}", e))?;
            drive_session(&engine, handle, report.as_deref())
        }
    }
}

fn list_drives() -> Result<()> {
    let disks = Disks::new_with_refreshed_list();

    println!(
        "{:<28} {:>12} {:>12} {:>10} {}",
        "MOUNT", "TOTAL", "FREE", "REMOVABLE", "FS"
    );
    for disk in disks.list() {
        let mount = disk.mount_point();
        let system = if is_system_mount(mount) { "  [system]" } else { "" };
        println!(
            "{:<28} {:>12} {:>12} {:>10} {}{}",
            mount.display(),
            mediatest::ui::human_bytes(disk.total_space() as f64),
            mediatest::ui::human_bytes(disk.available_space() as f64),
            if disk.is_removable() { "yes" } else { "no" },
            disk.file_system().to_string_lossy(),
            system,
        );
    }
    Ok(())
}

/// Build the drive descriptor the engine consumes. Mounted volumes come
/// from the system disk list; anything else is treated as a volume image
/// or block device and sized directly.
fn drive_for_path(path: &Path) -> Result<DriveInfo> {
    let disks = Disks::new_with_refreshed_list();
    for disk in disks.list() {
        if disk.mount_point() == path {
            return Ok(DriveInfo {
                path: path.to_path_buf(),
                total_bytes: disk.total_space(),
                free_bytes: disk.available_space(),
                is_system_drive: is_system_mount(path),
                sector_size_hint: None,
            });
        }
    }

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("{} is neither a mount point nor a readable target", path.display()))?;
    let mut total_bytes = metadata.len();
    if total_bytes == 0 {
        // Block devices report zero length; seek to the end to size them
        if let Ok(mut file) = std::fs::File::open(path) {
            total_bytes = file.seek(SeekFrom::End(0)).unwrap_or(0);
        }
    }

    Ok(DriveInfo {
        path: path.to_path_buf(),
        total_bytes,
        free_bytes: 0,
        is_system_drive: false,
        sector_size_hint: None,
    })
}

fn is_system_mount(path: &Path) -> bool {
    if matches!(
        path.to_string_lossy().as_ref(),
        "/" | "/boot" | "/etc" | "/System" | "C:\\"
    ) {
        return true;
    }
    path.join("Windows").exists() && path.parent().is_none()
}

fn parse_method(s: &str) -> Result<WipeMethod> {
    match s.to_ascii_lowercase().as_str() {
        "simple" | "zero" => Ok(WipeMethod::Simple),
        "dod" => Ok(WipeMethod::DoD),
        "gutmann" => Ok(WipeMethod::Gutmann),
        "custom" | "random" => Ok(WipeMethod::Custom),
        other => Err(anyhow!(
            "unknown method '{}' (expected simple, dod, gutmann, custom)",
            other
        )),
    }
}

fn confirm_wipe(drive: &DriveInfo) -> bool {
    println!(
        "About to irreversibly overwrite {} ({}).",
        drive.path.display(),
        mediatest::ui::human_bytes(drive.total_bytes as f64)
    );
    print!("Type 'WIPE' to continue: ");
    std::io::stdout().flush().ok();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    answer.trim() == "WIPE"
}

/// Poll the session to completion: drain events, redraw the progress bar,
/// forward Ctrl-C as a cooperative stop.
fn drive_session(engine: &Engine, handle: SessionHandle, report: Option<&Path>) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))
        .context("failed to install signal handler")?;

    let mut bar = ProgressBar::new(48);
    let mut percent = 0.0;
    let mut stop_sent = false;

    loop {
        while let Some(event) = engine.poll(handle)? {
            if let Some(p) = print_event(event) {
                percent = p;
            }
        }

        let stats = engine.statistics(handle)?;

        if stats.status.is_terminal() {
            // The terminal events land just after the status flips; pick up
            // the stragglers before leaving
            while let Some(event) = engine.poll(handle)? {
                if let Some(p) = print_event(event) {
                    percent = p;
                }
            }
            bar.render(percent, &stats);
            bar.finish();
            print_summary(engine, handle)?;
            if let Some(path) = report {
                write_report(engine, handle, path)?;
            }
            return Ok(());
        }

        bar.render(percent, &stats);

        if interrupted.load(Ordering::SeqCst) && !stop_sent {
            engine.stop_test(handle);
            stop_sent = true;
        }

        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Print one event; returns the new percent for `Progress` events.
fn print_event(event: ProgressEvent) -> Option<f64> {
    match event {
        ProgressEvent::Log { text, level } => {
            print!("\r\x1b[2K");
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", text),
                _ => println!("{}", text),
            }
            None
        }
        ProgressEvent::Progress { percent } => Some(percent),
        ProgressEvent::Speed { .. } => None,
        ProgressEvent::BadSector { record } => {
            print!("\r\x1b[2K");
            eprintln!(
                "bad sector {} ({:?}, pass {})",
                record.sector_index, record.kind, record.pass_number
            );
            None
        }
        ProgressEvent::Completed { summary } => {
            print!("\r\x1b[2K");
            println!("{}", summary);
            None
        }
        ProgressEvent::Failed { kind, message } => {
            print!("\r\x1b[2K");
            eprintln!("session failed ({:?}): {}", kind, message);
            None
        }
        ProgressEvent::FormatRequested { path, filesystem } => {
            print!("\r\x1b[2K");
            println!(
                "format of {} to {} requested (delegated to external tooling)",
                path.display(),
                filesystem
            );
            None
        }
    }
}

fn print_summary(engine: &Engine, handle: SessionHandle) -> Result<()> {
    let stats = engine.statistics(handle)?;
    println!(
        "status {:?}: {} of {} bytes, avg {:.1} MB/s (min {:.1} / max {:.1}), {} bad sector(s), elapsed {}",
        stats.status,
        stats.tested_bytes,
        stats.total_bytes,
        stats.avg_speed_mbs,
        stats.min_speed_mbs,
        stats.max_speed_mbs,
        stats.bad_sector_count,
        stats.elapsed_display(),
    );
    Ok(())
}

fn write_report(engine: &Engine, handle: SessionHandle, path: &Path) -> Result<()> {
    let records = engine.bad_sectors(handle)?;
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
    println!("bad-sector report written to {}", path.display());
    Ok(())
}
