use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write as _},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use rama::telemetry::tracing;

/// Number of 1 KiB chunks written per I/O unit (64 KiB per unit).
pub const IO_OPS_BASE: u64 = 64;

/// Size of a single write.
pub const IO_CHUNK_SIZE: usize = 1024;

/// Buffered data is flushed and synced every time this many bytes accumulated.
pub const IO_SYNC_THRESHOLD: usize = 512 * 1024;

const IO_CHUNK_PATTERN: &[u8] = b"contents";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoStressReport {
    pub chunks: u64,
    pub bytes_written: u64,
    /// Flush + sync cycles, including the final one.
    pub syncs: u64,
    pub elapsed: Duration,
}

/// Write `IO_OPS_BASE * units` chunks of 1 KiB to a uniquely named file in `dir`,
/// syncing at every [`IO_SYNC_THRESHOLD`] and once more at the end,
/// after which the file is removed again.
///
/// On failure the temp file is removed on a best-effort basis.
pub fn io_stress(units: u64, dir: &Path) -> Result<IoStressReport, ResourceStressError> {
    let start = Instant::now();
    let path = dir.join(format!("vecro_io_stress_{}", rand::random::<u64>()));

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|err| ResourceStressError::io(IoStage::Create, &path, err))?;

    let result = write_chunks(file, units, &path).and_then(|report| {
        std::fs::remove_file(&path)
            .map_err(|err| ResourceStressError::io(IoStage::Remove, &path, err))?;
        Ok(report)
    });

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Err(cleanup_err) = std::fs::remove_file(&path)
                && cleanup_err.kind() != io::ErrorKind::NotFound
            {
                tracing::warn!(
                    path = %path.display(),
                    "failed to remove io stress file after failure: {cleanup_err}"
                );
            }
            return Err(err);
        }
    };

    let report = IoStressReport {
        elapsed: start.elapsed(),
        ..report
    };
    tracing::debug!(
        units,
        bytes_written = report.bytes_written,
        syncs = report.syncs,
        elapsed = ?report.elapsed,
        "io load amount: {units}, total bytes written: {}",
        report.bytes_written,
    );
    Ok(report)
}

fn write_chunks(file: File, units: u64, path: &Path) -> Result<IoStressReport, ResourceStressError> {
    let chunk = IO_CHUNK_PATTERN.repeat(IO_CHUNK_SIZE / IO_CHUNK_PATTERN.len());
    let chunks = IO_OPS_BASE.saturating_mul(units);

    let mut writer = BufWriter::new(file);
    let mut bytes_written = 0u64;
    let mut unsynced = 0usize;
    let mut syncs = 0u64;

    for _ in 0..chunks {
        writer
            .write_all(&chunk)
            .map_err(|err| ResourceStressError::io(IoStage::Write, path, err))?;
        bytes_written += chunk.len() as u64;
        unsynced += chunk.len();

        if unsynced >= IO_SYNC_THRESHOLD {
            flush_and_sync(&mut writer, path)?;
            syncs += 1;
            unsynced -= IO_SYNC_THRESHOLD;
        }
    }

    flush_and_sync(&mut writer, path)?;
    syncs += 1;

    let file = writer
        .into_inner()
        .map_err(|err| ResourceStressError::io(IoStage::Flush, path, err.into_error()))?;
    close_file(file, path)?;

    Ok(IoStressReport {
        chunks,
        bytes_written,
        syncs,
        elapsed: Duration::ZERO,
    })
}

fn flush_and_sync(writer: &mut BufWriter<File>, path: &Path) -> Result<(), ResourceStressError> {
    writer
        .flush()
        .map_err(|err| ResourceStressError::io(IoStage::Flush, path, err))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|err| ResourceStressError::io(IoStage::Sync, path, err))
}

#[cfg(target_family = "unix")]
fn close_file(file: File, path: &Path) -> Result<(), ResourceStressError> {
    use std::os::fd::IntoRawFd as _;

    let fd = file.into_raw_fd();
    // SAFETY: ownership of `fd` was released by `file`, it is closed exactly once.
    if unsafe { libc::close(fd) } != 0 {
        return Err(ResourceStressError::io(
            IoStage::Close,
            path,
            io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(not(target_family = "unix"))]
fn close_file(file: File, _path: &Path) -> Result<(), ResourceStressError> {
    // close errors are not reported by the std file handle here
    drop(file);
    Ok(())
}

/// Step of the I/O stress run that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStage {
    Create,
    Write,
    Flush,
    Sync,
    Close,
    Remove,
}

impl fmt::Display for IoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoStage::Create => "create",
            IoStage::Write => "write",
            IoStage::Flush => "flush",
            IoStage::Sync => "sync",
            IoStage::Close => "close",
            IoStage::Remove => "remove",
        };
        f.write_str(s)
    }
}

/// The stress engine could not complete its configured workload.
#[derive(Debug)]
pub enum ResourceStressError {
    Io {
        stage: IoStage,
        path: PathBuf,
        source: io::Error,
    },
    /// The blocking stress worker was cancelled before completion,
    /// which only happens while the runtime shuts down.
    Interrupted(tokio::task::JoinError),
}

impl ResourceStressError {
    fn io(stage: IoStage, path: &Path, source: io::Error) -> Self {
        Self::Io {
            stage,
            path: path.to_owned(),
            source,
        }
    }

    /// A half-completed workload no longer honours the configured load.
    pub fn is_workload_broken(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

impl fmt::Display for ResourceStressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceStressError::Io {
                stage,
                path,
                source,
            } => write!(
                f,
                "io stress failed to {stage} temp file '{}': {source}",
                path.display()
            ),
            ResourceStressError::Interrupted(err) => {
                write!(f, "stress worker interrupted: {err}")
            }
        }
    }
}

impl std::error::Error for ResourceStressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceStressError::Io { source, .. } => Some(source),
            ResourceStressError::Interrupted(err) => Some(err),
        }
    }
}
