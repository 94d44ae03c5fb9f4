//! Copying a store directory to a log directory for offline analysis.
//!
//! Immutable storage files (`*.sst`) are cloned copy-on-write when the file
//! system supports it, else hard-linked, else copied. Everything else is
//! copied. The first hard-link failure turns hard links off for the rest of
//! the copy. Failures are reported to the event sink and never returned.

use fpstore_events::{CopyFailure, CopyFinished, EventSink, HardLinksDisabled, StoreEvent};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::task::JoinSet;

/// Extension of the engine's immutable table files.
const STORAGE_FILE_EXTENSION: &str = "sst";

/// Prefix of rotated engine info logs.
const OUTDATED_FILE_PREFIX: &str = "LOG.old";

type FileOp = fn(&Path, &Path) -> io::Result<()>;

/// Ways of bringing a storage file across without copying its bytes, tried
/// in order before falling back to a copy.
#[derive(Debug, Clone, Copy)]
struct Transfer {
    clone: FileOp,
    link: FileOp,
}

impl Transfer {
    const NATIVE: Self = Self {
        clone: clone_file,
        link: hard_link,
    };
}

/// How a file reached the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMethod {
    Cloned,
    HardLinked,
    Copied,
}

/// Tally of one [`copy_store`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Files cloned copy-on-write.
    pub cloned: u64,
    /// Files hard-linked.
    pub hard_linked: u64,
    /// Files copied byte for byte.
    pub copied: u64,
    /// Outdated files left behind.
    pub skipped: u64,
    /// Files (or directory operations) that failed.
    pub failed: u64,
}

impl CopyReport {
    /// Files that reached the destination.
    #[must_use]
    pub fn transferred(&self) -> u64 {
        self.cloned + self.hard_linked + self.copied
    }

    fn record(&mut self, method: CopyMethod) {
        match method {
            CopyMethod::Cloned => self.cloned += 1,
            CopyMethod::HardLinked => self.hard_linked += 1,
            CopyMethod::Copied => self.copied += 1,
        }
    }
}

/// Whether `name` is an immutable storage file.
#[must_use]
pub fn is_storage_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext == STORAGE_FILE_EXTENSION)
}

/// Whether `name` is a rotated log that is not worth copying.
#[must_use]
pub fn is_outdated_file(name: &str) -> bool {
    name.starts_with(OUTDATED_FILE_PREFIX)
}

/// Mirror the store at `source` into `destination`.
///
/// `destination` is emptied first; a destination that contains the store or
/// lies inside it is refused and nothing is touched. All files are copied
/// concurrently and the call returns once every copy has finished. Nothing
/// here fails the caller: errors are emitted as [`StoreEvent::CopyFailure`]
/// and counted.
pub async fn copy_store(
    source: &Path,
    destination: &Path,
    sink: Arc<dyn EventSink>,
) -> CopyReport {
    copy_store_with(source, destination, sink, Transfer::NATIVE).await
}

async fn copy_store_with(
    source: &Path,
    destination: &Path,
    sink: Arc<dyn EventSink>,
    transfer: Transfer,
) -> CopyReport {
    let started = Instant::now();
    let mut report = CopyReport::default();

    if let Err(err) = reset_destination(source, destination).await {
        report_failure(sink.as_ref(), destination, &err);
        report.failed += 1;
    } else {
        copy_entries(source, destination, transfer, &sink, &mut report).await;
    }

    sink.emit(&StoreEvent::CopyFinished(CopyFinished {
        source: source.display().to_string(),
        destination: destination.display().to_string(),
        cloned: report.cloned,
        hard_linked: report.hard_linked,
        copied: report.copied,
        skipped: report.skipped,
        failed: report.failed,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }));
    report
}

async fn reset_destination(source: &Path, destination: &Path) -> io::Result<()> {
    let source = resolve(source).await?;
    let target = resolve(destination).await?;
    if source.starts_with(&target) || target.starts_with(&source) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "destination {} overlaps the store at {}",
                target.display(),
                source.display()
            ),
        ));
    }

    match tokio::fs::remove_dir_all(destination).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    tokio::fs::create_dir_all(destination).await
}

/// Absolute form of `path` with symlinks resolved. Trailing components that
/// do not exist yet are appended to the nearest existing ancestor.
async fn resolve(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(mut resolved) => {
                for component in missing.iter().rev() {
                    match component {
                        Component::ParentDir => {
                            resolved.pop();
                        }
                        Component::CurDir => {}
                        other => resolved.push(other),
                    }
                }
                return Ok(resolved);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                match (existing.components().next_back(), existing.parent()) {
                    (Some(last), Some(parent)) => {
                        missing.push(last);
                        existing = parent;
                    }
                    _ => return Err(err),
                }
            }
            Err(err) => return Err(err),
        }
    }
}

async fn copy_entries(
    source: &Path,
    destination: &Path,
    transfer: Transfer,
    sink: &Arc<dyn EventSink>,
    report: &mut CopyReport,
) {
    let mut entries = match tokio::fs::read_dir(source).await {
        Ok(entries) => entries,
        Err(err) => {
            report_failure(sink.as_ref(), source, &err);
            report.failed += 1;
            return;
        }
    };

    let hard_links = Arc::new(AtomicBool::new(true));
    let mut join_set = JoinSet::new();

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                report_failure(sink.as_ref(), source, &err);
                report.failed += 1;
                break;
            }
        };

        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(err) => {
                report_failure(sink.as_ref(), &entry.path(), &err);
                report.failed += 1;
                continue;
            }
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if is_outdated_file(&name) {
            report.skipped += 1;
            continue;
        }

        let from = entry.path();
        let to = destination.join(&name);
        let storage = is_storage_file(&name);
        let hard_links = Arc::clone(&hard_links);
        let sink = Arc::clone(sink);
        join_set.spawn(async move {
            let result = if storage {
                copy_storage_file(&from, &to, transfer, &hard_links, sink.as_ref()).await
            } else {
                tokio::fs::copy(&from, &to).await.map(|_| CopyMethod::Copied)
            };
            result.map_err(|err| (from, err))
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(method)) => report.record(method),
            Ok(Err((path, err))) => {
                report_failure(sink.as_ref(), &path, &err);
                report.failed += 1;
            }
            Err(err) => {
                report_failure(sink.as_ref(), source, &io::Error::other(err.to_string()));
                report.failed += 1;
            }
        }
    }
}

async fn copy_storage_file(
    from: &Path,
    to: &Path,
    transfer: Transfer,
    hard_links: &AtomicBool,
    sink: &dyn EventSink,
) -> io::Result<CopyMethod> {
    if run_blocking(transfer.clone, from, to).await.is_ok() {
        return Ok(CopyMethod::Cloned);
    }

    // A failed clone may leave a partial target that a link cannot replace.
    let leftover = tokio::fs::try_exists(to).await.unwrap_or(true);
    if !leftover && hard_links.load(Ordering::Relaxed) {
        match run_blocking(transfer.link, from, to).await {
            Ok(()) => return Ok(CopyMethod::HardLinked),
            Err(err) => {
                if hard_links.swap(false, Ordering::Relaxed) {
                    sink.emit(&StoreEvent::HardLinksDisabled(HardLinksDisabled {
                        path: from.display().to_string(),
                        message: err.to_string(),
                    }));
                }
            }
        }
    }

    tokio::fs::copy(from, to).await?;
    Ok(CopyMethod::Copied)
}

async fn run_blocking(op: FileOp, from: &Path, to: &Path) -> io::Result<()> {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    tokio::task::spawn_blocking(move || op(&from, &to))
        .await
        .map_err(io::Error::other)?
}

fn hard_link(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::hard_link(from, to)
}

/// Copy-on-write clone through the `FICLONE` ioctl.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn clone_file(from: &Path, to: &Path) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    const FICLONE: u64 = 0x4004_9409;

    let source = std::fs::File::open(from)?;
    let target = std::fs::File::create(to)?;
    // SAFETY: both descriptors stay open for the duration of the call and
    // FICLONE takes the source descriptor by value.
    let rc = unsafe { libc::ioctl(target.as_raw_fd(), FICLONE as _, source.as_raw_fd()) };
    if rc == -1 {
        let err = io::Error::last_os_error();
        drop(target);
        if let Err(remove_err) = std::fs::remove_file(to) {
            tracing::debug!(
                target: "fpstore::snapshot",
                path = %to.display(),
                error = %remove_err,
                "Failed to remove partial clone"
            );
        }
        return Err(err);
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn clone_file(_from: &Path, _to: &Path) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

fn report_failure(sink: &dyn EventSink, path: &Path, err: &io::Error) {
    sink.emit(&StoreEvent::CopyFailure(CopyFailure {
        path: path.display().to_string(),
        message: err.to_string(),
    }));
}
