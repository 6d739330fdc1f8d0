//! OD-013: Application definition storage — load, atomic save, init, writer lock.

use super::error::{Error, Result};
use super::parser::{DISPATCH_BEGIN, DISPATCH_END};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Starting content for a fresh application definition.
pub fn definition_template() -> String {
    format!(
        "-- opdeck application definition\n\
         --\n\
         -- Script operations go above the dispatch-begin marker; their prompt\n\
         -- bindings go between the two markers. `opdeck add` maintains both.\n\
         \n\
         {}\n\
         \n\
         {}\n",
        DISPATCH_BEGIN, DISPATCH_END
    )
}

/// Read the definition text.
pub fn load_definition(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io("read", path, e))
}

/// Create a definition from the template. Refuses to overwrite.
pub fn init_definition(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(Error::io(
            "initialise",
            path,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file already exists"),
        ));
    }
    atomic_write(path, &definition_template())
}

/// Write a file atomically (temp file in the same directory, fsync, rename).
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| Error::io("create directory", &parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "opdeck".to_string());
    let tmp_path = parent.join(format!(".{}.tmp-{}", file_name, std::process::id()));

    {
        let mut file =
            std::fs::File::create(&tmp_path).map_err(|e| Error::io("create", &tmp_path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| Error::io("write", &tmp_path, e))?;
        file.sync_all().map_err(|e| Error::io("sync", &tmp_path, e))?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        Error::io("replace", path, e)
    })
}

/// Lock file path guarding writers of a definition.
pub fn lock_path(definition: &Path) -> PathBuf {
    let mut name = definition
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    definition.with_file_name(name)
}

/// A lock file this old is reclaimed when its holder cannot be checked.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(600);

#[cfg(target_os = "linux")]
fn holder_alive(pid: u32) -> Option<bool> {
    Some(Path::new("/proc").join(pid.to_string()).exists())
}

#[cfg(not(target_os = "linux"))]
fn holder_alive(_pid: u32) -> Option<bool> {
    None
}

/// A lock is stale when the PID it names is gone, or when the holder is
/// unknown and the file is older than [`STALE_LOCK_AGE`].
fn is_stale(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    let content = std::fs::read_to_string(path).unwrap_or_default();
    if let Some(alive) = content.trim().parse::<u32>().ok().and_then(holder_alive) {
        return !alive;
    }
    meta.modified()
        .ok()
        .and_then(|m| m.elapsed().ok())
        .is_some_and(|age| age >= STALE_LOCK_AGE)
}

/// Cross-process writer lock; removed on drop. A lock left behind by a
/// writer that died is reclaimed.
#[derive(Debug)]
pub struct DefinitionLock {
    path: PathBuf,
}

impl DefinitionLock {
    /// Create the lock file, retrying until `timeout` elapses.
    pub fn acquire(definition: &Path, timeout: Duration) -> Result<Self> {
        let path = lock_path(definition);
        let started = Instant::now();
        loop {
            match std::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)
            {
                Ok(mut file) => {
                    let _ = file.write_all(std::process::id().to_string().as_bytes());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        tracing::warn!(path = %path.display(), "reclaiming stale definition lock");
                        match std::fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(Error::io("unlock", &path, e)),
                        }
                    }
                    if started.elapsed() >= timeout {
                        return Err(Error::Locked {
                            path: definition.display().to_string(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(e) => return Err(Error::io("lock", &path, e)),
            }
        }
    }
}

impl Drop for DefinitionLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "cannot remove definition lock");
        }
    }
}
