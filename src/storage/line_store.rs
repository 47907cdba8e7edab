use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Line-oriented persistence of named text resources.
///
/// An absent resource reads as empty and removing it succeeds, so callers
/// never have to distinguish "never written" from "wiped".
#[async_trait]
pub trait LineStore: Send + Sync {
    /// First line of the resource, `None` when absent or empty
    async fn read_first_line(&self, name: &str) -> Result<Option<String>, StorageError>;

    /// All non-empty lines, oldest first
    async fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError>;

    /// Overwrite the resource with a single line
    async fn write_line(&self, name: &str, text: &str) -> Result<(), StorageError>;

    async fn append_line(&self, name: &str, text: &str) -> Result<(), StorageError>;

    /// Atomically replace the whole resource
    async fn replace_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError>;

    async fn remove(&self, name: &str) -> Result<(), StorageError>;
}

/// Line store rooted in a directory, one file per resource
#[derive(Debug, Clone)]
pub struct FsLineStore {
    root: PathBuf,
}

impl FsLineStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing a resource
    pub fn resource_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    async fn ensure_root(&self, name: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::unavailable(name, e))
    }
}

#[async_trait]
impl LineStore for FsLineStore {
    async fn read_first_line(&self, name: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.resource_path(name)).await {
            Ok(content) => Ok(content
                .lines()
                .next()
                .map(|line| line.trim_end_matches('\r').to_string())
                .filter(|line| !line.is_empty())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::unavailable(name, e)),
        }
    }

    async fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError> {
        match fs::read_to_string(self.resource_path(name)).await {
            Ok(content) => Ok(content
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::unavailable(name, e)),
        }
    }

    async fn write_line(&self, name: &str, text: &str) -> Result<(), StorageError> {
        self.replace_lines(name, &[text.to_string()]).await
    }

    async fn append_line(&self, name: &str, text: &str) -> Result<(), StorageError> {
        self.ensure_root(name).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.resource_path(name))
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;

        // A torn earlier append must not swallow this line
        let mut entry = String::with_capacity(text.len() + 2);
        if ends_mid_line(&mut file)
            .await
            .map_err(|e| StorageError::unavailable(name, e))?
        {
            warn!("{} ends in a partial line, starting a new one", name);
            entry.push('\n');
        }
        entry.push_str(text);
        entry.push('\n');

        file.write_all(entry.as_bytes())
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;

        trace!("Appended line to {}: {}", name, text);
        Ok(())
    }

    async fn replace_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError> {
        self.ensure_root(name).await?;

        let mut content = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }

        // Readers of the resource see either the old or the new content
        let target = self.resource_path(name);
        let staging = self.resource_path(&format!("{}.tmp", name));
        fs::write(&staging, content)
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;
        fs::rename(&staging, &target)
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;

        debug!("Rewrote {} with {} lines", name, lines.len());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.resource_path(name)).await {
            Ok(()) => {
                debug!("Removed resource {}", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::unavailable(name, e)),
        }
    }
}

/// Whether a non-empty file lacks a trailing newline
async fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1)).await?;
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

/// In-memory line store whose availability can be switched off
#[derive(Debug)]
pub struct MemoryLineStore {
    resources: Mutex<HashMap<String, Vec<String>>>,
    available: AtomicBool,
}

impl MemoryLineStore {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing medium going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether a resource currently exists
    pub fn contains(&self, name: &str) -> bool {
        self.resources.lock().contains_key(name)
    }

    /// Seed a resource with raw lines, malformed ones included
    pub fn insert_raw<I, S>(&self, name: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources
            .lock()
            .insert(name.to_string(), lines.into_iter().map(Into::into).collect());
    }

    fn check(&self, name: &str) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                name,
                io::Error::new(io::ErrorKind::Other, "store offline"),
            ))
        }
    }
}

impl Default for MemoryLineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LineStore for MemoryLineStore {
    async fn read_first_line(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.check(name)?;
        Ok(self
            .resources
            .lock()
            .get(name)
            .and_then(|lines| lines.first().cloned())
            .filter(|line| !line.is_empty()))
    }

    async fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError> {
        self.check(name)?;
        Ok(self
            .resources
            .lock()
            .get(name)
            .map(|lines| lines.iter().filter(|l| !l.is_empty()).cloned().collect())
            .unwrap_or_default())
    }

    async fn write_line(&self, name: &str, text: &str) -> Result<(), StorageError> {
        self.check(name)?;
        self.resources
            .lock()
            .insert(name.to_string(), vec![text.to_string()]);
        Ok(())
    }

    async fn append_line(&self, name: &str, text: &str) -> Result<(), StorageError> {
        self.check(name)?;
        self.resources
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }

    async fn replace_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError> {
        self.check(name)?;
        self.resources
            .lock()
            .insert(name.to_string(), lines.to_vec());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.check(name)?;
        self.resources.lock().remove(name);
        Ok(())
    }
}
