//! Archive sources the index reads class entries from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::ZipArchive;

pub const CLASS_SUFFIX: &str = ".class";

/// Maps entry paths to their bytes.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// All entry paths, in archive order.
    fn entry_names(&self) -> Result<Vec<String>>;

    async fn read(&self, name: &str) -> Result<Vec<u8>>;
}

pub fn class_entries(source: &dyn ArchiveSource) -> Result<Vec<String>> {
    Ok(source
        .entry_names()?
        .into_iter()
        .filter(|name| name.ends_with(CLASS_SUFFIX))
        .collect())
}

/// Class entries that are not nested classes.
pub fn outer_classes(source: &dyn ArchiveSource) -> Result<Vec<String>> {
    Ok(class_entries(source)?
        .into_iter()
        .filter(|name| !name.contains('$'))
        .collect())
}

#[derive(Clone)]
struct MappedJar(Arc<Mmap>);

impl AsRef<[u8]> for MappedJar {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// A jar on disk, memory-mapped once and read through cloned zip handles.
pub struct JarArchive {
    path: PathBuf,
    archive: ZipArchive<Cursor<MappedJar>>,
    names: Vec<String>,
}

impl JarArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open jar: {}", path.display()))?;
        // SAFETY: The file is opened read-only and the mapping is kept alive by
        // the Arc for as long as any zip handle refers to it.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to mmap jar: {}", path.display()))?;
        let mut archive = ZipArchive::new(Cursor::new(MappedJar(Arc::new(mmap))))
            .with_context(|| format!("Failed to read zip structure: {}", path.display()))?;

        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            names.push(entry.name().to_string());
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            names,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArchiveSource for JarArchive {
    fn entry_names(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.clone();
        let entry_name = name.to_string();
        let jar = self.path.display().to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut entry = archive
                .by_name(&entry_name)
                .with_context(|| format!("Entry {entry_name} not found in {jar}"))?;
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to inflate {entry_name} from {jar}"))?;
            Ok(bytes)
        })
        .await
        .context("jar read task panicked")?
    }
}

/// Archive held in memory, ordered by entry path.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: BTreeMap<String, Arc<Vec<u8>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(name.into(), Arc::new(bytes.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, B: Into<Vec<u8>>> FromIterator<(N, B)> for MemoryArchive {
    fn from_iter<I: IntoIterator<Item = (N, B)>>(iter: I) -> Self {
        let mut archive = MemoryArchive::new();
        for (name, bytes) in iter {
            archive.insert(name, bytes);
        }
        archive
    }
}

#[async_trait]
impl ArchiveSource for MemoryArchive {
    fn entry_names(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.entries
            .get(name)
            .map(|bytes| bytes.as_ref().clone())
            .with_context(|| format!("Entry {name} not found in memory archive"))
    }
}
