//! Reads the documents of permitted partitions from the partition store.
//!
//! The store is a directory whose top-level entries are partitions. Only
//! files directly inside a permitted partition directory with a supported
//! extension are read; everything else is skipped silently. Symlinks are
//! followed when they resolve inside the same partition; links that escape
//! it or dangle are reported as failures.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::types::{Document, DocumentKind, Partition};

pub const DEFAULT_EXTENSIONS: [&str; 2] = ["md", "csv"];

/// A file that exists but could not be ingested.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub partition: Partition,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DocumentLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load every supported document from `partitions`, in partition order.
    ///
    /// Missing partition directories contribute nothing. Unreadable files are
    /// recorded in [`LoadReport::failures`] and do not stop the load.
    pub fn load(&self, partitions: &[Partition]) -> LoadReport {
        let mut report = LoadReport::default();
        for partition in partitions {
            self.load_partition(partition, &mut report);
        }
        info!(
            partitions = partitions.len(),
            documents = report.documents.len(),
            failures = report.failures.len(),
            "documents loaded"
        );
        report
    }

    fn load_partition(&self, partition: &Partition, report: &mut LoadReport) {
        if !partition.is_plain_name() {
            warn!(%partition, "refusing partition name that is not a plain directory name");
            report.failures.push(LoadFailure {
                partition: partition.clone(),
                path: self.root.join(partition.as_str()),
                reason: "invalid partition name".to_string(),
            });
            return;
        }
        let dir = self.root.join(partition.as_str());
        if !dir.is_dir() {
            debug!(%partition, path = %dir.display(), "partition directory missing, skipping");
            return;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).follow_links(true) {
            match entry {
                Ok(e) if e.file_type().is_file() => {
                    if e.path_is_symlink() && !stays_inside(&dir, e.path()) {
                        let path = e.into_path();
                        if self.supported_extension(&path).is_some() {
                            warn!(%partition, path = %path.display(), "symlink points outside the partition");
                            report.failures.push(LoadFailure {
                                partition: partition.clone(),
                                path,
                                reason: "symlink points outside the partition".to_string(),
                            });
                        }
                        continue;
                    }
                    files.push(e.into_path());
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map_or_else(|| dir.clone(), Path::to_path_buf);
                    if path != dir && self.supported_extension(&path).is_none() {
                        debug!(%partition, path = %path.display(), error = %e, "skipping unlistable entry");
                        continue;
                    }
                    warn!(%partition, path = %path.display(), error = %e, "cannot list entry");
                    report.failures.push(LoadFailure { partition: partition.clone(), path, reason: e.to_string() });
                }
            }
        }
        files.sort();
        debug!(%partition, files = files.len(), "listing partition");

        for path in files {
            let Some(ext) = self.supported_extension(&path) else { continue };
            match read_file_content(&path) {
                Ok(content) => report.documents.push(Document {
                    doc_id: extract_doc_id(&path),
                    kind: DocumentKind::from_extension(&ext),
                    partition: partition.clone(),
                    path,
                    content,
                }),
                Err(e) => {
                    warn!(%partition, path = %path.display(), error = %e, "failed to read document");
                    report.failures.push(LoadFailure { partition: partition.clone(), path, reason: e.to_string() });
                }
            }
        }
    }

    fn supported_extension(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext).then_some(ext)
    }
}

/// Whether the link at `path` resolves to a file under `dir`.
fn stays_inside(dir: &Path, path: &Path) -> bool {
    match (fs::canonicalize(dir), fs::canonicalize(path)) {
        (Ok(dir), Ok(target)) => target.starts_with(dir),
        _ => false,
    }
}

fn read_file_content(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn extract_doc_id(path: &Path) -> String {
    path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned())
}
