// Copyright 2024. Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! On-disk persistence (spec.md §4.7, §6.3). Replaces
//! `original_source/storage.py`'s rocksdb-free-but-ad-hoc directory scheme
//! with the same plain `<domain>/<timestamp>_<job_id[:8]>/` layout, a
//! write-temp-then-rename manifest, and content-addressed page/blob files.

mod blob_store;
mod export;
mod manifest;
mod page_store;
mod reconcile;
mod registry;

pub use blob_store::BlobStore;
pub use export::{export_jsonl, export_zip};
pub use manifest::Manifest;
pub use page_store::PageStore;
pub use reconcile::fix_stuck_jobs;
pub use registry::{JobRegistry, RegistryEntry};

use crate::models::{CrawlParams, JobState, JobStatus, PageSummary};
use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {path}: {source}")]
    Json {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("failed to persist temp file to {path}: {source}")]
    Persist {
        path: Utf8PathBuf,
        #[source]
        source: tempfile::PersistError,
    },

    #[error("zip export failed: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// `job_id` is the first 16 hex chars of `sha256(seed_url || timestamp)`
/// (spec.md §4.7).
pub fn new_job_id(seed_url: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed_url.as_bytes());
    hasher.update(timestamp.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// `page_id` is the full sha256 hex digest of the canonical URL.
pub fn page_id_of(canonical_url: &str) -> String {
    hex::encode(Sha256::digest(canonical_url.as_bytes()))
}

/// `blob_id` is the full sha256 hex digest of the blob's bytes.
pub fn blob_id_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Strips a leading `www.` from a host, per `new_job`'s folder naming.
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// One crawl job's on-disk home: `<root>/<domain>/<timestamp>_<job_id[:8]>/`.
#[derive(Debug, Clone)]
pub struct JobDir {
    pub job_id: String,
    pub domain: String,
    pub timestamp: String,
    path: Utf8PathBuf,
}

impl JobDir {
    pub fn new(root: &Utf8Path, job_id: &str, domain: &str, timestamp: &str) -> Self {
        let folder = format!("{timestamp}_{}", &job_id[..job_id.len().min(8)]);
        Self {
            job_id: job_id.to_string(),
            domain: domain.to_string(),
            timestamp: timestamp.to_string(),
            path: root.join(domain).join(folder),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.path.join("manifest.json")
    }

    pub fn pages_dir(&self) -> Utf8PathBuf {
        self.path.join("pages")
    }

    pub fn blobs_dir(&self) -> Utf8PathBuf {
        self.path.join("blobs")
    }

    pub fn exports_dir(&self) -> Utf8PathBuf {
        self.path.join("exports")
    }

    pub fn logs_path(&self) -> Utf8PathBuf {
        self.path.join("logs.txt")
    }

    /// Creates the job's directory skeleton (spec.md §4.7).
    pub fn create_dirs(&self) -> Result<(), StoreError> {
        for dir in [self.path.clone(), self.pages_dir(), self.blobs_dir(), self.exports_dir()] {
            std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
                path: dir,
                source,
            })?;
        }
        Ok(())
    }
}

/// Coordinates the manifest, page store, blob store, and registry for one
/// crawl root (default `${USER_DATA}/crawls`, spec.md §4.7).
pub struct CrawlStore {
    root: Utf8PathBuf,
    registry: JobRegistry,
}

impl CrawlStore {
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        let registry = JobRegistry::load(&root)?;
        Ok(Self { root, registry })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Creates a brand-new job: allocates its id, directory, and an
    /// initial `pending` manifest, then records it in the registry.
    pub fn new_job(&mut self, params: &CrawlParams, now: OffsetDateTime) -> Result<JobDir, StoreError> {
        let timestamp_iso = now
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        let job_id = new_job_id(params.seed_url.as_str(), &timestamp_iso);

        let host = params.seed_url.host_str().unwrap_or("unknown").to_lowercase();
        let domain = strip_www(&host).to_string();

        let timestamp_str = format_timestamp_for_folder(now);
        let job_dir = JobDir::new(&self.root, &job_id, &domain, &timestamp_str);
        job_dir.create_dirs()?;

        let state = JobState::new(job_id.clone(), now);
        let manifest = Manifest {
            job_id: job_id.clone(),
            created_at: now,
            params: params.clone(),
            status: state,
        };
        manifest.write(&job_dir.manifest_path())?;

        self.registry.insert(&job_id, &domain, &timestamp_str)?;
        Ok(job_dir)
    }

    /// Locates the directory of an existing job, consulting the registry
    /// first and falling back to a directory scan (mirrors
    /// `original_source/storage.py::_get_job_dir`'s self-healing lookup).
    pub fn job_dir(&mut self, job_id: &str) -> Result<JobDir, StoreError> {
        if let Some(entry) = self.registry.get(job_id) {
            let job_dir = JobDir::new(&self.root, job_id, &entry.domain, &entry.timestamp);
            if job_dir.manifest_path().exists() {
                return Ok(job_dir);
            }
        }

        for domain_entry in std::fs::read_dir(&self.root)
            .map_err(|source| StoreError::Io { path: self.root.clone(), source })?
        {
            let domain_entry = domain_entry.map_err(|source| StoreError::Io { path: self.root.clone(), source })?;
            if !domain_entry.path().is_dir() {
                continue;
            }
            let Some(domain_name) = domain_entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if domain_name.starts_with('.') {
                continue;
            }
            let domain_path = domain_entry.path();
            let Ok(entries) = std::fs::read_dir(&domain_path) else {
                continue;
            };
            for job_entry in entries.flatten() {
                let name = job_entry.file_name().to_string_lossy().to_string();
                if name.contains(&job_id[..job_id.len().min(8)]) && job_entry.path().is_dir() {
                    let suffix = format!("_{}", &job_id[..job_id.len().min(8)]);
                    let timestamp = name
                        .rsplit_once(suffix.as_str())
                        .map(|(t, _)| t.to_string())
                        .unwrap_or_default();
                    self.registry.insert(job_id, &domain_name, &timestamp)?;
                    return Ok(JobDir::new(&self.root, job_id, &domain_name, &timestamp));
                }
            }
        }

        Err(StoreError::JobNotFound(job_id.to_string()))
    }

    pub fn load_manifest(&mut self, job_id: &str) -> Result<Manifest, StoreError> {
        let job_dir = self.job_dir(job_id)?;
        Manifest::read(&job_dir.manifest_path())
    }

    pub fn save_manifest(&self, job_dir: &JobDir, manifest: &Manifest) -> Result<(), StoreError> {
        manifest.write(&job_dir.manifest_path())
    }

    /// Scans every domain directory for manifests, sorted by mtime
    /// descending (spec.md §4.7).
    pub fn list_jobs(&self, limit: usize, offset: usize) -> Result<Vec<Manifest>, StoreError> {
        let mut dirs = Vec::new();
        let Ok(domains) = std::fs::read_dir(&self.root) else {
            return Ok(Vec::new());
        };
        for domain_entry in domains.flatten() {
            if !domain_entry.path().is_dir() {
                continue;
            }
            let Ok(jobs) = std::fs::read_dir(domain_entry.path()) else {
                continue;
            };
            for job_entry in jobs.flatten() {
                let manifest_path = job_entry.path().join("manifest.json");
                if manifest_path.exists() {
                    let mtime = job_entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                    dirs.push((mtime, manifest_path));
                }
            }
        }
        dirs.sort_by(|a, b| b.0.cmp(&a.0));

        let mut manifests = Vec::new();
        for (_, path) in dirs.into_iter().skip(offset).take(limit) {
            let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
                continue;
            };
            if let Ok(manifest) = Manifest::read(&path) {
                manifests.push(manifest);
            }
        }
        Ok(manifests)
    }

    /// Lists a job's pages sorted by mtime ascending (crawl order),
    /// optionally filtered by success/failure.
    pub fn list_pages(
        &mut self,
        job_id: &str,
        offset: usize,
        limit: usize,
        ok_filter: Option<bool>,
    ) -> Result<Vec<PageSummary>, StoreError> {
        let job_dir = self.job_dir(job_id)?;
        PageStore::new(job_dir.pages_dir()).list(offset, limit, ok_filter)
    }
}

fn format_timestamp_for_folder(now: OffsetDateTime) -> String {
    let format = time::format_description::parse("[year]-[month]-[day]_[hour]-[minute]-[second]")
        .expect("static format description is valid");
    now.format(&format).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use url::Url;

    #[test]
    fn job_id_is_sixteen_hex_chars() {
        let id = new_job_id("https://example.com/", "2026-01-01T00:00:00Z");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn strip_www_only_strips_leading() {
        assert_eq!(strip_www("www.example.com"), "example.com");
        assert_eq!(strip_www("example.com"), "example.com");
        assert_eq!(strip_www("wwwexample.com"), "wwwexample.com");
    }

    #[test]
    fn new_job_creates_domain_scoped_dir_without_www() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut store = CrawlStore::open(root).unwrap();

        let params = CrawlParams::new(Url::parse("https://www.example.com/a").unwrap());
        let now = time::macros::datetime!(2026-01-01 12:00:00 UTC);
        let job_dir = store.new_job(&params, now).unwrap();

        assert_eq!(job_dir.domain, "example.com");
        assert!(job_dir.manifest_path().exists());
        assert!(job_dir.pages_dir().exists());
        assert!(job_dir.blobs_dir().exists());
    }

    #[test]
    fn job_dir_round_trips_through_registry() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let mut store = CrawlStore::open(root).unwrap();

        let params = CrawlParams::new(Url::parse("https://example.com/").unwrap());
        let now = time::macros::datetime!(2026-01-01 12:00:00 UTC);
        let created = store.new_job(&params, now).unwrap();

        let found = store.job_dir(&created.job_id).unwrap();
        assert_eq!(found.path(), created.path());
    }
}
