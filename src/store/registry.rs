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

//! `.job_registry.json`: maps `job_id -> {domain, timestamp}` so a job's
//! directory can be found without scanning every domain subtree (spec.md
//! §4.7). `CrawlStore::job_dir` still falls back to a scan when an entry
//! is stale or missing, mirroring `original_source/storage.py`'s
//! self-healing `_get_job_dir`.

use super::StoreError;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub domain: String,
    pub timestamp: String,
}

pub struct JobRegistry {
    path: camino::Utf8PathBuf,
    entries: HashMap<String, RegistryEntry>,
}

impl JobRegistry {
    pub fn load(root: &Utf8Path) -> Result<Self, StoreError> {
        let path = root.join(".job_registry.json");
        let entries = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&bytes).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, job_id: &str) -> Option<&RegistryEntry> {
        self.entries.get(job_id)
    }

    pub fn insert(&mut self, job_id: &str, domain: &str, timestamp: &str) -> Result<(), StoreError> {
        self.entries.insert(
            job_id.to_string(),
            RegistryEntry {
                domain: domain.to_string(),
                timestamp: timestamp.to_string(),
            },
        );
        self.save()
    }

    fn save(&self) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let json = serde_json::to_vec_pretty(&self.entries).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        temp.write_all(&json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        temp.persist(&self.path).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
