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

//! The job manifest: the single file rewritten atomically on every state
//! transition and on each monitor tick (spec.md §4.7, §5).

use super::StoreError;
use crate::models::{CrawlParams, JobState};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::NamedTempFile;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub job_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub params: CrawlParams,
    pub status: JobState,
}

impl Manifest {
    pub fn read(path: &Utf8Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })
    }

    /// Writes the manifest via write-temp-then-rename so a concurrent
    /// reader (or a crash mid-write) never observes a half-written file.
    pub fn write(&self, path: &Utf8Path) -> Result<(), StoreError> {
        let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let json = serde_json::to_vec_pretty(self).map_err(|source| StoreError::Json {
            path: path.to_owned(),
            source,
        })?;
        temp.write_all(&json).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;
        temp.persist(path).map_err(|source| StoreError::Persist {
            path: path.to_owned(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use url::Url;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("manifest.json")).unwrap();

        let params = CrawlParams::new(Url::parse("https://example.com/").unwrap());
        let now = time::macros::datetime!(2026-01-01 00:00:00 UTC);
        let manifest = Manifest {
            job_id: "abc123".to_string(),
            created_at: now,
            params,
            status: JobState::new("abc123".to_string(), now),
        };

        manifest.write(&path).unwrap();
        let loaded = Manifest::read(&path).unwrap();
        assert_eq!(loaded.job_id, "abc123");
        assert_eq!(loaded.status.job_id, "abc123");
    }
}
