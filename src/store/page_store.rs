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

//! Page records: written once under a content-addressed name, never
//! mutated afterwards (spec.md §4.7). Two workers can never clobber the
//! same file because the name is `sha256(canonical_url)`.

use super::{page_id_of, StoreError};
use crate::models::{PageDetail, PageRecord, PageSummary};
use camino::{Utf8Path, Utf8PathBuf};

#[derive(Clone)]
pub struct PageStore {
    dir: Utf8PathBuf,
}

impl PageStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, canonical_url: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}.json", page_id_of(canonical_url)))
    }

    pub fn save(&self, record: &PageRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.url);
        let json = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| StoreError::Io { path, source })
    }

    pub fn load(&self, canonical_url: &str) -> Result<PageDetail, StoreError> {
        let path = self.path_for(canonical_url);
        let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path, source })
    }

    /// Returns every page record under this directory, sorted by file
    /// mtime ascending (crawl order), paginated and optionally filtered
    /// by `ok`.
    pub fn list(
        &self,
        offset: usize,
        limit: usize,
        ok_filter: Option<bool>,
    ) -> Result<Vec<PageSummary>, StoreError> {
        let mut files = self.all_files()?;
        files.sort_by_key(|(mtime, _)| *mtime);

        let mut out = Vec::new();
        let mut skipped = 0usize;
        for (_, path) in files {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let Ok(record) = serde_json::from_slice::<PageRecord>(&bytes) else {
                continue;
            };
            if let Some(want_ok) = ok_filter {
                if record.ok != want_ok {
                    continue;
                }
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            if out.len() >= limit {
                break;
            }
            out.push(PageSummary::from(&record));
        }
        Ok(out)
    }

    pub fn count(&self) -> usize {
        self.all_files().map(|f| f.len()).unwrap_or(0)
    }

    fn all_files(&self) -> Result<Vec<(std::time::SystemTime, Utf8PathBuf)>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })? {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
                continue;
            };
            let mtime = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            files.push((mtime, path));
        }
        Ok(files)
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::ArticleResult;

    fn record(url: &str, ok: bool) -> PageRecord {
        let now = time::macros::datetime!(2026-01-01 00:00:00 UTC);
        if ok {
            PageRecord::ok("job1", url.to_string(), 0, 200, ArticleResult::default(), now)
        } else {
            PageRecord::failed("job1", url.to_string(), 0, 0, "broken", now)
        }
    }

    #[test]
    fn save_then_load_round_trips_by_url_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());

        let rec = record("https://example.com/a", true);
        store.save(&rec).unwrap();

        let loaded = store.load("https://example.com/a").unwrap();
        assert_eq!(loaded.url, rec.url);
        assert!(loaded.ok);
    }

    #[test]
    fn list_applies_status_filter_and_pagination() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());

        store.save(&record("https://example.com/a", true)).unwrap();
        store.save(&record("https://example.com/b", false)).unwrap();
        store.save(&record("https://example.com/c", true)).unwrap();

        let ok_only = store.list(0, 10, Some(true)).unwrap();
        assert_eq!(ok_only.len(), 2);

        let first_page = store.list(0, 1, None).unwrap();
        assert_eq!(first_page.len(), 1);
    }
}
