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

//! Content-addressed asset blobs (spec.md §4.7, invariant I7: two assets
//! with identical bytes collapse to one file on disk).

use super::{blob_id_of, StoreError};
use crate::models::AssetBlob;
use camino::Utf8PathBuf;

#[derive(Clone)]
pub struct BlobStore {
    dir: Utf8PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn filename(blob_id: &str, extension: Option<&str>) -> String {
        match extension {
            Some(ext) => format!("{blob_id}.{ext}"),
            None => blob_id.to_string(),
        }
    }

    /// Writes `bytes` under its content hash, skipping the write entirely
    /// if a file with that hash already exists. Returns the stored
    /// filename (to be recorded as `source_url -> blob_filename`).
    pub fn put(&self, bytes: &[u8], extension: Option<&str>) -> Result<AssetBlob, StoreError> {
        let blob_id = blob_id_of(bytes);
        let filename = Self::filename(&blob_id, extension);
        let path = self.dir.join(&filename);

        if !path.exists() {
            std::fs::write(&path, bytes).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        }

        Ok(AssetBlob {
            blob_id,
            extension: extension.map(str::to_string),
            bytes: bytes.to_vec(),
        })
    }

    pub fn filename_for(&self, blob_id: &str, extension: Option<&str>) -> String {
        Self::filename(blob_id, extension)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identical_bytes_collapse_to_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());

        let first = store.put(b"same bytes", Some("png")).unwrap();
        let second = store.put(b"same bytes", Some("png")).unwrap();
        assert_eq!(first.blob_id, second.blob_id);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn filename_appends_extension_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());
        let blob = store.put(b"data", Some("jpg")).unwrap();
        assert!(store.filename_for(&blob.blob_id, Some("jpg")).ends_with(".jpg"));
        assert_eq!(store.filename_for(&blob.blob_id, None), blob.blob_id);
    }
}
