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

//! JSONL and ZIP exports (spec.md §4.7, §6.1 `GET .../export?format=`).

use super::{JobDir, Manifest, StoreError};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use std::io::Write;

/// One line per page record, with the extractor payload spread at the
/// top level alongside `{url, depth, ok, status_code, timestamp}`.
pub fn export_jsonl(job_dir: &JobDir) -> Result<Utf8PathBuf, StoreError> {
    let dest = job_dir.exports_dir().join("results.jsonl");
    let mut out = std::fs::File::create(&dest).map_err(|source| StoreError::Io {
        path: dest.clone(),
        source,
    })?;

    for path in page_files_sorted(&job_dir.pages_dir())? {
        let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let mut record: Value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let mut flattened = Map::new();
        if let Some(article) = record
            .as_object_mut()
            .and_then(|obj| obj.remove("article_result"))
        {
            if let Value::Object(article_fields) = article {
                flattened.extend(article_fields);
            }
        }
        if let Value::Object(rest) = record {
            flattened.extend(rest);
        }

        let line = serde_json::to_string(&Value::Object(flattened)).map_err(|source| {
            StoreError::Json {
                path: path.clone(),
                source,
            }
        })?;
        writeln!(out, "{line}").map_err(|source| StoreError::Io {
            path: dest.clone(),
            source,
        })?;
    }

    Ok(dest)
}

/// Bundles the JSONL export plus `pages/`, `blobs/`, and `manifest.json`
/// into a single zip archive.
pub fn export_zip(job_dir: &JobDir, manifest: &Manifest) -> Result<Utf8PathBuf, StoreError> {
    let jsonl_path = export_jsonl(job_dir)?;

    let dest = job_dir.exports_dir().join("results.zip");
    let file = std::fs::File::create(&dest).map_err(|source| StoreError::Io {
        path: dest.clone(),
        source,
    })?;
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::FileOptions<()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("manifest.json", options)?;
    zip.write_all(&serde_json::to_vec_pretty(manifest).map_err(|source| StoreError::Json {
        path: job_dir.manifest_path(),
        source,
    })?)
    .map_err(|source| StoreError::Io {
        path: dest.clone(),
        source,
    })?;

    zip.start_file("results.jsonl", options)?;
    let jsonl_bytes = std::fs::read(&jsonl_path).map_err(|source| StoreError::Io {
        path: jsonl_path.clone(),
        source,
    })?;
    zip.write_all(&jsonl_bytes).map_err(|source| StoreError::Io {
        path: dest.clone(),
        source,
    })?;

    add_dir_to_zip(&mut zip, &job_dir.pages_dir(), "pages", options)?;
    add_dir_to_zip(&mut zip, &job_dir.blobs_dir(), "blobs", options)?;

    zip.finish()?;
    Ok(dest)
}

fn add_dir_to_zip(
    zip: &mut zip::ZipWriter<std::fs::File>,
    dir: &Utf8Path,
    archive_prefix: &str,
    options: zip::write::FileOptions<()>,
) -> Result<(), StoreError> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_owned(),
        source,
    })? {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        zip.start_file(format!("{archive_prefix}/{name}"), options)?;
        let bytes = std::fs::read(&path).map_err(|source| StoreError::Io {
            path: dir.join(&name),
            source,
        })?;
        zip.write_all(&bytes).map_err(|source| StoreError::Io {
            path: dir.join(&name),
            source,
        })?;
    }
    Ok(())
}

fn page_files_sorted(dir: &Utf8Path) -> Result<Vec<camino::Utf8PathBuf>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_owned(),
        source,
    })? {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(path) = camino::Utf8PathBuf::from_path_buf(path) else {
            continue;
        };
        files.push(path);
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::{ArticleResult, CrawlParams, JobState, PageRecord};

    #[test]
    fn jsonl_export_spreads_article_result_fields() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let job_dir = JobDir::new(&root, "abc1234567890123", "example.com", "2026-01-01_00-00-00");
        job_dir.create_dirs().unwrap();

        let now = time::macros::datetime!(2026-01-01 00:00:00 UTC);
        let mut article = ArticleResult::default();
        article.title = Some("Hello".to_string());
        let record = PageRecord::ok(
            "abc1234567890123",
            "https://example.com/".to_string(),
            0,
            200,
            article,
            now,
        );
        crate::store::PageStore::new(job_dir.pages_dir()).save(&record).unwrap();

        let jsonl_path = export_jsonl(&job_dir).unwrap();
        let content = std::fs::read_to_string(jsonl_path).unwrap();
        assert!(content.contains("\"title\":\"Hello\""));
        assert!(content.contains("\"url\":\"https://example.com/\""));
    }

    #[test]
    fn zip_export_bundles_manifest_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let job_dir = JobDir::new(&root, "abc1234567890123", "example.com", "2026-01-01_00-00-00");
        job_dir.create_dirs().unwrap();

        let now = time::macros::datetime!(2026-01-01 00:00:00 UTC);
        let params = CrawlParams::new(url::Url::parse("https://example.com/").unwrap());
        let manifest = Manifest {
            job_id: "abc1234567890123".to_string(),
            created_at: now,
            params,
            status: JobState::new("abc1234567890123".to_string(), now),
        };
        manifest.write(&job_dir.manifest_path()).unwrap();

        let zip_path = export_zip(&job_dir, &manifest).unwrap();
        assert!(zip_path.exists());
    }
}
