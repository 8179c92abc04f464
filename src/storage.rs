//! # Object Store
//!
//! Flat-namespace blob storage behind a single front: a filesystem
//! backend for local runs and tests, and a Google Cloud Storage JSON
//! API backend for deployment. Paths are forward-slash keys relative
//! to the store root.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::StorageConfig;

const GCS_BASE: &str = "https://storage.googleapis.com";

/// Metadata prefix for student category CSVs.
pub const STUDENT_CATEGORIES_PREFIX: &str = "application_metadata/student_categories";
/// Metadata prefix for predicted probability CSVs. The misspelling is
/// load-bearing: existing uploads live under this key.
pub const PREDICTED_PROBABILITIES_PREFIX: &str = "application_metadata/predicted_probabilites";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {path}")]
    NotFound { path: String },
    #[error("invalid object path: {path}")]
    InvalidPath { path: String },
    #[error("unrecognized metadata file name: {name}")]
    UnknownMetadataFile { name: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage backend returned {status} for {path}")]
    Backend { status: u16, path: String },
}

/// Store path of the student categories CSV for a term.
pub fn student_categories_path(sis_term_id: &str) -> String {
    format!(
        "{}/{}-netid-name-stunum-categories.csv",
        STUDENT_CATEGORIES_PREFIX, sis_term_id
    )
}

/// Store path of the predicted probabilities CSV for a term.
pub fn predicted_probabilities_path(sis_term_id: &str) -> String {
    format!("{}/{}-pred-proba.csv", PREDICTED_PROBABILITIES_PREFIX, sis_term_id)
}

/// Store path of the weekly RAD export CSV.
pub fn rad_data_path(sis_term_id: &str, week: u32) -> String {
    format!(
        "{}/{}/rad_data/{}-week-{}-rad-data.csv",
        sis_term_id, week, sis_term_id, week
    )
}

/// Resolves an uploaded metadata file name to its store path, based on
/// the naming convention alone.
pub fn metadata_upload_path(file_name: &str) -> Result<String, StorageError> {
    if file_name.contains('/') || file_name.contains("..") {
        return Err(StorageError::InvalidPath {
            path: file_name.to_string(),
        });
    }
    if file_name.ends_with("-netid-name-stunum-categories.csv") {
        Ok(format!("{}/{}", STUDENT_CATEGORIES_PREFIX, file_name))
    } else if file_name.ends_with("-pred-proba.csv") {
        Ok(format!("{}/{}", PREDICTED_PROBABILITIES_PREFIX, file_name))
    } else {
        Err(StorageError::UnknownMetadataFile {
            name: file_name.to_string(),
        })
    }
}

/// Blob storage front. Variants are selected from [`StorageConfig`].
#[derive(Debug, Clone)]
pub enum ObjectStore {
    Fs(FsObjectStore),
    Gcs(GcsObjectStore),
}

impl ObjectStore {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        match config.backend.as_str() {
            "gcs" => {
                let bucket = config.gcs_bucket.clone().ok_or_else(|| {
                    StorageError::InvalidPath {
                        path: "gcs bucket not configured".to_string(),
                    }
                })?;
                Ok(ObjectStore::Gcs(GcsObjectStore::new(
                    bucket,
                    config.gcs_token.clone(),
                )?))
            }
            _ => Ok(ObjectStore::Fs(FsObjectStore::new(&config.fs_root))),
        }
    }

    pub async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        match self {
            ObjectStore::Fs(fs) => fs.upload(path, bytes).await,
            ObjectStore::Gcs(gcs) => gcs.upload(path, bytes).await,
        }
    }

    pub async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        match self {
            ObjectStore::Fs(fs) => fs.download(path).await,
            ObjectStore::Gcs(gcs) => gcs.download(path).await,
        }
    }

    /// Lists object paths under `prefix` whose names end with `suffix`.
    pub async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        match self {
            ObjectStore::Fs(fs) => fs.list(prefix, suffix).await,
            ObjectStore::Gcs(gcs) => gcs.list(prefix, suffix).await,
        }
    }

    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        match self {
            ObjectStore::Fs(fs) => fs.delete(path).await,
            ObjectStore::Gcs(gcs) => gcs.delete(path).await,
        }
    }
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if path.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(path))
    }

    pub async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(())
    }

    pub async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.resolve(prefix)?;
        let mut found = Vec::new();
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(entry_path);
                } else if let Ok(rel) = entry_path.strip_prefix(&self.root) {
                    let key = rel.to_string_lossy().replace('\\', "/");
                    if key.ends_with(suffix) {
                        found.push(key);
                    }
                }
            }
        }
        found.sort();
        Ok(found)
    }

    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

/// Google Cloud Storage JSON API store.
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    http: reqwest::Client,
    bucket: String,
    token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GcsListResponse {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct GcsObject {
    name: String,
}

impl GcsObjectStore {
    pub fn new(bucket: String, token: Option<String>) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            bucket,
            token,
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn encode(path: &str) -> String {
        url::form_urlencoded::byte_serialize(path.as_bytes()).collect()
    }

    pub async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            GCS_BASE,
            self.bucket,
            Self::encode(path)
        );
        let response = self
            .authed(self.http.post(&url))
            .body(bytes.to_vec())
            .send()
            .await?;
        Self::check(response.status(), path)?;
        Ok(())
    }

    pub async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}?alt=media",
            GCS_BASE,
            self.bucket,
            Self::encode(path)
        );
        let response = self.authed(self.http.get(&url)).send().await?;
        if response.status().as_u16() == 404 {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        Self::check(response.status(), path)?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn list(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StorageError> {
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/storage/v1/b/{}/o?prefix={}",
                GCS_BASE,
                self.bucket,
                Self::encode(prefix)
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(&Self::encode(token));
            }
            let response = self.authed(self.http.get(&url)).send().await?;
            Self::check(response.status(), prefix)?;
            let page: GcsListResponse = response.json().await?;
            found.extend(
                page.items
                    .into_iter()
                    .map(|o| o.name)
                    .filter(|name| name.ends_with(suffix)),
            );
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        found.sort();
        Ok(found)
    }

    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            GCS_BASE,
            self.bucket,
            Self::encode(path)
        );
        let response = self.authed(self.http.delete(&url)).send().await?;
        if response.status().as_u16() == 404 {
            return Err(StorageError::NotFound {
                path: path.to_string(),
            });
        }
        Self::check(response.status(), path)?;
        Ok(())
    }

    fn check(status: reqwest::StatusCode, path: &str) -> Result<(), StorageError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(StorageError::Backend {
                status: status.as_u16(),
                path: path.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_paths_follow_naming_convention() {
        assert_eq!(
            student_categories_path("2021-spring"),
            "application_metadata/student_categories/2021-spring-netid-name-stunum-categories.csv"
        );
        assert_eq!(
            predicted_probabilities_path("2021-spring"),
            "application_metadata/predicted_probabilites/2021-spring-pred-proba.csv"
        );
        assert_eq!(
            rad_data_path("2021-spring", 3),
            "2021-spring/3/rad_data/2021-spring-week-3-rad-data.csv"
        );
    }

    #[test]
    fn metadata_upload_routes_by_file_name() {
        assert_eq!(
            metadata_upload_path("2021-spring-netid-name-stunum-categories.csv").unwrap(),
            "application_metadata/student_categories/2021-spring-netid-name-stunum-categories.csv"
        );
        assert_eq!(
            metadata_upload_path("2021-spring-pred-proba.csv").unwrap(),
            "application_metadata/predicted_probabilites/2021-spring-pred-proba.csv"
        );
        assert!(metadata_upload_path("notes.txt").is_err());
        assert!(metadata_upload_path("../escape-pred-proba.csv").is_err());
    }

    #[tokio::test]
    async fn fs_store_round_trip_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::Fs(FsObjectStore::new(dir.path()));

        store
            .upload("2021-spring/1/rad_data/file.csv", b"a,b\n1,2\n")
            .await
            .unwrap();
        let bytes = store.download("2021-spring/1/rad_data/file.csv").await.unwrap();
        assert_eq!(bytes, b"a,b\n1,2\n");

        let listed = store.list("2021-spring", ".csv").await.unwrap();
        assert_eq!(listed, vec!["2021-spring/1/rad_data/file.csv".to_string()]);

        store.delete("2021-spring/1/rad_data/file.csv").await.unwrap();
        assert!(matches!(
            store.download("2021-spring/1/rad_data/file.csv").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(
            store.download("../outside.csv").await,
            Err(StorageError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn fs_list_of_missing_prefix_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.list("nope", ".csv").await.unwrap().is_empty());
    }
}
