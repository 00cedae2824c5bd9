use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub name: String,
    pub parent: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub file_name: String,
    pub file_url: String,
    pub folder: String,
    pub attached_to_doctype: Option<String>,
    pub attached_to_name: Option<String>,
    pub is_private: bool,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
}

/// Input of [`Store::save_file`].
#[derive(Debug, Clone, Copy)]
pub struct NewFile<'a> {
    pub file_name: &'a str,
    pub content: &'a [u8],
    pub attached_to_doctype: Option<&'a str>,
    pub attached_to_name: Option<&'a str>,
    pub folder: &'a str,
    pub is_private: bool,
}

fn file_url_for(file_name: &str, is_private: bool) -> String {
    if is_private {
        format!("/private/files/{}", file_name)
    } else {
        format!("/files/{}", file_name)
    }
}

/// `report.xlsx` + `ab12cd` -> `report-ab12cd.xlsx`
fn suffixed_file_name(file_name: &str, suffix: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{suffix}.{ext}"),
        _ => format!("{file_name}-{suffix}"),
    }
}

impl Store {
    pub fn folder_exists(&self, name: &str, parent: &str) -> Result<bool, StoreError> {
        let key = keys::folder_key(parent, name);
        Ok(self.folders.contains_key(key.as_bytes())?)
    }

    /// Create `parent/name` unless it exists. Returns `true` when created.
    pub fn ensure_folder(&self, name: &str, parent: &str) -> Result<bool, StoreError> {
        if self.folder_exists(name, parent)? {
            return Ok(false);
        }
        if !parent.is_empty() && !self.folders.contains_key(parent.as_bytes())? {
            return Err(StoreError::NotFound {
                entity: "folder".to_string(),
                key: parent.to_string(),
            });
        }

        let folder = Folder {
            name: name.to_string(),
            parent: parent.to_string(),
            created_at: Utc::now(),
        };
        let key = keys::folder_key(parent, name);
        let cas_result = self.folders.compare_and_swap(
            key.as_bytes(),
            None::<&[u8]>,
            Some(Self::serialize(&folder)?),
        )?;
        // Lost the race to another creator; the folder exists either way.
        Ok(cas_result.is_ok())
    }

    /// Store `content` and its metadata. A name collision inside the URL space
    /// gets a short unique suffix, the way the host file manager does it.
    pub fn save_file(&self, new_file: NewFile<'_>) -> Result<FileRecord, StoreError> {
        if new_file.file_name.trim().is_empty() {
            return Err(StoreError::Validation("file name must not be empty".into()));
        }
        if !self.folders.contains_key(new_file.folder.as_bytes())? {
            return Err(StoreError::NotFound {
                entity: "folder".to_string(),
                key: new_file.folder.to_string(),
            });
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut file_name = new_file.file_name.to_string();
        let mut file_url = file_url_for(&file_name, new_file.is_private);

        let url_key = keys::file_url_index_key(&file_url);
        let claimed = self
            .files
            .compare_and_swap(url_key.as_bytes(), None::<&[u8]>, Some(id.as_bytes().to_vec()))?;
        if claimed.is_err() {
            file_name = suffixed_file_name(new_file.file_name, &id[..6]);
            file_url = file_url_for(&file_name, new_file.is_private);
            let url_key = keys::file_url_index_key(&file_url);
            let retry = self.files.compare_and_swap(
                url_key.as_bytes(),
                None::<&[u8]>,
                Some(id.as_bytes().to_vec()),
            )?;
            if retry.is_err() {
                return Err(StoreError::Conflict {
                    entity: "file_url".to_string(),
                    key: file_url,
                });
            }
        }

        let record = FileRecord {
            id: id.clone(),
            file_name,
            file_url: file_url.clone(),
            folder: new_file.folder.to_string(),
            attached_to_doctype: new_file.attached_to_doctype.map(str::to_string),
            attached_to_name: new_file.attached_to_name.map(str::to_string),
            is_private: new_file.is_private,
            file_size: new_file.content.len() as u64,
            created_at: Utc::now(),
        };

        let key = keys::file_key(&id);
        let record_bytes = Self::serialize(&record)?;
        let write = self
            .file_contents
            .insert(key.as_bytes(), new_file.content)
            .and_then(|_| self.files.insert(key.as_bytes(), record_bytes));
        if let Err(e) = write {
            let _ = self
                .files
                .remove(keys::file_url_index_key(&file_url).as_bytes());
            let _ = self.file_contents.remove(key.as_bytes());
            return Err(StoreError::Sled(e));
        }
        Ok(record)
    }

    pub fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        let key = keys::file_key(file_id);
        match self.files.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_file_by_url(&self, file_url: &str) -> Result<Option<FileRecord>, StoreError> {
        let index_key = keys::file_url_index_key(file_url);
        let Some(id_raw) = self.files.get(index_key.as_bytes())? else {
            return Ok(None);
        };
        let file_id = match String::from_utf8(id_raw.to_vec()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid UTF-8 in file url index");
                return Ok(None);
            }
        };
        self.get_file(&file_id)
    }

    pub fn get_file_content(&self, file_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = keys::file_key(file_id);
        Ok(self.file_contents.get(key.as_bytes())?.map(|raw| raw.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("files.sled").to_str().unwrap()).unwrap();
        store.ensure_folder("Home", "").unwrap();
        (dir, store)
    }

    fn new_file<'a>(name: &'a str, content: &'a [u8]) -> NewFile<'a> {
        NewFile {
            file_name: name,
            content,
            attached_to_doctype: Some("iiQ-Check Export"),
            attached_to_name: Some("exp-1"),
            folder: "Home/iiq-check",
            is_private: true,
        }
    }

    #[test]
    fn ensure_folder_is_idempotent() {
        let (_dir, store) = open_store();
        assert!(store.ensure_folder("iiq-check", "Home").unwrap());
        assert!(!store.ensure_folder("iiq-check", "Home").unwrap());
        assert!(store.folder_exists("iiq-check", "Home").unwrap());
    }

    #[test]
    fn folder_needs_existing_parent() {
        let (_dir, store) = open_store();
        let err = store.ensure_folder("x", "Missing").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn save_and_read_back_by_url() {
        let (_dir, store) = open_store();
        store.ensure_folder("iiq-check", "Home").unwrap();

        let saved = store.save_file(new_file("a.xlsx", b"PK\x03\x04")).unwrap();
        assert_eq!(saved.file_url, "/private/files/a.xlsx");
        assert_eq!(saved.file_size, 4);

        let found = store.get_file_by_url("/private/files/a.xlsx").unwrap().unwrap();
        assert_eq!(found, saved);
        assert_eq!(
            store.get_file_content(&found.id).unwrap().unwrap(),
            b"PK\x03\x04".to_vec()
        );
    }

    #[test]
    fn colliding_names_get_suffix() {
        let (_dir, store) = open_store();
        store.ensure_folder("iiq-check", "Home").unwrap();

        let first = store.save_file(new_file("a.xlsx", b"1")).unwrap();
        let second = store.save_file(new_file("a.xlsx", b"2")).unwrap();
        assert_ne!(first.file_url, second.file_url);
        assert!(second.file_name.starts_with("a-"));
        assert!(second.file_name.ends_with(".xlsx"));
    }

    #[test]
    fn save_into_missing_folder_fails() {
        let (_dir, store) = open_store();
        let err = store.save_file(new_file("a.xlsx", b"1")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn suffix_keeps_extension() {
        assert_eq!(suffixed_file_name("r.xlsx", "abc"), "r-abc.xlsx");
        assert_eq!(suffixed_file_name("plain", "abc"), "plain-abc");
    }
}
