use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::archive::ArchiveEntry;
use crate::config::Config;
use crate::error::StoreError;
use crate::extract::ExtractedCourse;
use crate::model::Course;

/// Bumped whenever a persisted record shape changes, so old data can be
/// migrated instead of silently misread.
pub const SCHEMA_VERSION: u32 = 1;

/// Durable description of an imported or published package.
///
/// `files` is a best-effort snapshot capped at `Config::package_file_cap`
/// entries; archives with more entries than the cap do not round-trip their
/// full file list through this record.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub schema_version: u32,
    pub title: String,
    pub description: String,
    pub upload_date: DateTime<Utc>,
    pub files: Vec<ArchiveEntry>,
    pub main_file: String,
    pub manifest_path: Option<String>,
    pub manifest_dir: String,
    pub file_structure: Value,
    pub nested_zip_info: NestedZipInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_built_with_builder: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder_data: Option<ExtractedCourse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_count: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NestedZipInfo {
    pub has_nested_zips: bool,
    pub nested_zip_files: Vec<String>,
    pub extracted_nested_zip: bool,
    pub extracted_zip_name: Option<String>,
}

/// Stored course being edited through the REST surface.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub schema_version: u32,
    pub course: Course,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unpublished, time-boxed snapshot of a course being edited. Superseded by
/// the published Package Record.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: String,
    pub schema_version: u32,
    pub title: String,
    pub description: String,
    pub course_data: Course,
    pub timestamp: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub module_count: usize,
    pub element_count: usize,
}

/// Persistence port. The core never touches a concrete backing store
/// directly; anything that can hold JSON values under string keys works.
pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// JSON-file store under a root directory. One file per key; a byte quota
/// over the whole tree stands in for the browser's storage limit and
/// surfaces as `QuotaExceeded` rather than a silent partial write.
pub struct JsonFileStore {
    root: PathBuf,
    quota_bytes: u64,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        JsonFileStore {
            root: root.into(),
            quota_bytes,
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    fn used_bytes(&self) -> u64 {
        fn dir_size(dir: &Path) -> u64 {
            let Ok(read) = fs::read_dir(dir) else {
                return 0;
            };
            read.flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        dir_size(&path)
                    } else {
                        entry.metadata().map(|m| m.len()).unwrap_or(0)
                    }
                })
                .sum()
        }
        dir_size(&self.root)
    }
}

impl Storage for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(value)?;
        let needed = bytes.len() as u64;
        // overwrites free the old record's bytes, so they count against the
        // quota only by the difference
        let replaced = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if self
            .used_bytes()
            .saturating_sub(replaced)
            .saturating_add(needed)
            > self.quota_bytes
        {
            return Err(StoreError::QuotaExceeded {
                needed,
                limit: self.quota_bytes,
            });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(prefix);
        let mut keys = Vec::new();
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(err) => return Err(err.into()),
        };
        for entry in read.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".json") {
                keys.push(format!("{prefix}/{stem}"));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Typed record operations over the storage port.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Storage>,
    max_drafts: usize,
    draft_retention: Duration,
}

impl Store {
    pub fn new(backend: Arc<dyn Storage>, config: &Config) -> Self {
        Store {
            backend,
            max_drafts: config.max_drafts,
            draft_retention: Duration::days(config.draft_retention_days),
        }
    }

    fn load_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.backend.load(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn save_typed<T: Serialize>(&self, key: &str, record: &T) -> Result<(), StoreError> {
        self.backend.save(key, &serde_json::to_value(record)?)
    }

    // --- packages ---

    pub fn save_package(&self, record: &PackageRecord) -> Result<(), StoreError> {
        self.save_typed(&format!("packages/{}", record.id), record)
    }

    pub fn get_package(&self, id: &str) -> Result<PackageRecord, StoreError> {
        self.load_typed(&format!("packages/{id}"))?
            .ok_or_else(|| StoreError::NotFound(format!("package {id}")))
    }

    pub fn list_packages(&self) -> Result<Vec<PackageRecord>, StoreError> {
        let mut records = Vec::new();
        for key in self.backend.list("packages")? {
            if let Some(record) = self.load_typed::<PackageRecord>(&key)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        Ok(records)
    }

    pub fn delete_package(&self, id: &str) -> Result<(), StoreError> {
        self.backend.delete(&format!("packages/{id}"))
    }

    // --- courses ---

    pub fn create_course(&self, course: Course) -> Result<CourseRecord, StoreError> {
        let now = Utc::now();
        let record = CourseRecord {
            id: Uuid::new_v4().to_string(),
            schema_version: SCHEMA_VERSION,
            course,
            created_at: now,
            updated_at: now,
        };
        self.save_typed(&format!("courses/{}", record.id), &record)?;
        Ok(record)
    }

    pub fn get_course(&self, id: &str) -> Result<CourseRecord, StoreError> {
        self.load_typed(&format!("courses/{id}"))?
            .ok_or_else(|| StoreError::NotFound(format!("course {id}")))
    }

    pub fn update_course(&self, id: &str, course: Course) -> Result<CourseRecord, StoreError> {
        let mut record = self.get_course(id)?;
        record.course = course;
        record.updated_at = Utc::now();
        self.save_typed(&format!("courses/{id}"), &record)?;
        Ok(record)
    }

    pub fn list_courses(&self) -> Result<Vec<CourseRecord>, StoreError> {
        let mut records = Vec::new();
        for key in self.backend.list("courses")? {
            if let Some(record) = self.load_typed::<CourseRecord>(&key)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    pub fn delete_course(&self, id: &str) -> Result<(), StoreError> {
        self.backend.delete(&format!("courses/{id}"))?;
        self.backend.delete(&format!("drafts/{id}"))
    }

    // --- drafts ---

    /// Save a draft for a course, then prune the draft list: anything past
    /// the retention window goes, and only the most recent `max_drafts`
    /// survive.
    pub fn save_draft(&self, course_id: &str, course: &Course) -> Result<Draft, StoreError> {
        let now = Utc::now();
        let previous: Option<Draft> = self.load_typed(&format!("drafts/{course_id}"))?;
        let draft = Draft {
            id: course_id.to_string(),
            schema_version: SCHEMA_VERSION,
            title: course.title.clone(),
            description: course.description.clone(),
            course_data: course.clone(),
            timestamp: previous.map(|d| d.timestamp).unwrap_or(now),
            last_modified: now,
            module_count: course.modules.len(),
            element_count: course.element_count(),
        };
        self.save_typed(&format!("drafts/{course_id}"), &draft)?;
        self.prune_drafts()?;
        Ok(draft)
    }

    pub fn get_draft(&self, course_id: &str) -> Result<Option<Draft>, StoreError> {
        let draft: Option<Draft> = self.load_typed(&format!("drafts/{course_id}"))?;
        match draft {
            Some(d) if Utc::now() - d.last_modified > self.draft_retention => {
                self.backend.delete(&format!("drafts/{course_id}"))?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub fn clear_draft(&self, course_id: &str) -> Result<(), StoreError> {
        self.backend.delete(&format!("drafts/{course_id}"))
    }

    fn prune_drafts(&self) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut drafts: Vec<(String, Draft)> = Vec::new();
        for key in self.backend.list("drafts")? {
            if let Some(draft) = self.load_typed::<Draft>(&key)? {
                drafts.push((key, draft));
            }
        }

        let (kept, expired): (Vec<_>, Vec<_>) = drafts
            .into_iter()
            .partition(|(_, d)| now - d.last_modified <= self.draft_retention);
        for (key, _) in expired {
            self.backend.delete(&key)?;
        }

        let mut kept = kept;
        kept.sort_by(|a, b| b.1.last_modified.cmp(&a.1.last_modified));
        for (key, _) in kept.into_iter().skip(self.max_drafts) {
            self.backend.delete(&key)?;
        }
        Ok(())
    }

    // --- progress ---

    pub fn save_progress(
        &self,
        package_id: &str,
        user_id: &str,
        data: &Value,
    ) -> Result<(), StoreError> {
        self.backend
            .save(&format!("progress/{package_id}_{user_id}"), data)
    }

    pub fn get_progress(
        &self,
        package_id: &str,
        user_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        self.backend.load(&format!("progress/{package_id}_{user_id}"))
    }
}
