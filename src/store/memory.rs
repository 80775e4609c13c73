//! In-process store implementations and their JSON persistence.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::FormConfig;
use crate::store::{CachedInstance, InstanceStore, StoreError, SubmissionLog, Survey, SurveyStore};

/// Surveys declared in the configuration file.
#[derive(Debug)]
pub struct FormRegistry {
    forms: ArcSwap<HashMap<String, Survey>>,
}

impl FormRegistry {
    pub fn from_forms(forms: &[FormConfig]) -> Self {
        Self {
            forms: ArcSwap::from_pointee(index(forms)),
        }
    }

    pub fn len(&self) -> usize {
        self.forms.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn index(forms: &[FormConfig]) -> HashMap<String, Survey> {
    forms.iter().map(|f| (f.id.clone(), Survey::from(f))).collect()
}

#[async_trait]
impl SurveyStore for FormRegistry {
    async fn get(&self, id: &str) -> Result<Option<Survey>, StoreError> {
        Ok(self.forms.load().get(id).cloned())
    }

    fn reload(&self, forms: &[FormConfig]) {
        self.forms.store(Arc::new(index(forms)));
        tracing::info!(forms = forms.len(), "Form registry reloaded");
    }
}

/// One accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionEntry {
    pub form_id: String,
    pub instance_id: String,
    pub deprecated_id: Option<String>,
    /// Seconds since epoch.
    pub recorded_at: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubmissionLogFile {
    submissions: Vec<SubmissionEntry>,
    counts: BTreeMap<String, u64>,
}

/// Thread-safe submission log with optional file persistence.
#[derive(Debug, Clone, Default)]
pub struct MemorySubmissionLog {
    /// Keyed by (form id, instance id).
    entries: Arc<DashMap<(String, String), SubmissionEntry>>,
    counts: Arc<DashMap<String, u64>>,
    persistence_path: Option<PathBuf>,
}

impl MemorySubmissionLog {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            persistence_path,
            ..Self::default()
        }
    }

    /// Load from file if it exists; the same path is used when saving.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let log = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let file: SubmissionLogFile = serde_json::from_reader(reader)?;
            for entry in file.submissions {
                log.entries
                    .insert((entry.form_id.clone(), entry.instance_id.clone()), entry);
            }
            for (form_id, count) in file.counts {
                log.counts.insert(form_id, count);
            }
            tracing::info!(submissions = log.entries.len(), "Loaded submission log");
        }
        Ok(log)
    }

    /// Save to the persistence path, if one is set.
    pub fn save_to_file(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let mut submissions: Vec<SubmissionEntry> = self.entries.iter().map(|r| r.value().clone()).collect();
        submissions.sort_by(|a, b| (a.recorded_at, &a.instance_id).cmp(&(b.recorded_at, &b.instance_id)));
        let counts = self
            .counts
            .iter()
            .map(|r| (r.key().clone(), *r.value()))
            .collect();

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &SubmissionLogFile { submissions, counts })?;
        tracing::info!(path = ?path, submissions = self.entries.len(), "Saved submission log");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, form_id: &str, instance_id: &str) -> Option<SubmissionEntry> {
        self.entries
            .get(&(form_id.to_string(), instance_id.to_string()))
            .map(|r| r.value().clone())
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl SubmissionLog for MemorySubmissionLog {
    async fn record_if_new(
        &self,
        form_id: &str,
        instance_id: &str,
        deprecated_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        // the entry guard holds the shard lock, so check and insert are one step
        match self.entries.entry((form_id.to_string(), instance_id.to_string())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(SubmissionEntry {
                    form_id: form_id.to_string(),
                    instance_id: instance_id.to_string(),
                    deprecated_id: deprecated_id.map(str::to_string),
                    recorded_at: now_secs(),
                });
                *self.counts.entry(form_id.to_string()).or_insert(0) += 1;
                Ok(true)
            }
        }
    }

    async fn submission_count(&self, form_id: &str) -> Result<u64, StoreError> {
        Ok(self.counts.get(form_id).map(|r| *r.value()).unwrap_or(0))
    }
}

/// Cached instances keyed by instance id.
#[derive(Debug, Clone, Default)]
pub struct MemoryInstanceStore {
    inner: Arc<DashMap<String, CachedInstance>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object of `instance id → cached instance`.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self::new();
        let path = path.as_ref();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, CachedInstance> = serde_json::from_reader(reader)?;
            for (id, instance) in map {
                store.inner.insert(id, instance);
            }
            tracing::info!(instances = store.inner.len(), "Loaded instance cache");
        }
        Ok(store)
    }

    pub fn insert(&self, instance_id: impl Into<String>, instance: CachedInstance) {
        self.inner.insert(instance_id.into(), instance);
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn get(&self, instance_id: &str) -> Result<Option<CachedInstance>, StoreError> {
        Ok(self.inner.get(instance_id).map(|r| r.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(id: &str) -> FormConfig {
        FormConfig {
            id: id.to_string(),
            server_url: "http://odk.test".to_string(),
            open_rosa_id: "household".to_string(),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_registry_reload() {
        let registry = FormRegistry::from_forms(&[form("a")]);
        assert!(registry.get("a").await.unwrap().is_some());
        assert!(registry.get("b").await.unwrap().is_none());

        registry.reload(&[form("b")]);
        assert!(registry.get("a").await.unwrap().is_none());
        assert_eq!(registry.get("b").await.unwrap().unwrap().open_rosa_id, "household");
    }

    #[tokio::test]
    async fn test_record_if_new_counts_once() {
        let log = MemorySubmissionLog::new(None);
        assert!(log.record_if_new("a", "uuid:1", None).await.unwrap());
        assert!(!log.record_if_new("a", "uuid:1", Some("uuid:0")).await.unwrap());
        assert!(log.record_if_new("a", "uuid:2", Some("uuid:1")).await.unwrap());
        assert!(log.record_if_new("b", "uuid:1", None).await.unwrap());

        assert_eq!(log.submission_count("a").await.unwrap(), 2);
        assert_eq!(log.submission_count("b").await.unwrap(), 1);
        assert_eq!(log.submission_count("c").await.unwrap(), 0);
        assert_eq!(log.get("a", "uuid:1").unwrap().deprecated_id, None);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_record_once() {
        let log = MemorySubmissionLog::new(None);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.record_if_new("a", "uuid:dup", None).await.unwrap()
            }));
        }
        let mut firsts = 0;
        for handle in handles {
            if handle.await.unwrap() {
                firsts += 1;
            }
        }
        assert_eq!(firsts, 1);
        assert_eq!(log.submission_count("a").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persistence() {
        let path = std::env::temp_dir().join(format!("relay-log-{}.json", uuid::Uuid::new_v4()));

        let log = MemorySubmissionLog::new(Some(path.clone()));
        log.record_if_new("a", "uuid:1", Some("uuid:0")).await.unwrap();
        log.save_to_file().unwrap();

        let loaded = MemorySubmissionLog::load_from_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.submission_count("a").await.unwrap(), 1);
        assert!(!loaded.record_if_new("a", "uuid:1", None).await.unwrap());

        std::fs::remove_file(path).unwrap_or_default();
    }

    #[tokio::test]
    async fn test_instance_store_file() {
        let path = std::env::temp_dir().join(format!("relay-instances-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{"uuid:1": {"open_rosa_key": "or:https://odk.test,household", "instance": "<data/>"}}"#,
        )
        .unwrap();

        let store = MemoryInstanceStore::load_from_file(&path).unwrap();
        let cached = store.get("uuid:1").await.unwrap().unwrap();
        assert_eq!(cached.instance, "<data/>");
        assert!(cached.instance_attachments.is_empty());
        assert!(store.get("uuid:2").await.unwrap().is_none());

        std::fs::remove_file(path).unwrap_or_default();
    }
}
