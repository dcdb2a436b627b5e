//! Test case store: persists and retrieves recorded test cases.

use crate::error::{Result, RetraceError};
use crate::recording::schema::TestCase;
use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const ID_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Manages test case persistence, one JSON document per test case.
pub struct TestCaseStore {
    dir: PathBuf,
    cases: RwLock<HashMap<String, TestCase>>,
    reserved: Mutex<HashSet<String>>,
}

impl TestCaseStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| RetraceError::persistence(&dir, e))?;

        let store = Self {
            dir,
            cases: RwLock::new(HashMap::new()),
            reserved: Mutex::new(HashSet::new()),
        };
        store.load_all()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load all test cases from disk. Unreadable files are skipped.
    fn load_all(&self) -> Result<()> {
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| RetraceError::persistence(&self.dir, e))?;
        let mut map = self.cases.write();

        for entry in entries {
            let path = entry.map_err(|e| RetraceError::persistence(&self.dir, e))?.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                match load_one(&path) {
                    Ok(test_case) => {
                        map.insert(test_case.id.clone(), test_case);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load test case from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::debug!("Loaded {} test cases from {:?}", map.len(), self.dir);
        Ok(())
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(RetraceError::Validation(format!("Invalid test case id: {:?}", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }

    /// Allocate a fresh timestamp-derived id, suffixed `-NNN` on collision so
    /// ids keep sorting in creation order.
    pub fn allocate_id(&self, now: DateTime<Local>) -> String {
        let base = now.format(ID_FORMAT).to_string();
        let cases = self.cases.read();
        let mut reserved = self.reserved.lock();

        let taken = |candidate: &str| {
            cases.contains_key(candidate)
                || reserved.contains(candidate)
                || self.dir.join(format!("{}.json", candidate)).exists()
        };

        let mut id = base.clone();
        let mut n = 1;
        while taken(&id) {
            id = format!("{}-{:03}", base, n);
            n += 1;
        }

        reserved.insert(id.clone());
        id
    }

    fn write_file(&self, test_case: &TestCase) -> Result<PathBuf> {
        let path = self.path_for(&test_case.id)?;
        let content = serde_json::to_string_pretty(test_case)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| RetraceError::persistence(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| RetraceError::persistence(&path, e))?;
        Ok(path)
    }

    /// All test cases, newest first.
    pub fn list(&self) -> Vec<TestCase> {
        let mut cases: Vec<TestCase> = self.cases.read().values().cloned().collect();
        cases.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        cases
    }

    /// Get a test case by id, falling back to disk for files written elsewhere.
    pub fn get(&self, id: &str) -> Result<TestCase> {
        if let Some(tc) = self.cases.read().get(id) {
            return Ok(tc.clone());
        }

        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(RetraceError::TestCaseNotFound(id.to_string()));
        }

        let test_case = load_one(&path)?;
        self.cases
            .write()
            .insert(test_case.id.clone(), test_case.clone());
        Ok(test_case)
    }

    /// Persist a test case atomically and return its path.
    ///
    /// The id reservation is released whether or not the write succeeds.
    pub fn save(&self, test_case: &TestCase) -> Result<PathBuf> {
        let written = self.write_file(test_case);
        self.reserved.lock().remove(&test_case.id);
        let path = written?;

        self.cases
            .write()
            .insert(test_case.id.clone(), test_case.clone());

        tracing::debug!("Saved test case {} to {:?}", test_case.id, path);
        Ok(path)
    }

    /// Delete a test case. Returns false when it did not exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;

        let existed_on_disk = path.exists();
        if existed_on_disk {
            std::fs::remove_file(&path).map_err(|e| RetraceError::persistence(&path, e))?;
        }

        let cached = self.cases.write().remove(id).is_some();
        Ok(existed_on_disk || cached)
    }

    /// Case-insensitive search over name, description, task and tags.
    pub fn search(&self, query: &str) -> Vec<TestCase> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.list();
        }

        self.list()
            .into_iter()
            .filter(|tc| {
                tc.name.to_lowercase().contains(&needle)
                    || tc.description.to_lowercase().contains(&needle)
                    || tc.metadata.task.to_lowercase().contains(&needle)
                    || tc.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .collect()
    }
}

fn load_one(path: &Path) -> Result<TestCase> {
    let content = std::fs::read_to_string(path).map_err(|e| RetraceError::persistence(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::schema::TestCaseMetadata;
    use chrono::{Duration, TimeZone, Utc};

    fn test_case(id: &str, name: &str, minutes_ago: i64) -> TestCase {
        let created = Utc::now() - Duration::minutes(minutes_ago);
        TestCase {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("{} description", name),
            created_at: created,
            updated_at: created,
            start_url: String::new(),
            actions: vec![],
            tags: vec![],
            metadata: TestCaseMetadata {
                task: format!("task for {}", name),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_test_case_crud() {
        let dir = tempfile::tempdir().unwrap();
        let store = TestCaseStore::new(dir.path()).unwrap();

        let tc = test_case("case-1", "Login flow", 0);
        let path = store.save(&tc).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        assert_eq!(store.get("case-1").unwrap(), tc);

        let mut updated = tc.clone();
        updated.name = "Login flow v2".to_string();
        store.save(&updated).unwrap();
        assert_eq!(store.get("case-1").unwrap().name, "Login flow v2");

        assert!(store.delete("case-1").unwrap());
        assert!(!store.delete("case-1").unwrap());
        assert!(matches!(
            store.get("case-1"),
            Err(RetraceError::TestCaseNotFound(_))
        ));
    }

    #[test]
    fn test_reload_from_disk_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TestCaseStore::new(dir.path()).unwrap();
            store.save(&test_case("a", "A", 1)).unwrap();
        }
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let store = TestCaseStore::new(dir.path()).unwrap();
        let listed = store.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "a");
    }

    #[test]
    fn test_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = TestCaseStore::new(dir.path()).unwrap();
        store.save(&test_case("old", "Old", 30)).unwrap();
        store.save(&test_case("new", "New", 1)).unwrap();
        store.save(&test_case("mid", "Mid", 10)).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|tc| tc.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = TestCaseStore::new(dir.path()).unwrap();
        let mut tagged = test_case("b", "Checkout", 2);
        tagged.tags = vec!["Smoke".to_string()];
        store.save(&tagged).unwrap();
        store.save(&test_case("a", "Login", 1)).unwrap();

        assert_eq!(store.search("LOGIN").len(), 1);
        assert_eq!(store.search("smoke")[0].id, "b");
        assert_eq!(store.search("task for").len(), 2);
        assert!(store.search("nothing").is_empty());
    }

    #[test]
    fn test_allocate_id_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = TestCaseStore::new(dir.path()).unwrap();
        let now = Local.with_ymd_and_hms(2026, 10, 18, 9, 15, 2).unwrap();

        let first = store.allocate_id(now);
        let second = store.allocate_id(now);
        assert_eq!(first, "20261018_091502_000");
        assert_eq!(second, "20261018_091502_000-001");

        store.save(&test_case(&first, "First", 0)).unwrap();
        let third = store.allocate_id(now);
        assert_eq!(third, "20261018_091502_000-002");
    }

    #[test]
    fn test_collision_ids_sort_in_allocation_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = TestCaseStore::new(dir.path()).unwrap();
        let now = Local.with_ymd_and_hms(2026, 10, 18, 9, 15, 2).unwrap();

        let ids: Vec<String> = (0..12).map(|_| store.allocate_id(now)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
        assert_eq!(ids[11], "20261018_091502_000-011");
    }

    #[test]
    fn test_failed_save_releases_reserved_id() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cases");
        let store = TestCaseStore::new(&root).unwrap();
        let now = Local.with_ymd_and_hms(2026, 10, 18, 9, 15, 2).unwrap();
        let id = store.allocate_id(now);

        std::fs::remove_dir_all(&root).unwrap();
        std::fs::write(&root, "not a directory").unwrap();

        assert!(matches!(
            store.save(&test_case(&id, "Unsaved", 0)),
            Err(RetraceError::Persistence { .. })
        ));
        assert!(store.list().is_empty());
        assert_eq!(store.allocate_id(now), id);
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = TestCaseStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(RetraceError::Validation(_))
        ));
    }
}
