use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::{Template, Todo};

pub const LOGIN_KEY: &str = "todo_login";
pub const TODOS_KEY: &str = "todos";
pub const TEMPLATES_KEY: &str = "templates";
pub const THEME_KEY: &str = "theme";

const KEY_SUFFIX: &str = "data";

/// String key/value store backed by one `<key>.data` file per key.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened datastore");
        Ok(Self { data_dir })
    }

    pub fn key_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.{KEY_SUFFIX}"))
    }

    #[tracing::instrument(skip(self))]
    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.key_path(key);
        debug!(file = %path.display(), bytes = value.len(), "writing key atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn remove(&self, key: &str) -> anyhow::Result<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }

    /// Removes every key, leaving unrelated files in the directory alone.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> anyhow::Result<usize> {
        let mut removed = 0_usize;
        let entries = fs::read_dir(&self.data_dir)
            .with_context(|| format!("failed listing {}", self.data_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == KEY_SUFFIX) {
                fs::remove_file(&path)
                    .with_context(|| format!("failed removing {}", path.display()))?;
                removed += 1;
            }
        }
        info!(removed, "cleared datastore");
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    pub fn load_todos(&self) -> anyhow::Result<Vec<Todo>> {
        self.load_list(TODOS_KEY)
    }

    #[tracing::instrument(skip(self, todos))]
    pub fn save_todos(&self, todos: &[Todo]) -> anyhow::Result<()> {
        self.save_list(TODOS_KEY, todos)
            .context("failed to save todos")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_templates(&self) -> anyhow::Result<Vec<Template>> {
        self.load_list(TEMPLATES_KEY)
    }

    #[tracing::instrument(skip(self, templates))]
    pub fn save_templates(&self, templates: &[Template]) -> anyhow::Result<()> {
        self.save_list(TEMPLATES_KEY, templates)
            .context("failed to save templates")
    }

    /// An absent, unreadable, or corrupt key reads as an empty list.
    fn load_list<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Vec<T>> {
        let raw = match self.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key, "key absent, starting empty");
                return Ok(vec![]);
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(key, error = %reason, "key unreadable, starting empty");
                return Ok(vec![]);
            }
        };

        if raw.trim().is_empty() {
            return Ok(vec![]);
        }

        let values = match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(values) => values,
            Err(err) => {
                warn!(key, error = %err, "stored list is corrupt, starting empty");
                return Ok(vec![]);
            }
        };

        // A bad record costs only itself, not its neighbours.
        let total = values.len();
        let items: Vec<T> = values
            .into_iter()
            .enumerate()
            .filter_map(|(idx, value)| match serde_json::from_value::<T>(value) {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!(key, item = idx, error = %err, "dropping malformed stored record");
                    None
                }
            })
            .collect();
        debug!(key, count = items.len(), dropped = total - items.len(), "loaded list");
        Ok(items)
    }

    fn save_list<T: Serialize>(&self, key: &str, items: &[T]) -> anyhow::Result<()> {
        debug!(key, count = items.len(), "saving list");
        let serialized = serde_json::to_string(items)?;
        self.set(key, &serialized)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{DataStore, LOGIN_KEY, TODOS_KEY};
    use crate::task::Todo;

    #[test]
    fn absent_and_corrupt_lists_read_empty() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        assert!(store.load_todos().expect("absent").is_empty());

        fs::write(store.key_path(TODOS_KEY), "{not json").expect("write garbage");
        assert!(store.load_todos().expect("corrupt").is_empty());

        fs::write(store.key_path(TODOS_KEY), r#"{"title":"x"}"#).expect("write object");
        assert!(store.load_todos().expect("not an array").is_empty());
    }

    #[test]
    fn malformed_record_drops_only_itself() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        fs::write(
            store.key_path(TODOS_KEY),
            r#"[{"title":"A","checked":false},{"title":"B","checked":null},{"title":"C","checked":true}]"#,
        )
        .expect("write mixed list");

        let todos = store.load_todos().expect("load");
        let titles: Vec<&str> = todos.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert!(todos[1].checked);
    }

    #[test]
    fn raw_keys_and_clear() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        store.set(LOGIN_KEY, "1").expect("set");
        assert_eq!(store.get(LOGIN_KEY).expect("get").as_deref(), Some("1"));

        store.remove(LOGIN_KEY).expect("remove");
        store.remove(LOGIN_KEY).expect("remove twice");
        assert_eq!(store.get(LOGIN_KEY).expect("get"), None);

        store
            .save_todos(&[Todo::new("a".to_string())])
            .expect("save");
        fs::write(temp.path().join("notes.txt"), "keep").expect("write other");
        assert_eq!(store.clear().expect("clear"), 1);
        assert!(temp.path().join("notes.txt").exists());
        assert!(store.load_todos().expect("load").is_empty());
    }
}
