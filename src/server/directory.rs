use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};

use anyhow::Context;
use tracing::{debug, info, warn};

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub name: String,
    pub password: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub trait CredentialDirectory {
    /// `None` when no user is enrolled under `uid`.
    fn lookup(&self, uid: &str) -> Option<UserRecord>;
}

#[derive(Debug, Default)]
struct Loaded {
    modified: Option<SystemTime>,
    users: BTreeMap<String, UserRecord>,
}

/// Users stored as a JSON array of records, reloaded when the file changes.
#[derive(Debug)]
pub struct JsonDirectory {
    path: Option<PathBuf>,
    loaded: Mutex<Loaded>,
}

impl JsonDirectory {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let loaded = read_users(&path)?;
        info!(path = %path.display(), users = loaded.users.len(), "Loaded user directory");
        Ok(Self {
            path: Some(path),
            loaded: Mutex::new(loaded),
        })
    }

    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> anyhow::Result<Self> {
        let users = index_records(records.into_iter().collect())?;
        Ok(Self {
            path: None,
            loaded: Mutex::new(Loaded {
                modified: None,
                users,
            }),
        })
    }

    pub fn len(&self) -> usize {
        self.loaded().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn loaded(&self) -> MutexGuard<'_, Loaded> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self, loaded: &mut Loaded) {
        let Some(path) = &self.path else {
            return;
        };
        let modified = modified_time(path);
        if modified.is_none() || modified == loaded.modified {
            return;
        }
        match read_users(path) {
            Ok(fresh) => {
                info!(path = %path.display(), users = fresh.users.len(), "Reloaded user directory");
                *loaded = fresh;
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to reload user directory, keeping previous users"
                );
                // don't retry until the file changes again
                loaded.modified = modified;
            }
        }
    }
}

impl CredentialDirectory for JsonDirectory {
    fn lookup(&self, uid: &str) -> Option<UserRecord> {
        let mut loaded = self.loaded();
        self.refresh(&mut loaded);
        let user = loaded.users.get(uid).cloned();
        debug!(uid, found = user.is_some(), "Looked up user");
        user
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_users(path: &Path) -> anyhow::Result<Loaded> {
    let modified = modified_time(path);
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading user directory {}", path.display()))?;
    let records: Vec<UserRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing user directory {}", path.display()))?;
    Ok(Loaded {
        modified,
        users: index_records(records)?,
    })
}

fn index_records(records: Vec<UserRecord>) -> anyhow::Result<BTreeMap<String, UserRecord>> {
    let mut users = BTreeMap::new();
    for record in records {
        if users.contains_key(&record.uid) {
            anyhow::bail!("duplicate uid {} in user directory", record.uid);
        }
        users.insert(record.uid.clone(), record);
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn record(uid: &str, password: &str) -> UserRecord {
        UserRecord {
            uid: uid.to_owned(),
            name: format!("user {uid}"),
            password: password.to_owned(),
        }
    }

    fn scratch_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "lockbridge-{}-{}.json",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn lookup_hits_and_misses() {
        let directory = JsonDirectory::from_records([record("alice", "secret123")]).unwrap();
        assert_eq!(directory.lookup("alice").unwrap().password, "secret123");
        assert!(directory.lookup("bob").is_none());
        assert!(directory.lookup("ALICE").is_none());
    }

    #[test]
    fn duplicate_uids_are_rejected() {
        let err = JsonDirectory::from_records([record("a", "1"), record("a", "2")]).unwrap_err();
        assert!(err.to_string().contains("duplicate uid a"));
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", record("alice", "secret123"));
        assert!(!rendered.contains("secret123"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn load_reads_json_array() {
        let path = scratch_file("load");
        std::fs::write(
            &path,
            r#"[{"uid":"42","name":"Alice","password":"pw"},{"uid":"7","name":"Bob","password":"hunter2"}]"#,
        )
        .unwrap();
        let directory = JsonDirectory::load(&path).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.lookup("7").unwrap().name, "Bob");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_fails_on_missing_or_malformed_file() {
        let path = scratch_file("malformed");
        assert!(JsonDirectory::load(&path).is_err());
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonDirectory::load(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn picks_up_changes_and_survives_bad_rewrites() {
        let path = scratch_file("reload");
        std::fs::write(&path, r#"[{"uid":"1","name":"A","password":"old"}]"#).unwrap();
        let directory = JsonDirectory::load(&path).unwrap();
        assert_eq!(directory.lookup("1").unwrap().password, "old");

        let bump = |contents: &str| {
            std::fs::write(&path, contents).unwrap();
            let later = SystemTime::now() + Duration::from_secs(60 * directory.len() as u64 + 60);
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(later)
                .unwrap();
        };

        bump(concat!(
            r#"[{"uid":"1","name":"A","password":"new"},"#,
            r#"{"uid":"2","name":"B","password":"pw"}]"#
        ));
        assert_eq!(directory.lookup("1").unwrap().password, "new");
        assert!(directory.lookup("2").is_some());

        bump("[broken");
        assert_eq!(directory.lookup("1").unwrap().password, "new");
        assert_eq!(directory.len(), 2);
        std::fs::remove_file(&path).unwrap();
    }
}
