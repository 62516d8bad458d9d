//! Saved connection profiles.
//!
//! Profiles live in a single JSON object keyed by profile name:
//!
//! ```json
//! {
//!   "office": {
//!     "host": "smtp.example.com",
//!     "user": "ops",
//!     "password": null,
//!     "sender": "ops@example.com",
//!     "recipient": ["noc@example.com"],
//!     "auth": true
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fault::{Fault, Result, StoreError};

/// Application directory under the user's config dir.
const APP_DIR: &str = "groker";

/// Store file name.
const PROFILES_FILE: &str = "profiles.json";

/// A named bundle of connection parameters.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// SMTP host name or address.
    pub host: String,
    /// Login user; presence enables authentication.
    #[serde(default)]
    pub user: Option<String>,
    /// Login password, if saved.
    #[serde(default)]
    pub password: Option<String>,
    /// Envelope sender.
    pub sender: String,
    /// Envelope recipients, in order.
    pub recipient: Vec<String>,
    /// Whether to authenticate.
    #[serde(default)]
    pub auth: bool,
}

impl Profile {
    /// Builds a profile from operator input. Authentication is enabled when a
    /// user is given.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        user: Option<String>,
        password: Option<String>,
        sender: impl Into<String>,
        recipient: Vec<String>,
    ) -> Self {
        let auth = user.is_some();
        Self {
            host: host.into(),
            user,
            password,
            sender: sender.into(),
            recipient,
            auth,
        }
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("auth", &self.auth)
            .finish()
    }
}

/// All saved profiles, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profiles(BTreeMap<String, Profile>);

impl Profiles {
    /// Looks up a profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProfileNotFound`] if there is no such profile.
    pub fn get(&self, name: &str) -> Result<&Profile> {
        debug!("Get saved profile name: {name}");
        self.0
            .get(name)
            .ok_or_else(|| Fault::ProfileNotFound(name.to_string()))
    }

    /// Inserts or replaces a profile, returning the one it replaced.
    pub fn insert(&mut self, name: impl Into<String>, profile: Profile) -> Option<Profile> {
        self.0.insert(name.into(), profile)
    }

    /// Profile names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Where profiles are persisted.
pub trait ProfileStore {
    /// Loads every profile. A store that does not exist yet is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProfileStore`] if the store exists but is unusable.
    fn load(&self) -> Result<Profiles>;

    /// Replaces the stored profiles.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::ProfileStore`] if writing fails.
    fn save(&self, profiles: &Profiles) -> Result<()>;
}

/// Saves `profile` under `name`, keeping every other profile.
///
/// Returns true if an existing profile was overwritten.
///
/// # Errors
///
/// Returns [`Fault::ProfileStore`] if writing fails.
pub fn save_profile(
    store: &impl ProfileStore,
    profiles: &mut Profiles,
    name: &str,
    profile: Profile,
) -> Result<bool> {
    let replaced = profiles.insert(name, profile).is_some();
    if replaced {
        warn!("Profile '{name}' already exists. Overwriting it.");
    }
    store.save(profiles)?;
    Ok(replaced)
}

/// Profiles stored as one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Uses the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses the per-user default location.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(default_path())
    }

    /// Path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fault(&self, source: StoreError) -> Fault {
        Fault::ProfileStore {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProfileStore for JsonFileStore {
    fn load(&self) -> Result<Profiles> {
        if !self.path.exists() {
            debug!("No profiles file at {}", self.path.display());
            return Ok(Profiles::default());
        }

        debug!("Loading profiles file: {}", self.path.display());
        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| self.fault(StoreError::Read(e)))?;

        serde_json::from_str(&contents).map_err(|e| self.fault(StoreError::Parse(e)))
    }

    fn save(&self, profiles: &Profiles) -> Result<()> {
        debug!("Saving profiles to file: {}", self.path.display());
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| self.fault(StoreError::Write(e)))?;
        }

        let contents =
            serde_json::to_string_pretty(profiles).map_err(|e| self.fault(StoreError::Encode(e)))?;
        std::fs::write(&self.path, contents).map_err(|e| self.fault(StoreError::Write(e)))
    }
}

/// `<config dir>/groker/profiles.json`, or the working directory when the
/// platform has no config dir.
#[must_use]
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(PROFILES_FILE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample(host: &str) -> Profile {
        Profile::new(
            host,
            Some("ops".into()),
            None,
            "ops@example.com",
            vec!["a@x.com".into(), "b@x.com".into()],
        )
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load().unwrap().names().count(), 0);
    }

    #[test]
    fn invalid_json_is_a_store_fault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(
            err,
            Fault::ProfileStore {
                source: StoreError::Parse(_),
                ..
            }
        ));
        assert_eq!(err.exit_code(), crate::fault::EXIT_PROFILE_STORE);
    }

    #[test]
    fn reads_layout_with_null_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"{"relay": {"host": "relay.local", "user": null, "password": null,
                "sender": "a@x.com", "recipient": ["b@x.com"], "auth": false}}"#,
        )
        .unwrap();

        let profiles = JsonFileStore::new(&path).load().unwrap();
        let relay = profiles.get("relay").unwrap();
        assert_eq!(relay.host, "relay.local");
        assert!(!relay.auth);
        assert_eq!(relay.user, None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("profiles.json"));
        let mut profiles = Profiles::default();

        assert!(!save_profile(&store, &mut profiles, "office", sample("smtp.office")).unwrap());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, profiles);
        assert!(loaded.get("office").unwrap().auth);
    }

    #[test]
    fn overwrite_keeps_other_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("profiles.json"));
        let mut profiles = Profiles::default();
        save_profile(&store, &mut profiles, "b", sample("b.host")).unwrap();
        save_profile(&store, &mut profiles, "a", sample("a.host")).unwrap();
        save_profile(&store, &mut profiles, "c", sample("c.host")).unwrap();

        let replaced = save_profile(&store, &mut profiles, "b", sample("b2.host")).unwrap();
        assert!(replaced);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(loaded.get("a").unwrap().host, "a.host");
        assert_eq!(loaded.get("b").unwrap().host, "b2.host");
        assert_eq!(loaded.get("c").unwrap().host, "c.host");
    }

    #[test]
    fn unknown_profile() {
        let err = Profiles::default().get("ghost").unwrap_err();
        assert!(matches!(err, Fault::ProfileNotFound(ref name) if name == "ghost"));
    }

    #[test]
    fn debug_redacts_password() {
        let mut profile = sample("h");
        profile.password = Some("hunter2".into());
        assert!(!format!("{profile:?}").contains("hunter2"));
    }
}
