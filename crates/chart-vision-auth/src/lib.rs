#![warn(missing_docs)]
//! # chart-vision-auth
//!
//! ## Purpose
//! Implements API credential bootstrap for `chart-vision`.
//!
//! ## Responsibilities
//! - Hold the credential as an opaque value that never prints its secret.
//! - Model the `checking -> missing | ready` bootstrap lifecycle.
//! - Unify the four credential strategies (environment, host key picker,
//!   user-entered persisted, fixed) behind [`CredentialStrategy`].
//! - React to invalid-credential reports from the request layer.
//!
//! ## Data flow
//! Config selects a [`CredentialStrategy`] -> [`CredentialBootstrap::initialize`]
//! consults the strategy's capability ([`KeyPicker`] or [`CredentialStore`]) ->
//! UI gates on [`BootstrapState`] -> request failures call
//! [`CredentialBootstrap::on_invalid_credential`].
//!
//! ## Ownership and lifetimes
//! Capabilities are shared `Arc<dyn ...>` trait objects so the app shell and
//! tests can inject their own implementations.
//!
//! ## Error model
//! Blank input, unsupported actions and capability failures surface as
//! [`AuthError`]. Validation failures are also recorded on the bootstrap so
//! the credential screen can show them.
//!
//! ## Security and privacy notes
//! Credentials are never logged. Log lines carry [`Credential::fingerprint`]
//! only.
//!
//! ## Example
//! ```rust
//! use chart_vision_auth::{BootstrapState, CredentialBootstrap, CredentialStrategy};
//!
//! let mut bootstrap = CredentialBootstrap::new(CredentialStrategy::Environment(None));
//! assert_eq!(bootstrap.state(), BootstrapState::Checking);
//! bootstrap.initialize().unwrap();
//! assert_eq!(bootstrap.state(), BootstrapState::Ready);
//! ```

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Validation message shown when a blank key is submitted.
pub const EMPTY_KEY_MESSAGE: &str = "Please enter a valid API key.";

/// Configuration error shown when a fixed key is rejected.
pub const FIXED_KEY_REJECTED_MESSAGE: &str =
    "The configured API key was rejected. Check the application configuration.";

/// Opaque API credential.
///
/// Always trimmed and non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Creates a credential from raw input.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for blank input.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AuthError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the secret for placing into a request header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns a short, log-safe SHA-256 fingerprint.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

/// Bootstrap lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Startup check in progress.
    Checking,
    /// No usable credential; the entry or selection screen is shown.
    Missing,
    /// Credential available; the main UI is shown.
    Ready,
}

/// Host-provided key picker capability.
pub trait KeyPicker: Send + Sync {
    /// Returns `true` when the host already holds a selected key.
    fn has_selected_api_key(&self) -> Result<bool, AuthError>;

    /// Opens the host selection dialog and returns once it closes.
    fn open_select_key(&self) -> Result<(), AuthError>;

    /// Returns the key selected in the host, if any.
    fn selected_api_key(&self) -> Option<Credential>;
}

/// Persistent single-key store capability.
pub trait CredentialStore: Send + Sync {
    /// Reads the saved value, if any.
    fn load(&self) -> Result<Option<String>, AuthError>;

    /// Persists a value, replacing any previous one.
    fn save(&self, value: &str) -> Result<(), AuthError>;

    /// Deletes the saved value. Deleting a missing value is not an error.
    fn clear(&self) -> Result<(), AuthError>;
}

/// Key-file store holding one trimmed credential.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the key file location.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>, AuthError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw.trim().to_string()).filter(|value| !value.is_empty())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(AuthError::Store(format!(
                "unable to read key file '{}': {error}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, value: &str) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                AuthError::Store(format!(
                    "unable to create key directory '{}': {error}",
                    parent.display()
                ))
            })?;
        }

        write_private(&self.path, value).map_err(|error| {
            AuthError::Store(format!(
                "unable to write key file '{}': {error}",
                self.path.display()
            ))
        })
    }

    fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AuthError::Store(format!(
                "unable to delete key file '{}': {error}",
                self.path.display()
            ))),
        }
    }
}

/// Writes `value` to a file readable only by its owner on unix.
fn write_private(path: &Path, value: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        options.mode(0o600);
        let mut file = options.open(path)?;
        // `mode` applies only on creation; tighten a pre-existing file too.
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(value.as_bytes())
    }
    #[cfg(not(unix))]
    {
        options.open(path)?.write_all(value.as_bytes())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `value`.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
        }
    }

    /// Returns a copy of the stored value.
    pub fn snapshot(&self) -> Option<String> {
        self.value.lock().ok().and_then(|value| value.clone())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>, AuthError> {
        let value = self
            .value
            .lock()
            .map_err(|_| AuthError::Store("memory store lock poisoned".to_string()))?;
        Ok(value.clone())
    }

    fn save(&self, new_value: &str) -> Result<(), AuthError> {
        let mut value = self
            .value
            .lock()
            .map_err(|_| AuthError::Store("memory store lock poisoned".to_string()))?;
        *value = Some(new_value.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut value = self
            .value
            .lock()
            .map_err(|_| AuthError::Store("memory store lock poisoned".to_string()))?;
        *value = None;
        Ok(())
    }
}

/// Credential acquisition strategy selected at startup.
#[derive(Clone)]
pub enum CredentialStrategy {
    /// Key injected through the process environment.
    Environment(Option<Credential>),
    /// Key chosen through a host-provided picker; session-only.
    HostPicker(Arc<dyn KeyPicker>),
    /// Key typed by the user and persisted locally.
    Persisted(Arc<dyn CredentialStore>),
    /// Key fixed by the build or deployment.
    Fixed(Credential),
}

impl CredentialStrategy {
    /// Returns the strategy discriminant.
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Environment(_) => StrategyKind::Environment,
            Self::HostPicker(_) => StrategyKind::HostPicker,
            Self::Persisted(_) => StrategyKind::Persisted,
            Self::Fixed(_) => StrategyKind::Fixed,
        }
    }
}

impl fmt::Debug for CredentialStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialStrategy::{:?}", self.kind())
    }
}

/// Strategy discriminant, usable in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// See [`CredentialStrategy::Environment`].
    Environment,
    /// See [`CredentialStrategy::HostPicker`].
    HostPicker,
    /// See [`CredentialStrategy::Persisted`].
    Persisted,
    /// See [`CredentialStrategy::Fixed`].
    Fixed,
}

impl StrategyKind {
    /// Returns the configuration spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::HostPicker => "picker",
            Self::Persisted => "persisted",
            Self::Fixed => "fixed",
        }
    }

    /// Parses the configuration spelling (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "environment" | "env" => Some(Self::Environment),
            "picker" | "host-picker" => Some(Self::HostPicker),
            "persisted" | "user" => Some(Self::Persisted),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

/// What the bootstrap did after an invalid-credential report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// Environment key: state unchanged, error shown inline only.
    KeptReady,
    /// Picker key dropped; the user must select another.
    Reselect,
    /// Persisted key deleted; the user must enter another.
    ReEnter,
    /// Fixed key rejected; reported as a configuration problem.
    ConfigurationError,
}

/// Credential bootstrap state machine.
#[derive(Debug)]
pub struct CredentialBootstrap {
    strategy: CredentialStrategy,
    state: BootstrapState,
    credential: Option<Credential>,
    validation_error: Option<String>,
    configuration_error: Option<String>,
}

impl CredentialBootstrap {
    /// Creates a bootstrap in `Checking` state.
    pub fn new(strategy: CredentialStrategy) -> Self {
        Self {
            strategy,
            state: BootstrapState::Checking,
            credential: None,
            validation_error: None,
            configuration_error: None,
        }
    }

    /// Returns current state.
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Returns `true` in `Ready` state.
    pub fn is_ready(&self) -> bool {
        self.state == BootstrapState::Ready
    }

    /// Returns the active credential, if any.
    ///
    /// The environment strategy may be ready without one.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Returns the active strategy discriminant.
    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Returns the last entry validation message.
    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    /// Returns the configuration error raised by a rejected fixed key.
    pub fn configuration_error(&self) -> Option<&str> {
        self.configuration_error.as_deref()
    }

    /// Runs the startup check.
    ///
    /// # Errors
    /// Returns picker/store failures. The state is `Missing` in that case.
    pub fn initialize(&mut self) -> Result<BootstrapState, AuthError> {
        self.state = BootstrapState::Checking;
        self.validation_error = None;

        let resolved = match &self.strategy {
            CredentialStrategy::Environment(credential) => {
                self.credential = credential.clone();
                self.configuration_error = None;
                BootstrapState::Ready
            }
            CredentialStrategy::Fixed(credential) => {
                self.credential = Some(credential.clone());
                self.configuration_error = None;
                BootstrapState::Ready
            }
            CredentialStrategy::HostPicker(picker) => {
                let picker = Arc::clone(picker);
                self.adopt_picker_selection(picker.as_ref())?
            }
            CredentialStrategy::Persisted(store) => {
                let saved = store.load().inspect_err(|_| {
                    self.state = BootstrapState::Missing;
                })?;
                self.credential = saved.and_then(|value| Credential::new(value).ok());
                if self.credential.is_some() {
                    BootstrapState::Ready
                } else {
                    BootstrapState::Missing
                }
            }
        };

        self.state = resolved;
        log::info!(
            "auth | initialize | strategy={} state={:?} key={}",
            self.strategy.kind().as_str(),
            self.state,
            self.fingerprint_for_log()
        );
        Ok(self.state)
    }

    /// Opens the host picker and commits `Ready` only if the host confirms a
    /// selection once the dialog closes.
    ///
    /// # Errors
    /// Returns [`AuthError::UnsupportedAction`] for non-picker strategies and
    /// propagates picker failures.
    pub fn select_credential(&mut self) -> Result<BootstrapState, AuthError> {
        let CredentialStrategy::HostPicker(picker) = &self.strategy else {
            return Err(self.unsupported("select"));
        };
        let picker = Arc::clone(picker);

        picker.open_select_key().inspect_err(|_| {
            self.state = BootstrapState::Missing;
        })?;
        self.state = self.adopt_picker_selection(picker.as_ref())?;

        log::info!(
            "auth | select | state={:?} key={}",
            self.state,
            self.fingerprint_for_log()
        );
        Ok(self.state)
    }

    /// Validates, persists and adopts a user-entered key.
    ///
    /// # Errors
    /// Returns [`AuthError::EmptyCredential`] for blank input (state stays as
    /// it was and [`Self::validation_error`] is set),
    /// [`AuthError::UnsupportedAction`] for non-persisted strategies, and
    /// store failures.
    pub fn save_credential(&mut self, input: &str) -> Result<BootstrapState, AuthError> {
        let CredentialStrategy::Persisted(store) = &self.strategy else {
            return Err(self.unsupported("save"));
        };
        let store = Arc::clone(store);

        let credential = match Credential::new(input) {
            Ok(credential) => credential,
            Err(error) => {
                self.validation_error = Some(EMPTY_KEY_MESSAGE.to_string());
                return Err(error);
            }
        };

        store.save(credential.expose())?;
        self.validation_error = None;
        self.credential = Some(credential);
        self.state = BootstrapState::Ready;

        log::info!("auth | save | key={}", self.fingerprint_for_log());
        Ok(self.state)
    }

    /// Deletes a persisted key on user request.
    ///
    /// # Errors
    /// Returns [`AuthError::UnsupportedAction`] for non-persisted strategies
    /// and store failures.
    pub fn clear_credential(&mut self) -> Result<BootstrapState, AuthError> {
        let CredentialStrategy::Persisted(store) = &self.strategy else {
            return Err(self.unsupported("clear"));
        };
        store.clear()?;
        self.credential = None;
        self.state = BootstrapState::Missing;
        log::info!("auth | clear | state=Missing");
        Ok(self.state)
    }

    /// Applies the strategy-specific reaction to a rejected credential.
    ///
    /// # Errors
    /// Propagates store failures while deleting a persisted key. The state is
    /// `Missing` even then.
    pub fn on_invalid_credential(&mut self) -> Result<InvalidationOutcome, AuthError> {
        let outcome = match &self.strategy {
            CredentialStrategy::Environment(_) => InvalidationOutcome::KeptReady,
            CredentialStrategy::HostPicker(_) => {
                self.credential = None;
                self.state = BootstrapState::Missing;
                InvalidationOutcome::Reselect
            }
            CredentialStrategy::Persisted(store) => {
                let store = Arc::clone(store);
                self.credential = None;
                self.state = BootstrapState::Missing;
                store.clear()?;
                InvalidationOutcome::ReEnter
            }
            CredentialStrategy::Fixed(_) => {
                self.state = BootstrapState::Missing;
                self.configuration_error = Some(FIXED_KEY_REJECTED_MESSAGE.to_string());
                InvalidationOutcome::ConfigurationError
            }
        };

        log::warn!(
            "auth | invalidated | strategy={} outcome={outcome:?}",
            self.strategy.kind().as_str()
        );
        Ok(outcome)
    }

    fn adopt_picker_selection(
        &mut self,
        picker: &dyn KeyPicker,
    ) -> Result<BootstrapState, AuthError> {
        let selected = picker.has_selected_api_key().inspect_err(|_| {
            self.state = BootstrapState::Missing;
        })?;

        self.credential = if selected {
            picker.selected_api_key()
        } else {
            None
        };

        Ok(if self.credential.is_some() {
            BootstrapState::Ready
        } else {
            BootstrapState::Missing
        })
    }

    fn unsupported(&self, action: &'static str) -> AuthError {
        AuthError::UnsupportedAction {
            action,
            strategy: self.strategy.kind().as_str(),
        }
    }

    fn fingerprint_for_log(&self) -> String {
        self.credential
            .as_ref()
            .map(Credential::fingerprint)
            .unwrap_or_else(|| "none".to_string())
    }
}

/// Errors produced by credential bootstrap logic.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Submitted credential was blank.
    #[error("API key must be non-empty")]
    EmptyCredential,
    /// Action does not apply to the configured strategy.
    #[error("'{action}' is not available for the {strategy} key strategy")]
    UnsupportedAction {
        /// Requested action.
        action: &'static str,
        /// Configured strategy name.
        strategy: &'static str,
    },
    /// Host picker failure.
    #[error("key picker failure: {0}")]
    Picker(String),
    /// Credential store failure.
    #[error("credential store failure: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for credential values and strategy transitions.

    use super::*;

    #[derive(Default)]
    struct ScriptedPicker {
        selected: Mutex<Option<String>>,
        on_open: Option<String>,
    }

    impl KeyPicker for ScriptedPicker {
        fn has_selected_api_key(&self) -> Result<bool, AuthError> {
            Ok(self.selected.lock().expect("lock").is_some())
        }

        fn open_select_key(&self) -> Result<(), AuthError> {
            *self.selected.lock().expect("lock") = self.on_open.clone();
            Ok(())
        }

        fn selected_api_key(&self) -> Option<Credential> {
            self.selected
                .lock()
                .expect("lock")
                .clone()
                .and_then(|value| Credential::new(value).ok())
        }
    }

    #[test]
    fn credential_is_trimmed_and_debug_hides_secret() {
        let credential = Credential::new("  secret-key \n").expect("non-empty");
        assert_eq!(credential.expose(), "secret-key");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret-key"));
        assert_eq!(credential.fingerprint().len(), 8);
        assert!(Credential::new(" \t").is_err());
    }

    #[test]
    fn strategy_kind_parses_configuration_spellings() {
        assert_eq!(StrategyKind::parse("Picker"), Some(StrategyKind::HostPicker));
        assert_eq!(StrategyKind::parse("env"), Some(StrategyKind::Environment));
        assert_eq!(StrategyKind::parse("hardcoded"), None);
        assert_eq!(StrategyKind::Persisted.as_str(), "persisted");
    }

    #[test]
    fn picker_without_dialog_selection_stays_missing() {
        let picker = Arc::new(ScriptedPicker::default());
        let mut bootstrap = CredentialBootstrap::new(CredentialStrategy::HostPicker(picker));
        assert_eq!(bootstrap.initialize().expect("init"), BootstrapState::Missing);

        assert_eq!(
            bootstrap.select_credential().expect("dialog closes"),
            BootstrapState::Missing
        );
    }

    #[test]
    fn picker_selection_is_confirmed_before_ready() {
        let picker = Arc::new(ScriptedPicker {
            selected: Mutex::new(None),
            on_open: Some("picked-key".to_string()),
        });
        let mut bootstrap = CredentialBootstrap::new(CredentialStrategy::HostPicker(picker));
        bootstrap.initialize().expect("init");

        assert_eq!(bootstrap.select_credential().expect("select"), BootstrapState::Ready);
        assert_eq!(
            bootstrap.credential().map(Credential::expose),
            Some("picked-key")
        );
    }

    #[test]
    fn save_is_rejected_for_other_strategies() {
        let mut bootstrap = CredentialBootstrap::new(CredentialStrategy::Environment(None));
        bootstrap.initialize().expect("init");
        assert!(matches!(
            bootstrap.save_credential("key"),
            Err(AuthError::UnsupportedAction { action: "save", .. })
        ));
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = std::env::temp_dir().join(format!(
            "chart-vision-auth-test-{}",
            std::process::id()
        ));
        let store = FileCredentialStore::new(dir.join("nested").join("api_key"));
        assert_eq!(store.load().expect("missing is ok"), None);

        store.save("stored-key").expect("save");
        assert_eq!(store.load().expect("load"), Some("stored-key".to_string()));

        store.clear().expect("clear");
        store.clear().expect("second clear is a no-op");
        assert_eq!(store.load().expect("load"), None);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[test]
    fn file_store_writes_owner_only_key_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!(
            "chart-vision-auth-mode-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("api_key");
        std::fs::write(&path, "old").expect("seed file");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
            .expect("widen seed");

        let store = FileCredentialStore::new(&path);
        store.save("secret-key").expect("save");

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().expect("load"), Some("secret-key".to_string()));
        let _ = std::fs::remove_dir_all(dir);
    }
}
