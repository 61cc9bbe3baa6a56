//! The identity aggregate: every managed identity plus the active pointer.
//!
//! An [`IdentityStore`] is loaded once per invocation, queried and mutated in
//! memory, and written back as a whole. Each identity is sealed in its own
//! envelope, so one damaged record never hides the others.
//!
//! Mutations build the next state, persist it, and only then replace the
//! in-memory state. A failed write leaves the store exactly as it was.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use zeroize::Zeroize;

use crate::config::StoreConfig;
use crate::crypto::{open, seal, EnvKeyProvider, Envelope, KeyProvider, MasterKey};
use crate::error::{GitusrError, Result};
use crate::identity::{is_valid_email, Identity, IdentityField, IdentityId, IdentityRecord, ListedIdentity};
use crate::sshkey::{fingerprint, normalize, validate};
use crate::storage::store_file::{
    decode_envelope, encode_envelope, ensure_config_dir, read_store_file, write_store_file, StoreFile,
};
use crate::time::now_rfc3339;

// ── State ─────────────────────────────────────────────────────────────────────

/// Decrypted contents of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub identities: BTreeMap<IdentityId, Identity>,
    /// May point at an id that failed to decrypt; lookups then return `None`.
    pub active_id: Option<IdentityId>,
}

/// A record that could not be decrypted or decoded during load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: IdentityId,
    pub reason: String,
}

/// What went wrong while loading, if anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Set when the file existed but could not be read or parsed. The store
    /// then starts empty.
    pub file_error: Option<String>,
    pub skipped: Vec<SkippedRecord>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.file_error.is_none() && self.skipped.is_empty()
    }
}

/// A newly stored identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub identity: Identity,
    /// Set when the key file is readable by others.
    pub permission_warning: Option<String>,
}

// ── IdentityStore ─────────────────────────────────────────────────────────────

/// Encrypted-at-rest store of identities.
///
/// Records that fail to decode or decrypt are kept as raw JSON and written
/// back unchanged on save, so a changed hostname or username does not wipe them.
/// [`discard_unreadable`](Self::discard_unreadable) drops them explicitly.
pub struct IdentityStore<K: KeyProvider = EnvKeyProvider> {
    config: StoreConfig,
    keys: K,
    state: StoreState,
    unreadable: BTreeMap<IdentityId, Value>,
    report: LoadReport,
}

impl IdentityStore<EnvKeyProvider> {
    /// Load the default store with the environment-derived master key.
    ///
    /// # Errors
    ///
    /// Returns [`GitusrError::Config`] if the store location cannot be
    /// resolved.
    pub fn from_env() -> Result<Self> {
        Ok(Self::load(StoreConfig::from_env()?, EnvKeyProvider))
    }
}

impl<K: KeyProvider> IdentityStore<K> {
    /// Load the store at `config`. Never fails: a missing or unparseable
    /// file yields an empty store, and undecryptable records are skipped
    /// with a warning and listed in [`load_report`](Self::load_report).
    pub fn load(config: StoreConfig, keys: K) -> Self {
        if let Err(e) = ensure_config_dir(&config.config_dir) {
            log::warn!(
                "cannot create config directory {}: {e}",
                config.config_dir.display()
            );
        }
        let mut store = Self {
            config,
            keys,
            state: StoreState::default(),
            unreadable: BTreeMap::new(),
            report: LoadReport::default(),
        };
        store.reload();
        store
    }

    /// Discard in-memory state and read the file again.
    pub fn reload(&mut self) {
        self.state = StoreState::default();
        self.unreadable.clear();
        self.report = LoadReport::default();

        let path = &self.config.store_path;
        let file = match read_store_file(path) {
            Ok(Some(file)) => file,
            Ok(None) => {
                log::debug!("no store at {}, starting empty", path.display());
                return;
            }
            Err(e) => {
                log::warn!("ignoring unreadable store {}: {e}", path.display());
                self.report.file_error = Some(e.to_string());
                return;
            }
        };

        let master = self.keys.master_key();
        for (id, raw) in file.identities {
            match decode_envelope(&raw).and_then(|envelope| open_record(&master, &envelope)) {
                Ok(record) => {
                    self.state
                        .identities
                        .insert(id.clone(), record.into_identity(id));
                }
                Err(e) => {
                    log::warn!("skipping identity {id}: {e}");
                    self.report.skipped.push(SkippedRecord {
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                    self.unreadable.insert(id, raw);
                }
            }
        }
        self.state.active_id = file.active_id;

        log::debug!(
            "loaded {} identities ({} skipped) from {}",
            self.state.identities.len(),
            self.report.skipped.len(),
            path.display()
        );
    }

    /// Re-encrypt every identity and atomically replace the store file.
    pub fn save(&self) -> Result<()> {
        self.persist(&self.state)
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let master = self.keys.master_key();
        let mut identities = self.unreadable.clone();
        for (id, identity) in &state.identities {
            let envelope = seal_record(&master, identity)?;
            identities.insert(id.clone(), encode_envelope(&envelope)?);
        }

        let file = StoreFile {
            identities,
            active_id: state.active_id.clone(),
            timestamp: Some(now_rfc3339()),
        };
        ensure_config_dir(&self.config.config_dir)?;
        write_store_file(&self.config.store_path, &file)?;
        log::debug!(
            "saved {} identities to {}",
            state.identities.len(),
            self.config.store_path.display()
        );
        Ok(())
    }

    fn commit(&mut self, next: StoreState) -> Result<()> {
        self.persist(&next)?;
        self.state = next;
        let state = &self.state;
        self.unreadable
            .retain(|id, _| !state.identities.contains_key(id));
        Ok(())
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    /// Validate and add a new identity, then persist.
    ///
    /// # Errors
    ///
    /// - [`GitusrError::Validation`] for an empty name or a missing or
    ///   malformed email.
    /// - [`GitusrError::KeyFileNotFound`] / [`GitusrError::InvalidKeyFormat`]
    ///   when the key file is unusable.
    /// - [`GitusrError::DuplicateIdentity`] when another identity has the same
    ///   email, nickname and key path.
    pub fn add_identity(
        &mut self,
        name: &str,
        email: &str,
        ssh_key_path: impl AsRef<Path>,
        description: Option<&str>,
        nickname: Option<&str>,
    ) -> Result<Identity> {
        self.add_identity_checked(name, email, ssh_key_path, description, nickname)
            .map(|added| added.identity)
    }

    /// [`add_identity`](Self::add_identity), also returning the key file's
    /// permission warning so callers can show it without re-reading the key.
    pub fn add_identity_checked(
        &mut self,
        name: &str,
        email: &str,
        ssh_key_path: impl AsRef<Path>,
        description: Option<&str>,
        nickname: Option<&str>,
    ) -> Result<Added> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(GitusrError::Validation("name must not be empty".into()));
        }
        check_email(email)?;
        let nickname = non_empty(nickname);
        let description = non_empty(description);

        let path = normalize(ssh_key_path);
        let check = validate(&path)?;

        if self.find_triple(email, nickname.as_deref(), &path, None) {
            return Err(GitusrError::DuplicateIdentity);
        }

        let identity = Identity {
            id: self.fresh_id(email, nickname.as_deref(), &path),
            ssh_key_fingerprint: fingerprint(&path),
            nickname,
            name: name.to_string(),
            email: email.to_string(),
            ssh_key_path: path,
            description,
        };

        let mut next = self.state.clone();
        next.identities
            .insert(identity.id.clone(), identity.clone());
        self.commit(next)?;

        log::info!("added identity {} <{}>", identity.label(), identity.email);
        Ok(Added {
            identity,
            permission_warning: check.permission_warning,
        })
    }

    /// Mark `id` active. `Ok(false)` without any change if it is unknown.
    pub fn set_active(&mut self, id: &str) -> Result<bool> {
        let Some(identity) = self.state.identities.get(id) else {
            return Ok(false);
        };
        let mut next = self.state.clone();
        next.active_id = Some(identity.id.clone());
        self.commit(next)?;
        Ok(true)
    }

    /// Delete `id`, clearing the active pointer if it pointed here.
    /// `Ok(false)` if there is no such identity.
    pub fn remove_identity(&mut self, id: &str) -> Result<bool> {
        if !self.state.identities.contains_key(id) {
            return Ok(false);
        }
        let mut next = self.state.clone();
        next.identities.remove(id);
        if next.active_id.as_ref().map(IdentityId::as_str) == Some(id) {
            next.active_id = None;
        }
        self.commit(next)?;
        log::info!("removed identity {id}");
        Ok(true)
    }

    /// Change one editable field.
    ///
    /// An empty or absent value clears `nickname` and `description`. For
    /// `name` and `email` it is refused: `Ok(false)`, nothing changes.
    /// `Ok(false)` also when `id` is unknown. The id is never recomputed.
    ///
    /// # Errors
    ///
    /// [`GitusrError::Validation`] for a malformed email and
    /// [`GitusrError::DuplicateIdentity`] when the edit would collide with
    /// another identity's triple.
    pub fn update_field(
        &mut self,
        id: &str,
        field: IdentityField,
        value: Option<&str>,
    ) -> Result<bool> {
        let Some(current) = self.state.identities.get(id) else {
            return Ok(false);
        };
        let mut updated = current.clone();

        match (field, non_empty(value)) {
            (IdentityField::Name, Some(name)) => updated.name = name,
            (IdentityField::Email, Some(email)) => {
                check_email(&email)?;
                updated.email = email;
            }
            (IdentityField::Name | IdentityField::Email, None) => {
                log::warn!("{field} cannot be empty");
                return Ok(false);
            }
            (IdentityField::Nickname, nickname) => updated.nickname = nickname,
            (IdentityField::Description, description) => updated.description = description,
        }

        self.replace(updated)
    }

    /// Point `id` at a different key file, re-validating and re-fingerprinting
    /// it. `Ok(false)` if `id` is unknown.
    ///
    /// # Errors
    ///
    /// Key file errors from validation, or [`GitusrError::DuplicateIdentity`].
    pub fn update_ssh_key_path(&mut self, id: &str, new_path: impl AsRef<Path>) -> Result<bool> {
        let Some(current) = self.state.identities.get(id) else {
            return Ok(false);
        };
        let path = normalize(new_path);
        validate(&path)?;

        let mut updated = current.clone();
        updated.ssh_key_fingerprint = fingerprint(&path);
        updated.ssh_key_path = path;
        self.replace(updated)
    }

    fn replace(&mut self, updated: Identity) -> Result<bool> {
        if self.find_triple(
            &updated.email,
            updated.nickname.as_deref(),
            &updated.ssh_key_path,
            Some(&updated.id),
        ) {
            return Err(GitusrError::DuplicateIdentity);
        }
        let mut next = self.state.clone();
        log::debug!("updating identity {}", updated.id);
        next.identities.insert(updated.id.clone(), updated);
        self.commit(next)?;
        Ok(true)
    }

    /// Drop records that failed to decrypt at load time and persist.
    /// Returns how many were dropped.
    pub fn discard_unreadable(&mut self) -> Result<usize> {
        let dropped = std::mem::take(&mut self.unreadable);
        if let Err(e) = self.persist(&self.state) {
            self.unreadable = dropped;
            return Err(e);
        }
        if !dropped.is_empty() {
            log::info!("discarded {} unreadable identities", dropped.len());
        }
        Ok(dropped.len())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn get_identity(&self, id: &str) -> Option<&Identity> {
        self.state.identities.get(id)
    }

    /// Every identity with exactly this email.
    pub fn find_by_email(&self, email: &str) -> Vec<&Identity> {
        self.identities().filter(|i| i.email == email).collect()
    }

    /// The first identity (in id order) with this nickname.
    pub fn find_by_nickname(&self, nickname: &str) -> Option<&Identity> {
        self.identities()
            .find(|i| i.nickname.as_deref() == Some(nickname))
    }

    /// Every identity whose id starts with `prefix`.
    pub fn find_by_id_prefix(&self, prefix: &str) -> Vec<&Identity> {
        self.identities()
            .filter(|i| i.id.as_str().starts_with(prefix))
            .collect()
    }

    pub fn active_id(&self) -> Option<&IdentityId> {
        self.state.active_id.as_ref()
    }

    /// The active identity, if the active id resolves.
    pub fn active_identity(&self) -> Option<&Identity> {
        self.active_id()
            .and_then(|id| self.state.identities.get(id))
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.state.identities.values()
    }

    /// Public views of every identity, in id order.
    pub fn list_identities(&self) -> Vec<ListedIdentity> {
        let active = self.active_id();
        self.identities()
            .map(|i| ListedIdentity::new(i, Some(&i.id) == active))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.identities.is_empty()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Records still held as opaque envelopes.
    pub fn unreadable_count(&self) -> usize {
        self.unreadable.len()
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn find_triple(
        &self,
        email: &str,
        nickname: Option<&str>,
        path: &Path,
        except: Option<&IdentityId>,
    ) -> bool {
        self.identities()
            .filter(|i| Some(&i.id) != except)
            .any(|i| i.has_triple(email, nickname, path))
    }

    /// An id for a new identity. Ids are never recomputed, so an edited
    /// identity can still own the plain hash of a triple that is free again.
    fn fresh_id(&self, email: &str, nickname: Option<&str>, path: &Path) -> IdentityId {
        let taken = |id: &IdentityId| {
            self.state.identities.contains_key(id) || self.unreadable.contains_key(id)
        };
        (0u32..)
            .map(|attempt| IdentityId::derive_nth(email, nickname, path, attempt))
            .find(|id| !taken(id))
            .unwrap_or_else(|| IdentityId::derive(email, nickname, path))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(GitusrError::Validation("email must not be empty".into()));
    }
    if !is_valid_email(email) {
        return Err(GitusrError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(())
}

fn seal_record(master: &MasterKey, identity: &Identity) -> Result<Envelope> {
    let mut plaintext = serde_json::to_vec(&IdentityRecord::from_identity(identity))
        .map_err(|e| GitusrError::SerializationError(e.to_string()))?;
    let sealed = seal(master, &plaintext);
    plaintext.zeroize();
    sealed
}

fn open_record(master: &MasterKey, envelope: &Envelope) -> Result<IdentityRecord> {
    let mut plaintext = open(master, envelope)?;
    let record = serde_json::from_slice(&plaintext)
        .map_err(|e| GitusrError::CorruptedData(format!("invalid record: {e}")));
    plaintext.zeroize();
    record
}
