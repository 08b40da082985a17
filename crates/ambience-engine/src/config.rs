//! Typed access to the three configuration documents in shared storage.
//!
//! Catalog documents are JSON maps of id to [`EffectParameters`]; the playback
//! document is a single [`PlaybackFlags`] record. Ids missing from a stored map
//! fall back to the catalog defaults, so a fresh store means "everything off".

use std::collections::BTreeMap;
use std::sync::Arc;

use ambience_core::{
    Catalog, CatalogKind, EffectParameters, EngineError, InstanceKey, PlaybackFlags, Result,
};
use ambience_platform::ConfigStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::notifier::{ChangeNotifier, Topic};

pub const EFFECTS_KEY: &str = "ambience.effects";
pub const BACKGROUNDS_KEY: &str = "ambience.backgrounds";
pub const PLAYBACK_KEY: &str = "ambience.playback";

/// Parameters for every catalog entry, keyed across both catalogs.
pub type DesiredState = BTreeMap<InstanceKey, EffectParameters>;

fn storage_error(err: Box<dyn std::error::Error + Send + Sync>) -> EngineError {
    EngineError::Storage(err.to_string())
}

#[derive(Clone)]
pub struct ConfigRepository {
    store: Arc<dyn ConfigStore>,
    effects: Catalog,
    backgrounds: Catalog,
}

impl ConfigRepository {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            effects: Catalog::builtin(CatalogKind::Effects).clone(),
            backgrounds: Catalog::builtin(CatalogKind::Backgrounds).clone(),
        }
    }

    /// Replaces the catalog of the same kind.
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        match catalog.kind() {
            CatalogKind::Effects => self.effects = catalog,
            CatalogKind::Backgrounds => self.backgrounds = catalog,
        }
        self
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn catalog(&self, kind: CatalogKind) -> &Catalog {
        match kind {
            CatalogKind::Effects => &self.effects,
            CatalogKind::Backgrounds => &self.backgrounds,
        }
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).map_err(storage_error)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stored records layered field by field over catalog defaults.
    ///
    /// Stored ids unknown to the catalog are kept; the lifecycle manager
    /// reports them when they are active. A record that cannot be read falls
    /// back to its default so one bad entry never blocks the rest.
    pub fn read_catalog(&self, kind: CatalogKind) -> Result<BTreeMap<String, EffectParameters>> {
        let mut merged = self.catalog(kind).defaults();
        let stored: Option<BTreeMap<String, Value>> =
            self.read_json(Topic::Catalog(kind).storage_key())?;
        let Some(stored) = stored else {
            debug!(catalog = %kind, "no stored document, using catalog defaults");
            return Ok(merged);
        };
        for (id, record) in stored {
            let base = merged.get(&id).cloned().unwrap_or_default();
            match overlay(&base, &record) {
                Ok(params) => {
                    merged.insert(id, params);
                }
                Err(err) => {
                    warn!(catalog = %kind, id = %id, "ignoring stored record: {err}");
                    merged.insert(id, base);
                }
            }
        }
        Ok(merged)
    }

    /// Both catalogs as one desired state.
    pub fn read_desired(&self) -> Result<DesiredState> {
        let mut desired = DesiredState::new();
        for kind in CatalogKind::ALL {
            for (id, params) in self.read_catalog(kind)? {
                desired.insert(InstanceKey::new(kind, id), params);
            }
        }
        Ok(desired)
    }

    /// Atomically rewrites the record for `id`, starting from the stored value or
    /// the catalog default. Ids outside the catalog are rejected, and so are
    /// records with a non-finite number.
    pub fn modify_entry(
        &self,
        kind: CatalogKind,
        id: &str,
        apply: impl FnOnce(&mut EffectParameters) -> std::result::Result<(), String>,
    ) -> Result<EffectParameters> {
        let default = self
            .catalog(kind)
            .get(id)
            .map(|descriptor| descriptor.default_parameters.clone())
            .ok_or_else(|| EngineError::UnknownEffect {
                catalog: kind,
                id: id.to_string(),
            })?;

        let mut apply = Some(apply);
        let mut outcome: Result<EffectParameters> =
            Err(EngineError::Storage(format!("{kind} {id} was not written")));
        self.store
            .update(Topic::Catalog(kind).storage_key(), &mut |current| {
                let mut map: BTreeMap<String, Value> = match current {
                    Some(raw) => match serde_json::from_str(raw) {
                        Ok(map) => map,
                        Err(err) => {
                            outcome = Err(err.into());
                            return None;
                        }
                    },
                    None => BTreeMap::new(),
                };
                let stored = map.get(id).map(|record| overlay(&default, record));
                let mut params = match stored {
                    Some(Ok(params)) => params,
                    Some(Err(err)) => {
                        warn!(catalog = %kind, id, "replacing unreadable record: {err}");
                        default.clone()
                    }
                    None => default.clone(),
                };
                if let Some(apply) = apply.take() {
                    if let Err(reason) = apply(&mut params).and_then(|()| params.check_finite()) {
                        outcome = Err(EngineError::Config(reason));
                        return None;
                    }
                }
                let record = match serde_json::to_value(&params) {
                    Ok(record) => record,
                    Err(err) => {
                        outcome = Err(err.into());
                        return None;
                    }
                };
                map.insert(id.to_string(), record);
                match serde_json::to_string(&map) {
                    Ok(raw) => {
                        outcome = Ok(params);
                        Some(raw)
                    }
                    Err(err) => {
                        outcome = Err(err.into());
                        None
                    }
                }
            })
            .map_err(storage_error)?;
        outcome
    }

    pub fn read_playback(&self) -> Result<PlaybackFlags> {
        Ok(self.read_json(PLAYBACK_KEY)?.unwrap_or_default())
    }

    pub fn modify_playback(&self, apply: impl FnOnce(&mut PlaybackFlags)) -> Result<PlaybackFlags> {
        let mut apply = Some(apply);
        let mut outcome: Result<PlaybackFlags> =
            Err(EngineError::Storage("playback was not written".into()));
        self.store
            .update(PLAYBACK_KEY, &mut |current| {
                let mut flags: PlaybackFlags = match current.map(serde_json::from_str) {
                    Some(Ok(flags)) => flags,
                    Some(Err(err)) => {
                        outcome = Err(err.into());
                        return None;
                    }
                    None => PlaybackFlags::default(),
                };
                if let Some(apply) = apply.take() {
                    apply(&mut flags);
                }
                match to_json(&flags) {
                    Ok(raw) => {
                        outcome = Ok(flags);
                        Some(raw)
                    }
                    Err(err) => {
                        outcome = Err(err);
                        None
                    }
                }
            })
            .map_err(storage_error)?;
        outcome
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Layers a stored record, which may name only some fields, over `base`.
fn overlay(base: &EffectParameters, record: &Value) -> Result<EffectParameters> {
    let Some(fields) = record.as_object() else {
        return Err(EngineError::Storage(format!(
            "parameter record must be an object, found `{record}`"
        )));
    };
    let mut merged = serde_json::to_value(base)?;
    if let Some(target) = merged.as_object_mut() {
        for (field, value) in fields {
            target.insert(field.clone(), value.clone());
        }
    }
    Ok(serde_json::from_value(merged)?)
}

/// The writer side used by the configuration UI of this view.
///
/// Every successful write publishes its topic on the view's notifier; storage
/// events only reach the other views.
#[derive(Clone)]
pub struct ConfigEditor {
    repo: ConfigRepository,
    notifier: ChangeNotifier,
}

impl ConfigEditor {
    pub fn new(repo: ConfigRepository, notifier: ChangeNotifier) -> Self {
        Self { repo, notifier }
    }

    pub fn repository(&self) -> &ConfigRepository {
        &self.repo
    }

    pub fn set_active(&self, kind: CatalogKind, id: &str, active: bool) -> Result<EffectParameters> {
        self.update(kind, id, |params| {
            params.is_active = active;
            Ok(())
        })
    }

    pub fn update(
        &self,
        kind: CatalogKind,
        id: &str,
        apply: impl FnOnce(&mut EffectParameters) -> std::result::Result<(), String>,
    ) -> Result<EffectParameters> {
        let params = self.repo.modify_entry(kind, id, apply)?;
        self.notifier.publish(Topic::Catalog(kind));
        Ok(params)
    }

    /// Sets one field by name, as typed in a settings form.
    pub fn set_field(
        &self,
        kind: CatalogKind,
        id: &str,
        field: &str,
        value: &str,
    ) -> Result<EffectParameters> {
        self.update(kind, id, |params| params.set_field(field, value))
    }

    /// Restores catalog defaults for `id`, keeping whether it is active.
    pub fn reset(&self, kind: CatalogKind, id: &str) -> Result<EffectParameters> {
        let defaults = self
            .repo
            .catalog(kind)
            .get(id)
            .map(|descriptor| descriptor.default_parameters.clone());
        self.update(kind, id, move |params| {
            if let Some(defaults) = defaults {
                let active = params.is_active;
                *params = defaults.active(active);
            }
            Ok(())
        })
    }

    /// Deactivates every entry of both catalogs and returns how many were on.
    pub fn disable_all(&self) -> Result<usize> {
        let mut total = 0;
        for kind in CatalogKind::ALL {
            let mut disabled = 0;
            let active: Vec<String> = self
                .repo
                .read_catalog(kind)?
                .into_iter()
                .filter(|(id, params)| params.is_active && self.repo.catalog(kind).get(id).is_some())
                .map(|(id, _)| id)
                .collect();
            for id in active {
                self.repo.modify_entry(kind, &id, |params| {
                    params.is_active = false;
                    Ok(())
                })?;
                disabled += 1;
            }
            if disabled > 0 {
                self.notifier.publish(Topic::Catalog(kind));
            }
            total += disabled;
        }
        Ok(total)
    }

    pub fn set_playing(&self, playing: bool) -> Result<PlaybackFlags> {
        self.playback(|flags| flags.playing = playing)
    }

    pub fn set_volume(&self, volume: f32) -> Result<PlaybackFlags> {
        self.playback(|flags| flags.volume = volume.clamp(0.0, 1.0))
    }

    pub fn set_muted(&self, muted: bool) -> Result<PlaybackFlags> {
        self.playback(|flags| flags.muted = muted)
    }

    fn playback(&self, apply: impl FnOnce(&mut PlaybackFlags)) -> Result<PlaybackFlags> {
        let flags = self.repo.modify_playback(apply)?;
        self.notifier.publish(Topic::Playback);
        Ok(flags)
    }
}
