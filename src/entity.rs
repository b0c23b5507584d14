//! Entity registry
//!
//! Stands in for the host's state machine: every exposed value is an entity
//! with an id such as `sensor.ampster_country`, and anything that needs a
//! current value (the uploader, the web API) asks the registry for its
//! [`EntityState`]. Managed entities compute their state on every read;
//! external states are plain values written through [`EntityRegistry::set_state`].

use crate::buttons::Button;
use crate::error::{AmpsterError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// State reported for entities whose source is not available
pub const STATE_UNAVAILABLE: &str = "unavailable";
/// State reported for entities without a value yet
pub const STATE_UNKNOWN: &str = "unknown";

/// Point-in-time view of one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub available: bool,
    pub last_updated: DateTime<Utc>,
}

/// A value exposed to the outside world
pub trait Entity: Send + Sync {
    fn entity_id(&self) -> String;
    fn unique_id(&self) -> String;
    fn name(&self) -> String;

    /// Current state, `None` when there is no value
    fn state(&self) -> Option<String>;

    fn attributes(&self) -> Map<String, Value> {
        Map::new()
    }

    fn available(&self) -> bool {
        true
    }

    fn snapshot(&self) -> EntityState {
        let available = self.available();
        let state = if available {
            self.state().unwrap_or_else(|| STATE_UNKNOWN.to_string())
        } else {
            STATE_UNAVAILABLE.to_string()
        };
        let mut attributes = self.attributes();
        attributes
            .entry("friendly_name")
            .or_insert_with(|| Value::String(self.name()));
        EntityState {
            entity_id: self.entity_id(),
            state,
            attributes,
            available,
            last_updated: Utc::now(),
        }
    }
}

/// Read access to entity states
pub trait StateReader: Send + Sync {
    fn get_state(&self, entity_id: &str) -> Option<EntityState>;
}

/// Lowercase, non-alphanumerics collapsed to single underscores
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }
    slug
}

#[derive(Default)]
struct Tables {
    managed: BTreeMap<String, Arc<dyn Entity>>,
    buttons: BTreeMap<String, Arc<dyn Button>>,
    external: BTreeMap<String, EntityState>,
}

/// Registry of every entity known to the process
#[derive(Default)]
pub struct EntityRegistry {
    tables: RwLock<Tables>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_taken(tables: &Tables, entity_id: &str) -> bool {
        tables.managed.contains_key(entity_id) || tables.buttons.contains_key(entity_id)
    }

    /// Add a managed entity; returns false if the id is already taken
    pub fn register(&self, entity: Arc<dyn Entity>) -> bool {
        let entity_id = entity.entity_id();
        let mut tables = self.write();
        if Self::is_taken(&tables, &entity_id) {
            return false;
        }
        tables.external.remove(&entity_id);
        tables.managed.insert(entity_id, entity);
        true
    }

    /// Add a button; returns false if the id is already taken
    pub fn register_button(&self, button: Arc<dyn Button>) -> bool {
        let entity_id = button.entity_id();
        let mut tables = self.write();
        if Self::is_taken(&tables, &entity_id) {
            return false;
        }
        tables.external.remove(&entity_id);
        tables.buttons.insert(entity_id, button);
        true
    }

    /// Drop a managed entity or button
    pub fn remove(&self, entity_id: &str) -> bool {
        let mut tables = self.write();
        tables.managed.remove(entity_id).is_some() || tables.buttons.remove(entity_id).is_some()
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        let tables = self.read();
        Self::is_taken(&tables, entity_id) || tables.external.contains_key(entity_id)
    }

    pub fn button(&self, entity_id: &str) -> Option<Arc<dyn Button>> {
        self.read().buttons.get(entity_id).cloned()
    }

    /// Write an external state; managed ids cannot be overwritten
    pub fn set_state(
        &self,
        entity_id: &str,
        state: impl Into<String>,
        attributes: Map<String, Value>,
    ) -> Result<()> {
        if !entity_id.contains('.') {
            return Err(AmpsterError::validation(
                "entity_id".to_string(),
                format!("'{}' is not of the form <domain>.<object_id>", entity_id),
            ));
        }
        let mut tables = self.write();
        if Self::is_taken(&tables, entity_id) {
            return Err(AmpsterError::validation(
                "entity_id".to_string(),
                format!("'{}' is managed by Ampster", entity_id),
            ));
        }
        tables.external.insert(
            entity_id.to_string(),
            EntityState {
                entity_id: entity_id.to_string(),
                state: state.into(),
                attributes,
                available: true,
                last_updated: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn entity_ids(&self) -> Vec<String> {
        let tables = self.read();
        let mut ids: Vec<String> = tables
            .managed
            .keys()
            .chain(tables.buttons.keys())
            .chain(tables.external.keys())
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Every state, ordered by entity id
    pub fn all_states(&self) -> Vec<EntityState> {
        let (managed, buttons, external) = {
            let tables = self.read();
            (
                tables.managed.values().cloned().collect::<Vec<_>>(),
                tables.buttons.values().cloned().collect::<Vec<_>>(),
                tables.external.values().cloned().collect::<Vec<_>>(),
            )
        };
        let mut states: Vec<EntityState> = managed
            .iter()
            .map(|e| e.snapshot())
            .chain(buttons.iter().map(|b| b.snapshot()))
            .chain(external)
            .collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }
}

impl StateReader for EntityRegistry {
    fn get_state(&self, entity_id: &str) -> Option<EntityState> {
        // Entity reads may consult the coordinator, so release the lock first
        let (managed, button, external) = {
            let tables = self.read();
            (
                tables.managed.get(entity_id).cloned(),
                tables.buttons.get(entity_id).cloned(),
                tables.external.get(entity_id).cloned(),
            )
        };
        managed
            .map(|e| e.snapshot())
            .or_else(|| button.map(|b| b.snapshot()))
            .or(external)
    }
}
