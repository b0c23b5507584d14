//! Price sensors
//!
//! One [`PriceSensor`] per snapshot key. Sensors hold no value of their own:
//! every read projects the coordinator's current snapshot, so a refresh is
//! visible immediately. The [`SensorProjector`] listener registers sensors for
//! keys that show up in later snapshots.

use crate::coordinator::{RefreshCoordinator, RefreshListener, RefreshOutcome};
use crate::entity::{Entity, EntityRegistry, slugify};
use crate::logging::StructuredLogger;
use crate::price::{DisplayEntity, project_value};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Attribute carrying the complete value of lists and objects
pub const FULL_VALUE_ATTR: &str = "full_value";

pub const STATIC_SENSOR_ID: &str = "sensor.ampster_static_42";
const STATIC_VALUE: i64 = 42;

pub fn price_entity_id(key: &str) -> String {
    format!("sensor.ampster_{}", slugify(key))
}

/// Entity exposing one top-level key of the price document
pub struct PriceSensor {
    key: String,
    coordinator: Arc<RefreshCoordinator>,
}

impl PriceSensor {
    pub fn new(key: impl Into<String>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            key: key.into(),
            coordinator,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn current(&self) -> Option<DisplayEntity> {
        self.coordinator
            .current_snapshot()
            .and_then(|snapshot| snapshot.get(&self.key).map(|v| project_value(&self.key, v)))
    }
}

impl Entity for PriceSensor {
    fn entity_id(&self) -> String {
        price_entity_id(&self.key)
    }

    fn unique_id(&self) -> String {
        format!("ampster_{}", self.key)
    }

    fn name(&self) -> String {
        format!("Ampster {}", self.key)
    }

    fn state(&self) -> Option<String> {
        self.current().map(|e| e.display_value.to_string())
    }

    fn attributes(&self) -> Map<String, Value> {
        let mut attrs = Map::new();
        if let Some(full) = self.current().and_then(|e| e.full_value) {
            attrs.insert(FULL_VALUE_ATTR.to_string(), full);
        }
        attrs
    }

    fn available(&self) -> bool {
        self.coordinator.last_update_success()
            && self
                .coordinator
                .current_snapshot()
                .is_some_and(|s| s.contains_key(&self.key))
    }
}

/// Constant sensor; available while the last refresh succeeded
pub struct StaticSensor {
    coordinator: Arc<RefreshCoordinator>,
}

impl StaticSensor {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl Entity for StaticSensor {
    fn entity_id(&self) -> String {
        STATIC_SENSOR_ID.to_string()
    }

    fn unique_id(&self) -> String {
        "ampster_static_42".to_string()
    }

    fn name(&self) -> String {
        "Ampster Static 42".to_string()
    }

    fn state(&self) -> Option<String> {
        Some(STATIC_VALUE.to_string())
    }

    fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }
}

#[derive(Default)]
struct Tracked {
    /// Keys already handled, registered or not
    seen: BTreeSet<String>,
    /// Entity ids this projector registered
    owned: BTreeSet<String>,
}

/// Keeps one registered sensor per key ever seen in a snapshot
pub struct SensorProjector {
    coordinator: Weak<RefreshCoordinator>,
    registry: Arc<EntityRegistry>,
    tracked: Mutex<Tracked>,
    logger: StructuredLogger,
}

impl SensorProjector {
    pub fn new(
        coordinator: &Arc<RefreshCoordinator>,
        registry: Arc<EntityRegistry>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            coordinator: Arc::downgrade(coordinator),
            registry,
            tracked: Mutex::new(Tracked::default()),
            logger,
        }
    }

    /// Register sensors for keys not seen before; returns how many were added
    pub fn sync(&self) -> usize {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return 0;
        };
        let Some(snapshot) = coordinator.current_snapshot() else {
            return 0;
        };

        let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for key in snapshot.keys() {
            if tracked.seen.contains(key) {
                continue;
            }
            let sensor = PriceSensor::new(key.clone(), coordinator.clone());
            let entity_id = sensor.entity_id();
            if self.registry.register(Arc::new(sensor)) {
                tracked.owned.insert(entity_id);
                added += 1;
            } else {
                self.logger
                    .warn(&format!("Entity id {} already taken; key '{}' skipped", entity_id, key));
            }
            tracked.seen.insert(key.clone());
        }
        if added > 0 {
            self.logger.info(&format!("Added {} price sensors", added));
        }
        added
    }

    /// Entity ids registered by this projector; ids owned elsewhere are excluded
    pub fn entity_ids(&self) -> Vec<String> {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .owned
            .iter()
            .cloned()
            .collect()
    }
}

impl RefreshListener for SensorProjector {
    fn notify(&self, outcome: &RefreshOutcome) {
        if outcome.is_success() {
            self.sync();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{STATE_UNAVAILABLE, StateReader};
    use crate::fetcher::{FetchError, PriceSource};
    use crate::logging::get_logger;
    use crate::price::PriceSnapshot;
    use serde_json::json;

    /// Serves whatever document is currently loaded
    struct Loaded(Mutex<Option<Value>>);

    #[async_trait::async_trait]
    impl PriceSource for Loaded {
        async fn fetch(&self, _url: &str) -> std::result::Result<PriceSnapshot, FetchError> {
            match self.0.lock().unwrap().clone() {
                Some(Value::Object(map)) => Ok(map),
                _ => Err(FetchError::Status(503)),
            }
        }
    }

    fn setup(doc: Value) -> (Arc<Loaded>, Arc<RefreshCoordinator>, Arc<EntityRegistry>, Arc<SensorProjector>) {
        let source = Arc::new(Loaded(Mutex::new(Some(doc))));
        let coordinator = Arc::new(RefreshCoordinator::new("u", source.clone(), get_logger("test")));
        let registry = Arc::new(EntityRegistry::new());
        let projector = Arc::new(SensorProjector::new(&coordinator, registry.clone(), get_logger("test")));
        coordinator.add_listener(projector.clone());
        (source, coordinator, registry, projector)
    }

    #[tokio::test]
    async fn sensors_follow_snapshot() {
        let (_, coordinator, registry, projector) =
            setup(json!({"current_period_all_in_price": 0.25, "country": "NL"}));
        coordinator.request_refresh().await;

        let price = registry
            .get_state("sensor.ampster_current_period_all_in_price")
            .unwrap();
        assert_eq!(price.state, "0.25");
        assert!(!price.attributes.contains_key(FULL_VALUE_ATTR));
        assert_eq!(
            price.attributes.get("friendly_name"),
            Some(&json!("Ampster current_period_all_in_price"))
        );
        assert_eq!(registry.get_state("sensor.ampster_country").unwrap().state, "NL");
        assert_eq!(projector.entity_ids().len(), 2);
    }

    #[tokio::test]
    async fn complex_values_carry_full_value() {
        let (_, coordinator, registry, _) = setup(json!({"hours": [1, 2, 3]}));
        coordinator.request_refresh().await;

        let state = registry.get_state("sensor.ampster_hours").unwrap();
        assert_eq!(state.state, "list (3)");
        assert_eq!(state.attributes.get(FULL_VALUE_ATTR), Some(&json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn new_keys_are_added_and_stale_keys_go_unavailable() {
        let (source, coordinator, registry, projector) = setup(json!({"a": 1}));
        coordinator.request_refresh().await;

        *source.0.lock().unwrap() = Some(json!({"b": 2}));
        coordinator.request_refresh().await;

        assert_eq!(projector.entity_ids(), vec!["sensor.ampster_a", "sensor.ampster_b"]);
        assert_eq!(registry.get_state("sensor.ampster_b").unwrap().state, "2");
        assert_eq!(registry.get_state("sensor.ampster_a").unwrap().state, STATE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn taken_ids_are_not_claimed() {
        let (_, coordinator, registry, first) = setup(json!({"a": 1, "b": 2}));
        coordinator.request_refresh().await;

        let second = Arc::new(SensorProjector::new(&coordinator, registry.clone(), get_logger("test")));
        assert_eq!(second.sync(), 0);
        assert!(second.entity_ids().is_empty());
        assert_eq!(first.entity_ids().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_marks_sensors_unavailable() {
        let (source, coordinator, registry, _) = setup(json!({"a": 1}));
        coordinator.request_refresh().await;
        registry.register(Arc::new(StaticSensor::new(coordinator.clone())));
        assert_eq!(registry.get_state(STATIC_SENSOR_ID).unwrap().state, "42");

        *source.0.lock().unwrap() = None;
        coordinator.request_refresh().await;
        assert!(!registry.get_state("sensor.ampster_a").unwrap().available);
        assert!(!registry.get_state(STATIC_SENSOR_ID).unwrap().available);
    }

    #[test]
    fn entity_naming() {
        assert_eq!(price_entity_id("Current Price"), "sensor.ampster_current_price");
    }
}
