//! Price threshold automation
//!
//! After each successful refresh, turns the target entity `on` when the
//! configured price is strictly below the threshold and `off` otherwise.

use crate::config::AutomationConfig;
use crate::coordinator::{RefreshCoordinator, RefreshListener, RefreshOutcome};
use crate::entity::{EntityRegistry, StateReader};
use crate::logging::StructuredLogger;
use serde_json::{Map, Value};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// `On` below the threshold, `Off` at or above it
pub fn decide(price: f64, threshold: f64) -> SwitchState {
    if price < threshold {
        SwitchState::On
    } else {
        SwitchState::Off
    }
}

/// Reads a numeric price from a number or a numeric string
fn as_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub struct PriceAutomation {
    config: AutomationConfig,
    coordinator: Weak<RefreshCoordinator>,
    registry: Arc<EntityRegistry>,
    logger: StructuredLogger,
}

impl PriceAutomation {
    pub fn new(
        config: AutomationConfig,
        coordinator: &Arc<RefreshCoordinator>,
        registry: Arc<EntityRegistry>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            config,
            coordinator: Arc::downgrade(coordinator),
            registry,
            logger,
        }
    }

    /// Evaluate the current snapshot; returns the state written, if any
    pub fn evaluate(&self) -> Option<SwitchState> {
        let snapshot = self.coordinator.upgrade()?.current_snapshot()?;
        let Some(price) = snapshot.get(&self.config.price_key).and_then(as_price) else {
            self.logger.debug(&format!(
                "Price key '{}' missing or not numeric",
                self.config.price_key
            ));
            return None;
        };

        let wanted = decide(price, self.config.threshold);
        let current = self.registry.get_state(&self.config.target_entity);
        if current.is_some_and(|s| s.state == wanted.as_str()) {
            return None;
        }

        match self
            .registry
            .set_state(&self.config.target_entity, wanted.as_str(), Map::new())
        {
            Ok(()) => {
                self.logger.info(&format!(
                    "Price {} vs threshold {}: turning {} {}",
                    price,
                    self.config.threshold,
                    self.config.target_entity,
                    wanted.as_str()
                ));
                Some(wanted)
            }
            Err(e) => {
                self.logger.error(&format!(
                    "Failed to set {}: {}",
                    self.config.target_entity, e
                ));
                None
            }
        }
    }
}

impl RefreshListener for PriceAutomation {
    fn notify(&self, outcome: &RefreshOutcome) {
        if outcome.is_success() {
            self.evaluate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchError, PriceSource};
    use crate::logging::get_logger;
    use crate::price::PriceSnapshot;
    use serde_json::json;
    use std::sync::Mutex;

    struct Doc(Mutex<Value>);

    #[async_trait::async_trait]
    impl PriceSource for Doc {
        async fn fetch(&self, _url: &str) -> std::result::Result<PriceSnapshot, FetchError> {
            self.0
                .lock()
                .unwrap()
                .as_object()
                .cloned()
                .ok_or(FetchError::NotAnObject)
        }
    }

    fn config() -> AutomationConfig {
        AutomationConfig {
            enabled: true,
            price_key: "current_period_all_in_price".to_string(),
            threshold: 0.20,
            target_entity: "switch.inverter".to_string(),
        }
    }

    #[test]
    fn threshold_is_strict() {
        assert_eq!(decide(0.19, 0.20), SwitchState::On);
        assert_eq!(decide(0.20, 0.20), SwitchState::Off);
        assert_eq!(decide(-0.05, 0.20), SwitchState::On);
    }

    #[tokio::test]
    async fn switches_target_on_price_changes() {
        let source = Arc::new(Doc(Mutex::new(json!({"current_period_all_in_price": 0.15}))));
        let coordinator = Arc::new(RefreshCoordinator::new("u", source.clone(), get_logger("test")));
        let registry = Arc::new(EntityRegistry::new());
        let automation = Arc::new(PriceAutomation::new(
            config(),
            &coordinator,
            registry.clone(),
            get_logger("automation"),
        ));
        coordinator.add_listener(automation.clone());

        coordinator.request_refresh().await;
        assert_eq!(registry.get_state("switch.inverter").unwrap().state, "on");
        // Unchanged decision writes nothing
        assert_eq!(automation.evaluate(), None);

        *source.0.lock().unwrap() = json!({"current_period_all_in_price": "0.31"});
        coordinator.request_refresh().await;
        assert_eq!(registry.get_state("switch.inverter").unwrap().state, "off");
    }

    #[tokio::test]
    async fn missing_price_leaves_target_alone() {
        let source = Arc::new(Doc(Mutex::new(json!({"country": "NL"}))));
        let coordinator = Arc::new(RefreshCoordinator::new("u", source, get_logger("test")));
        let registry = Arc::new(EntityRegistry::new());
        let automation = PriceAutomation::new(config(), &coordinator, registry.clone(), get_logger("automation"));

        coordinator.request_refresh().await;
        assert_eq!(automation.evaluate(), None);
        assert!(registry.get_state("switch.inverter").is_none());
    }
}
