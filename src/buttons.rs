//! Button entities
//!
//! A button's state is the time it was last pressed.

use crate::coordinator::RefreshCoordinator;
use crate::entity::Entity;
use crate::logging::StructuredLogger;
use crate::uploader::DataUploader;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

pub const UPDATE_NOW_ID: &str = "button.ampster_update_now";
pub const UPLOAD_NOW_ID: &str = "button.ampster_upload_now";

/// Entity that performs an action when pressed
#[async_trait::async_trait]
pub trait Button: Entity {
    async fn press(&self);
}

#[derive(Default)]
struct LastPressed(Mutex<Option<DateTime<Utc>>>);

impl LastPressed {
    fn mark(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    fn get(&self) -> Option<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.to_rfc3339())
    }
}

/// Requests a price refresh
pub struct UpdateNowButton {
    coordinator: Arc<RefreshCoordinator>,
    logger: StructuredLogger,
    pressed: LastPressed,
}

impl UpdateNowButton {
    pub fn new(coordinator: Arc<RefreshCoordinator>, logger: StructuredLogger) -> Self {
        Self {
            coordinator,
            logger,
            pressed: LastPressed::default(),
        }
    }
}

impl Entity for UpdateNowButton {
    fn entity_id(&self) -> String {
        UPDATE_NOW_ID.to_string()
    }

    fn unique_id(&self) -> String {
        "ampster_update_now".to_string()
    }

    fn name(&self) -> String {
        "Ampster: Update Now".to_string()
    }

    fn state(&self) -> Option<String> {
        self.pressed.get()
    }
}

#[async_trait::async_trait]
impl Button for UpdateNowButton {
    async fn press(&self) {
        self.pressed.mark();
        self.logger.info("Manual refresh requested");
        self.coordinator.request_refresh().await;
    }
}

/// Runs one upload immediately
pub struct UploadNowButton {
    uploader: Arc<DataUploader>,
    logger: StructuredLogger,
    pressed: LastPressed,
}

impl UploadNowButton {
    pub fn new(uploader: Arc<DataUploader>, logger: StructuredLogger) -> Self {
        Self {
            uploader,
            logger,
            pressed: LastPressed::default(),
        }
    }
}

impl Entity for UploadNowButton {
    fn entity_id(&self) -> String {
        UPLOAD_NOW_ID.to_string()
    }

    fn unique_id(&self) -> String {
        "ampster_upload_now".to_string()
    }

    fn name(&self) -> String {
        "Ampster: Upload Now".to_string()
    }

    fn state(&self) -> Option<String> {
        self.pressed.get()
    }
}

#[async_trait::async_trait]
impl Button for UploadNowButton {
    async fn press(&self) {
        self.pressed.mark();
        self.logger.info("Manual upload requested");
        self.uploader.upload().await;
    }
}
