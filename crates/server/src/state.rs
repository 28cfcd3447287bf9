use std::sync::Arc;

use pizzeria_core::{Config, IntakeService, SanitizedConfig, TrackingService};

/// Shared application state
pub struct AppState {
    config: Config,
    intake: Arc<IntakeService>,
    tracking: Arc<TrackingService>,
}

impl AppState {
    pub fn new(config: Config, intake: Arc<IntakeService>, tracking: Arc<TrackingService>) -> Self {
        Self {
            config,
            intake,
            tracking,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn intake(&self) -> &IntakeService {
        self.intake.as_ref()
    }

    pub fn tracking(&self) -> &TrackingService {
        self.tracking.as_ref()
    }
}
