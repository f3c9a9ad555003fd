//! Service metadata consumed from the platform's service registry.

use super::event::NotificationChannel;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    /// Restricted services are still in trial mode.
    pub restricted: bool,
    /// Whether the service counts towards production volume reports.
    pub count_as_live: bool,
    pub organization_id: Option<Uuid>,
    pub permissions: Vec<NotificationChannel>,
}

impl Service {
    pub fn allows(&self, channel: NotificationChannel) -> bool {
        self.permissions.contains(&channel)
    }

    /// Live production services: active and counted in production reports.
    pub fn is_live(&self) -> bool {
        self.active && self.count_as_live
    }
}
