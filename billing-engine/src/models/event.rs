//! Raw notification events, read-only input owned by the send pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Sms,
    Email,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Sms => "sms",
            NotificationChannel::Email => "email",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "email" => NotificationChannel::Email,
            _ => NotificationChannel::Sms,
        }
    }
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationStatus {
    Created,
    Sending,
    Sent,
    Delivered,
    Pending,
    TemporaryFailure,
    PermanentFailure,
    TechnicalFailure,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Created => "created",
            NotificationStatus::Sending => "sending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Pending => "pending",
            NotificationStatus::TemporaryFailure => "temporary-failure",
            NotificationStatus::PermanentFailure => "permanent-failure",
            NotificationStatus::TechnicalFailure => "technical-failure",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sending" => NotificationStatus::Sending,
            "sent" => NotificationStatus::Sent,
            "delivered" => NotificationStatus::Delivered,
            "pending" => NotificationStatus::Pending,
            "temporary-failure" => NotificationStatus::TemporaryFailure,
            "permanent-failure" => NotificationStatus::PermanentFailure,
            "technical-failure" => NotificationStatus::TechnicalFailure,
            _ => NotificationStatus::Created,
        }
    }

    /// Whether a notification in this status counts towards billing.
    ///
    /// The billable set differs per channel: SMS is billed from the moment a
    /// fragment reaches the provider (including "sent" receipts), while email
    /// billing excludes the provider's transient "sent" state.
    pub fn is_billable(&self, channel: NotificationChannel) -> bool {
        match channel {
            NotificationChannel::Sms => matches!(
                self,
                NotificationStatus::Sending
                    | NotificationStatus::Sent
                    | NotificationStatus::Delivered
                    | NotificationStatus::Pending
                    | NotificationStatus::TemporaryFailure
                    | NotificationStatus::PermanentFailure
            ),
            NotificationChannel::Email => matches!(
                self,
                NotificationStatus::Sending
                    | NotificationStatus::Delivered
                    | NotificationStatus::TemporaryFailure
                    | NotificationStatus::PermanentFailure
            ),
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of API key a notification was sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyType {
    Normal,
    Team,
    Test,
}

impl ApiKeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyType::Normal => "normal",
            ApiKeyType::Team => "team",
            ApiKeyType::Test => "test",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "team" => ApiKeyType::Team,
            "test" => ApiKeyType::Test,
            _ => ApiKeyType::Normal,
        }
    }
}

/// One raw notification event as written by the send/delivery pipeline.
///
/// Provider, rate multiplier, and the international flag are optional on the
/// wire; the rollup applies the documented defaults ("unknown", 1, false)
/// when grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNotificationEvent {
    pub id: Uuid,
    pub service_id: Uuid,
    pub template_id: Uuid,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub key_type: ApiKeyType,
    /// Channel-specific chargeable unit count, e.g. SMS fragments.
    pub billable_units: i64,
    pub rate_multiplier: Option<Decimal>,
    pub international: Option<bool>,
    pub provider: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billable_status_sets_differ_by_channel() {
        assert!(NotificationStatus::Sent.is_billable(NotificationChannel::Sms));
        assert!(!NotificationStatus::Sent.is_billable(NotificationChannel::Email));

        assert!(NotificationStatus::Pending.is_billable(NotificationChannel::Sms));
        assert!(!NotificationStatus::Pending.is_billable(NotificationChannel::Email));

        for channel in [NotificationChannel::Sms, NotificationChannel::Email] {
            assert!(NotificationStatus::Delivered.is_billable(channel));
            assert!(NotificationStatus::TemporaryFailure.is_billable(channel));
            assert!(NotificationStatus::PermanentFailure.is_billable(channel));
            assert!(!NotificationStatus::Created.is_billable(channel));
            assert!(!NotificationStatus::TechnicalFailure.is_billable(channel));
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        let status = NotificationStatus::TemporaryFailure;
        assert_eq!(NotificationStatus::from_string(status.as_str()), status);
    }
}
