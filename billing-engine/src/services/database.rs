//! Postgres-backed store.

use crate::models::{
    AnnualBilling, ApiKeyType, DailyUsageFact, NotificationChannel, NotificationStatus, Rate,
    RawNotificationEvent, Service,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::UsageStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use platform_core::error::AppError;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    service_id: Uuid,
    template_id: Uuid,
    channel: String,
    status: String,
    key_type: String,
    billable_units: i64,
    rate_multiplier: Option<Decimal>,
    international: Option<bool>,
    provider: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for RawNotificationEvent {
    fn from(row: EventRow) -> Self {
        RawNotificationEvent {
            id: row.id,
            service_id: row.service_id,
            template_id: row.template_id,
            channel: NotificationChannel::from_string(&row.channel),
            status: NotificationStatus::from_string(&row.status),
            key_type: ApiKeyType::from_string(&row.key_type),
            billable_units: row.billable_units,
            rate_multiplier: row.rate_multiplier,
            international: row.international,
            provider: row.provider,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct FactRow {
    local_date: NaiveDate,
    template_id: Uuid,
    service_id: Uuid,
    channel: String,
    provider: String,
    rate_multiplier: Decimal,
    international: bool,
    rate: Decimal,
    billable_units: i64,
    notifications_sent: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FactRow> for DailyUsageFact {
    fn from(row: FactRow) -> Self {
        DailyUsageFact {
            local_date: row.local_date,
            template_id: row.template_id,
            service_id: row.service_id,
            channel: NotificationChannel::from_string(&row.channel),
            provider: row.provider,
            rate_multiplier: row.rate_multiplier,
            international: row.international,
            rate: row.rate,
            billable_units: row.billable_units,
            notifications_sent: row.notifications_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RateRow {
    channel: String,
    valid_from: DateTime<Utc>,
    price: Decimal,
}

impl From<RateRow> for Rate {
    fn from(row: RateRow) -> Self {
        Rate {
            channel: NotificationChannel::from_string(&row.channel),
            valid_from: row.valid_from,
            price: row.price,
        }
    }
}

#[derive(FromRow)]
struct AnnualBillingRow {
    service_id: Uuid,
    financial_year_start: i32,
    free_sms_fragment_limit: i64,
}

impl From<AnnualBillingRow> for AnnualBilling {
    fn from(row: AnnualBillingRow) -> Self {
        AnnualBilling {
            service_id: row.service_id,
            financial_year_start: row.financial_year_start,
            free_sms_fragment_limit: row.free_sms_fragment_limit,
        }
    }
}

#[derive(FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    active: bool,
    restricted: bool,
    count_as_live: bool,
    organization_id: Option<Uuid>,
    sends_sms: bool,
    sends_email: bool,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        let mut permissions = Vec::new();
        if row.sends_sms {
            permissions.push(NotificationChannel::Sms);
        }
        if row.sends_email {
            permissions.push(NotificationChannel::Email);
        }
        Service {
            id: row.id,
            name: row.name,
            active: row.active,
            restricted: row.restricted,
            count_as_live: row.count_as_live,
            organization_id: row.organization_id,
            permissions,
        }
    }
}

const SERVICE_COLUMNS: &str =
    "id, name, active, restricted, count_as_live, organization_id, sends_sms, sends_email";

#[async_trait]
impl UsageStore for PgStore {
    #[instrument(skip(self))]
    async fn events_in_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        service_id: Option<Uuid>,
    ) -> Result<Vec<RawNotificationEvent>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["events_in_window"])
            .start_timer();

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, service_id, template_id, channel, status, key_type, billable_units, rate_multiplier, international, provider, created_at
            FROM notifications
            WHERE created_at >= $1 AND created_at < $2
              AND ($3::uuid IS NULL OR service_id = $3)
            ORDER BY created_at
            "#,
        )
        .bind(from)
        .bind(until)
        .bind(service_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to scan events: {}", e)))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(RawNotificationEvent::from).collect())
    }

    #[instrument(skip(self))]
    async fn service_ids_with_events(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["service_ids_with_events"])
            .start_timer();

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT service_id
            FROM notifications
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY service_id
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list event services: {}", e))
        })?;

        timer.observe_duration();

        Ok(ids)
    }

    /// Atomic single-query upsert: the unique composite key resolves
    /// concurrent rebuilds, and the measures are replaced, not incremented.
    #[instrument(skip(self, fact), fields(service_id = %fact.service_id, local_date = %fact.local_date))]
    async fn upsert_fact(&self, fact: &DailyUsageFact) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_fact"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO daily_usage_facts (local_date, template_id, service_id, channel, provider, rate_multiplier, international, rate, billable_units, notifications_sent, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now())
            ON CONFLICT (local_date, template_id, service_id, channel, provider, rate_multiplier, international, rate)
            DO UPDATE SET
                billable_units = EXCLUDED.billable_units,
                notifications_sent = EXCLUDED.notifications_sent,
                updated_at = now()
            "#,
        )
        .bind(fact.local_date)
        .bind(fact.template_id)
        .bind(fact.service_id)
        .bind(fact.channel.as_str())
        .bind(&fact.provider)
        .bind(fact.rate_multiplier)
        .bind(fact.international)
        .bind(fact.rate)
        .bind(fact.billable_units)
        .bind(fact.notifications_sent)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert fact: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self))]
    async fn facts_for_service(
        &self,
        service_id: Uuid,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailyUsageFact>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["facts_for_service"])
            .start_timer();

        let rows = sqlx::query_as::<_, FactRow>(
            r#"
            SELECT local_date, template_id, service_id, channel, provider, rate_multiplier, international, rate, billable_units, notifications_sent, created_at, updated_at
            FROM daily_usage_facts
            WHERE service_id = $1 AND local_date >= $2 AND local_date <= $3
            ORDER BY local_date, template_id, provider
            "#,
        )
        .bind(service_id)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read facts: {}", e)))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(DailyUsageFact::from).collect())
    }

    #[instrument(skip(self))]
    async fn facts_in_range(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailyUsageFact>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["facts_in_range"])
            .start_timer();

        let rows = sqlx::query_as::<_, FactRow>(
            r#"
            SELECT local_date, template_id, service_id, channel, provider, rate_multiplier, international, rate, billable_units, notifications_sent, created_at, updated_at
            FROM daily_usage_facts
            WHERE local_date >= $1 AND local_date <= $2
            ORDER BY local_date, service_id, template_id, provider
            "#,
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read facts: {}", e)))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(DailyUsageFact::from).collect())
    }

    #[instrument(skip(self))]
    async fn rates(&self) -> Result<Vec<Rate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["rates"])
            .start_timer();

        let rows = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT channel, valid_from, price
            FROM rates
            ORDER BY valid_from DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read rates: {}", e)))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(Rate::from).collect())
    }

    #[instrument(skip(self))]
    async fn annual_billing(
        &self,
        service_id: Uuid,
        financial_year_start: i32,
    ) -> Result<Option<AnnualBilling>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["annual_billing"])
            .start_timer();

        let row = sqlx::query_as::<_, AnnualBillingRow>(
            r#"
            SELECT service_id, financial_year_start, free_sms_fragment_limit
            FROM annual_billing
            WHERE service_id = $1 AND financial_year_start = $2
            "#,
        )
        .bind(service_id)
        .bind(financial_year_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read annual billing: {}", e))
        })?;

        timer.observe_duration();

        Ok(row.map(AnnualBilling::from))
    }

    #[instrument(skip(self))]
    async fn latest_annual_billing(
        &self,
        service_id: Uuid,
        up_to_year: i32,
    ) -> Result<Option<AnnualBilling>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["latest_annual_billing"])
            .start_timer();

        let row = sqlx::query_as::<_, AnnualBillingRow>(
            r#"
            SELECT service_id, financial_year_start, free_sms_fragment_limit
            FROM annual_billing
            WHERE service_id = $1 AND financial_year_start <= $2
            ORDER BY financial_year_start DESC
            LIMIT 1
            "#,
        )
        .bind(service_id)
        .bind(up_to_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to read annual billing: {}", e))
        })?;

        timer.observe_duration();

        Ok(row.map(AnnualBilling::from))
    }

    #[instrument(skip(self))]
    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["service"])
            .start_timer();

        let row = sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"
        ))
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read service: {}", e)))?;

        timer.observe_duration();

        Ok(row.map(Service::from))
    }

    #[instrument(skip(self))]
    async fn services(&self) -> Result<Vec<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["services"])
            .start_timer();

        let rows = sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list services: {}", e)))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(Service::from).collect())
    }

    #[instrument(skip(self))]
    async fn organization_services(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["organization_services"])
            .start_timer();

        let rows = sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE organization_id = $1 ORDER BY id"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list organization services: {}", e))
        })?;

        timer.observe_duration();

        Ok(rows.into_iter().map(Service::from).collect())
    }
}
