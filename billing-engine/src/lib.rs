//! Usage and billing accounting engine for the notification platform.
//!
//! Raw per-notification events are rolled up into daily aggregate fact rows
//! (idempotently, one full-current-total row per natural key per local
//! calendar day), unit rates are resolved per channel and date, and each
//! service's annual free-message allowance is sequentially allocated across
//! the financial year to compute cost. The query engine answers per-service,
//! per-organization, and platform-wide usage questions, rebuilding today's
//! facts on demand when a requested range includes the current day.
//!
//! The engine is invoked as a library by a scheduler (nightly rollups) and by
//! report-serving code; it defines no network or CLI surface of its own.

pub mod clock;
pub mod config;
pub mod models;
pub mod period;
pub mod services;
