//! Annual free-allowance rows, administratively created, read-only here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A service's free SMS fragment allowance for one financial year
/// (April 1 of `financial_year_start` through March 31 of the next year).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnualBilling {
    pub service_id: Uuid,
    pub financial_year_start: i32,
    pub free_sms_fragment_limit: i64,
}
