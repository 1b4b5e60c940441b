use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rules stored in the `business_rules` table on top of the configured ones.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
                .fetch_all(&self.pool)
                .await?;

        Ok(apply_rule_overrides(defaults, rows))
    }
}

/// Expected value format: `{"value": <number/string>}`.
pub(crate) fn apply_rule_overrides(defaults: BusinessRules, rows: Vec<(String, Value)>) -> BusinessRules {
    let mut rules = defaults;

    for (key, value) in rows {
        let Some(v) = value.get("value") else {
            warn!(rule = %key, "Business rule without a value field, ignoring");
            continue;
        };
        match key.as_str() {
            "deposit_ratio_bps" => {
                match v.as_u64().and_then(|bps| u32::try_from(bps).ok()) {
                    Some(bps) => rules.deposit_ratio_bps = bps,
                    None => warn!(value = %v, "deposit_ratio_bps override is not an integer"),
                }
            }
            "currency" => {
                if let Some(s) = v.as_str() {
                    rules.currency = s.to_uppercase();
                }
            }
            "session_ttl_seconds" => {
                if let Some(u) = v.as_u64() {
                    rules.session_ttl_seconds = u;
                }
            }
            _ => {}
        }
    }

    rules
}
