//! Common test utilities and helpers

use std::path::Path;
use std::time::Duration;

use bcra_etl::api::BcraClient;
use bcra_etl::config::{ApiConfig, Driver, WarehouseConfig};
use chrono::{DateTime, Utc};
use secrecy::SecretString;

pub const TEST_TOKEN: &str = "test-token";

/// Test data utilities
pub mod test_data {
    use super::*;
    use bcra_etl::models::SOURCE_TZ;
    use serde_json::{json, Value};

    /// `days` daily observations ending on `now`'s local date, newest last
    pub fn daily_series(now: DateTime<Utc>, days: i64, base: f64) -> Value {
        let today = now.with_timezone(&SOURCE_TZ).date_naive();
        let points: Vec<Value> = (0..days)
            .rev()
            .map(|i| {
                let date = today - chrono::Duration::days(i);
                json!({"d": date.format("%Y-%m-%d").to_string(), "v": base + i as f64})
            })
            .collect();
        Value::Array(points)
    }
}

/// Client pointed at a mock server
pub fn client_for(base_url: &str) -> BcraClient {
    BcraClient::new(&ApiConfig {
        token: SecretString::from(TEST_TOKEN.to_string()),
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
    })
    .expect("Failed to build client")
}

/// SQLite warehouse config writing to `path`
pub fn sqlite_config(path: &Path) -> WarehouseConfig {
    WarehouseConfig {
        driver: Driver::Sqlite,
        host: String::new(),
        port: 0,
        database: path.to_string_lossy().to_string(),
        user: String::new(),
        password: SecretString::from(String::new()),
        schema: "main".to_string(),
        table: "bcra".to_string(),
    }
}

/// Logging utilities for tests
pub mod logging {
    use std::sync::Once;
    use tracing::info;

    static INIT: Once = Once::new();

    /// Initialize test logging
    pub fn init_test_logging() {
        INIT.call_once(|| {
            // Only initialize if not already initialized
            let _ = tracing::subscriber::set_global_default(
                tracing_subscriber::fmt()
                    .with_env_filter("bcra_etl=debug")
                    .with_test_writer()
                    .finish(),
            );
        });
    }

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }
}
