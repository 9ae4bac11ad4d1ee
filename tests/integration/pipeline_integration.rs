//! End-to-end runs against a mock API and a SQLite warehouse

use chrono::{NaiveDate, Utc};
use pretty_assertions::assert_eq;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bcra_etl::database::{self, LoadMode};
use bcra_etl::models::{find_endpoint, FetchWindow};
use bcra_etl::pipeline::{self, EndpointStatus, LoadOutcome, RunOptions, RunStatus};

use crate::common::{client_for, logging, sqlite_config, test_data, TEST_TOKEN};

fn options(paths: &[&str], load_mode: LoadMode) -> RunOptions {
    RunOptions {
        endpoints: paths.iter().map(|p| find_endpoint(p).unwrap()).collect(),
        load_mode,
        ..RunOptions::default()
    }
}

async fn stored_rows(db_path: &std::path::Path) -> Vec<(NaiveDate, String)> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("Failed to open warehouse file");
    let rows = sqlx::query("SELECT date, concept FROM main.bcra ORDER BY date")
        .fetch_all(&pool)
        .await
        .expect("Failed to read warehouse");
    pool.close().await;
    rows.iter()
        .map(|r| (r.get::<NaiveDate, _>("date"), r.get::<String, _>("concept")))
        .collect()
}

#[tokio::test]
async fn test_usd_ok_and_usd_of_failing() {
    logging::init_test_logging();
    logging::log_test_step("Loading /usd while /usd_of returns 500");

    let now = Utc::now();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usd"))
        .and(header("Authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data::daily_series(now, 31, 1000.0)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/usd_of"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");
    let warehouse_config = sqlite_config(&db_path);
    let client = client_for(&server.uri());

    let report = pipeline::run(
        &client,
        || database::connect(&warehouse_config, 200),
        &options(&["/usd", "/usd_of"], LoadMode::Replace),
        now,
    )
    .await;

    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.rows_aggregated, 29);
    assert_eq!(report.endpoints[0].status, EndpointStatus::Fetched { rows: 29 });
    assert!(report.endpoints[1].is_failed());

    let window = FetchWindow::at(now, 30);
    let rows = stored_rows(&db_path).await;
    assert_eq!(rows.len(), 29);
    assert!(rows.iter().all(|(_, concept)| concept == "Dolar blue"));
    assert!(rows.iter().all(|(date, _)| window.contains(*date)));
    assert_eq!(rows.first().map(|r| r.0), Some(window.start));
    assert_eq!(rows.last().map(|r| r.0), Some(window.end));
}

#[tokio::test]
async fn test_all_endpoints_failing_skips_load() {
    logging::init_test_logging();
    logging::log_test_step("Every endpoint returns 404");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");
    let warehouse_config = sqlite_config(&db_path);
    let client = client_for(&server.uri());

    let report = pipeline::run(
        &client,
        || database::connect(&warehouse_config, 200),
        &RunOptions::default(),
        Utc::now(),
    )
    .await;

    assert_eq!(report.status(), RunStatus::NoData);
    assert_eq!(report.load, LoadOutcome::Skipped(pipeline::SkipReason::NoData));
    assert!(report.endpoints.iter().all(|e| e.is_failed()));
    assert!(!db_path.exists(), "warehouse must not be touched");
}

#[tokio::test]
async fn test_rerun_replace_and_upsert_keep_row_count() {
    logging::init_test_logging();

    let now = Utc::now();
    let server = MockServer::start().await;
    for (endpoint, base) in [("/plazo_fijo", 5_000_000.0), ("/depositos", 9_000_000.0)] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(test_data::daily_series(now, 40, base)))
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("warehouse.db");
    let warehouse_config = sqlite_config(&db_path);
    let client = client_for(&server.uri());

    for mode in [LoadMode::Replace, LoadMode::Replace, LoadMode::Upsert, LoadMode::Upsert] {
        logging::log_test_step(&format!("Run in {mode} mode"));
        let report = pipeline::run(
            &client,
            || database::connect(&warehouse_config, 7),
            &options(&["/plazo_fijo", "/depositos"], mode),
            now,
        )
        .await;

        assert_eq!(report.status(), RunStatus::Complete);
        match &report.load {
            LoadOutcome::Loaded(load) => {
                assert_eq!(load.rows_inserted, 58);
                assert_eq!(load.batches, 9);
            }
            other => panic!("expected a load, got {other:?}"),
        }
        assert_eq!(stored_rows(&db_path).await.len(), 58);
    }
}
