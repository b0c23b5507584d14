use ampster::buttons::{Button, UPLOAD_NOW_ID};
use ampster::config::{Config, Country};
use ampster::integration::{Ampster, DEFAULT_ENTRY_ID};
use ampster::uploader::UploadOutcome;
use mockito::{Matcher, Server};
use serde_json::{Map, json};

async fn price_server() -> mockito::ServerGuard {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/electricity_prices/NL.json")
        .with_status(200)
        .with_body(json!({"current_period_all_in_price": 0.25, "country": "NL"}).to_string())
        .create_async()
        .await;
    server
}

fn config(prices: &mockito::ServerGuard, upload_url: String, sensors: &str) -> Config {
    let mut config = Config::default();
    config.entry.country_prefix = Some(Country::NL);
    config.entry.base_url = format!("{}/electricity_prices/", prices.url());
    config.entry.upload_url = upload_url;
    config.entry.api_key = "test-key".to_string();
    config.entry.upload_sensors = sensors.to_string();
    config
}

#[tokio::test]
async fn uploads_static_and_external_sensors() {
    let prices = price_server().await;
    let mut sink = Server::new_async().await;
    let upload = sink
        .mock("POST", "/ingest")
        .match_header("x-api-key", "test-key")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "sensors": {
                "static_42": {"value": "42"},
                "test_sensor": {"value": "on"}
            }
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let app = Ampster::new();
    app.setup_entry(
        DEFAULT_ENTRY_ID,
        &config(&prices, format!("{}/ingest", sink.url()), "static_42,test_sensor"),
    )
    .await
    .unwrap();
    app.registry()
        .set_state("sensor.test_sensor", "on", Map::new())
        .unwrap();

    let uploader = app.uploader(DEFAULT_ENTRY_ID).await.unwrap();
    assert!(uploader.is_running());
    assert_eq!(uploader.upload().await, UploadOutcome::Uploaded { sensors: 2 });
    upload.assert_async().await;

    app.unload_all().await;
    assert!(!uploader.is_running());
}

#[tokio::test]
async fn upload_button_posts_once() {
    let prices = price_server().await;
    let mut sink = Server::new_async().await;
    let upload = sink
        .mock("POST", "/ingest")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let app = Ampster::new();
    app.setup_entry(
        DEFAULT_ENTRY_ID,
        &config(&prices, format!("{}/ingest", sink.url()), "country"),
    )
    .await
    .unwrap();

    let button = app.registry().button(UPLOAD_NOW_ID).unwrap();
    button.press().await;
    upload.assert_async().await;
}

#[tokio::test]
async fn unresolved_sensors_skip_the_post() {
    let prices = price_server().await;
    let mut sink = Server::new_async().await;
    let upload = sink
        .mock("POST", "/ingest")
        .expect(0)
        .create_async()
        .await;

    let app = Ampster::new();
    app.setup_entry(
        DEFAULT_ENTRY_ID,
        &config(&prices, format!("{}/ingest", sink.url()), "does_not_exist"),
    )
    .await
    .unwrap();

    let uploader = app.uploader(DEFAULT_ENTRY_ID).await.unwrap();
    assert_eq!(uploader.upload().await, UploadOutcome::NothingToUpload);
    upload.assert_async().await;
}

#[tokio::test]
async fn missing_upload_config_disables_uploader() {
    let prices = price_server().await;
    let mut cfg = config(&prices, String::new(), "country");
    cfg.entry.api_key.clear();

    let app = Ampster::new();
    app.setup_entry(DEFAULT_ENTRY_ID, &cfg).await.unwrap();
    assert!(app.uploader(DEFAULT_ENTRY_ID).await.is_none());
    assert!(app.registry().button(UPLOAD_NOW_ID).is_none());
}
