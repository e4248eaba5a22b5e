//! Public-IP lookup against the local stub endpoints


use region_webdriver::{GeoLookup, TargetRegion};
use std::time::Duration;
use test_server::TestServer;

#[tokio::test]
async fn test_country_code_from_lookup() {
    let server = TestServer::start().await;
    server.wait_ready().await.unwrap();

    let lookup = GeoLookup::new(server.url_for("geo/gb"));
    assert_eq!(lookup.country_code().await.unwrap(), "GB");
    assert!(lookup.is_region_ip_address(&TargetRegion::gb()).await);
    assert!(!lookup.is_region_ip_address(&TargetRegion::us()).await);
}

#[tokio::test]
async fn test_country_code_is_uppercased() {
    let server = TestServer::start().await;
    server.wait_ready().await.unwrap();

    let lookup = GeoLookup::new(server.url_for("geo/se"));
    assert_eq!(lookup.country_code().await.unwrap(), "SE");
}

#[tokio::test]
async fn test_lookup_errors() {
    let server = TestServer::start().await;
    server.wait_ready().await.unwrap();

    let down = GeoLookup::new(server.url_for("geo/down"));
    let err = down.country_code().await.unwrap_err();
    assert!(err.to_string().contains("429"), "unexpected error: {}", err);

    let empty = GeoLookup::new(server.url_for("geo/empty"));
    assert!(empty.country_code().await.is_err());
}

#[tokio::test]
async fn test_failed_lookup_falls_back_to_local_address() {
    // Nothing listens on port 9 of localhost
    let lookup = GeoLookup::new("http://127.0.0.1:9/json/").with_timeout(Duration::from_secs(1));

    // No address prefixes are known for the US, whatever the local address is
    assert!(!lookup.is_region_ip_address(&TargetRegion::us()).await);
}
