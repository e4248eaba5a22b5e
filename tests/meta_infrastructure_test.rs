//! Meta/Infrastructure Tests
//!
//! These tests verify that the testing infrastructure itself works correctly:
//! the fake shop server, its stub endpoints, and test isolation.


use test_server::TestServer;

/// Meta test: Verify test server starts on a random port
#[tokio::test]
async fn meta_test_server_starts() {
    let server = TestServer::start().await;
    assert!(server.addr().port() > 0);
    println!("✅ Test server running on: {}", server.url());
}

/// Meta test: Verify the shop page carries the location chooser
#[tokio::test]
async fn meta_test_server_serves_shop() {
    let server = TestServer::start().await;
    server
        .wait_ready()
        .await
        .expect("Server failed to become ready");

    let body = reqwest::get(server.url_for("shop/523388"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains("<title>Volvo Penta Shop</title>"));
    assert!(body.contains("class=\"location-selector\""));
    assert!(body.contains("data-country=\"GB\""));

    println!("✅ Test server serves the shop page");
}

/// Meta test: Verify the UK page and geo stubs respond as expected
#[tokio::test]
async fn meta_test_server_stub_routes() {
    let server = TestServer::start().await;
    server.wait_ready().await.unwrap();

    let uk = reqwest::get(server.url_for("uk/shop")).await.unwrap();
    assert!(uk.status().is_success());
    assert!(uk.text().await.unwrap().contains("£"));

    let geo: serde_json::Value = reqwest::get(server.url_for("geo/gb"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(geo["country_code"], "GB");

    let down = reqwest::get(server.url_for("geo/down")).await.unwrap();
    assert_eq!(down.status().as_u16(), 429);
}

/// Meta test: Verify multiple test servers get different ports for isolation
#[tokio::test]
async fn meta_test_multiple_servers_different_ports() {
    let server1 = TestServer::start().await;
    let server2 = TestServer::start().await;

    assert_ne!(server1.addr().port(), server2.addr().port());

    println!("✅ Server 1: {}", server1.url());
    println!("✅ Server 2: {}", server2.url());
}

/// Meta test: Verify server wait_ready() detects when server is responsive
#[tokio::test]
async fn meta_test_server_wait_ready() {
    let server = TestServer::start().await;

    let result = server.wait_ready().await;
    assert!(result.is_ok(), "wait_ready() should succeed");
}
