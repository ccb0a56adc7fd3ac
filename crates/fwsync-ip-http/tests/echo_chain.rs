//! Echo chain behavior against an in-process HTTP server

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use fwsync_core::error::EndpointFailureReason;
use fwsync_core::traits::IpResolver;
use fwsync_ip_http::HttpIpResolver;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Serve a fixed set of echo routes on an ephemeral port
async fn spawn_echo_server() -> String {
    let app = Router::new()
        .route("/plain", get(|| async { "203.0.113.5\n" }))
        .route("/padded", get(|| async { "   \n 198.51.100.9 \t\n" }))
        .route("/html", get(|| async { "<html>Your IP: 192.0.2.44</html>" }))
        .route("/broken", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "oops") }))
        .route("/bad-octet", get(|| async { "999.1.1.1" }))
        .route("/text", get(|| async { "no address here" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "10.0.0.1"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

fn urls(base: &str, paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| format!("{}{}", base, p)).collect()
}

#[tokio::test]
async fn first_valid_endpoint_wins() {
    let base = spawn_echo_server().await;
    let resolver = HttpIpResolver::new().unwrap();

    let resolved = resolver
        .resolve(&urls(&base, &["/plain", "/padded"]))
        .await
        .unwrap();

    assert_eq!(resolved.ip, Ipv4Addr::new(203, 0, 113, 5));
    assert_eq!(resolved.endpoint, format!("{}/plain", base));
    assert!(resolved.failures.is_empty());
}

#[tokio::test]
async fn failures_are_skipped_in_order() {
    let base = spawn_echo_server().await;
    let resolver = HttpIpResolver::new().unwrap();

    let resolved = resolver
        .resolve(&urls(&base, &["/broken", "/bad-octet", "/text", "/html"]))
        .await
        .unwrap();

    assert_eq!(resolved.ip, Ipv4Addr::new(192, 0, 2, 44));
    let reasons: Vec<_> = resolved.failures.iter().map(|f| f.reason.clone()).collect();
    assert_eq!(
        reasons,
        vec![
            EndpointFailureReason::Status(500),
            EndpointFailureReason::Unparseable("999.1.1.1".into()),
            EndpointFailureReason::Unparseable("no address here".into()),
        ]
    );
}

#[tokio::test]
async fn surrounding_whitespace_is_ignored() {
    let base = spawn_echo_server().await;
    let resolved = HttpIpResolver::new()
        .unwrap()
        .resolve(&urls(&base, &["/padded"]))
        .await
        .unwrap();
    assert_eq!(resolved.ip, Ipv4Addr::new(198, 51, 100, 9));
}

#[tokio::test]
async fn blank_entries_are_skipped() {
    let base = spawn_echo_server().await;
    let mut endpoints = vec!["".to_string(), "   ".to_string()];
    endpoints.extend(urls(&base, &["/plain"]));

    let resolver = HttpIpResolver::new().unwrap();
    let resolved = resolver.resolve(&endpoints).await.unwrap();
    assert!(resolved.failures.is_empty());
}

#[tokio::test]
async fn all_endpoints_failing_reports_each() {
    let base = spawn_echo_server().await;
    let err = HttpIpResolver::new()
        .unwrap()
        .resolve(&urls(&base, &["/broken", "/text"]))
        .await
        .unwrap_err();

    assert_eq!(err.failures.len(), 2);
    assert!(err.to_string().starts_with("cannot resolve IP"));
}

#[tokio::test]
async fn empty_list_is_a_failure() {
    let err = HttpIpResolver::new().unwrap().resolve(&[]).await.unwrap_err();
    assert!(err.failures.is_empty());
}

#[tokio::test]
async fn timeout_moves_on_to_next_endpoint() {
    let base = spawn_echo_server().await;
    let resolver = HttpIpResolver::with_timeout(Duration::from_millis(200)).unwrap();

    let resolved = resolver
        .resolve(&urls(&base, &["/slow", "/plain"]))
        .await
        .unwrap();

    assert_eq!(resolved.ip, Ipv4Addr::new(203, 0, 113, 5));
    assert!(matches!(
        resolved.failures[0].reason,
        EndpointFailureReason::Transport(_)
    ));
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_failure() {
    // Port 9 (discard) on localhost is expected to refuse connections
    let err = HttpIpResolver::with_timeout(Duration::from_millis(500))
        .unwrap()
        .resolve(&["http://127.0.0.1:9/".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err.failures[0].reason,
        EndpointFailureReason::Transport(_)
    ));
}
