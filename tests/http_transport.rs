//! HttpTransport against a local tiny_http endpoint
#![cfg(feature = "http")]

use readtime::{
    Event, FixedPageRenderer, Foreground, HttpTransport, Session, TargetId, TelemetrySnapshot,
    TelemetryTransport, TrackerConfig, TransportError,
};
use std::io::Read;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Response, Server};
use uuid::Uuid;

/// Serve `status` for every request and forward each (url, body) pair.
fn start_endpoint(status: u16) -> (String, mpsc::Receiver<(String, String)>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    let endpoint = format!("http://{}/api/record-read-times", addr);
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let _ = tx.send((request.url().to_string(), body));
            let _ = request.respond(Response::empty(status));
        }
    });
    (endpoint, rx)
}

fn snapshot() -> TelemetrySnapshot {
    TelemetrySnapshot {
        target_id: TargetId::from("edition-7"),
        client_id: Uuid::nil(),
        page_times: vec![1200.4, 0.0, 87.6],
    }
}

fn transport() -> HttpTransport {
    HttpTransport::new(&TrackerConfig::default()).unwrap()
}

#[tokio::test]
async fn posts_snapshot_as_json() {
    let (endpoint, rx) = start_endpoint(200);
    transport().send(&endpoint, snapshot()).await.unwrap();

    let (url, body) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(url, "/api/record-read-times");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["target_id"], "edition-7");
    assert_eq!(json["client_id"], Uuid::nil().to_string());
    assert_eq!(json["page_times"], serde_json::json!([1200, 0, 88]));
}

#[tokio::test]
async fn error_status_is_a_failure() {
    let (endpoint, _rx) = start_endpoint(503);
    let err = transport().send(&endpoint, snapshot()).await.unwrap_err();
    assert_eq!(err, TransportError::Status(503));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = format!("http://127.0.0.1:{}/api/record-read-times", port);
    let err = transport().send(&endpoint, snapshot()).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)), "{:?}", err);
}

#[tokio::test]
async fn session_delivers_read_times_end_to_end() -> anyhow::Result<()> {
    let (endpoint, rx) = start_endpoint(200);
    let config = TrackerConfig {
        endpoint,
        debounce_ms: 5,
        tick_period_ms: 10,
        flush_interval_ms: 200,
        flush_check_period_ms: 50,
        ..TrackerConfig::default()
    };
    let transport = Arc::new(HttpTransport::new(&config)?);
    let renderer = Arc::new(FixedPageRenderer::uniform(2, 595.0, 842.0));
    let (session, handle) = Session::new(config, renderer, transport, Foreground::default())?;
    let client_id = session.client_id();
    let driver = tokio::spawn(session.run());

    handle.send(Event::ContentAdded {
        target: TargetId::from("edition-7"),
        document: "/pdfs/edition-7.pdf".to_string(),
    })?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.send(Event::Visibility {
        target: TargetId::from("edition-7"),
        page: 2,
        ratio: 1.0,
    })?;

    let body = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
        .await?
        .map(|(_, body)| body)?;
    let json: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(json["client_id"], client_id.to_string());
    assert_eq!(json["page_times"][0], 0);
    assert!(json["page_times"][1].as_u64().unwrap_or(0) > 0);

    handle.shutdown().await?;
    driver.await??;
    Ok(())
}
