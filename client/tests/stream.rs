//! Event streaming behavior against a mock service.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use exosphere_client::{
    stream_run_events, ClientConfig, ClientError, ExosphereClient, StreamRunOptions,
};
use exosphere_types::{EventPayload, RunEvent, RunId};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ExosphereClient {
    ExosphereClient::new(ClientConfig::new("test-key").with_base_url(server.uri())).unwrap()
}

/// Serve one streaming response that delivers `first_frame` as a complete
/// chunk, then closes the socket without the chunked-encoding terminator.
/// wiremock cannot model this, so a raw listener stands in for a server
/// whose connection drops mid-stream.
async fn serve_then_drop(first_frame: &'static [u8]) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            request.extend_from_slice(&buf[..n]);
            if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\n\
             content-type: text/event-stream\r\n\
             transfer-encoding: chunked\r\n\r\n\
             {:x}\r\n",
            first_frame.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(first_frame).await.unwrap();
        socket.write_all(b"\r\n").await.unwrap();
        socket.flush().await.unwrap();
        // Dropping the socket here closes the connection mid-body.
    });
    format!("http://{addr}")
}

fn sse_response(body: impl Into<Vec<u8>>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/event-stream")
}

fn collector() -> (Arc<Mutex<Vec<RunEvent>>>, impl FnMut(RunEvent)) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event| sink.lock().unwrap().push(event))
}

#[tokio::test]
async fn decodes_frames_in_order_until_natural_end() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/runs/run-9/events"))
        .and(query_param("stream", "1"))
        .and(header("accept", "text/event-stream"))
        .respond_with(sse_response(
            &b": keep-alive\n\n\
               event: created\ndata: {\"a\":1}\nts: t1\n\n\
               data: foo\ndata: bar\n\n\
               id: 7\nretry: 100\n\n\
               event: done\n\n"[..],
        ))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (events, on_event) = collector();

    stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new(),
    )
    .await
    .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].event_type, "created");
    assert_eq!(events[0].payload, Some(EventPayload::Json(json!({"a": 1}))));
    assert_eq!(events[0].ts.as_deref(), Some("t1"));

    // Two data lines, not JSON: joined raw text under the default type.
    assert_eq!(events[1].event_type, "message");
    assert_eq!(
        events[1].payload,
        Some(EventPayload::Text("foo\nbar".to_owned()))
    );

    // The id/retry-only frame was dropped; the event-only frame was not.
    assert_eq!(events[2].event_type, "done");
    assert_eq!(events[2].payload, None);
}

#[tokio::test]
async fn non_success_open_is_a_hard_failure_before_any_event() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/runs/run-9/events"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such run"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (events, on_event) = collector();

    // Even with on_error supplied, a failed open must reject.
    let err = stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new().with_on_error(|_| panic!("open failures must not be routed here")),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("404"), "message: {err}");
    assert!(err.to_string().contains("no such run"), "message: {err}");
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn prefired_cancellation_resolves_without_callbacks() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/runs/run-9/events"))
        .respond_with(sse_response(&b"event: created\n\n"[..]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (events, on_event) = collector();

    stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new().with_cancellation(cancel),
    )
    .await
    .unwrap();

    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancellation_during_open_resolves_promptly() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/runs/run-9/events"))
        .respond_with(sse_response(&b"event: created\n\n"[..]).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let (events, on_event) = collector();

    let start = Instant::now();
    stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new().with_cancellation(cancel),
    )
    .await
    .unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stream_fault_is_routed_to_on_error_when_supplied() {
    let server = MockServer::start().await;

    // A valid frame followed by invalid UTF-8 inside a complete frame.
    let mut body = b"event: created\n\n".to_vec();
    body.extend_from_slice(b"data: \xff\xfe\n\n");

    Mock::given(method("GET"))
        .and(path("/v1/runs/run-9/events"))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (events, on_event) = collector();
    let faults = Arc::new(Mutex::new(Vec::new()));
    let fault_sink = Arc::clone(&faults);

    stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new()
            .with_on_error(move |e| fault_sink.lock().unwrap().push(e.to_string())),
    )
    .await
    .unwrap();

    // The healthy frame was emitted before the fault was intercepted.
    assert_eq!(events.lock().unwrap().len(), 1);
    let faults = faults.lock().unwrap();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].contains("UTF-8"), "fault: {}", faults[0]);
}

#[tokio::test]
async fn stream_fault_propagates_without_on_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/runs/run-9/events"))
        .respond_with(sse_response(&b"data: \xff\xfe\n\n"[..]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (_events, on_event) = collector();

    let err = stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ClientError::Protocol(_)));
}

#[tokio::test]
async fn connection_drop_mid_stream_surfaces_as_reader_error() {
    let base_url = serve_then_drop(b"event: created\n\n").await;
    let client = ExosphereClient::new(ClientConfig::new("test-key").with_base_url(base_url)).unwrap();
    let (events, on_event) = collector();

    let err = stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ClientError::Http(_)), "got {err:?}");
    // The frame delivered before the drop was still emitted.
    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(events.lock().unwrap()[0].event_type, "created");
}

#[tokio::test]
async fn connection_drop_is_routed_to_on_error_when_supplied() {
    let base_url = serve_then_drop(b"event: created\n\n").await;
    let client = ExosphereClient::new(ClientConfig::new("test-key").with_base_url(base_url)).unwrap();
    let (events, on_event) = collector();
    let faults = Arc::new(Mutex::new(Vec::new()));
    let fault_sink = Arc::clone(&faults);

    stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new().with_on_error(move |e| fault_sink.lock().unwrap().push(e)),
    )
    .await
    .unwrap();

    assert_eq!(events.lock().unwrap().len(), 1);
    let faults = faults.lock().unwrap();
    assert_eq!(faults.len(), 1);
    assert!(matches!(faults[0], ClientError::Http(_)), "got {:?}", faults[0]);
}

#[tokio::test]
async fn custom_parser_sees_joined_data_lines() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/runs/run-9/events"))
        .respond_with(sse_response(&b"data: alpha\ndata: beta\n\n"[..]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (events, on_event) = collector();

    stream_run_events(
        &client,
        &RunId::from("run-9"),
        on_event,
        StreamRunOptions::new()
            .with_payload_parser(|raw| EventPayload::Json(json!({ "lines": raw }))),
    )
    .await
    .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(
        events[0].payload,
        Some(EventPayload::Json(json!({"lines": "alpha\nbeta"})))
    );
}
