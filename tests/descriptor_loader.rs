mod common;

use std::time::Duration;

use common::{png, FakeInference};
use serde_json::json;
use vigil::matcher::DEFAULT_DISTANCE_THRESHOLD;
use vigil::{DescriptorLoader, MatchOutcome, Matcher, RosterClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RED: [u8; 3] = [200, 10, 10];
const BLUE: [u8; 3] = [10, 10, 200];
const GRAY: [u8; 3] = [90, 90, 90];

async fn serve_roster(server: &MockServer, faces: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/activity/known-faces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "faces": faces })))
        .mount(server)
        .await;
}

async fn serve_image(server: &MockServer, at: &str, color: [u8; 3]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(color)),
        )
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> RosterClient {
    let url = format!("{}/api/activity/known-faces", server.uri());
    RosterClient::new(&url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_alice_matches_her_own_descriptor() {
    let server = MockServer::start().await;
    serve_roster(
        &server,
        json!([{ "label": "alice", "imagePaths": [format!("{}/faces/alice/a.jpg", server.uri())] }]),
    )
    .await;
    serve_image(&server, "/faces/alice/a.jpg", RED).await;

    let d = vec![0.1, 0.2, 0.3, 0.4];
    let inference = FakeInference::new(Duration::ZERO, Vec::new()).with_reference(RED, d.clone(), 1);
    let client = client(&server);
    let sets = DescriptorLoader::new(&client, &inference).load().await;
    assert_eq!(sets.len(), 1);

    let matcher = Matcher::new(sets, DEFAULT_DISTANCE_THRESHOLD);
    assert_eq!(
        matcher.query(&d),
        MatchOutcome::Known {
            label: "alice".into(),
            distance: 0.0
        }
    );

    let far = vec![0.9, 0.2, 0.3, 0.4];
    let outcome = matcher.query(&far);
    assert!(!outcome.is_known());
    assert!((outcome.distance().unwrap() - 0.8).abs() < 1e-5);
}

#[tokio::test]
async fn test_disallowed_extension_yields_nothing() {
    let server = MockServer::start().await;
    serve_roster(
        &server,
        json!([{ "label": "bob", "imagePaths": [format!("{}/faces/bob/bad.txt", server.uri())] }]),
    )
    .await;

    let inference = FakeInference::new(Duration::ZERO, Vec::new());
    let client = client(&server);
    let (sets, summary) = DescriptorLoader::new(&client, &inference)
        .load_with_summary()
        .await;
    assert!(sets.is_empty());
    assert_eq!(summary.images_rejected, 1);

    let matcher = Matcher::new(sets, DEFAULT_DISTANCE_THRESHOLD);
    assert_eq!(matcher.query(&[0.0; 4]), MatchOutcome::Unknown { distance: None });

    // only the roster was requested
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_partial_failures_keep_the_rest() {
    let server = MockServer::start().await;
    let base = server.uri();
    serve_roster(
        &server,
        json!([
            { "label": "alice", "imagePaths": [
                format!("{base}/faces/alice/.keep"),
                format!("{base}/faces/alice/a.jpg"),
                format!("{base}/faces/alice/missing.png"),
                format!("{base}/faces/alice/empty.webp"),
            ]},
            { "label": "carol", "imagePaths": [format!("{base}/faces/carol/c.png?sig=1")] },
            { "label": "dave", "imagePaths": [format!("{base}/faces/dave/group.png")] },
        ]),
    )
    .await;
    serve_image(&server, "/faces/alice/a.jpg", RED).await;
    serve_image(&server, "/faces/alice/empty.webp", GRAY).await;
    serve_image(&server, "/faces/dave/group.png", BLUE).await;
    Mock::given(method("GET"))
        .and(path("/faces/alice/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/faces/carol/c.png"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
        .mount(&server)
        .await;

    let inference = FakeInference::new(Duration::ZERO, Vec::new())
        .with_reference(RED, vec![1.0, 0.0], 1)
        .with_reference(BLUE, vec![0.0, 1.0], 3);
    let client = client(&server);
    let (sets, summary) = DescriptorLoader::new(&client, &inference)
        .load_with_summary()
        .await;

    let labels: Vec<&str> = sets.iter().map(|s| s.label()).collect();
    assert_eq!(labels, vec!["alice", "dave"]);
    assert_eq!(sets[0].descriptors().len(), 1);
    assert_eq!(summary.identities, 3);
    assert_eq!(summary.identities_loaded, 2);
    assert_eq!(summary.images_rejected, 1);
    assert_eq!(summary.images_described, 2);
    assert_eq!(summary.no_face, 1);
    assert_eq!(summary.multiple_faces, 1);
    assert_eq!(summary.status_failures, 1);
    assert_eq!(summary.decode_failures, 1);
}

#[tokio::test]
async fn test_roster_errors_mean_no_identities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activity/known-faces"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let inference = FakeInference::new(Duration::ZERO, Vec::new());
    let client = client(&server);
    assert!(DescriptorLoader::new(&client, &inference).load().await.is_empty());
}

#[tokio::test]
async fn test_malformed_roster_means_no_identities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activity/known-faces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "faces": "alice" })))
        .mount(&server)
        .await;

    let inference = FakeInference::new(Duration::ZERO, Vec::new());
    let client = client(&server);
    assert!(DescriptorLoader::new(&client, &inference).load().await.is_empty());
}

#[tokio::test]
async fn test_failure_classes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activity/known-faces"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let err = client(&server).fetch_roster().await.unwrap_err();
    assert_eq!(err.class(), vigil::error::FailureClass::CrossOrigin);

    // nothing listens on port 9 of localhost
    let offline = RosterClient::new("http://127.0.0.1:9/known-faces", Duration::from_secs(2)).unwrap();
    let err = offline.fetch_roster().await.unwrap_err();
    assert_eq!(err.class(), vigil::error::FailureClass::Connectivity);
}

#[tokio::test]
async fn test_stalled_roster_is_a_connectivity_failure() {
    // headers arrive on time, the promised body never does
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stall = tokio::spawn(async move {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"faces\":")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let url = format!("http://{addr}/api/activity/known-faces");
    let slow = RosterClient::new(&url, Duration::from_millis(300)).unwrap();
    let err = slow.fetch_roster().await.unwrap_err();
    assert_eq!(err.class(), vigil::error::FailureClass::Connectivity);
    stall.abort();

    // a response that never starts within the timeout
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/activity/known-faces"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    let url = format!("{}/api/activity/known-faces", server.uri());
    let slow = RosterClient::new(&url, Duration::from_millis(300)).unwrap();
    let err = slow.fetch_roster().await.unwrap_err();
    assert_eq!(err.class(), vigil::error::FailureClass::Connectivity);
}
