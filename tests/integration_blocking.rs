mod support;

use std::time::Duration;

use netreq::prelude::{Client, Credentials, ErrorKind, Method, RequestConfig};
use netreq::transport::TransportKind;
use serde_json::Value;

use support::{MockResponse, MockServer};

fn client(kind: TransportKind) -> Client {
    Client::builder()
        .transport(kind)
        .default_timeout(Duration::from_secs(2))
        .try_build()
        .expect("client should build")
}

fn both_transports() -> [TransportKind; 2] {
    [TransportKind::Socket, TransportKind::Platform]
}

#[test]
fn get_json_succeeds_on_both_transports() {
    for kind in both_transports() {
        let server = MockServer::start(vec![MockResponse::new(
            200,
            vec![("Content-Type", "application/json")],
            br#"{"ok":true}"#.to_vec(),
        )]);

        let response = client(kind).get(&server.url("/v1/ping?verbose=1"), &RequestConfig::new());

        assert!(response.is_success(), "{kind:?}: {:?}", response.error());
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        let body: Value = response.json().expect("json body");
        assert_eq!(body["ok"], true);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/v1/ping?verbose=1");
        assert!(requests[0].body.is_empty());
        assert!(
            requests[0]
                .headers
                .get("user-agent")
                .is_some_and(|value| value.starts_with("netreq/"))
        );
    }
}

#[test]
fn post_sends_payload_with_content_type_and_length() {
    for kind in both_transports() {
        let server = MockServer::start(vec![MockResponse::new(
            201,
            vec![("Content-Type", "application/json")],
            br#"{"id":"item-1"}"#.to_vec(),
        )]);

        let response = client(kind).post(
            &server.url("/v1/items"),
            r#"{"name":"demo"}"#,
            "application/json",
            &RequestConfig::new(),
        );

        assert_eq!(response.status_code(), 201, "{kind:?}");
        assert!(response.is_success());

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body, br#"{"name":"demo"}"#.to_vec());
        assert_eq!(
            requests[0].headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(
            requests[0].headers.get("content-length").map(String::as_str),
            Some("15")
        );
    }
}

#[test]
fn put_patch_and_delete_use_their_methods() {
    let server = MockServer::start(vec![
        MockResponse::status(200),
        MockResponse::status(200),
        MockResponse::status(204),
    ]);
    let client = client(TransportKind::Socket);
    let config = RequestConfig::new();

    assert!(client.put(&server.url("/v1/items/1"), "a=1", "text/plain", &config).is_success());
    assert!(client.patch(&server.url("/v1/items/1"), "a=2", "text/plain", &config).is_success());
    let deleted = client.delete(&server.url("/v1/items/1"), &config);
    assert_eq!(deleted.status_code(), 204);
    assert!(deleted.body().is_empty());

    let methods = server
        .requests()
        .into_iter()
        .map(|request| request.method)
        .collect::<Vec<_>>();
    assert_eq!(methods, vec!["PUT", "PATCH", "DELETE"]);
}

#[test]
fn credentials_replace_caller_authorization_header() {
    let server = MockServer::start(vec![MockResponse::status(200)]);
    let config = RequestConfig::new()
        .with_header("Authorization", "Bearer from-caller")
        .with_header("X-Request-Id", "req-7")
        .with_credentials(Credentials::api_key("from-session"));

    let response = client(TransportKind::Socket).get(&server.url("/v1/me"), &config);
    assert!(response.is_success());

    let requests = server.requests();
    assert_eq!(
        requests[0].headers.get("authorization").map(String::as_str),
        Some("Bearer from-session")
    );
    assert_eq!(
        requests[0].headers.get("x-request-id").map(String::as_str),
        Some("req-7")
    );
}

#[test]
fn chunked_bodies_are_reassembled() {
    for kind in both_transports() {
        let server = MockServer::start(vec![
            MockResponse::text(200, "hello chunked world").chunked(),
        ]);

        let response = client(kind).get(&server.url("/stream"), &RequestConfig::new());

        assert!(response.is_success(), "{kind:?}: {:?}", response.error());
        assert_eq!(response.text_lossy(), "hello chunked world");
    }
}

#[test]
fn relative_redirects_are_followed_on_the_same_server() {
    let server = MockServer::start(vec![
        MockResponse::redirect(302, "/v1/final"),
        MockResponse::text(200, "arrived"),
    ]);

    let response = client(TransportKind::Socket).get(&server.url("/v1/start"), &RequestConfig::new());

    assert!(response.is_success());
    assert_eq!(response.text_lossy(), "arrived");
    let paths = server
        .requests()
        .into_iter()
        .map(|request| request.path)
        .collect::<Vec<_>>();
    assert_eq!(paths, vec!["/v1/start", "/v1/final"]);
}

#[test]
fn redirect_is_returned_when_following_is_disabled() {
    let server = MockServer::start(vec![MockResponse::redirect(302, "/v1/final")]);
    let config = RequestConfig::new().with_follow_redirects(false);

    let response = client(TransportKind::Platform).get(&server.url("/v1/start"), &config);

    assert_eq!(response.status_code(), 302);
    assert!(!response.is_success());
    assert!(response.error().is_none());
    assert_eq!(response.header("location"), Some("/v1/final"));
    assert_eq!(server.served_count(), 1);
}

#[test]
fn see_other_turns_post_into_get() {
    let server = MockServer::start(vec![
        MockResponse::redirect(303, "/v1/jobs/9"),
        MockResponse::text(200, "done"),
    ]);

    let response = client(TransportKind::Socket).post(
        &server.url("/v1/jobs"),
        "payload",
        "text/plain",
        &RequestConfig::new(),
    );

    assert!(response.is_success());
    let requests = server.requests();
    assert_eq!(requests[1].method, "GET");
    assert!(requests[1].body.is_empty());
    assert!(requests[1].headers.get("content-type").is_none());
}

#[test]
fn client_error_status_is_reported_with_its_body() {
    let server = MockServer::start(vec![MockResponse::text(404, "no such item")]);

    let response = client(TransportKind::Socket).request(
        Method::Get,
        &server.url("/v1/items/404"),
        None,
        &RequestConfig::new(),
    );

    assert_eq!(response.status_code(), 404);
    assert!(!response.is_success());
    assert_eq!(response.error_kind(), Some(ErrorKind::ClientError));
    assert_eq!(response.text_lossy(), "no such item");
}
