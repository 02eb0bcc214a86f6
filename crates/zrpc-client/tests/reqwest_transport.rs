mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zrpc_client::{headers, Client, Context, ContextError, Error, Form, Method, ReqwestTransport, Transport};

fn reqwest_client() -> (Client, Arc<ReqwestTransport>) {
    let config = common::config();
    let transport = Arc::new(ReqwestTransport::new(&config).unwrap());
    let shared: Arc<dyn Transport> = Arc::clone(&transport) as Arc<dyn Transport>;
    (Client::from_shared(shared, &config).unwrap(), transport)
}

#[tokio::test]
async fn test_json_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", headers::CONTENT_TYPE_JSON))
        .and(header("x-reqid", "req-1"))
        .and(header("user-agent", common::TEST_USER_AGENT))
        .and(body_string(r#"{"name":"a"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"x": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = reqwest_client();
    let ctx = Context::background().with_request_id("req-1");

    let value: Option<Value> = client
        .call_with_json(&ctx, Method::POST, &format!("{}/items", server.uri()), &json!({"name": "a"}))
        .await
        .unwrap();

    assert_eq!(value, Some(json!({"x": 1})));
}

#[tokio::test]
async fn test_host_override_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("host", "api.example.com"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = reqwest_client();
    let endpoint = format!("-H api.example.com {}/ping", server.uri());

    client
        .call::<()>(&Context::background(), Method::GET, &endpoint)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_form_encodings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "a b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(header("content-type", headers::CONTENT_TYPE_FORM))
        .and(body_string("q=a+b"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (client, _) = reqwest_client();
    let mut form = Form::new();
    form.insert("q".into(), vec!["a b".into()]);

    let found: Option<Vec<i32>> = client
        .call_with_form(&Context::background(), Method::GET, &format!("{}/search", server.uri()), &form)
        .await
        .unwrap();
    assert_eq!(found, Some(vec![1, 2]));

    let submitted: Option<Value> = client
        .call_with_form(&Context::background(), Method::POST, &format!("{}/submit", server.uri()), &form)
        .await
        .unwrap();
    assert_eq!(submitted, None);
}

#[tokio::test]
async fn test_error_body_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("x-reqid", "srv-7")
                .set_body_raw(r#"{"error":"no such bucket","key":"NoSuchBucket","errno":612}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let (client, _) = reqwest_client();
    let err = client
        .call::<()>(&Context::background(), Method::DELETE, &format!("{}/bucket", server.uri()))
        .await
        .unwrap_err();

    let info = err.as_status().expect("status error");
    assert_eq!(info.rpc_error(), (404, Some(612), Some("NoSuchBucket"), "no such bucket"));
    assert_eq!(info.reqid(), Some("srv-7"));
}

#[tokio::test]
async fn test_plain_text_error_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&server)
        .await;

    let (client, _) = reqwest_client();
    let err = client
        .call::<()>(&Context::background(), Method::GET, &server.uri())
        .await
        .unwrap_err();

    let info = err.as_status().expect("status error");
    assert_eq!(info.status_code(), 503);
    assert_eq!(info.message(), "try later");
}

#[tokio::test]
async fn test_deadline_aborts_slow_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let (client, transport) = reqwest_client();
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(100));
    let started = std::time::Instant::now();

    let err = client
        .call::<()>(&ctx, Method::GET, &format!("{}/slow", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(ContextError::DeadlineExceeded)), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(transport.inflight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_racing_dispatch_never_waits_for_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let (client, transport) = reqwest_client();
    let endpoint = format!("{}/slow", server.uri());

    for micros in 0..40u64 {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_micros(micros));
        let result = tokio::time::timeout(Duration::from_secs(5), client.call::<()>(&ctx, Method::GET, &endpoint))
            .await
            .unwrap_or_else(|_| panic!("call with a {micros}us deadline did not settle"));
        assert!(result.unwrap_err().is_cancelled());
    }

    assert_eq!(transport.inflight(), 0);
}
