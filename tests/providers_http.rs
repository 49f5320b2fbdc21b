// tests/providers_http.rs
// HTTP clients against a local stub server.
use chief_of_staff::ingest::providers::{
    GmailAdapter, GmailHttpClient, SlackAdapter, SlackHttpClient, StaticToken, TelegramAdapter,
    TelegramHttpClient, TokenSource,
};
use chief_of_staff::{SourceAdapter, SourceError, SourceKind};
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Route {
    /// Substring of the request line.
    path: &'static str,
    status: u16,
    headers: &'static str,
    body: String,
}

fn route(path: &'static str, status: u16, body: &str) -> Route {
    Route {
        path,
        status,
        headers: "",
        body: body.to_string(),
    }
}

/// Serve `routes` until the test ends. Returns the base URL and the request lines seen.
async fn stub(routes: Vec<Route>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let req = String::from_utf8_lossy(&buf).to_string();
            let line = req.lines().next().unwrap_or_default().to_string();
            log.lock().unwrap().push(req);
            let (status, headers, body) = routes
                .iter()
                .find(|r| line.contains(r.path))
                .map(|r| (r.status, r.headers, r.body.clone()))
                .unwrap_or((404, "", "{}".to_string()));
            let resp = format!(
                "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\n{headers}connection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    });
    (format!("http://{addr}"), seen)
}

fn since() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[tokio::test]
async fn slack_workspace_end_to_end() {
    let (base, seen) = stub(vec![
        route(
            "conversations.list",
            200,
            r#"{"ok": true, "channels": [
                {"id": "C1", "name": "eng", "name_normalized": "eng"},
                {"id": "C2", "name": "gone", "is_archived": true}
            ]}"#,
        ),
        route(
            "conversations.history",
            200,
            r#"{"ok": true, "messages": [
                {"ts": "1700000500.000200", "user": "U1", "text": "Release is <b>blocked</b>"},
                {"ts": "1700000600.000200", "subtype": "channel_join", "text": "joined"}
            ]}"#,
        ),
        route(
            "users.info",
            200,
            r#"{"ok": true, "user": {"name": "ana", "real_name": "Ana Lopez", "profile": {"display_name": ""}}}"#,
        ),
    ])
    .await;

    let api = SlackHttpClient::new(SecretString::from("xoxb-test")).with_base_url(&base);
    let adapter = SlackAdapter::new("acme", Arc::new(api)).with_attempts(1);
    let out = adapter.fetch_recent(since()).await.unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].source, SourceKind::Slack);
    assert_eq!(out[0].source_ref, "C1:1700000500.000200");
    assert_eq!(out[0].sender, "Ana Lopez");
    assert_eq!(out[0].body, "Release is blocked");
    assert_eq!(out[0].context, "acme #eng");

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|r| r.to_ascii_lowercase().contains("authorization: bearer xoxb-test")));
    // Archived channel history is never requested.
    assert!(!seen.iter().any(|r| r.contains("channel=C2")));
}

#[tokio::test]
async fn slack_invalid_auth_fails_the_workspace() {
    let (base, _) = stub(vec![route(
        "conversations.list",
        200,
        r#"{"ok": false, "error": "invalid_auth"}"#,
    )])
    .await;
    let api = SlackHttpClient::new(SecretString::from("xoxb-bad")).with_base_url(&base);
    let err = SlackAdapter::new("acme", Arc::new(api))
        .fetch_recent(since())
        .await
        .unwrap_err();
    assert_eq!(err, SourceError::Auth("invalid_auth".into()));
}

#[tokio::test]
async fn slack_http_429_carries_retry_after() {
    let (base, _) = stub(vec![Route {
        path: "conversations.list",
        status: 429,
        headers: "retry-after: 30\r\n",
        body: "{}".into(),
    }])
    .await;
    let api = SlackHttpClient::new(SecretString::from("xoxb")).with_base_url(&base);
    let err = SlackAdapter::new("acme", Arc::new(api))
        .with_attempts(1)
        .fetch_recent(since())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SourceError::RateLimited {
            retry_after: Some(Duration::from_secs(30))
        }
    );
}

#[tokio::test]
async fn telegram_rate_limit_envelope_hides_token() {
    let (base, _) = stub(vec![route(
        "getUpdates",
        429,
        r#"{"ok": false, "error_code": 429, "description": "Too Many Requests: retry after 5", "parameters": {"retry_after": 5}}"#,
    )])
    .await;
    let api = TelegramHttpClient::new(SecretString::from("123:SECRET")).with_base_url(&base);
    let err = TelegramAdapter::new(Arc::new(api))
        .with_attempts(1)
        .fetch_recent(since())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SourceError::RateLimited {
            retry_after: Some(Duration::from_secs(5))
        }
    );
    assert!(!err.to_string().contains("SECRET"));
}

#[tokio::test]
async fn telegram_updates_are_mapped() {
    let (base, seen) = stub(vec![route(
        "getUpdates",
        200,
        r#"{"ok": true, "result": [
            {"update_id": 9, "message": {"message_id": 3, "date": 1700000400,
              "chat": {"id": -100, "title": "Family"}, "from": {"first_name": "Mum"}, "text": "Call me"}}
        ]}"#,
    )])
    .await;
    let api = TelegramHttpClient::new(SecretString::from("123:abc")).with_base_url(&base);
    let out = TelegramAdapter::new(Arc::new(api))
        .fetch_recent(since())
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].source_ref, "-100:3");
    assert_eq!(out[0].context, "Family");
    assert!(seen.lock().unwrap()[0].starts_with("GET /bot123:abc/getUpdates"));
}

#[tokio::test]
async fn gmail_lists_then_fetches_metadata() {
    let (base, seen) = stub(vec![
        route(
            "/messages/m1?",
            200,
            r#"{"id": "m1", "threadId": "t1", "internalDate": "1700000300000",
                "snippet": "Please sign the contract",
                "payload": {"headers": [{"name": "From", "value": "Dana <dana@example.test>"},
                                        {"name": "Subject", "value": "Contract"}]}}"#,
        ),
        route("/messages?", 200, r#"{"messages": [{"id": "m1", "threadId": "t1"}]}"#),
    ])
    .await;
    let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new(SecretString::from("ya29.test")));
    let api = GmailHttpClient::new(tokens).with_base_url(&base);
    let out = GmailAdapter::new(Arc::new(api))
        .fetch_recent(since())
        .await
        .unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].subject.as_deref(), Some("Contract"));
    assert_eq!(out[0].source_ref, "t1");

    let seen = seen.lock().unwrap();
    assert!(seen[0].contains("q=after%3A1700000000"));
}

#[tokio::test]
async fn gmail_unauthorized_is_auth_error() {
    let (base, _) = stub(vec![route("/messages?", 401, r#"{"error": {"code": 401}}"#)]).await;
    let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new(SecretString::from("expired")));
    let api = GmailHttpClient::new(tokens).with_base_url(&base);
    let err = GmailAdapter::new(Arc::new(api))
        .fetch_recent(since())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Auth(_)));
}
