use flowfin_server::{AppConfig, DeploymentEnvironment, build_app};
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde_json::Value;
use tokio::task::JoinHandle;

async fn start_server(
    cfg: AppConfig,
) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&cfg);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

fn assert_hardened(headers: &HeaderMap) {
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-xss-protection"], "1; mode=block");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert!(headers.contains_key("strict-transport-security"));
    assert!(headers.contains_key("permissions-policy"));
}

#[tokio::test]
async fn server_endpoints_work() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    // GET /
    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert_hardened(resp.headers());
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "FlowFin Server");
    assert_eq!(body["status"], "ok");

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert_hardened(resp.headers());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // GET /readyz
    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");

    // Incoming request ids are mirrored
    let resp = client
        .get(format!("{base}/healthz"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "req-42");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn csrf_token_endpoint_returns_body_and_cookie() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/csrf-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_hardened(resp.headers());
    assert_eq!(resp.headers()["cache-control"], "no-store");
    // Development deployments do not send a content security policy
    assert!(!resp.headers().contains_key("content-security-policy"));

    let cookie = resp.headers()[SET_COOKIE].to_str().unwrap().to_string();
    let body: Value = resp.json().await.unwrap();
    let token = body["csrfToken"].as_str().expect("csrfToken string");

    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(cookie.contains(&format!("csrf-token={token}")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=3600"));
    assert!(!cookie.contains("Secure"));

    // Two issuances never share a token
    let other: Value = client
        .get(format!("{base}/api/csrf-token"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_ne!(other["csrfToken"], body["csrfToken"]);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn production_sends_csp_and_secure_cookie() {
    let cfg = AppConfig {
        environment: DeploymentEnvironment::Production,
        ..AppConfig::default()
    };
    let (base, shutdown_tx, handle) = start_server(cfg).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/csrf-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_hardened(resp.headers());

    let csp = resp.headers()["content-security-policy"].to_str().unwrap();
    assert!(csp.starts_with("default-src 'self'; script-src"));
    assert!(csp.contains("frame-ancestors 'none'"));
    assert!(csp.ends_with("form-action 'self'"));

    let cookie = resp.headers()[SET_COOKIE].to_str().unwrap();
    assert!(cookie.contains("Secure"));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unknown_routes_still_get_security_headers() {
    let (base, shutdown_tx, handle) = start_server(AppConfig::default()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/does/not/exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_hardened(resp.headers());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    // Mutations on unknown routes are stopped by the CSRF guard first
    let resp = client
        .post(format!("{base}/does/not/exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_hardened(resp.headers());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
