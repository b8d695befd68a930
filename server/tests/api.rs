//! End-to-end tests over the HTTP surface: the router runs on an ephemeral
//! port and every upstream (tracker, chat webhook, image host, assistant) is
//! a wiremock server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_partial_json;
use wiremock::matchers::method;
use wiremock::matchers::path;

use intake_chat::ChatNotifier;
use intake_core::config::JiraConfig;
use intake_core::rate_limit::RateLimiter;
use intake_imgur::ImgurClient;
use intake_jira::JiraClient;
use intake_server::AppState;
use intake_server::build_router;

struct TestHarness {
    base_url: String,
    jira: MockServer,
    chat: MockServer,
    imgur: MockServer,
    http: reqwest::Client,
}

async fn spawn_app(rate_limit: u32, assistant: Option<intake_assistant::Client>) -> TestHarness {
    let jira = MockServer::start().await;
    let chat = MockServer::start().await;
    let imgur = MockServer::start().await;

    let state = AppState {
        jira: JiraClient::new(&JiraConfig {
            host: jira.uri(),
            email: "bot@acme.com".to_string(),
            api_token: "token".to_string(),
        })
        .expect("jira client"),
        chat: Some(
            ChatNotifier::new(
                url::Url::parse(&format!("{}/v1/spaces/AAA/messages", chat.uri()))
                    .expect("webhook url"),
            )
            .expect("notifier"),
        ),
        assistant,
        imgur: ImgurClient::new(Some("test-id".to_string()))
            .expect("imgur client")
            .with_base_url(imgur.uri()),
        rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        attach_delay: Duration::ZERO,
        attach_retry_delay: Duration::from_millis(1),
    };

    let router = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });

    TestHarness {
        base_url: format!("http://{addr}"),
        jira,
        chat,
        imgur,
        http: reqwest::Client::new(),
    }
}

async fn mount_issue_created(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "10001",
            "key": "HIR-42",
            "self": format!("{}/rest/api/3/issue/10001", server.uri()),
        })))
        .mount(server)
        .await;
}

async fn mount_chat_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/spaces/AAA/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "spaces/AAA/messages/x"
        })))
        .mount(server)
        .await;
}

fn ticket_json() -> serde_json::Value {
    serde_json::json!({
        "cliente": "hiraoka",
        "asunto": "Checkout roto",
        "descripcion": "<p>El checkout no carga en staging</p>",
        "tipo": "Bug",
        "urgencia": "High",
        "contacto": "ana@example.com",
    })
}

#[tokio::test]
async fn ticket_flow_creates_issue_and_notifies() {
    let harness = spawn_app(100, None).await;
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue"))
        .and(body_partial_json(serde_json::json!({
            "fields": {
                "project": { "key": "HIR" },
                "summary": "Checkout roto",
                "issuetype": { "name": "Bug" },
                "priority": { "name": "High" },
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "10001",
            "key": "HIR-42",
            "self": format!("{}/rest/api/3/issue/10001", harness.jira.uri()),
        })))
        .expect(1)
        .mount(&harness.jira)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/spaces/AAA/messages"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.chat)
        .await;

    let response = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .json(&ticket_json())
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["issueKey"], "HIR-42");
    assert_eq!(
        body["issueUrl"],
        format!("{}/browse/HIR-42", harness.jira.uri())
    );
}

#[tokio::test]
async fn multipart_ticket_attaches_uploaded_files() {
    let harness = spawn_app(100, None).await;
    mount_issue_created(&harness.jira).await;
    mount_chat_ok(&harness.chat).await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/HIR-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "key": "HIR-42"
        })))
        .mount(&harness.jira)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue/HIR-42/attachments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "2000", "filename": "captura.png" }
        ])))
        .expect(1)
        .mount(&harness.jira)
        .await;

    let form = reqwest::multipart::Form::new()
        .text("cliente", "hiraoka")
        .text("asunto", "Checkout roto")
        .text("descripcion", "<p>detalle</p>")
        .text("tipo", "Bug")
        .text("urgencia", "Medium")
        .part(
            "archivo_0",
            reqwest::multipart::Part::bytes(vec![137, 80, 78, 71])
                .file_name("captura.png")
                .mime_str("image/png")
                .expect("part"),
        );

    let response = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .multipart(form)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["issueKey"], "HIR-42");
}

#[tokio::test]
async fn unknown_client_is_rejected() {
    let harness = spawn_app(100, None).await;

    let mut ticket = ticket_json();
    ticket["cliente"] = serde_json::json!("acme");
    let response = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .json(&ticket)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Cliente no válido");
}

#[tokio::test]
async fn missing_description_is_rejected() {
    let harness = spawn_app(100, None).await;

    let mut ticket = ticket_json();
    ticket["descripcion"] = serde_json::json!("");
    let response = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .json(&ticket)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn empty_subject_gets_a_default() {
    let harness = spawn_app(100, None).await;
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue"))
        .and(body_partial_json(serde_json::json!({
            "fields": { "summary": "El checkout no carga en staging" }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "10001",
            "key": "HIR-43",
            "self": format!("{}/rest/api/3/issue/10001", harness.jira.uri()),
        })))
        .expect(1)
        .mount(&harness.jira)
        .await;
    mount_chat_ok(&harness.chat).await;

    let mut ticket = ticket_json();
    ticket["asunto"] = serde_json::json!("");
    let response = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .json(&ticket)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn tracker_failures_surface_their_message() {
    let harness = spawn_app(100, None).await;
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "errorMessages": ["Field 'priority' cannot be set"],
        })))
        .mount(&harness.jira)
        .await;

    let response = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .json(&ticket_json())
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["error"], "Field 'priority' cannot be set");
}

#[tokio::test]
async fn rate_limit_rejects_after_budget() {
    let harness = spawn_app(1, None).await;
    mount_issue_created(&harness.jira).await;
    mount_chat_ok(&harness.chat).await;

    let first = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .json(&ticket_json())
        .send()
        .await
        .expect("request");
    assert_eq!(first.status(), 200);

    let second = harness
        .http
        .post(format!("{}/api/ticket", harness.base_url))
        .json(&ticket_json())
        .send()
        .await
        .expect("request");
    assert_eq!(second.status(), 429);
}

#[tokio::test]
async fn analyze_without_assistant_passes_through() {
    let harness = spawn_app(100, None).await;

    let response = harness
        .http
        .post(format!("{}/api/ai/analyze", harness.base_url))
        .json(&serde_json::json!({ "ticket": ticket_json() }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["needsClarification"], false);
    assert!(
        body["interpretation"]
            .as_str()
            .expect("interpretation")
            .contains("no configurado")
    );
}

#[tokio::test]
async fn analyze_forwards_model_suggestions() {
    let model = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{
                "type": "text",
                "text": r#"{"needsClarification":false,"interpretation":"Todo claro","suggestions":{"tipo":"Bug","urgencia":"High","asunto":"Cupones no aplican en checkout"}}"#
            }]
        })))
        .expect(1)
        .mount(&model)
        .await;

    let assistant = intake_assistant::Client::new("test-key")
        .expect("assistant")
        .with_base_url(model.uri());
    let harness = spawn_app(100, Some(assistant)).await;

    let response = harness
        .http
        .post(format!("{}/api/ai/analyze", harness.base_url))
        .json(&serde_json::json!({
            "ticket": ticket_json(),
            "conversationHistory": [],
            "images": [],
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["needsClarification"], false);
    assert_eq!(body["suggestions"]["tipo"], "Bug");
    assert_eq!(body["suggestions"]["asunto"], "Cupones no aplican en checkout");
}

#[tokio::test]
async fn upload_rejects_non_images() {
    let harness = spawn_app(100, None).await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(vec![1, 2, 3])
            .file_name("doc.pdf")
            .mime_str("application/pdf")
            .expect("part"),
    );

    let response = harness
        .http
        .post(format!("{}/api/upload-image", harness.base_url))
        .multipart(form)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["error"], "El archivo debe ser una imagen");
}

#[tokio::test]
async fn upload_publishes_to_the_image_host() {
    let harness = spawn_app(100, None).await;
    Mock::given(method("POST"))
        .and(path("/3/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": { "link": "https://i.imgur.com/abc123.png", "deletehash": "xyz" }
        })))
        .expect(1)
        .mount(&harness.imgur)
        .await;

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(vec![137, 80, 78, 71])
            .file_name("captura.png")
            .mime_str("image/png")
            .expect("part"),
    );

    let response = harness
        .http
        .post(format!("{}/api/upload-image", harness.base_url))
        .multipart(form)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["url"], "https://i.imgur.com/abc123.png");
    assert_eq!(body["isPublicUrl"], true);
    assert_eq!(body["deleteHash"], "xyz");
    assert_eq!(body["type"], "image/png");
}

#[tokio::test]
async fn notify_endpoint_resends_the_notification() {
    let harness = spawn_app(100, None).await;
    Mock::given(method("POST"))
        .and(path("/v1/spaces/AAA/messages"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&harness.chat)
        .await;

    let response = harness
        .http
        .post(format!("{}/api/notify", harness.base_url))
        .json(&serde_json::json!({
            "ticket": ticket_json(),
            "issueKey": "HIR-42",
            "issueUrl": "https://acme.atlassian.net/browse/HIR-42",
        }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn notify_rejects_incomplete_payloads() {
    let harness = spawn_app(100, None).await;

    let response = harness
        .http
        .post(format!("{}/api/notify", harness.base_url))
        .json(&serde_json::json!({ "issueKey": "HIR-42" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["error"], "Datos incompletos");
}

#[tokio::test]
async fn projects_endpoint_lists_the_clients() {
    let harness = spawn_app(100, None).await;

    let response = harness
        .http
        .get(format!("{}/api/projects", harness.base_url))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    let entries = body.as_array().expect("array");
    assert_eq!(entries.len(), 4);
    assert_eq!(entries[0]["id"], "goodyear");
    assert_eq!(entries[3]["name"], "HIRAOKA");
}

#[tokio::test]
async fn healthz_answers() {
    let harness = spawn_app(100, None).await;
    let response = harness
        .http
        .get(format!("{}/healthz", harness.base_url))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.expect("body"), "ok");
}
