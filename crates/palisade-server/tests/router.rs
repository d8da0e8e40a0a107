//! End-to-end routing tests against an in-memory inference backend.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use futures::stream;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use palisade_auth::{AccessPolicy, AccessVerifier, KeySetRegistry, ACCESS_JWT_HEADER};
use palisade_config::{IdentityPropagation, Settings, DEFAULT_SYSTEM_PROMPT};
use palisade_core::{ChatMessage, GatewayError, GatewayRoute};
use palisade_llm::{InferenceBackend, InferenceRequest, RawResponse};
use palisade_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KID: &str = "test-key";
const SECRET: &[u8] = b"secret-key-material";
const SECRET_B64: &str = "c2VjcmV0LWtleS1tYXRlcmlhbA";
const AUDIENCE: &str = "aud-123";
const STREAM_BODY: &str = concat!(
    "data: {\"response\":\"Hel\"}\n\n",
    "data: {\"response\":\"lo\"}\n\n",
    "data: [DONE]\n\n"
);

/// Records every request and answers with a fixed event stream, or fails.
#[derive(Default)]
struct RecordingBackend {
    requests: Mutex<Vec<InferenceRequest>>,
    fail: bool,
}

impl RecordingBackend {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for RecordingBackend {
    async fn run(&self, request: InferenceRequest) -> Result<RawResponse, GatewayError> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(GatewayError::Inference("backend unavailable".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        let chunks: Vec<Result<Bytes, GatewayError>> = STREAM_BODY
            .split_inclusive("\n\n")
            .map(|chunk| Ok(Bytes::from(chunk.to_string())))
            .collect();

        Ok(RawResponse {
            status: StatusCode::OK,
            headers,
            body: Box::pin(stream::iter(chunks)),
        })
    }
}

struct Harness {
    _jwks: MockServer,
    issuer: String,
    backend: Arc<RecordingBackend>,
    app: Router,
}

fn base_settings() -> Settings {
    Settings::from_lookup(|key| match key {
        "CF_ACCOUNT_ID" => Some("acct".into()),
        "CF_API_TOKEN" => Some("tok".into()),
        _ => None,
    })
    .expect("settings")
}

async fn harness_with(backend: RecordingBackend, configure: impl FnOnce(&mut Settings)) -> Harness {
    let jwks = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdn-cgi/access/certs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{ "kid": KID, "kty": "oct", "alg": "HS256", "k": SECRET_B64 }]
        })))
        .mount(&jwks)
        .await;

    let issuer = jwks.uri();
    let mut settings = base_settings();
    settings.team_domain = Some(issuer.clone());
    settings.policy_aud = Some(AUDIENCE.into());
    configure(&mut settings);

    let policy = AccessPolicy {
        issuer: settings.team_domain.clone(),
        audience: settings.policy_aud.clone(),
    };
    let verifier = AccessVerifier::new(policy, &KeySetRegistry::new(), Duration::from_secs(300));
    let backend = Arc::new(backend);
    let state = AppState::new(settings, verifier, backend.clone());

    Harness {
        _jwks: jwks,
        issuer,
        backend,
        app: build_router(Arc::new(state)),
    }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

async fn harness() -> Harness {
    harness_with(RecordingBackend::default(), |_| {}).await
}

fn mint(issuer: &str, secret: &[u8]) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    let claims = json!({
        "iss": issuer,
        "aud": [AUDIENCE],
        "exp": now + 600,
        "iat": now,
        "email": "dev@example.com",
        "sub": "user-1",
    });
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID.into());
    encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
}

fn chat_request(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(ACCESS_JWT_HEADER, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Bytes {
    to_bytes(response.into_body(), 1 << 20).await.unwrap()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

const HI: &str = r#"{"messages":[{"role":"user","content":"hi"}]}"#;

#[tokio::test]
async fn root_and_files_come_from_embedded_assets() {
    let h = harness().await;

    for uri in ["/", "/styles.css", "/chat.js"] {
        let response = h.send(get(uri)).await;
        let expected = palisade_assets::asset_response(uri);

        assert_eq!(response.status(), expected.status(), "{uri}");
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE),
            expected.headers().get(header::CONTENT_TYPE),
            "{uri}"
        );
        assert_eq!(
            body_bytes(response).await,
            body_bytes(expected).await,
            "{uri}"
        );
    }
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn chat_rejects_other_methods() {
    let h = harness().await;

    for verb in ["GET", "PUT", "DELETE"] {
        let request = Request::builder()
            .method(verb)
            .uri("/api/chat")
            .body(Body::empty())
            .unwrap();
        let response = h.send(request).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{verb}");
        assert_eq!(body_text(response).await, "Method not allowed");
    }
}

#[tokio::test]
async fn unknown_api_paths_are_not_found() {
    let h = harness().await;

    for uri in ["/api/unknown", "/api/", "/api/chat/extra"] {
        let response = h.send(get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_text(response).await, "Not found");
    }
}

#[tokio::test]
async fn unknown_asset_paths_are_not_found() {
    let h = harness().await;

    for uri in ["/unknown/path", "/missing.png", "/api"] {
        let response = h.send(get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_text(response).await, "Not found");
    }
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn missing_token_is_forbidden_before_inference() {
    let h = harness().await;

    let response = h.send(chat_request(None, HI)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(response).await,
        "missing required cf authorization token"
    );
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn bad_signature_is_forbidden() {
    let h = harness().await;
    let token = mint(&h.issuer, b"some-other-secret");

    let response = h.send(chat_request(Some(&token), HI)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_text(response).await.starts_with("invalid token: "));
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn missing_audience_is_forbidden() {
    let h = harness_with(RecordingBackend::default(), |s| s.policy_aud = None).await;
    let token = mint(&h.issuer, SECRET);

    let response = h.send(chat_request(Some(&token), HI)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "missing required audience");
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn valid_chat_streams_backend_output_unchanged() {
    let h = harness().await;
    let token = mint(&h.issuer, SECRET);

    let response = h.send(chat_request(Some(&token), HI)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(body_text(response).await, STREAM_BODY);

    let requests = h.backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(
        request.messages,
        vec![ChatMessage::system(DEFAULT_SYSTEM_PROMPT), ChatMessage::user("hi")]
    );
    assert_eq!(request.model, base_settings().model_id);
    assert_eq!(request.max_tokens, 1024);
    assert!(request.stream);
    assert!(request.gateway.is_none());
}

#[tokio::test]
async fn caller_system_message_is_not_duplicated() {
    let h = harness().await;
    let token = mint(&h.issuer, SECRET);
    let body = r#"{"messages":[
        {"role":"system","content":"be terse"},
        {"role":"user","content":"hi"}
    ]}"#;

    let response = h.send(chat_request(Some(&token), body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let requests = h.backend.requests();
    assert_eq!(
        requests[0].messages,
        vec![ChatMessage::system("be terse"), ChatMessage::user("hi")]
    );
}

#[tokio::test]
async fn missing_messages_field_still_reaches_the_model() {
    let h = harness().await;
    let token = mint(&h.issuer, SECRET);

    let response = h.send(chat_request(Some(&token), "{}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let requests = h.backend.requests();
    assert_eq!(
        requests[0].messages,
        vec![ChatMessage::system(DEFAULT_SYSTEM_PROMPT)]
    );
}

#[tokio::test]
async fn malformed_body_is_a_generic_failure() {
    let h = harness().await;
    let token = mint(&h.issuer, SECRET);

    let response = h.send(chat_request(Some(&token), "{not json")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(
        body_json(response).await,
        json!({ "error": "Failed to process request" })
    );
    assert!(h.backend.requests().is_empty());
}

#[tokio::test]
async fn backend_failure_is_a_generic_failure() {
    let h = harness_with(RecordingBackend::failing(), |_| {}).await;
    let token = mint(&h.issuer, SECRET);

    let response = h.send(chat_request(Some(&token), HI)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "error": "Failed to process request" }));
    assert_eq!(h.backend.requests().len(), 1);
}

#[tokio::test]
async fn identity_note_leads_when_propagation_is_enabled() {
    let h = harness_with(RecordingBackend::default(), |s| {
        s.identity_propagation = IdentityPropagation::Enabled;
    })
    .await;
    let token = mint(&h.issuer, SECRET);

    let response = h.send(chat_request(Some(&token), HI)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let messages = h.backend.requests()[0].messages.clone();
    assert_eq!(
        messages,
        vec![
            ChatMessage::system(
                "The user in this conversation is authenticated as dev@example.com."
            ),
            ChatMessage::system(DEFAULT_SYSTEM_PROMPT),
            ChatMessage::user("hi"),
        ]
    );
}

#[tokio::test]
async fn gateway_route_is_passed_to_the_backend() {
    let route = GatewayRoute {
        id: "gw-1".into(),
        skip_cache: true,
        cache_ttl: Some(120),
    };
    let expected = route.clone();
    let h = harness_with(RecordingBackend::default(), move |s| s.gateway = Some(route)).await;
    let token = mint(&h.issuer, SECRET);

    let response = h.send(chat_request(Some(&token), HI)).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(h.backend.requests()[0].gateway, Some(expected));
}
