//! HttpBackend against a throw-away axum server
//!
//! The fake server speaks just enough of the restaurant API to check what the
//! client sends (paths, bearer tokens, multipart fields) and how it maps the
//! server's answers onto the error taxonomy.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use libcarenderia::api::{Backend, HttpBackend};
use libcarenderia::config::ApiConfig;
use libcarenderia::storage::{MemoryStorage, Storage, ACCESS_TOKEN_KEY};
use libcarenderia::types::{ImageMimeType, ImageUpload, NewReview};
use libcarenderia::{ApiError, Registration, ReviewTarget, StorefrontError};

const VALID_TOKEN: &str = "tok-juan";

#[derive(Clone, Default)]
struct Recorded {
    /// Authorization header of every request, keyed by path
    auth: Arc<Mutex<Vec<(String, Option<String>)>>>,
    review_body: Arc<Mutex<Option<String>>>,
}

impl Recorded {
    fn record(&self, path: &str, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth.lock().unwrap().push((path.to_string(), auth));
    }

    fn auth_for(&self, path: &str) -> Option<String> {
        self.auth
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .and_then(|(_, auth)| auth.clone())
    }
}

fn is_authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", VALID_TOKEN))
        .unwrap_or(false)
}

fn token_rejected() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid"
        })),
    )
}

async fn obtain_token(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "juan" && body["password"] == "adobo123" {
        (
            StatusCode::OK,
            Json(json!({ "access": VALID_TOKEN, "refresh": "ref-juan" })),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "No active account found with the given credentials" })),
        )
    }
}

async fn register() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "username": ["A user with that username already exists."] })),
    )
}

async fn current_user(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    recorded.record("/firstapp/users/me/", &headers);
    if !is_authorized(&headers) {
        return token_rejected();
    }
    (
        StatusCode::OK,
        Json(json!({
            "username": "juan",
            "email": "juan@example.com",
            "first_name": "Juan",
            "last_name": "",
            "phone": null
        })),
    )
}

async fn products(State(recorded): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    recorded.record("/firstapp/products/", &headers);
    Json(json!({
        "count": 3,
        "results": [
            { "id": 1, "name": "Chicken Adobo", "category": "Ulam", "price": "120.50" },
            { "id": 3, "name": "Lechon", "category": "Ulam", "price": "market price" },
            { "id": 2, "name": "Halo-Halo", "category": "Dessert", "price": 85, "is_available": false }
        ]
    }))
}

async fn reviews() -> Json<Value> {
    Json(json!([
        {
            "id": 1, "username": "maria", "review_type": "food", "food": 1,
            "rating": 5, "comment": "Sarap!", "created_at": "2024-06-01T12:00:00Z"
        },
        {
            "id": 2, "username": "pedro", "review_type": "shop",
            "rating": 4, "comment": "", "created_at": "2024-06-02T08:30:00Z"
        },
        {
            "id": 3, "username": "ghost", "review_type": "food",
            "rating": 9, "created_at": "2024-06-03T08:30:00Z"
        },
        {
            "id": 4, "username": "nodate", "review_type": "shop", "rating": 3
        }
    ]))
}

async fn create_review(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    recorded.record("/firstapp/reviews/", &headers);
    if !is_authorized(&headers) {
        return token_rejected();
    }
    *recorded.review_body.lock().unwrap() = Some(String::from_utf8_lossy(&body).into_owned());
    (
        StatusCode::CREATED,
        Json(json!({
            "id": 10, "username": "juan", "review_type": "food", "food": 1,
            "rating": 4, "comment": "Masarap", "image": "/media/reviews/plate.png",
            "created_at": "2024-06-04T09:00:00Z"
        })),
    )
}

async fn coupons() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "<h1>Server Error (500)</h1>")
}

async fn claimed_coupons(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !is_authorized(&headers) {
        return token_rejected();
    }
    (
        StatusCode::OK,
        Json(json!([
            {
                "id": 7, "name": "Free Gulaman", "product_name": "Gulaman", "rate": "100%",
                "code": "GUL7", "expiration": "2030-01-31", "status": "claimed"
            },
            {
                "id": 8, "name": "No Expiry", "rate": 10,
                "code": "NOEXP", "expiration": null, "status": "claimed"
            },
            {
                "id": 9, "name": "No Code", "rate": 10,
                "expiration": "2030-01-31", "status": "claimed"
            }
        ])),
    )
}

async fn claim(
    State(recorded): State<Recorded>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> (StatusCode, Json<Value>) {
    recorded.record("/firstapp/coupons/claim/", &headers);
    if !is_authorized(&headers) {
        return token_rejected();
    }
    if id == 99 {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." })));
    }
    (StatusCode::OK, Json(json!({ "message": "Coupon claimed" })))
}

async fn request_otp(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["email"] == "juan@example.com" {
        (StatusCode::OK, Json(json!({ "message": "OTP sent" })))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No user with this email." })),
        )
    }
}

struct TestServer {
    base_url: String,
    recorded: Recorded,
}

async fn spawn_server() -> TestServer {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/api/token/", post(obtain_token))
        .route("/firstapp/users/register/", post(register))
        .route("/firstapp/users/me/", get(current_user))
        .route("/firstapp/products/", get(products))
        .route("/firstapp/reviews/", get(reviews).post(create_review))
        .route("/firstapp/coupons/", get(coupons))
        .route("/firstapp/coupons/claimed/", get(claimed_coupons))
        .route("/firstapp/coupons/{id}/claim/", post(claim))
        .route("/firstapp/password-reset/request-otp/", post(request_otp))
        .with_state(recorded.clone());

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        recorded,
    }
}

fn backend(base_url: &str, storage: Arc<MemoryStorage>) -> HttpBackend {
    let config = ApiConfig {
        base_url: format!("{}/", base_url),
        timeout_secs: Some(5),
    };
    HttpBackend::new(&config, storage).expect("client")
}

#[tokio::test]
async fn test_login_and_profile_with_bearer_token() {
    let server = spawn_server().await;
    let storage = Arc::new(MemoryStorage::new());
    let api = backend(&server.base_url, storage.clone());
    assert_eq!(api.base_url(), server.base_url);

    let session = api
        .obtain_token("juan", &"adobo123".to_string().into())
        .await
        .unwrap();
    assert_eq!(session.access_token, VALID_TOKEN);
    assert_eq!(session.refresh_token, "ref-juan");

    storage
        .set(ACCESS_TOKEN_KEY, &session.access_token)
        .await
        .unwrap();
    let user = api.current_user().await.unwrap();
    assert_eq!(user.username, "juan");
    assert_eq!(user.first_name.as_deref(), Some("Juan"));
    assert_eq!(user.last_name, None);

    assert_eq!(
        server.recorded.auth_for("/firstapp/users/me/").as_deref(),
        Some("Bearer tok-juan")
    );
}

#[tokio::test]
async fn test_bad_credentials_are_validation_errors() {
    let server = spawn_server().await;
    let api = backend(&server.base_url, Arc::new(MemoryStorage::new()));

    let err = api
        .obtain_token("juan", &"wrong".to_string().into())
        .await
        .unwrap_err();
    match err {
        StorefrontError::Api(ApiError::Validation(msg)) => {
            assert_eq!(msg, "No active account found with the given credentials")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_token_is_unauthorized() {
    let server = spawn_server().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, "expired-token").await.unwrap();
    let api = backend(&server.base_url, storage);

    let err = api.current_user().await.unwrap_err();
    assert!(err.is_session_expired());
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_public_listings_are_sent_without_token() {
    let server = spawn_server().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, "expired-token").await.unwrap();
    let api = backend(&server.base_url, storage);

    // "market price" does not parse; the other two survive
    let products = api.list_products().await.unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[0].price, 120.5);
    assert_eq!(products[1].id, 2);
    assert!(products[0].available);
    assert!(!products[1].available);

    assert_eq!(server.recorded.auth_for("/firstapp/products/"), None);
}

#[tokio::test]
async fn test_malformed_reviews_are_skipped() {
    let server = spawn_server().await;
    let api = backend(&server.base_url, Arc::new(MemoryStorage::new()));

    let reviews = api.list_reviews().await.unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].target, ReviewTarget::Food(1));
    assert_eq!(reviews[1].target, ReviewTarget::Shop);
}

#[tokio::test]
async fn test_unparseable_claimed_coupons_are_skipped() {
    let server = spawn_server().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, VALID_TOKEN).await.unwrap();
    let api = backend(&server.base_url, storage);

    let coupons = api.list_claimed_coupons().await.unwrap();
    assert_eq!(coupons.len(), 1);
    assert_eq!(coupons[0].id, 7);
    assert_eq!(coupons[0].code, "GUL7");
}

#[tokio::test]
async fn test_review_submission_is_multipart() {
    let server = spawn_server().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, VALID_TOKEN).await.unwrap();
    let api = backend(&server.base_url, storage);

    let review = NewReview {
        target: ReviewTarget::Food(1),
        rating: 4,
        comment: "Masarap".to_string(),
        image: Some(ImageUpload {
            file_name: "plate.png".to_string(),
            mime_type: ImageMimeType::Png,
            bytes: vec![0x89, b'P', b'N', b'G'],
        }),
    };
    let created = api.create_review(&review).await.unwrap();
    assert_eq!(created.id, 10);
    assert_eq!(created.image.as_deref(), Some("/media/reviews/plate.png"));

    let body = server.recorded.review_body.lock().unwrap().clone().unwrap();
    assert!(body.contains("name=\"rating\""));
    assert!(body.contains("name=\"review_type\""));
    assert!(body.contains("food"));
    assert!(body.contains("filename=\"plate.png\""));
    assert!(body.contains("image/png"));
}

#[tokio::test]
async fn test_field_errors_become_messages() {
    let server = spawn_server().await;
    let api = backend(&server.base_url, Arc::new(MemoryStorage::new()));

    let registration = Registration {
        username: "juan".to_string(),
        email: "juan@example.com".to_string(),
        password: "adobo123".to_string().into(),
        first_name: None,
        middle_name: None,
        last_name: None,
        phone: None,
        address: None,
    };
    let err = api.register(&registration).await.unwrap_err();
    assert_eq!(
        err.user_message(),
        "username: A user with that username already exists."
    );

    let err = api
        .request_password_reset("nobody@example.com")
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "No user with this email.");
    api.request_password_reset("juan@example.com").await.unwrap();
}

#[tokio::test]
async fn test_claim_status_mapping() {
    let server = spawn_server().await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(ACCESS_TOKEN_KEY, VALID_TOKEN).await.unwrap();
    let api = backend(&server.base_url, storage);

    api.claim_coupon(3).await.unwrap();
    assert!(matches!(
        api.claim_coupon(99).await,
        Err(StorefrontError::Api(ApiError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_server_error_without_json_body() {
    let server = spawn_server().await;
    let api = backend(&server.base_url, Arc::new(MemoryStorage::new()));

    match api.list_coupons().await {
        Err(StorefrontError::Api(ApiError::Server(msg))) => {
            assert_eq!(msg, "Internal Server Error")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = backend(&format!("http://{}", addr), Arc::new(MemoryStorage::new()));
    let err = api.list_products().await.unwrap_err();
    assert!(matches!(err, StorefrontError::Api(ApiError::Network(_))));
    assert!(err.user_message().contains("Unable to reach the server"));
}
