use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use carecrew::{app, config::Config, db, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const PUBLIC_URL: &str = "http://carecrew.test";
const BOUNDARY: &str = "carecrew-boundary";

struct TestApp {
    _blobs: TempDir,
    router: Router,
}

fn test_app() -> TestApp {
    let blobs = TempDir::new().unwrap();
    let config = Config {
        database_path: ":memory:".into(),
        blob_root: blobs.path().to_path_buf(),
        public_url: PUBLIC_URL.into(),
        signing_secret: "test-secret".into(),
        server_host: "127.0.0.1".into(),
        server_port: 0,
    };
    let conn = db::open_in_memory().unwrap();
    TestApp {
        _blobs: blobs,
        router: app(AppState::new(conn, &config).unwrap()),
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let (status, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn login(&self, phone: &str) -> (String, Value) {
        let (status, body) = self
            .json(Method::POST, "/login", None, Some(json!({ "phone": phone })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (body["token"].as_str().unwrap().to_string(), body["user"].clone())
    }

    async fn upload(&self, token: &str, file_name: &str, content_type: &str, data: &[u8]) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/prescriptions")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

#[tokio::test]
async fn login_normalizes_phone_and_reuses_user() {
    let app = test_app();

    let (first_token, first_user) = app.login("+1 234-567-8900").await;
    assert_eq!(first_user["phone"], "+12345678900");

    let (_, second_user) = app.login("12345678900").await;
    assert_eq!(second_user["id"], first_user["id"]);

    let (status, me) = app.json(Method::GET, "/me", Some(&first_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], first_user["id"]);
}

#[tokio::test]
async fn bad_phone_is_rejected() {
    let app = test_app();
    let (status, body) = app
        .json(Method::POST, "/login", None, Some(json!({ "phone": "12 34" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please enter a valid phone number (10-15 digits).");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = test_app();
    let (token, _) = app.login("9876543210").await;

    let (status, _) = app.json(Method::POST, "/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.json(Method::GET, "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requests_without_session_are_unauthorized() {
    let app = test_app();
    for uri in ["/me", "/medicines", "/appointments", "/prescriptions"] {
        let (status, _) = app.json(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }
    let (status, _) = app.json(Method::GET, "/medicines", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn medicine_lifecycle() {
    let app = test_app();
    let (token, _) = app.login("+15550001111").await;
    // Far enough out that neither flag can flip during the test.
    let expiry = chrono::Utc::now().date_naive() + chrono::Days::new(120);

    let (status, created) = app
        .json(
            Method::POST,
            "/medicines",
            Some(&token),
            Some(json!({ "name": " Metformin ", "strength": "500mg", "expiry_date": expiry })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Metformin");
    assert_eq!(created["expired"], false);
    assert_eq!(created["expiring_soon"], false);

    let (status, body) = app
        .json(
            Method::POST,
            "/medicines",
            Some(&token),
            Some(json!({ "name": "Metformin", "strength": "", "expiry_date": expiry })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Strength is required and must be under 50 characters.");

    let (status, list) = app.json(Method::GET, "/medicines", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    // Another user cannot see or delete it.
    let (other, _) = app.login("+15550002222").await;
    let (_, others) = app.json(Method::GET, "/medicines", Some(&other), None).await;
    assert!(others.as_array().unwrap().is_empty());
    let uri = format!("/medicines/{}", created["id"].as_str().unwrap());
    let (status, _) = app.json(Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.json(Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, list) = app.json(Method::GET, "/medicines", Some(&token), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn appointments_are_split_into_upcoming_and_past() {
    let app = test_app();
    let (token, _) = app.login("+15550003333").await;
    let today = chrono::Utc::now().date_naive();

    for (doctor, date) in [
        ("Dr. Past", today - chrono::Days::new(3)),
        ("Dr. Today", today),
        ("Dr. Soon", today + chrono::Days::new(5)),
    ] {
        let (status, _) = app
            .json(
                Method::POST,
                "/appointments",
                Some(&token),
                Some(json!({ "doctor_name": doctor, "appointment_date": date })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.json(Method::GET, "/appointments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let find = |group: &str, doctor: &str| {
        body[group]
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["doctor_name"] == doctor)
            .cloned()
    };
    assert!(find("past", "Dr. Past").is_some());
    assert_eq!(find("upcoming", "Dr. Soon").unwrap()["upcoming_soon"], true);

    // The handler reads the clock on its own; skip the same-day checks if
    // the date rolled over in between.
    if chrono::Utc::now().date_naive() == today {
        assert_eq!(body["upcoming"][0]["doctor_name"], "Dr. Today");
        assert_eq!(body["upcoming"][0]["today"], true);
        assert_eq!(body["upcoming"][1]["doctor_name"], "Dr. Soon");
    }
}

#[tokio::test]
async fn malformed_ids_and_links_get_json_errors() {
    let app = test_app();
    let (token, _) = app.login("+15550007777").await;

    for uri in [
        "/medicines/not-a-uuid",
        "/appointments/123",
        "/prescriptions/xyz",
    ] {
        let (status, body) = app.json(Method::DELETE, uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "Invalid record id");
    }
    let (status, body) = app
        .json(Method::GET, "/prescriptions/xyz/download", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid record id");

    for uri in [
        "/blobs/owner/scan.pdf",
        "/blobs/owner/scan.pdf?expires=soon&signature=abc",
        "/blobs/owner/scan.pdf?expires=1",
    ] {
        let (status, body) = app.json(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body["error"], "Invalid or expired link");
    }
}

#[tokio::test]
async fn oversized_pdf_is_rejected() {
    let app = test_app();
    let (token, _) = app.login("+15550004444").await;
    let big = vec![b'%'; 12 * 1024 * 1024];

    let (status, body) = app.upload(&token, "big.pdf", "application/pdf", &big).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File too large. Please upload a file smaller than 10MB.");

    let (_, list) = app.json(Method::GET, "/prescriptions", Some(&token), None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn disallowed_type_is_rejected() {
    let app = test_app();
    let (token, _) = app.login("+15550005555").await;
    let (status, _) = app.upload(&token, "notes.txt", "text/plain", b"hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn prescription_upload_preview_download_delete() {
    let app = test_app();
    let (token, user) = app.login("+15550006666").await;

    let (status, older) = app.upload(&token, "old.pdf", "application/pdf", b"%PDF-1.4").await;
    assert_eq!(status, StatusCode::CREATED);

    let png: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    let (status, record) = app.upload(&token, "scan.png", "image/png", &png).await;
    assert_eq!(status, StatusCode::CREATED, "{record}");
    assert_eq!(record["file_name"], "scan.png");
    assert_eq!(record["file_size"], png.len());
    assert!(record["file_path"]
        .as_str()
        .unwrap()
        .starts_with(user["id"].as_str().unwrap()));

    // Newest first.
    let (_, list) = app.json(Method::GET, "/prescriptions", Some(&token), None).await;
    let ids: Vec<_> = list.as_array().unwrap().iter().map(|p| p["id"].clone()).collect();
    assert_eq!(ids, vec![record["id"].clone(), older["id"].clone()]);

    let id = record["id"].as_str().unwrap();

    let (status, preview) = app
        .json(Method::GET, &format!("/prescriptions/{id}/preview"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["file_name"], "scan.png");
    assert_eq!(preview["expires_in"], 300);

    // The signed link works without a session.
    let link = preview["url"].as_str().unwrap().strip_prefix(PUBLIC_URL).unwrap();
    let (status, bytes) = app
        .send(Request::builder().uri(link).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, png);

    // Tampering with the link is refused.
    let tampered = link.replace("signature=", "signature=0");
    let (status, _) = app
        .send(Request::builder().uri(tampered).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let download = Request::builder()
        .uri(format!("/prescriptions/{id}/download"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(download).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"scan.png\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), png.as_slice());

    // Other users cannot reach it.
    let (other, _) = app.login("+15550007777").await;
    let (status, _) = app
        .json(Method::GET, &format!("/prescriptions/{id}/preview"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .json(Method::DELETE, &format!("/prescriptions/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(Request::builder().uri(link).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = app.json(Method::GET, "/prescriptions", Some(&token), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}
