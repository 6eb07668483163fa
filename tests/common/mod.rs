#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;

use bloodshare::config::Config;
use bloodshare::database;
use bloodshare::services::notification_service::{
    EmailMessage, Notifier, NotifyError, SmsMessage,
};
use bloodshare::state::AppState;
use bloodshare::web;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Email(EmailMessage),
    Sms(SmsMessage),
}

/// Records every message; addresses listed in `failing` are rejected.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
    pub failing: Vec<String>,
}

impl RecordingNotifier {
    pub fn failing_for(addresses: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub async fn emails_to(&self, to: &str) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|s| matches!(s, Sent::Email(m) if m.to == to))
            .count()
    }

    pub async fn sms_count(&self) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|s| matches!(s, Sent::Sms(_)))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        if self.failing.contains(&message.to) {
            return Err(NotifyError::Upstream {
                channel: "email",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(Sent::Email(message.clone()));
        Ok(())
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError> {
        if self.failing.contains(&message.to) {
            return Err(NotifyError::Upstream {
                channel: "sms",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(Sent::Sms(message.clone()));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn test_app() -> TestApp {
    test_app_with(RecordingNotifier::default()).await
}

pub async fn test_app_with(notifier: RecordingNotifier) -> TestApp {
    let pool = database::connect_in_memory().await.unwrap();
    let config = Config {
        password_iterations: 10,
        ..Config::default()
    };
    let notifier = Arc::new(notifier);
    let state = AppState::new(pool, config, notifier.clone());
    TestApp {
        router: web::build_router(state),
        notifier,
    }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
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

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Registers a user and returns `(token, user_id)`.
    pub async fn register_user(
        &self,
        name: &str,
        role: &str,
        phone: Option<&str>,
    ) -> (String, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "name": name,
                    "email": format!("{name}@example.com"),
                    "phone": phone,
                    "password": "secret123",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Registers a donor user with a profile at `[lon, lat]`; returns `(token, donor_id)`.
    pub async fn register_donor(
        &self,
        name: &str,
        blood_type: &str,
        coordinates: [f64; 2],
        phone: Option<&str>,
    ) -> (String, String) {
        let (token, _) = self.register_user(name, "donor", phone).await;
        let (status, body) = self
            .send(
                Method::POST,
                "/api/donors/register",
                Some(&token),
                Some(json!({
                    "bloodType": blood_type,
                    "location": {
                        "type": "Point",
                        "coordinates": coordinates,
                        "address": "1 Main St",
                        "city": "Amsterdam",
                        "state": "NH",
                        "zipCode": "1012AB",
                    },
                    "medicalInfo": { "medicalConditions": [], "medications": [] }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (token, body["data"]["id"].as_str().unwrap().to_string())
    }
}

/// Amsterdam Centraal area.
pub const HOSPITAL: [f64; 2] = [4.9041, 52.3676];

pub fn blood_request_body(blood_type: &str, units: i64) -> Value {
    let needed_by = (chrono::Utc::now() + chrono::Duration::days(2)).to_rfc3339();
    json!({
        "bloodType": blood_type,
        "units": units,
        "urgencyLevel": "critical",
        "hospital": {
            "name": "OLVG",
            "address": "Oosterpark 9",
            "location": { "type": "Point", "coordinates": HOSPITAL }
        },
        "neededBy": needed_by,
        "notes": "surgery"
    })
}
