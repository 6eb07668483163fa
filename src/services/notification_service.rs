use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{EmailConfig, SmsConfig};
use crate::models::BloodType;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("{channel} channel is not configured")]
    NotConfigured { channel: &'static str },

    #[error("{channel} upstream unreachable: {message}")]
    Connect {
        channel: &'static str,
        message: String,
    },

    #[error("{channel} upstream returned {status}: {body}")]
    Upstream {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("email template failed: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError>;

    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError>;
}

/// What a donor is told about a new blood request.
#[derive(Debug, Clone)]
pub struct DonationRequestNotice<'a> {
    pub donor_name: &'a str,
    pub donor_blood_type: BloodType,
    pub blood_type: BloodType,
    pub hospital_name: &'a str,
    pub hospital_address: &'a str,
    pub units: i64,
    pub needed_by: DateTime<Utc>,
}

#[derive(Template)]
#[template(path = "donation_request_email.html")]
struct DonationRequestEmail<'a> {
    donor_name: &'a str,
    donor_blood_type: BloodType,
    hospital_name: &'a str,
    hospital_address: &'a str,
    units: i64,
    needed_by: String,
}

impl DonationRequestNotice<'_> {
    pub fn email(&self, to: &str) -> Result<EmailMessage, NotifyError> {
        let html = DonationRequestEmail {
            donor_name: self.donor_name,
            donor_blood_type: self.donor_blood_type,
            hospital_name: self.hospital_name,
            hospital_address: self.hospital_address,
            units: self.units,
            needed_by: self.needed_by.format("%Y-%m-%d").to_string(),
        }
        .render()?;
        Ok(EmailMessage {
            to: to.to_string(),
            subject: "Blood Donation Request".to_string(),
            html,
        })
    }

    pub fn sms(&self, to: &str) -> SmsMessage {
        SmsMessage {
            to: to.to_string(),
            body: format!(
                "Blood donation request: {} needs {} units of {} blood by {}. \
                 Please contact us if available.",
                self.hospital_name,
                self.units,
                self.blood_type,
                self.needed_by.format("%Y-%m-%d")
            ),
        }
    }
}

/// Sends email through an HTTP mail relay and SMS through the Twilio REST API.
pub struct HttpNotifier {
    client: reqwest::Client,
    email: EmailConfig,
    sms: SmsConfig,
}

#[derive(Serialize)]
struct MailRelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl HttpNotifier {
    /// `timeout` bounds each provider call, connect through response body.
    pub fn new(
        email: EmailConfig,
        sms: SmsConfig,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Self::with_builder(reqwest::Client::builder(), email, sms, timeout)
    }

    fn with_builder(
        builder: reqwest::ClientBuilder,
        email: EmailConfig,
        sms: SmsConfig,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: builder.timeout(timeout).build()?,
            email,
            sms,
        })
    }
}

async fn check_status(channel: &'static str, resp: reqwest::Response) -> Result<(), NotifyError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(NotifyError::Upstream {
        channel,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Notifier for HttpNotifier {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let (Some(url), Some(from)) = (self.email.api_url.as_deref(), self.email.from.as_deref())
        else {
            return Err(NotifyError::NotConfigured { channel: "email" });
        };

        let mut req = self.client.post(url).json(&MailRelayRequest {
            from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        });
        if let Some(key) = self.email.api_key.as_deref() {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| NotifyError::Connect {
            channel: "email",
            message: e.to_string(),
        })?;
        check_status("email", resp).await
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError> {
        let (Some(sid), Some(token), Some(from)) = (
            self.sms.account_sid.as_deref(),
            self.sms.auth_token.as_deref(),
            self.sms.from.as_deref(),
        ) else {
            return Err(NotifyError::NotConfigured { channel: "sms" });
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.sms.api_url.trim_end_matches('/'),
            sid
        );
        let resp = self
            .client
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&[
                ("To", message.to.as_str()),
                ("From", from),
                ("Body", message.body.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NotifyError::Connect {
                channel: "sms",
                message: e.to_string(),
            })?;
        check_status("sms", resp).await
    }
}

/// Fallback when no provider is configured: messages are only logged.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        info!(to = %message.to, subject = %message.subject, "email notification (log only)");
        Ok(())
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError> {
        info!(to = %message.to, body = %message.body, "sms notification (log only)");
        Ok(())
    }
}

/// Result of notifying one donor over every channel they can be reached on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub attempted: usize,
    pub delivered: usize,
}

impl DeliveryOutcome {
    pub fn reached(&self) -> bool {
        self.delivered > 0
    }
}

/// Email always, SMS only when a phone number is on file. Failures are logged, not returned.
pub async fn notify_donor(
    notifier: &dyn Notifier,
    notice: &DonationRequestNotice<'_>,
    donor_id: &str,
    email: &str,
    phone: Option<&str>,
) -> DeliveryOutcome {
    let mut outcome = DeliveryOutcome::default();

    outcome.attempted += 1;
    let sent = match notice.email(email) {
        Ok(message) => notifier.send_email(&message).await,
        Err(e) => Err(e),
    };
    match sent {
        Ok(()) => outcome.delivered += 1,
        Err(e) => {
            warn!(donor_id = %donor_id, channel = "email", error = %e, "notification failed")
        }
    }

    if let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) {
        outcome.attempted += 1;
        match notifier.send_sms(&notice.sms(phone)).await {
            Ok(()) => outcome.delivered += 1,
            Err(e) => {
                warn!(donor_id = %donor_id, channel = "sms", error = %e, "notification failed")
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::{header, HeaderMap, StatusCode, Uri};
    use axum::Router;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::TimeZone;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    fn notice() -> DonationRequestNotice<'static> {
        DonationRequestNotice {
            donor_name: "John <Doe>",
            donor_blood_type: BloodType::APositive,
            blood_type: BloodType::APositive,
            hospital_name: "City Hospital",
            hospital_address: "1 Main St",
            units: 3,
            needed_by: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    struct FailingEmail;

    #[async_trait]
    impl Notifier for FailingEmail {
        fn name(&self) -> &'static str {
            "failing-email"
        }

        async fn send_email(&self, _message: &EmailMessage) -> Result<(), NotifyError> {
            Err(NotifyError::NotConfigured { channel: "email" })
        }

        async fn send_sms(&self, _message: &SmsMessage) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    #[test]
    fn sms_text_names_hospital_units_and_date() {
        let sms = notice().sms("+15550100");
        assert_eq!(sms.to, "+15550100");
        assert_eq!(
            sms.body,
            "Blood donation request: City Hospital needs 3 units of A+ blood by 2024-05-01. \
             Please contact us if available."
        );
    }

    #[test]
    fn email_is_escaped_html() {
        let mut notice = notice();
        notice.hospital_name = "St. Mary & \"Sons\"";
        let email = notice.email("john@example.com").unwrap();
        assert_eq!(email.to, "john@example.com");
        assert_eq!(email.subject, "Blood Donation Request");
        assert!(email.html.starts_with("<h2>Blood Donation Request</h2>"));
        assert!(email.html.contains("Dear John &lt;Doe&gt;,"));
        assert!(email.html.contains("Hospital: St. Mary &amp; &quot;Sons&quot;"));
        assert!(!email.html.contains("<Doe>"));
        assert!(email.html.contains("matching your blood type (A+)"));
        assert!(email.html.contains("Units needed: 3"));
        assert!(email.html.contains("Needed by: 2024-05-01"));
    }

    #[tokio::test]
    async fn log_notifier_reaches_both_channels() {
        let outcome = notify_donor(
            &LogNotifier,
            &notice(),
            "donor-1",
            "john@example.com",
            Some("+15550100"),
        )
        .await;
        assert_eq!(
            outcome,
            DeliveryOutcome {
                attempted: 2,
                delivered: 2
            }
        );
    }

    #[tokio::test]
    async fn sms_skipped_without_phone() {
        let outcome =
            notify_donor(&LogNotifier, &notice(), "donor-1", "j@example.com", Some("  ")).await;
        assert_eq!(outcome.attempted, 1);
    }

    #[tokio::test]
    async fn partial_failure_still_reaches_donor() {
        let outcome =
            notify_donor(&FailingEmail, &notice(), "d", "j@example.com", Some("+1")).await;
        assert_eq!(outcome.delivered, 1);
        assert!(outcome.reached());

        let unreachable = notify_donor(&FailingEmail, &notice(), "d", "j@example.com", None).await;
        assert!(!unreachable.reached());
    }

    #[tokio::test]
    async fn unconfigured_http_notifier_reports_channel() {
        let notifier = HttpNotifier::new(
            EmailConfig::default(),
            SmsConfig::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = notifier
            .send_sms(&SmsMessage {
                to: "+1".into(),
                body: "hi".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured { channel: "sms" }));
    }

    #[derive(Debug, Clone)]
    struct Captured {
        path: String,
        authorization: Option<String>,
        content_type: Option<String>,
        body: String,
    }

    type Seen = Arc<Mutex<Vec<Captured>>>;

    /// Local provider stand-in answering every request with `status` after `delay`.
    async fn provider(status: StatusCode, delay: Duration) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let recorder = seen.clone();
        let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap, body: String| {
            let recorder = recorder.clone();
            async move {
                let get = |name: header::HeaderName| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                recorder.lock().await.push(Captured {
                    path: uri.path().to_string(),
                    authorization: get(header::AUTHORIZATION),
                    content_type: get(header::CONTENT_TYPE),
                    body,
                });
                tokio::time::sleep(delay).await;
                (status, "provider says no")
            }
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), seen)
    }

    fn local_notifier(base: &str, timeout: Duration) -> HttpNotifier {
        HttpNotifier::with_builder(
            reqwest::Client::builder().no_proxy(),
            EmailConfig {
                api_url: Some(format!("{base}/send")),
                api_key: Some("relay-key".into()),
                from: Some("noreply@bloodshare.test".into()),
            },
            SmsConfig {
                api_url: format!("{base}/"),
                account_sid: Some("AC123".into()),
                auth_token: Some("twilio-token".into()),
                from: Some("+15550199".into()),
            },
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sms_posts_twilio_form_with_basic_auth() {
        let (base, seen) = provider(StatusCode::CREATED, Duration::ZERO).await;
        let notifier = local_notifier(&base, Duration::from_secs(5));

        notifier.send_sms(&notice().sms("+15550100")).await.unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        let req = &seen[0];
        assert_eq!(req.path, "/2010-04-01/Accounts/AC123/Messages.json");
        let expected_auth = format!("Basic {}", STANDARD.encode("AC123:twilio-token"));
        assert_eq!(req.authorization.as_deref(), Some(expected_auth.as_str()));
        assert_eq!(
            req.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert!(req.body.contains("To=%2B15550100"));
        assert!(req.body.contains("From=%2B15550199"));
        assert!(req.body.contains("Body=Blood+donation+request%3A+City+Hospital"));
    }

    #[tokio::test]
    async fn email_posts_json_with_bearer_key() {
        let (base, seen) = provider(StatusCode::OK, Duration::ZERO).await;
        let notifier = local_notifier(&base, Duration::from_secs(5));

        let message = notice().email("john@example.com").unwrap();
        notifier.send_email(&message).await.unwrap();

        let seen = seen.lock().await;
        let req = &seen[0];
        assert_eq!(req.path, "/send");
        assert_eq!(req.authorization.as_deref(), Some("Bearer relay-key"));
        assert_eq!(req.content_type.as_deref(), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(body["from"], "noreply@bloodshare.test");
        assert_eq!(body["to"], "john@example.com");
        assert_eq!(body["subject"], "Blood Donation Request");
        assert_eq!(body["html"], message.html.as_str());
    }

    #[tokio::test]
    async fn email_without_key_sends_no_authorization() {
        let (base, seen) = provider(StatusCode::OK, Duration::ZERO).await;
        let mut notifier = local_notifier(&base, Duration::from_secs(5));
        notifier.email.api_key = None;

        let message = notice().email("john@example.com").unwrap();
        notifier.send_email(&message).await.unwrap();
        assert_eq!(seen.lock().await[0].authorization, None);
    }

    #[tokio::test]
    async fn provider_errors_map_to_upstream() {
        let (base, _) = provider(StatusCode::SERVICE_UNAVAILABLE, Duration::ZERO).await;
        let notifier = local_notifier(&base, Duration::from_secs(5));
        let message = notice().email("john@example.com").unwrap();
        let err = notifier.send_email(&message).await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Upstream { channel: "email", status: 503, ref body }
                if body == "provider says no"
        ));

        let (base, _) = provider(StatusCode::BAD_REQUEST, Duration::ZERO).await;
        let notifier = local_notifier(&base, Duration::from_secs(5));
        let err = notifier.send_sms(&notice().sms("+1")).await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Upstream { channel: "sms", status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let (base, _) = provider(StatusCode::OK, Duration::from_secs(5)).await;
        let notifier = local_notifier(&base, Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = notifier.send_sms(&notice().sms("+1")).await.unwrap_err();
        assert!(matches!(err, NotifyError::Connect { channel: "sms", .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
