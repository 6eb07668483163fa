use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::database::user_repo;
use crate::error::{AppError, Result};
use crate::models::{Role, UsersRow};

type HmacSha256 = Hmac<Sha256>;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Contact details embedded in donor, recipient and match views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

impl From<&UsersRow> for UserSummary {
    fn from(row: &UsersRow) -> Self {
        Self {
            name: row.name.clone(),
            email: row.email.clone(),
            phone: row.phone.clone(),
        }
    }
}

impl UserView {
    pub fn from_row(row: UsersRow) -> Result<Self> {
        Ok(Self {
            role: row.role.parse()?,
            id: row.user_id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            created_at: row.created_at,
        })
    }
}

pub async fn register(
    pool: &SqlitePool,
    config: &Config,
    input: RegisterInput,
) -> Result<AuthSession> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Please provide your name"));
    }
    let email = normalize_email(&input.email)?;
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let role: Role = input
        .role
        .parse()
        .map_err(|_| AppError::bad_request("Role must be 'donor' or 'recipient'"))?;
    let phone = input
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    if user_repo::load_user_by_email(pool, &email).await?.is_some() {
        return Err(AppError::bad_request("User already exists"));
    }

    let user_id = Uuid::new_v4().to_string();
    let password_hash = spawn_hash_password(input.password, config.password_iterations).await?;
    let created_at = Utc::now();

    user_repo::insert_user(
        pool,
        user_repo::NewUser {
            user_id: &user_id,
            name,
            email: &email,
            phone,
            password_hash: &password_hash,
            role: role.as_str(),
            created_at,
        },
    )
    .await
    .map_err(|e| AppError::unique_violation(e, "User already exists"))?;

    info!(user_id = %user_id, role = %role, "user registered");

    let user = UserView {
        id: user_id,
        name: name.to_string(),
        email,
        phone: phone.map(str::to_string),
        role,
        created_at,
    };
    let token = issue_token(config, &user.id, role, Utc::now())?;
    Ok(AuthSession { token, user })
}

pub async fn login(pool: &SqlitePool, config: &Config, input: LoginInput) -> Result<AuthSession> {
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let email = normalize_email(&input.email).map_err(|_| invalid())?;
    let row = user_repo::load_user_by_email(pool, &email)
        .await?
        .ok_or_else(invalid)?;

    if !spawn_verify_password(input.password, row.password_hash.clone()).await? {
        return Err(invalid());
    }

    let user = UserView::from_row(row)?;
    let token = issue_token(config, &user.id, user.role, Utc::now())?;
    info!(user_id = %user.id, "user logged in");
    Ok(AuthSession { token, user })
}

pub async fn load_current_user(pool: &SqlitePool, user_id: &str) -> Result<UserView> {
    let row = user_repo::load_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    UserView::from_row(row)
}

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(AppError::bad_request("Please provide a valid email"));
    }
    Ok(email)
}

/// PBKDF2-HMAC-SHA256 with a single 32-byte output block.
fn pbkdf2_block(password: &[u8], salt: &[u8], iterations: u32) -> Option<[u8; 32]> {
    let mac = HmacSha256::new_from_slice(password).ok()?;

    let mut first = mac.clone();
    first.update(salt);
    first.update(&1u32.to_be_bytes());
    let mut u = [0u8; 32];
    u.copy_from_slice(&first.finalize().into_bytes());
    let mut out = u;

    for _ in 1..iterations {
        let mut next = mac.clone();
        next.update(&u);
        u.copy_from_slice(&next.finalize().into_bytes());
        for (o, b) in out.iter_mut().zip(u.iter()) {
            *o ^= b;
        }
    }
    Some(out)
}

/// `pbkdf2-sha256$<iterations>$<salt>$<hash>`, base64url without padding.
pub fn hash_password(password: &str, iterations: u32) -> Result<String> {
    let iterations = iterations.max(1);
    let salt = Uuid::new_v4();
    let hash = pbkdf2_block(password.as_bytes(), salt.as_bytes(), iterations)
        .ok_or_else(|| AppError::Internal("password hashing failed".to_string()))?;
    Ok(format!(
        "{HASH_SCHEME}${iterations}${}${}",
        general_purpose::URL_SAFE_NO_PAD.encode(salt.as_bytes()),
        general_purpose::URL_SAFE_NO_PAD.encode(hash)
    ))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (
        general_purpose::URL_SAFE_NO_PAD.decode(salt),
        general_purpose::URL_SAFE_NO_PAD.decode(hash),
    ) else {
        return false;
    };

    pbkdf2_block(password.as_bytes(), &salt, iterations.max(1))
        .is_some_and(|actual| constant_time_eq(&actual, &expected))
}

/// Runs [`hash_password`] on the blocking pool; PBKDF2 must not stall a runtime worker.
pub async fn spawn_hash_password(password: String, iterations: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))?
}

pub async fn spawn_verify_password(password: String, stored: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn signer(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("token key rejected: {e}")))
}

/// HS256 JWT carrying the user id, role and expiry.
pub fn issue_token(
    config: &Config,
    user_id: &str,
    role: Role,
    now: DateTime<Utc>,
) -> Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        exp: (now + Duration::hours(config.token_ttl_hours)).timestamp(),
    };
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::to_vec(&claims)
        .map_err(|e| AppError::Internal(format!("token encode failed: {e}")))?;
    let signing_input = format!("{}.{}", header, general_purpose::URL_SAFE_NO_PAD.encode(payload));

    let mut mac = signer(&config.token_secret)?;
    mac.update(signing_input.as_bytes());
    let signature = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Checks signature and expiry; `None` for anything that should be treated as unauthenticated.
pub fn verify_token(secret: &str, token: &str, now: DateTime<Utc>) -> Option<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let signature = general_purpose::URL_SAFE_NO_PAD.decode(parts[2]).ok()?;
    let mut mac = signer(secret).ok()?;
    mac.update(parts[0].as_bytes());
    mac.update(b".");
    mac.update(parts[1].as_bytes());
    mac.verify_slice(&signature).ok()?;

    let payload_bytes = general_purpose::URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims = serde_json::from_slice::<Claims>(&payload_bytes).ok()?;
    if claims.exp <= now.timestamp() {
        return None;
    }
    Some(claims)
}
