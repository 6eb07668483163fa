use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::UsersRow;

const SQL_INSERT_USER: &str = r#"
INSERT INTO users (
  user_id,
  name,
  email,
  phone,
  password_hash,
  role,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#;

pub const SQL_LOAD_USER_BY_ID: &str = r#"
SELECT user_id, name, email, phone, password_hash, role, created_at
FROM users
WHERE user_id = ?1
LIMIT 1
"#;

pub const SQL_LOAD_USER_BY_EMAIL: &str = r#"
SELECT user_id, name, email, phone, password_hash, role, created_at
FROM users
WHERE email = ?1
LIMIT 1
"#;

pub struct NewUser<'a> {
    pub user_id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_user(pool: &SqlitePool, user: NewUser<'_>) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_USER)
        .bind(user.user_id)
        .bind(user.name)
        .bind(user.email)
        .bind(user.phone)
        .bind(user.password_hash)
        .bind(user.role)
        .bind(user.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn load_user(pool: &SqlitePool, user_id: &str) -> sqlx::Result<Option<UsersRow>> {
    sqlx::query_as::<_, UsersRow>(SQL_LOAD_USER_BY_ID)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn load_user_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<Option<UsersRow>> {
    sqlx::query_as::<_, UsersRow>(SQL_LOAD_USER_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .await
}
