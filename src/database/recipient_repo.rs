use sqlx::SqlitePool;

use crate::models::RecipientRow;

const SQL_INSERT_RECIPIENT: &str = r#"
INSERT INTO recipients (
  recipient_id,
  user_id,
  blood_type,
  longitude,
  latitude,
  address,
  city,
  state,
  zip_code,
  medical_conditions,
  medications,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
"#;

pub const SQL_LOAD_RECIPIENT_BY_USER: &str = r#"
SELECT
    recipient_id,
    user_id,
    blood_type,
    longitude,
    latitude,
    address,
    city,
    state,
    zip_code,
    medical_conditions,
    medications,
    created_at
FROM recipients
WHERE user_id = ?1
LIMIT 1
"#;

const SQL_UPDATE_RECIPIENT: &str = r#"
UPDATE recipients SET
  blood_type = ?2,
  longitude = ?3,
  latitude = ?4,
  address = ?5,
  city = ?6,
  state = ?7,
  zip_code = ?8,
  medical_conditions = ?9,
  medications = ?10
WHERE recipient_id = ?1
"#;

pub async fn insert_recipient(pool: &SqlitePool, recipient: &RecipientRow) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_RECIPIENT)
        .bind(&recipient.recipient_id)
        .bind(&recipient.user_id)
        .bind(&recipient.blood_type)
        .bind(recipient.longitude)
        .bind(recipient.latitude)
        .bind(&recipient.address)
        .bind(&recipient.city)
        .bind(&recipient.state)
        .bind(&recipient.zip_code)
        .bind(&recipient.medical_conditions)
        .bind(&recipient.medications)
        .bind(recipient.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn load_recipient_by_user(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Option<RecipientRow>> {
    sqlx::query_as::<_, RecipientRow>(SQL_LOAD_RECIPIENT_BY_USER)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn update_recipient(pool: &SqlitePool, recipient: &RecipientRow) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPDATE_RECIPIENT)
        .bind(&recipient.recipient_id)
        .bind(&recipient.blood_type)
        .bind(recipient.longitude)
        .bind(recipient.latitude)
        .bind(&recipient.address)
        .bind(&recipient.city)
        .bind(&recipient.state)
        .bind(&recipient.zip_code)
        .bind(&recipient.medical_conditions)
        .bind(&recipient.medications)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
