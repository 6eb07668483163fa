use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::models::{BloodRequestRow, MatchedDonorRow};

const REQUEST_COLUMNS: &str = r#"
    r.request_id, r.recipient_user_id, r.blood_type, r.units, r.urgency_level,
    r.hospital_name, r.hospital_address, r.hospital_longitude, r.hospital_latitude,
    r.status, r.needed_by, r.notes, r.created_at, r.closed_at
"#;

const SQL_INSERT_REQUEST: &str = r#"
INSERT INTO blood_requests (
  request_id,
  recipient_user_id,
  blood_type,
  units,
  urgency_level,
  hospital_name,
  hospital_address,
  hospital_longitude,
  hospital_latitude,
  status,
  needed_by,
  notes,
  created_at,
  closed_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
"#;

const SQL_INSERT_MATCHED_DONOR: &str = r#"
INSERT INTO matched_donors (
  request_id,
  donor_id,
  status,
  contacted_at,
  position
) VALUES (?1, ?2, 'contacted', ?3, ?4)
"#;

const SQL_MATCHED_DONORS_BASE: &str = r#"
SELECT
    m.request_id,
    m.donor_id,
    m.status,
    m.contacted_at,
    m.response_at,
    m.notes,
    d.blood_type AS donor_blood_type,
    d.longitude AS donor_longitude,
    d.latitude AS donor_latitude,
    u.name AS donor_user_name,
    u.email AS donor_user_email,
    u.phone AS donor_user_phone
FROM matched_donors m
JOIN donors d ON d.donor_id = m.donor_id
JOIN users u ON u.user_id = d.user_id
"#;

const SQL_UPDATE_MATCH_STATUS: &str = r#"
UPDATE matched_donors
SET status = ?4,
    response_at = ?5,
    notes = COALESCE(?6, notes)
WHERE request_id = ?1
  AND donor_id = ?2
  AND status = ?3
"#;

const SQL_COUNT_MATCHES_WITH_STATUS: &str = r#"
SELECT COUNT(*) FROM matched_donors WHERE request_id = ?1 AND status = ?2
"#;

const SQL_CANCEL_OPEN_MATCHES: &str = r#"
UPDATE matched_donors
SET status = 'cancelled',
    response_at = ?2
WHERE request_id = ?1
  AND status IN ('contacted', 'confirmed')
"#;

const SQL_UPDATE_REQUEST_STATUS: &str = r#"
UPDATE blood_requests
SET status = ?2,
    closed_at = ?3
WHERE request_id = ?1
"#;

const SQL_CANCEL_EXPIRED_MATCHES: &str = r#"
UPDATE matched_donors
SET status = 'cancelled',
    response_at = ?1
WHERE status IN ('contacted', 'confirmed')
  AND request_id IN (
    SELECT request_id FROM blood_requests
    WHERE status IN ('pending', 'matched')
      AND needed_by < ?1
  )
"#;

const SQL_CLOSE_EXPIRED: &str = r#"
UPDATE blood_requests
SET status = 'cancelled',
    closed_at = ?1
WHERE status IN ('pending', 'matched')
  AND needed_by < ?1
"#;

pub async fn insert_request(
    conn: &mut SqliteConnection,
    req: &BloodRequestRow,
) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_REQUEST)
        .bind(&req.request_id)
        .bind(&req.recipient_user_id)
        .bind(&req.blood_type)
        .bind(req.units)
        .bind(&req.urgency_level)
        .bind(&req.hospital_name)
        .bind(&req.hospital_address)
        .bind(req.hospital_longitude)
        .bind(req.hospital_latitude)
        .bind(&req.status)
        .bind(req.needed_by)
        .bind(&req.notes)
        .bind(req.created_at)
        .bind(req.closed_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn insert_matched_donor(
    conn: &mut SqliteConnection,
    request_id: &str,
    donor_id: &str,
    contacted_at: DateTime<Utc>,
    position: i64,
) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_MATCHED_DONOR)
        .bind(request_id)
        .bind(donor_id)
        .bind(contacted_at)
        .bind(position)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn load_request(
    pool: &SqlitePool,
    request_id: &str,
) -> sqlx::Result<Option<BloodRequestRow>> {
    let sql = format!(
        "SELECT {} FROM blood_requests r WHERE r.request_id = ?1 LIMIT 1",
        REQUEST_COLUMNS
    );
    sqlx::query_as::<_, BloodRequestRow>(&sql)
        .bind(request_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_requests_for_recipient(
    pool: &SqlitePool,
    recipient_user_id: &str,
) -> sqlx::Result<Vec<BloodRequestRow>> {
    let sql = format!(
        "SELECT {} FROM blood_requests r WHERE r.recipient_user_id = ?1 ORDER BY r.created_at DESC",
        REQUEST_COLUMNS
    );
    sqlx::query_as::<_, BloodRequestRow>(&sql)
        .bind(recipient_user_id)
        .fetch_all(pool)
        .await
}

pub async fn list_requests_for_donor(
    pool: &SqlitePool,
    donor_id: &str,
) -> sqlx::Result<Vec<BloodRequestRow>> {
    let sql = format!(
        r#"
SELECT {}
FROM blood_requests r
JOIN matched_donors m ON m.request_id = r.request_id
WHERE m.donor_id = ?1
ORDER BY r.created_at DESC
"#,
        REQUEST_COLUMNS
    );
    sqlx::query_as::<_, BloodRequestRow>(&sql)
        .bind(donor_id)
        .fetch_all(pool)
        .await
}

pub async fn list_matched_donors(
    pool: &SqlitePool,
    request_id: &str,
) -> sqlx::Result<Vec<MatchedDonorRow>> {
    let sql = format!(
        "{} WHERE m.request_id = ?1 ORDER BY m.position ASC",
        SQL_MATCHED_DONORS_BASE
    );
    sqlx::query_as::<_, MatchedDonorRow>(&sql)
        .bind(request_id)
        .fetch_all(pool)
        .await
}

pub async fn load_matched_donor(
    pool: &SqlitePool,
    request_id: &str,
    donor_id: &str,
) -> sqlx::Result<Option<MatchedDonorRow>> {
    let sql = format!(
        "{} WHERE m.request_id = ?1 AND m.donor_id = ?2 LIMIT 1",
        SQL_MATCHED_DONORS_BASE
    );
    sqlx::query_as::<_, MatchedDonorRow>(&sql)
        .bind(request_id)
        .bind(donor_id)
        .fetch_optional(pool)
        .await
}

/// Compare-and-set on the match status; returns 0 when the row was no longer in `from_status`.
pub async fn update_match_status(
    conn: &mut SqliteConnection,
    request_id: &str,
    donor_id: &str,
    from_status: &str,
    to_status: &str,
    response_at: DateTime<Utc>,
    notes: Option<&str>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPDATE_MATCH_STATUS)
        .bind(request_id)
        .bind(donor_id)
        .bind(from_status)
        .bind(to_status)
        .bind(response_at)
        .bind(notes)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count_matches_with_status(
    conn: &mut SqliteConnection,
    request_id: &str,
    status: &str,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(SQL_COUNT_MATCHES_WITH_STATUS)
        .bind(request_id)
        .bind(status)
        .fetch_one(conn)
        .await
}

pub async fn cancel_open_matches(
    conn: &mut SqliteConnection,
    request_id: &str,
    response_at: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_CANCEL_OPEN_MATCHES)
        .bind(request_id)
        .bind(response_at)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

pub async fn update_request_status(
    conn: &mut SqliteConnection,
    request_id: &str,
    status: &str,
    closed_at: Option<DateTime<Utc>>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPDATE_REQUEST_STATUS)
        .bind(request_id)
        .bind(status)
        .bind(closed_at)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

/// Cancels open requests whose `needed_by` has passed, along with their open matches.
pub async fn close_expired_requests(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> sqlx::Result<u64> {
    sqlx::query(SQL_CANCEL_EXPIRED_MATCHES)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    let res = sqlx::query(SQL_CLOSE_EXPIRED)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}
