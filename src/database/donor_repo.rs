use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteArguments, Arguments, SqliteConnection, SqlitePool};

use crate::models::{DonationRow, DonorContactRow, DonorRow};

const DONOR_COLUMNS: &str = r#"
    d.donor_id, d.user_id, d.blood_type, d.longitude, d.latitude,
    d.address, d.city, d.state, d.zip_code, d.last_donated,
    d.medical_conditions, d.medications, d.is_eligible, d.availability, d.created_at
"#;

const SQL_INSERT_DONOR: &str = r#"
INSERT INTO donors (
  donor_id,
  user_id,
  blood_type,
  longitude,
  latitude,
  address,
  city,
  state,
  zip_code,
  last_donated,
  medical_conditions,
  medications,
  is_eligible,
  availability,
  created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
"#;

const SQL_UPDATE_DONOR: &str = r#"
UPDATE donors SET
  blood_type = ?2,
  longitude = ?3,
  latitude = ?4,
  address = ?5,
  city = ?6,
  state = ?7,
  zip_code = ?8,
  last_donated = ?9,
  medical_conditions = ?10,
  medications = ?11,
  is_eligible = ?12,
  availability = ?13
WHERE donor_id = ?1
"#;

const SQL_UPDATE_AVAILABILITY: &str = r#"
UPDATE donors SET availability = ?2 WHERE donor_id = ?1
"#;

const SQL_UPDATE_LAST_DONATED: &str = r#"
UPDATE donors SET last_donated = ?2 WHERE donor_id = ?1
"#;

const SQL_INSERT_DONATION: &str = r#"
INSERT INTO donor_donations (
  donation_id,
  donor_id,
  donated_at,
  recipient_user_id,
  hospital,
  notes
) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const SQL_LIST_DONATIONS: &str = r#"
SELECT donation_id, donor_id, donated_at, recipient_user_id, hospital, notes
FROM donor_donations
WHERE donor_id = ?1
ORDER BY donated_at DESC
"#;

fn select_donor_by(column: &str) -> String {
    format!(
        "SELECT {} FROM donors d WHERE d.{} = ?1 LIMIT 1",
        DONOR_COLUMNS, column
    )
}

pub async fn insert_donor(pool: &SqlitePool, donor: &DonorRow) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_DONOR)
        .bind(&donor.donor_id)
        .bind(&donor.user_id)
        .bind(&donor.blood_type)
        .bind(donor.longitude)
        .bind(donor.latitude)
        .bind(&donor.address)
        .bind(&donor.city)
        .bind(&donor.state)
        .bind(&donor.zip_code)
        .bind(donor.last_donated)
        .bind(&donor.medical_conditions)
        .bind(&donor.medications)
        .bind(donor.is_eligible)
        .bind(donor.availability)
        .bind(donor.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn load_donor_by_user(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Option<DonorRow>> {
    sqlx::query_as::<_, DonorRow>(&select_donor_by("user_id"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn load_donor(pool: &SqlitePool, donor_id: &str) -> sqlx::Result<Option<DonorRow>> {
    sqlx::query_as::<_, DonorRow>(&select_donor_by("donor_id"))
        .bind(donor_id)
        .fetch_optional(pool)
        .await
}

pub async fn update_donor(pool: &SqlitePool, donor: &DonorRow) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPDATE_DONOR)
        .bind(&donor.donor_id)
        .bind(&donor.blood_type)
        .bind(donor.longitude)
        .bind(donor.latitude)
        .bind(&donor.address)
        .bind(&donor.city)
        .bind(&donor.state)
        .bind(&donor.zip_code)
        .bind(donor.last_donated)
        .bind(&donor.medical_conditions)
        .bind(&donor.medications)
        .bind(donor.is_eligible)
        .bind(donor.availability)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn update_availability(
    pool: &SqlitePool,
    donor_id: &str,
    availability: bool,
) -> sqlx::Result<u64> {
    let res = sqlx::query(SQL_UPDATE_AVAILABILITY)
        .bind(donor_id)
        .bind(availability)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Available, eligible donors inside the bounding box `(min_lat, max_lat, min_lon, max_lon)`.
pub async fn load_match_candidates(
    pool: &SqlitePool,
    bbox: (f64, f64, f64, f64),
    blood_type: Option<&str>,
) -> sqlx::Result<Vec<DonorContactRow>> {
    let mut sql = format!(
        r#"
SELECT {},
    u.name AS user_name,
    u.email AS user_email,
    u.phone AS user_phone
FROM donors d
JOIN users u ON u.user_id = d.user_id
WHERE d.availability = 1
  AND d.is_eligible = 1
"#,
        DONOR_COLUMNS
    );
    let mut args = SqliteArguments::default();

    let (min_lat, max_lat, min_lon, max_lon) = bbox;
    sql.push_str(" AND d.latitude BETWEEN ? AND ? AND d.longitude BETWEEN ? AND ?");
    args.add(min_lat);
    args.add(max_lat);
    args.add(min_lon);
    args.add(max_lon);

    if let Some(blood_type) = blood_type {
        sql.push_str(" AND d.blood_type = ?");
        args.add(blood_type.to_string());
    }

    sqlx::query_as_with::<_, DonorContactRow, _>(&sql, args)
        .fetch_all(pool)
        .await
}

pub struct NewDonation<'a> {
    pub donation_id: &'a str,
    pub donor_id: &'a str,
    pub donated_at: DateTime<Utc>,
    pub recipient_user_id: Option<&'a str>,
    pub hospital: Option<&'a str>,
    pub notes: Option<&'a str>,
}

pub async fn insert_donation(
    conn: &mut SqliteConnection,
    donation: NewDonation<'_>,
) -> sqlx::Result<()> {
    sqlx::query(SQL_INSERT_DONATION)
        .bind(donation.donation_id)
        .bind(donation.donor_id)
        .bind(donation.donated_at)
        .bind(donation.recipient_user_id)
        .bind(donation.hospital)
        .bind(donation.notes)
        .execute(&mut *conn)
        .await?;

    sqlx::query(SQL_UPDATE_LAST_DONATED)
        .bind(donation.donor_id)
        .bind(donation.donated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn list_donations(pool: &SqlitePool, donor_id: &str) -> sqlx::Result<Vec<DonationRow>> {
    sqlx::query_as::<_, DonationRow>(SQL_LIST_DONATIONS)
        .bind(donor_id)
        .fetch_all(pool)
        .await
}
