//! SQLite schema for the blood-donation store.
//!
//! Timestamps are RFC 3339 text, string lists are JSON arrays, coordinates are
//! stored as separate longitude/latitude columns so the bounding-box prefilter
//! can use the `(latitude, longitude)` indexes.

use sqlx::SqlitePool;

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS users (
    user_id       TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    email         TEXT NOT NULL UNIQUE,
    phone         TEXT,
    password_hash TEXT NOT NULL,
    role          TEXT NOT NULL CHECK (role IN ('donor', 'recipient')),
    created_at    TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS donors (
    donor_id           TEXT PRIMARY KEY,
    user_id            TEXT NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
    blood_type         TEXT NOT NULL,
    longitude          REAL NOT NULL,
    latitude           REAL NOT NULL,
    address            TEXT NOT NULL,
    city               TEXT NOT NULL,
    state              TEXT NOT NULL,
    zip_code           TEXT NOT NULL,
    last_donated       TEXT,
    medical_conditions TEXT NOT NULL DEFAULT '[]',
    medications        TEXT NOT NULL DEFAULT '[]',
    is_eligible        INTEGER NOT NULL DEFAULT 1,
    availability       INTEGER NOT NULL DEFAULT 1,
    created_at         TEXT NOT NULL
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_donors_geo ON donors (latitude, longitude)",
    "CREATE INDEX IF NOT EXISTS idx_donors_match ON donors (blood_type, availability, is_eligible)",
    r#"
CREATE TABLE IF NOT EXISTS donor_donations (
    donation_id       TEXT PRIMARY KEY,
    donor_id          TEXT NOT NULL REFERENCES donors(donor_id) ON DELETE CASCADE,
    donated_at        TEXT NOT NULL,
    recipient_user_id TEXT,
    hospital          TEXT,
    notes             TEXT
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_donor_donations_donor ON donor_donations (donor_id)",
    r#"
CREATE TABLE IF NOT EXISTS recipients (
    recipient_id       TEXT PRIMARY KEY,
    user_id            TEXT NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
    blood_type         TEXT NOT NULL,
    longitude          REAL NOT NULL,
    latitude           REAL NOT NULL,
    address            TEXT NOT NULL,
    city               TEXT NOT NULL,
    state              TEXT NOT NULL,
    zip_code           TEXT NOT NULL,
    medical_conditions TEXT NOT NULL DEFAULT '[]',
    medications        TEXT NOT NULL DEFAULT '[]',
    created_at         TEXT NOT NULL
)
"#,
    r#"
CREATE TABLE IF NOT EXISTS blood_requests (
    request_id         TEXT PRIMARY KEY,
    recipient_user_id  TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    blood_type         TEXT NOT NULL,
    units              INTEGER NOT NULL CHECK (units >= 1),
    urgency_level      TEXT NOT NULL DEFAULT 'medium',
    hospital_name      TEXT NOT NULL,
    hospital_address   TEXT NOT NULL,
    hospital_longitude REAL NOT NULL,
    hospital_latitude  REAL NOT NULL,
    status             TEXT NOT NULL DEFAULT 'pending',
    needed_by          TEXT NOT NULL,
    notes              TEXT,
    created_at         TEXT NOT NULL,
    closed_at          TEXT
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_blood_requests_recipient ON blood_requests (recipient_user_id)",
    r#"
CREATE TABLE IF NOT EXISTS matched_donors (
    request_id   TEXT NOT NULL REFERENCES blood_requests(request_id) ON DELETE CASCADE,
    donor_id     TEXT NOT NULL REFERENCES donors(donor_id) ON DELETE CASCADE,
    status       TEXT NOT NULL DEFAULT 'contacted',
    contacted_at TEXT NOT NULL,
    response_at  TEXT,
    notes        TEXT,
    position     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (request_id, donor_id)
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_matched_donors_donor ON matched_donors (donor_id)",
];

/// Creates all tables and indexes that do not exist yet.
pub async fn initialize_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
