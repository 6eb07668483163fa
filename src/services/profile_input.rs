//! Request fields shared by donor, recipient and blood-request payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{BloodType, DonorRow, GeoPoint, RecipientRow};

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInput {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub coordinates: Option<[f64; 2]>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(flatten)]
    pub point: GeoPoint,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

impl LocationInput {
    /// Every field is required for a new profile.
    pub fn into_location(self) -> Result<Location> {
        let point = parse_point(self.kind.as_deref(), self.coordinates)?
            .ok_or_else(|| AppError::bad_request("Please provide location coordinates"))?;
        Ok(Location {
            point,
            address: required_text(self.address, "Please provide your address")?,
            city: required_text(self.city, "Please provide your city")?,
            state: required_text(self.state, "Please provide your state")?,
            zip_code: required_text(self.zip_code, "Please provide your zip code")?,
        })
    }

    /// Overwrites the fields present in the input; blank strings are rejected.
    pub fn apply_to(self, location: &mut Location) -> Result<()> {
        if let Some(point) = parse_point(self.kind.as_deref(), self.coordinates)? {
            location.point = point;
        }
        if let Some(address) = self.address {
            location.address = required_text(Some(address), "Please provide your address")?;
        }
        if let Some(city) = self.city {
            location.city = required_text(Some(city), "Please provide your city")?;
        }
        if let Some(state) = self.state {
            location.state = required_text(Some(state), "Please provide your state")?;
        }
        if let Some(zip_code) = self.zip_code {
            location.zip_code = required_text(Some(zip_code), "Please provide your zip code")?;
        }
        Ok(())
    }
}

/// Profile rows that keep their `Location` as flat columns.
pub trait LocatedRow {
    fn location(&self) -> Location;
    fn set_location(&mut self, location: Location);
}

macro_rules! located_row {
    ($($row:ty),+) => {
        $(impl LocatedRow for $row {
            fn location(&self) -> Location {
                Location {
                    point: GeoPoint::new(self.longitude, self.latitude),
                    address: self.address.clone(),
                    city: self.city.clone(),
                    state: self.state.clone(),
                    zip_code: self.zip_code.clone(),
                }
            }

            fn set_location(&mut self, location: Location) {
                self.longitude = location.point.longitude;
                self.latitude = location.point.latitude;
                self.address = location.address;
                self.city = location.city;
                self.state = location.state;
                self.zip_code = location.zip_code;
            }
        })+
    };
}

located_row!(DonorRow, RecipientRow);

/// Trims list entries and drops the blank ones.
pub fn clean_list(items: Vec<String>) -> Vec<String> {
    items.into_iter().filter_map(|s| optional_text(Some(s))).collect()
}

pub fn parse_point(kind: Option<&str>, coordinates: Option<[f64; 2]>) -> Result<Option<GeoPoint>> {
    if let Some(kind) = kind {
        if kind != "Point" {
            return Err(AppError::bad_request("Location type must be 'Point'"));
        }
    }
    let Some([longitude, latitude]) = coordinates else {
        return Ok(None);
    };
    let point = GeoPoint::new(longitude, latitude);
    if !point.is_valid() {
        return Err(AppError::bad_request(
            "Coordinates must be [longitude, latitude] within valid ranges",
        ));
    }
    Ok(Some(point))
}

pub fn required_text(value: Option<String>, message: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(message))
}

pub fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Trailing whitespace is kept: a query-string `A+` arrives as `"A "`.
pub fn parse_blood_type(raw: Option<&str>, message: &str) -> Result<BloodType> {
    let raw = raw
        .map(str::trim_start)
        .filter(|v| !v.trim_end().is_empty())
        .ok_or_else(|| AppError::bad_request(message))?;
    raw.parse().map_err(|_| {
        AppError::bad_request(format!("Invalid blood type '{}'", raw.trim_end()))
    })
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn parse_datetime_field(raw: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_datetime(v)
            .map(Some)
            .ok_or_else(|| AppError::bad_request(format!("Invalid date for {field}: '{v}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_input() -> LocationInput {
        LocationInput {
            kind: Some("Point".into()),
            coordinates: Some([4.9, 52.37]),
            address: Some(" Dam 1 ".into()),
            city: Some("Amsterdam".into()),
            state: Some("NH".into()),
            zip_code: Some("1012JS".into()),
        }
    }

    #[test]
    fn complete_location_is_accepted() {
        let loc = full_input().into_location().unwrap();
        assert_eq!(loc.point, GeoPoint::new(4.9, 52.37));
        assert_eq!(loc.address, "Dam 1");
    }

    #[test]
    fn missing_fields_are_reported() {
        let mut input = full_input();
        input.zip_code = None;
        let err = input.into_location().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m == "Please provide your zip code"));

        let mut input = full_input();
        input.coordinates = None;
        assert!(input.into_location().is_err());
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let mut input = full_input();
        input.coordinates = Some([52.37, 200.0]);
        assert!(input.into_location().is_err());
    }

    #[test]
    fn partial_update_touches_only_given_fields() {
        let mut loc = full_input().into_location().unwrap();
        LocationInput {
            city: Some("Utrecht".into()),
            ..LocationInput::default()
        }
        .apply_to(&mut loc)
        .unwrap();
        assert_eq!(loc.city, "Utrecht");
        assert_eq!(loc.address, "Dam 1");
        assert_eq!(loc.point, GeoPoint::new(4.9, 52.37));
    }

    #[test]
    fn location_serializes_geojson_with_address() {
        let loc = full_input().into_location().unwrap();
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["type"], "Point");
        assert_eq!(json["coordinates"][1], 52.37);
        assert_eq!(json["zipCode"], "1012JS");
    }

    #[test]
    fn dates_accept_both_forms() {
        assert_eq!(
            parse_datetime("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_datetime("2024-05-01T10:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap())
        );
        assert!(parse_datetime("yesterday").is_none());
        assert!(parse_datetime_field(Some("01/05/2024"), "neededBy").is_err());
        assert_eq!(parse_datetime_field(Some(" "), "neededBy").unwrap(), None);
    }

    #[test]
    fn blood_type_errors_are_client_errors() {
        assert!(parse_blood_type(None, "Please provide blood type").is_err());
        assert!(parse_blood_type(Some("Q+"), "x").is_err());
        assert_eq!(parse_blood_type(Some("o-"), "x").unwrap(), BloodType::ONegative);
    }

    #[test]
    fn blood_type_from_decoded_query_plus() {
        assert_eq!(parse_blood_type(Some("A "), "x").unwrap(), BloodType::APositive);
        assert_eq!(parse_blood_type(Some(" AB "), "x").unwrap(), BloodType::AbPositive);
        assert_eq!(parse_blood_type(Some("O- "), "x").unwrap(), BloodType::ONegative);
        assert!(parse_blood_type(Some("   "), "x").is_err());
    }
}
