pub mod auth_service;
pub mod blood_request_service;
pub mod donor_service;
pub mod geo_service;
pub mod notification_service;
pub mod profile_input;
pub mod recipient_service;
