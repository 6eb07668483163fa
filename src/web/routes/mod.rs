pub mod auth;
pub mod donors;
pub mod recipients;
pub mod root;
