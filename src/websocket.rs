pub mod auth;
pub mod status_stream;
