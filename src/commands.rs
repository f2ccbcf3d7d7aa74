pub mod generate_secret;
pub mod jobs;
pub mod migrate;
pub mod serve;
pub mod version;
