pub mod control;
pub mod control_key;
pub mod error;
pub mod health_checks;
pub mod json_error;
pub mod validated_json;

#[cfg(any(test, feature = "test-utils"))]
pub mod assertions;
