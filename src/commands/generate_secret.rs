use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;

const KEY_BYTES: usize = 32;

/// A random base64 key for `control.api_key`.
#[must_use]
pub fn generate_control_key() -> String {
    let mut secret = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);
    general_purpose::STANDARD.encode(secret)
}

pub fn handle_generate_secret_command() {
    let encoded = generate_control_key();

    println!("🔐 Generated control API key:");
    println!();
    println!("control:");
    println!("  api_key: \"{encoded}\"");
    println!();
    println!("Add this to your config/{{environment}}.yaml file, or set APP_CONTROL__API_KEY.");
}
