pub mod secret;

pub use secret::{ resolve_api_key, ConfigError };
