pub mod serve;

// Re-export command functions for convenience
pub use serve::{check_config, resolve_config, serve, ServeParams};
