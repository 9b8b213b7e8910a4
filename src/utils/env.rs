// src/utils/env.rs

use std::path::Path;

use log::{info, warn};

/// Candidate env files, checked in order; the first one found wins
const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads environment variables from the first `.env` file found. Variables
/// already present in the process environment keep their values.
pub fn load_env() {
    for path in ENV_PATHS.iter() {
        if Path::new(path).exists() {
            match dotenv::from_path(path) {
                Ok(()) => {
                    info!("Loaded environment variables from {}", path);
                    return;
                }
                Err(e) => warn!("Failed to load environment from {}: {}", path, e),
            }
        }
    }
    info!("No .env file found, using environment variables from system");
}
