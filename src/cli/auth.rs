//! CLI auth command handlers for the stored bearer token.

use crate::config::ClientConfig;
use crate::storage::{FileStore, KeyValueStore, AUTH_TOKEN_KEY};

/// The token store the CLI and driver share.
pub fn token_store(config: &ClientConfig) -> FileStore {
    match config.storage_dir() {
        Some(dir) => FileStore::new(dir),
        None => FileStore::new_default(),
    }
}

/// Handle `caeli-stream auth set <token>`.
pub fn handle_set(config: &ClientConfig, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let token = token.trim();
    if token.is_empty() {
        return Err("token must not be empty".into());
    }
    let store = token_store(config);
    store.set(AUTH_TOKEN_KEY, token)?;
    println!("✅ Token saved to {}", store.base_dir().display());
    Ok(())
}

/// Handle `caeli-stream auth status`.
pub fn handle_status(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.auth_token().is_some() {
        println!("✅ Using token from environment/config (CAELI_AUTH_TOKEN)");
        return Ok(());
    }
    let store = token_store(config);
    match store.get(AUTH_TOKEN_KEY)? {
        Some(token) if !token.trim().is_empty() => {
            println!("✅ Token stored ({} chars)", token.trim().len());
        }
        _ => println!("⚪ No token stored"),
    }
    Ok(())
}

/// Handle `caeli-stream auth clear`.
pub fn handle_clear(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    token_store(config).remove(AUTH_TOKEN_KEY)?;
    println!("✅ Token removed");
    Ok(())
}
