use webrtc::ice_transport::ice_server::RTCIceServer;

use crate::error::AppError;

/// Loads a `.env` file (searching the current directory and its
/// ancestors, same as `pkg/system/env_loader.go`) unless `LOG_LEVEL`
/// is already present in the environment.
pub fn load_dotenv() {
    if std::env::var("LOG_LEVEL").is_err() {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(?path, "loaded .env file"),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!("no .env file found, continuing with process environment")
            }
            Err(e) => tracing::warn!(error = %e, "failed to parse .env file"),
        }
    }
}

fn split_servers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Reads `STUN_SERVERS` (comma-separated `stun:host:port` list).
/// Missing or empty is a fatal [`AppError::Config`] (spec.md §6).
pub fn stun_servers() -> Result<Vec<RTCIceServer>, AppError> {
    let raw = std::env::var("STUN_SERVERS")
        .map_err(|_| AppError::Config("STUN_SERVERS not set in environment".into()))?;

    let servers = split_servers(&raw);
    if servers.is_empty() {
        return Err(AppError::Config("STUN_SERVERS is empty".into()));
    }

    Ok(servers
        .into_iter()
        .map(|url| RTCIceServer {
            urls: vec![url],
            ..Default::default()
        })
        .collect())
}

/// Reads the optional `TURN_SERVERS`/`TURN_USERNAME`/`TURN_CREDENTIAL`
/// triple. Returns an empty list (and logs a warning) if unset.
pub fn turn_servers() -> Vec<RTCIceServer> {
    let raw = std::env::var("TURN_SERVERS").unwrap_or_default();
    if raw.is_empty() {
        tracing::warn!("TURN server configuration missing in environment, some connections may fail");
        return Vec::new();
    }

    let username = std::env::var("TURN_USERNAME").unwrap_or_default();
    let credential = std::env::var("TURN_CREDENTIAL").unwrap_or_default();

    split_servers(&raw)
        .into_iter()
        .map(|url| RTCIceServer {
            urls: vec![url],
            username: username.clone(),
            credential: credential.clone(),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_servers_trims_and_skips_empty() {
        let out = split_servers(" stun:a:1 , stun:b:2,, stun:c:3 ");
        assert_eq!(out, vec!["stun:a:1", "stun:b:2", "stun:c:3"]);
    }
}
