//! Small OS-facing helpers ported from `pkg/system/system.go`.

use rand::RngCore;

/// Generates a fresh [`SessionId`]: 8 random bytes, hex-encoded.
/// One is generated per connection attempt (spec.md §3).
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Prints a prompt and blocks until the user presses Enter, then (when
/// `exit` is set) terminates the process with status 1. Used on fatal
/// startup/connection errors so a message is readable in a detached
/// terminal before the window closes (spec.md §7).
pub fn wait_for_user_response(exit: bool) {
    println!("Press Enter to continue...");
    let mut discard = String::new();
    let _ = std::io::stdin().read_line(&mut discard);
    if exit {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_16_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_ids_are_not_constant() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
    }
}
