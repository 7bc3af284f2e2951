use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of entropy in a share token (256 bits).
pub const SHARE_TOKEN_BYTES: usize = 32;

/// Generate an unguessable share token, hex-encoded (64 chars).
pub fn generate_share_token() -> String {
    let mut bytes = [0u8; SHARE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(SHARE_TOKEN_BYTES * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Cheap shape check before hitting the database with a client-supplied token.
pub fn is_well_formed_share_token(token: &str) -> bool {
    token.len() == SHARE_TOKEN_BYTES * 2 && token.chars().all(|ch| ch.is_ascii_hexdigit())
}
