use rand::{rngs::OsRng, RngCore};

const USER_ID_BYTES: usize = 16;
const SESSION_TOKEN_BYTES: usize = 32;

fn random_hex(len: usize) -> Result<String, rand::Error> {
    let mut buf = vec![0u8; len];
    OsRng.try_fill_bytes(&mut buf)?;
    Ok(hex::encode(buf))
}

/// 128 random bits, 32 hex chars.
pub fn new_user_id() -> Result<String, rand::Error> {
    random_hex(USER_ID_BYTES)
}

/// 256 random bits, 64 hex chars.
pub fn new_session_token() -> Result<String, rand::Error> {
    random_hex(SESSION_TOKEN_BYTES)
}
