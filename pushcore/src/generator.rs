//! Synthetic identifiers and tokens for benchmark devices.
//!
//! Nothing here is cryptographically secure or unique; uniqueness, where
//! it matters, is the server's business.

use rand::Rng;

pub const HEX_ALPHABET: &[u8; 16] = b"abcdef0123456789";
pub const AUTH_TOKEN_LEN: usize = 16;
pub const PUSH_TOKEN_LEN: usize = 160;
pub const PUSH_TOKEN_BLOCK_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushTechnology {
    Gcm,
    Fcm,
}

impl PushTechnology {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushTechnology::Gcm => "g",
            PushTechnology::Fcm => "f",
        }
    }
}

/// `len` characters drawn uniformly from [`HEX_ALPHABET`].
pub fn random_token_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| HEX_ALPHABET[rng.random_range(0..HEX_ALPHABET.len())] as char)
        .collect()
}

pub fn random_token(len: usize) -> String {
    random_token_with(&mut rand::rng(), len)
}

/// One random 40-character block repeated four times.
pub fn push_token_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_token_with(rng, PUSH_TOKEN_BLOCK_LEN).repeat(PUSH_TOKEN_LEN / PUSH_TOKEN_BLOCK_LEN)
}

pub fn generate_push_token() -> String {
    push_token_with(&mut rand::rng())
}

pub fn auth_token() -> String {
    random_token(AUTH_TOKEN_LEN)
}
