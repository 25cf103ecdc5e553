use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha1::{Digest, Sha1};

use crate::iproto::consts::{GREETING_LINE_SIZE, GREETING_SIZE, SCRAMBLE_SIZE};
use crate::iproto::{ProtocolError, Result};

/// The 128-byte banner a server sends as soon as a client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub version: String,
    pub salt: Vec<u8>,
}

impl Greeting {
    pub fn parse(buf: &[u8; GREETING_SIZE]) -> Result<Self> {
        let (line1, line2) = buf.split_at(GREETING_LINE_SIZE);

        let banner = std::str::from_utf8(line1)
            .map_err(|_| ProtocolError::BadGreeting("banner is not UTF-8".into()))?;
        let mut words = banner.split_whitespace();
        if words.next() != Some("Tarantool") {
            return Err(ProtocolError::BadGreeting(format!(
                "unexpected banner {:?}",
                banner.trim_end()
            )));
        }
        let version = words.next().unwrap_or_default().to_string();

        let encoded = std::str::from_utf8(line2)
            .map_err(|_| ProtocolError::BadGreeting("salt line is not UTF-8".into()))?
            .trim_end_matches(['\n', ' ', '\0']);
        let salt = STANDARD
            .decode(encoded)
            .map_err(|e| ProtocolError::BadGreeting(format!("salt is not base64: {e}")))?;
        if salt.len() < SCRAMBLE_SIZE {
            return Err(ProtocolError::BadGreeting(format!(
                "salt too short: {} bytes",
                salt.len()
            )));
        }

        Ok(Greeting { version, salt })
    }

    pub fn scramble(&self, password: &str) -> [u8; SCRAMBLE_SIZE] {
        scramble(&self.salt, password)
    }
}

/// chap-sha1: `sha1(pass) XOR sha1(salt[..20] ++ sha1(sha1(pass)))`.
pub fn scramble(salt: &[u8], password: &str) -> [u8; SCRAMBLE_SIZE] {
    let step1 = Sha1::digest(password.as_bytes());
    let step2 = Sha1::digest(step1);

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_SIZE.min(salt.len())]);
    hasher.update(step2);
    let step3 = hasher.finalize();

    let mut out = [0u8; SCRAMBLE_SIZE];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = step1[i] ^ step3[i];
    }
    out
}

/// Builds a greeting the way a server lays it out. Used by test servers.
pub fn build_greeting(version: &str, salt: &[u8]) -> [u8; GREETING_SIZE] {
    let mut buf = [b' '; GREETING_SIZE];
    let banner = format!("Tarantool {version} (Binary) 00000000-0000-0000-0000-000000000000");
    let encoded = STANDARD.encode(salt);

    let n = banner.len().min(GREETING_LINE_SIZE - 1);
    buf[..n].copy_from_slice(&banner.as_bytes()[..n]);
    buf[GREETING_LINE_SIZE - 1] = b'\n';
    let m = encoded.len().min(GREETING_LINE_SIZE - 1);
    buf[GREETING_LINE_SIZE..GREETING_LINE_SIZE + m].copy_from_slice(&encoded.as_bytes()[..m]);
    buf[GREETING_SIZE - 1] = b'\n';
    buf
}
