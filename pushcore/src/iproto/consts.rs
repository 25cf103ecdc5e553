// Binary protocol constants. Values are fixed by the server.

pub const GREETING_SIZE: usize = 128;
pub const GREETING_LINE_SIZE: usize = 64;
pub const SCRAMBLE_SIZE: usize = 20;

/// Requests are always sent with the 5-byte `0xce` length form.
pub const LENGTH_PREFIX_SIZE: usize = 5;

// Request types
pub const SELECT: u32 = 0x01;
pub const CALL_16: u32 = 0x06;
pub const AUTH: u32 = 0x07;
pub const PING: u32 = 0x40;

// Header keys
pub const KEY_CODE: u64 = 0x00;
pub const KEY_SYNC: u64 = 0x01;
pub const KEY_SCHEMA_VERSION: u64 = 0x05;

// Body keys
pub const KEY_SPACE_ID: u64 = 0x10;
pub const KEY_INDEX_ID: u64 = 0x11;
pub const KEY_LIMIT: u64 = 0x12;
pub const KEY_OFFSET: u64 = 0x13;
pub const KEY_ITERATOR: u64 = 0x14;
pub const KEY_KEY: u64 = 0x20;
pub const KEY_TUPLE: u64 = 0x21;
pub const KEY_FUNCTION_NAME: u64 = 0x22;
pub const KEY_USER_NAME: u64 = 0x23;
pub const KEY_DATA: u64 = 0x30;
pub const KEY_ERROR_24: u64 = 0x31;
pub const KEY_ERROR: u64 = 0x52;

pub const OK: u32 = 0x00;
pub const ERROR_TYPE_FLAG: u32 = 0x8000;

// Server error codes the client branches on
pub const ER_NO_SUCH_PROC: u32 = 33;
pub const ER_PASSWORD_MISMATCH: u32 = 47;
pub const ER_LOADING: u32 = 116;

pub const ITER_EQ: u32 = 0;

// System views used to resolve names to ids
pub const VSPACE_ID: u32 = 281;
pub const VSPACE_NAME_INDEX: u32 = 2;
pub const VINDEX_ID: u32 = 289;
pub const VINDEX_NAME_INDEX: u32 = 2;

pub const AUTH_MECHANISM: &str = "chap-sha1";
