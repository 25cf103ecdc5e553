use bytes::Bytes;
use pushcore_tuple::Decoder;
use thiserror::Error;

use super::consts;
use super::error::{ProtocolError, Result};

/// An empty msgpack array, used as the data of responses without a body.
const EMPTY_ARRAY: &[u8] = &[0x90];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub code: u32,
    pub sync: u64,
    pub schema_version: Option<u64>,
}

/// Error reported by the server in a response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server error {code}: {message}")]
pub struct ServerError {
    pub code: u32,
    pub message: String,
}

impl ServerError {
    /// The instance is up but still bootstrapping; retrying can succeed.
    pub fn is_transient(&self) -> bool {
        self.code == consts::ER_LOADING
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub header: ResponseHeader,
    /// Raw DATA value (an array of tuples), sliced out of the frame.
    pub data: Option<Bytes>,
    pub error: Option<String>,
}

impl Response {
    /// Decodes one frame, the bytes after its length prefix.
    pub fn decode(frame: Bytes) -> Result<Response> {
        let mut dec = Decoder::new(&frame);

        let mut code = None;
        let mut sync = None;
        let mut schema_version = None;
        for _ in 0..dec.read_map_len()? {
            match dec.read_uint()? {
                consts::KEY_CODE => code = Some(dec.read_uint()? as u32),
                consts::KEY_SYNC => sync = Some(dec.read_uint()?),
                consts::KEY_SCHEMA_VERSION => schema_version = Some(dec.read_uint()?),
                _ => skip_value(&mut dec)?,
            }
        }
        let header = ResponseHeader {
            code: code.unwrap_or(consts::OK),
            sync: sync.ok_or(ProtocolError::MissingSync)?,
            schema_version,
        };

        let mut data = None;
        let mut error = None;
        if !dec.is_finished() {
            for _ in 0..dec.read_map_len()? {
                match dec.read_uint()? {
                    consts::KEY_DATA => {
                        let start = dec.position();
                        skip_value(&mut dec)?;
                        data = Some(frame.slice(start..dec.position()));
                    }
                    consts::KEY_ERROR_24 => error = Some(dec.read_str()?),
                    // Extended error stack. ERROR_24 carries the same message.
                    consts::KEY_ERROR => skip_value(&mut dec)?,
                    _ => skip_value(&mut dec)?,
                }
            }
        }

        Ok(Response {
            header,
            data,
            error,
        })
    }

    pub fn is_error(&self) -> bool {
        self.header.code & consts::ERROR_TYPE_FLAG != 0
    }

    pub fn error_code(&self) -> Option<u32> {
        self.is_error()
            .then_some(self.header.code & !consts::ERROR_TYPE_FLAG)
    }

    /// The DATA array on success, or the server's error.
    pub fn into_data(self) -> std::result::Result<Bytes, ServerError> {
        if let Some(code) = self.error_code() {
            return Err(ServerError {
                code,
                message: self.error.unwrap_or_default(),
            });
        }
        Ok(self.data.unwrap_or_else(|| Bytes::from_static(EMPTY_ARRAY)))
    }
}

fn skip_value(dec: &mut Decoder<'_>) -> Result<()> {
    let mut rd = dec.remaining();
    let before = rd.len();
    rmpv::decode::read_value(&mut rd)?;
    dec.advance(before - rd.len())?;
    Ok(())
}
