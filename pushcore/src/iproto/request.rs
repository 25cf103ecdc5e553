use pushcore_tuple::Encoder;

use super::consts;
use super::error::Result;

/// A single request to the server. Argument tuples and keys arrive
/// pre-encoded as msgpack arrays.
#[derive(Debug, Clone, Copy)]
pub enum Request<'a> {
    Ping,
    Auth {
        user: &'a str,
        scramble: &'a [u8; consts::SCRAMBLE_SIZE],
    },
    Select {
        space_id: u32,
        index_id: u32,
        offset: u32,
        limit: u32,
        iterator: u32,
        key: &'a [u8],
    },
    Call {
        function: &'a str,
        args: &'a [u8],
    },
}

impl Request<'_> {
    pub fn request_type(&self) -> u32 {
        match self {
            Request::Ping => consts::PING,
            Request::Auth { .. } => consts::AUTH,
            Request::Select { .. } => consts::SELECT,
            Request::Call { .. } => consts::CALL_16,
        }
    }

    /// Encodes a complete packet: length prefix, header and body.
    pub fn encode(&self, sync: u64) -> Result<Vec<u8>> {
        let mut packet = Vec::with_capacity(128);
        packet.extend_from_slice(&[0xce, 0, 0, 0, 0]);
        let mut enc = Encoder::from_vec(packet);

        enc.write_map_len(2)?;
        enc.write_uint(consts::KEY_CODE)?;
        enc.write_uint(u64::from(self.request_type()))?;
        enc.write_uint(consts::KEY_SYNC)?;
        enc.write_uint(sync)?;

        self.encode_body(&mut enc)?;

        let mut packet = enc.into_data();
        let body_len = (packet.len() - consts::LENGTH_PREFIX_SIZE) as u32;
        packet[1..consts::LENGTH_PREFIX_SIZE].copy_from_slice(&body_len.to_be_bytes());
        Ok(packet)
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<()> {
        match *self {
            Request::Ping => enc.write_map_len(0)?,
            Request::Auth { user, scramble } => {
                enc.write_map_len(2)?;
                enc.write_uint(consts::KEY_USER_NAME)?;
                enc.write_str(user)?;
                enc.write_uint(consts::KEY_TUPLE)?;
                enc.write_array_len(2)?;
                enc.write_str(consts::AUTH_MECHANISM)?;
                enc.write_str_bytes(scramble)?;
            }
            Request::Select {
                space_id,
                index_id,
                offset,
                limit,
                iterator,
                key,
            } => {
                enc.write_map_len(6)?;
                enc.write_uint(consts::KEY_SPACE_ID)?;
                enc.write_uint(u64::from(space_id))?;
                enc.write_uint(consts::KEY_INDEX_ID)?;
                enc.write_uint(u64::from(index_id))?;
                enc.write_uint(consts::KEY_LIMIT)?;
                enc.write_uint(u64::from(limit))?;
                enc.write_uint(consts::KEY_OFFSET)?;
                enc.write_uint(u64::from(offset))?;
                enc.write_uint(consts::KEY_ITERATOR)?;
                enc.write_uint(u64::from(iterator))?;
                enc.write_uint(consts::KEY_KEY)?;
                enc.write_raw(key);
            }
            Request::Call { function, args } => {
                enc.write_map_len(2)?;
                enc.write_uint(consts::KEY_FUNCTION_NAME)?;
                enc.write_str(function)?;
                enc.write_uint(consts::KEY_TUPLE)?;
                enc.write_raw(args);
            }
        }
        Ok(())
    }
}
