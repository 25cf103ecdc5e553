use rmp::Marker;
use rmp::decode;

use crate::error::{Result, TupleError};
use crate::millitime::MilliTime;

/// MessagePack reader over a borrowed buffer.
pub struct Decoder<'a> {
    data: &'a [u8],
    rd: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, rd: data }
    }

    pub fn is_finished(&self) -> bool {
        self.rd.is_empty()
    }

    pub fn bytes_left(&self) -> usize {
        self.rd.len()
    }

    pub fn position(&self) -> usize {
        self.data.len() - self.rd.len()
    }

    /// The unread tail of the buffer.
    pub fn remaining(&self) -> &'a [u8] {
        self.rd
    }

    /// Moves the cursor forward by `n` bytes.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.rd.len() < len {
            return Err(TupleError::UnexpectedEof);
        }
        let (head, tail) = self.rd.split_at(len);
        self.rd = tail;
        Ok(head)
    }

    fn read_marker(&mut self) -> Result<Marker> {
        Ok(decode::read_marker(&mut self.rd)?)
    }

    pub fn read_array_len(&mut self) -> Result<u32> {
        Ok(decode::read_array_len(&mut self.rd)?)
    }

    pub fn read_map_len(&mut self) -> Result<u32> {
        Ok(decode::read_map_len(&mut self.rd)?)
    }

    /// Reads an array header and checks it against the record's allowed arity.
    pub fn read_tuple_len(&mut self, record: &'static str, min: u32, max: u32) -> Result<u32> {
        let got = self.read_array_len()?;
        if got < min || got > max {
            return Err(TupleError::Arity {
                record,
                min,
                max,
                got,
            });
        }
        Ok(got)
    }

    /// Reads a `str` (or `bin`, which some servers emit for strings) as UTF-8.
    pub fn read_str(&mut self) -> Result<String> {
        let len = match self.read_marker()? {
            Marker::FixStr(n) => n as usize,
            Marker::Str8 | Marker::Bin8 => self.read_u8()? as usize,
            Marker::Str16 | Marker::Bin16 => self.read_u16_be()? as usize,
            Marker::Str32 | Marker::Bin32 => self.read_u32_be()? as usize,
            found => {
                return Err(TupleError::InvalidMarker {
                    expected: "string",
                    found,
                });
            }
        };
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(TupleError::InvalidUtf8)
    }

    pub fn read_int(&mut self) -> Result<i64> {
        Ok(decode::read_int(&mut self.rd)?)
    }

    pub fn read_uint(&mut self) -> Result<u64> {
        Ok(decode::read_int(&mut self.rd)?)
    }

    pub fn read_millitime(&mut self) -> Result<MilliTime> {
        let millis = self.read_int()?;
        if millis < 0 {
            return Err(TupleError::NegativeTime(millis));
        }
        Ok(MilliTime::from_millis(millis))
    }
}
