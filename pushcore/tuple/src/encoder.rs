use rmp::encode;

use crate::error::Result;
use crate::millitime::MilliTime;

/// MessagePack writer for fixed-shape tuples and request bodies.
pub struct Encoder {
    writer: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            writer: Vec::with_capacity(capacity),
        }
    }

    /// Continues writing after bytes already present in `writer`.
    pub fn from_vec(writer: Vec<u8>) -> Self {
        Self { writer }
    }

    pub fn into_data(self) -> Vec<u8> {
        self.writer
    }

    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    pub fn write_array_len(&mut self, len: u32) -> Result<()> {
        encode::write_array_len(&mut self.writer, len)?;
        Ok(())
    }

    pub fn write_map_len(&mut self, len: u32) -> Result<()> {
        encode::write_map_len(&mut self.writer, len)?;
        Ok(())
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        encode::write_str(&mut self.writer, s)?;
        Ok(())
    }

    /// Writes raw bytes under a `str` marker. The auth scramble travels this way.
    pub fn write_str_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        encode::write_str_len(&mut self.writer, bytes.len() as u32)?;
        self.writer.extend_from_slice(bytes);
        Ok(())
    }

    /// Smallest int encoding that holds `val`.
    pub fn write_int(&mut self, val: i64) -> Result<()> {
        encode::write_sint(&mut self.writer, val)?;
        Ok(())
    }

    pub fn write_uint(&mut self, val: u64) -> Result<()> {
        encode::write_uint(&mut self.writer, val)?;
        Ok(())
    }

    /// Always the 9-byte int64 form.
    pub fn write_millitime(&mut self, t: MilliTime) -> Result<()> {
        encode::write_i64(&mut self.writer, t.as_millis())?;
        Ok(())
    }

    pub fn write_nil(&mut self) -> Result<()> {
        encode::write_nil(&mut self.writer)?;
        Ok(())
    }

    /// Appends an already encoded value.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.extend_from_slice(bytes);
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
