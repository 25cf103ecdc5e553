use crate::encoder::Encoder;
use crate::error::Result;
use crate::millitime::MilliTime;

#[derive(Debug, Clone, PartialEq)]
enum Field {
    Str(String),
    Int(i64),
    Uint(u64),
    Time(MilliTime),
}

/// Positional argument tuple for a remote call or index key.
#[derive(Debug, Default, Clone)]
pub struct TupleBuilder {
    fields: Vec<Field>,
}

impl TupleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn str(mut self, value: impl Into<String>) -> Self {
        self.fields.push(Field::Str(value.into()));
        self
    }

    pub fn int(mut self, value: i64) -> Self {
        self.fields.push(Field::Int(value));
        self
    }

    pub fn uint(mut self, value: u64) -> Self {
        self.fields.push(Field::Uint(value));
        self
    }

    pub fn millitime(mut self, value: MilliTime) -> Self {
        self.fields.push(Field::Time(value));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn encode_to(&self, enc: &mut Encoder) -> Result<()> {
        enc.write_array_len(self.fields.len() as u32)?;
        for field in &self.fields {
            match field {
                Field::Str(s) => enc.write_str(s)?,
                Field::Int(i) => enc.write_int(*i)?,
                Field::Uint(u) => enc.write_uint(*u)?,
                Field::Time(t) => enc.write_millitime(*t)?,
            }
        }
        Ok(())
    }

    pub fn build(self) -> Result<Vec<u8>> {
        let mut enc = Encoder::with_capacity(64 + self.fields.len() * 16);
        self.encode_to(&mut enc)?;
        Ok(enc.into_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;

    #[test]
    fn builds_positional_array() {
        let data = TupleBuilder::new()
            .str("dev")
            .str("sub")
            .millitime(MilliTime::from_millis(42))
            .build()
            .unwrap();

        let mut dec = Decoder::new(&data);
        assert_eq!(dec.read_array_len().unwrap(), 3);
        assert_eq!(dec.read_str().unwrap(), "dev");
        assert_eq!(dec.read_str().unwrap(), "sub");
        assert_eq!(dec.read_millitime().unwrap(), MilliTime::from_millis(42));
        assert!(dec.is_finished());
    }

    #[test]
    fn empty_builder_is_empty_array() {
        let data = TupleBuilder::new().build().unwrap();
        assert_eq!(data, vec![0x90]);
    }
}
