use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{Result, TupleError};

/// A record with a fixed positional layout on the wire.
///
/// Records carry no type tag: the field order is the schema, so every
/// implementation writes and expects its own array arity.
pub trait Tuple: Sized {
    /// Used in arity errors.
    const NAME: &'static str;

    fn encode(&self, enc: &mut Encoder) -> Result<()>;

    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;
}

pub fn marshal_to<T: Tuple>(value: &T, enc: &mut Encoder) -> Result<()> {
    value.encode(enc)
}

pub fn marshal<T: Tuple>(value: &T) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    marshal_to(value, &mut enc)?;
    Ok(enc.into_data())
}

pub fn unmarshal<T: Tuple>(data: &[u8]) -> Result<T> {
    let mut dec = Decoder::new(data);
    let value = T::decode(&mut dec)?;

    if dec.is_finished() {
        Ok(value)
    } else {
        Err(TupleError::LeftoverData(dec.bytes_left()))
    }
}

/// Decodes a result set: an array whose every element is a `T`.
pub fn unmarshal_array<T: Tuple>(data: &[u8]) -> Result<Vec<T>> {
    let mut dec = Decoder::new(data);
    let len = dec.read_array_len()?;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        out.push(T::decode(&mut dec)?);
    }

    if dec.is_finished() {
        Ok(out)
    } else {
        Err(TupleError::LeftoverData(dec.bytes_left()))
    }
}
