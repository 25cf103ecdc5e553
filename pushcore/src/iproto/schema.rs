//! Decoding of `_vspace` / `_vindex` rows used to resolve names to ids.

use rmpv::Value;

use super::error::{ProtocolError, Result};

/// `_vspace` rows are `[id, owner, name, engine, field_count, flags, format]`.
pub fn decode_space_id(data: &[u8]) -> Result<Option<u32>> {
    first_row_field(data, 0)
}

/// `_vindex` rows are `[space_id, iid, name, type, opts, parts]`.
pub fn decode_index_id(data: &[u8]) -> Result<Option<u32>> {
    first_row_field(data, 1)
}

fn first_row_field(data: &[u8], field: usize) -> Result<Option<u32>> {
    let mut rd = data;
    let rows = match rmpv::decode::read_value(&mut rd)? {
        Value::Array(rows) => rows,
        other => return Err(ProtocolError::BadSchemaTuple(format!("expected array, got {other}"))),
    };
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let id = row
        .as_array()
        .and_then(|fields| fields.get(field))
        .and_then(Value::as_u64)
        .ok_or_else(|| ProtocolError::BadSchemaTuple(row.to_string()))?;
    u32::try_from(id)
        .map(Some)
        .map_err(|_| ProtocolError::BadSchemaTuple(format!("id {id} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, value).unwrap();
        buf
    }

    #[test]
    fn space_id_from_vspace_row() {
        let rows = Value::Array(vec![Value::Array(vec![
            Value::from(512),
            Value::from(1),
            Value::from("devs"),
            Value::from("memtx"),
            Value::from(0),
        ])]);
        assert_eq!(decode_space_id(&encode(&rows)).unwrap(), Some(512));
    }

    #[test]
    fn index_id_from_vindex_row() {
        let rows = Value::Array(vec![Value::Array(vec![
            Value::from(512),
            Value::from(0),
            Value::from("primary"),
            Value::from("tree"),
        ])]);
        assert_eq!(decode_index_id(&encode(&rows)).unwrap(), Some(0));
    }

    #[test]
    fn missing_name_is_none() {
        assert_eq!(decode_space_id(&[0x90]).unwrap(), None);
    }

    #[test]
    fn malformed_row_is_rejected() {
        let rows = Value::Array(vec![Value::from("devs")]);
        assert!(decode_space_id(&encode(&rows)).is_err());
    }
}
