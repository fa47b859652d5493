use super::error::BencodeError;
use super::value::{Value, ValueKind};
use std::io::Write;

/// Encodes a value back to canonical bencode (dictionary keys sorted).
///
/// Source spans are ignored; the output length may differ from the span of
/// a decoded value whose dictionaries were not in canonical order.
pub fn encode(value: &Value) -> Result<Vec<u8>, BencodeError> {
    let mut buf = Vec::new();
    encode_value(value, &mut buf)?;
    Ok(buf)
}

fn encode_value<W: Write>(value: &Value, writer: &mut W) -> Result<(), BencodeError> {
    match &value.kind {
        ValueKind::Integer(i) => {
            write!(writer, "i{}e", i)?;
        }
        ValueKind::Bytes(b) => {
            write!(writer, "{}:", b.len())?;
            writer.write_all(b)?;
        }
        ValueKind::List(l) => {
            writer.write_all(b"l")?;
            for item in l {
                encode_value(item, writer)?;
            }
            writer.write_all(b"e")?;
        }
        ValueKind::Dict(d) => {
            writer.write_all(b"d")?;
            for (key, val) in d {
                write!(writer, "{}:", key.len())?;
                writer.write_all(key)?;
                encode_value(val, writer)?;
            }
            writer.write_all(b"e")?;
        }
    }
    Ok(())
}
