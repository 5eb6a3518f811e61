//! Minimal protobuf wire-format reader.
//!
//! [`WireDecoder`] walks a byte buffer as a flat stream of `(field number, value)`
//! pairs. It knows nothing about message schemas: nested messages come back as
//! [`WireValue::LengthDelimited`] slices that can be fed into a fresh decoder.
//!
//! The decoder never reads past the end of its buffer. A truncated varint, a
//! length prefix that overruns the buffer, or a wire type whose size cannot be
//! determined simply ends the stream.

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LENGTH_DELIMITED: u64 = 2;
const WIRE_START_GROUP: u64 = 3;
const WIRE_END_GROUP: u64 = 4;
const WIRE_FIXED32: u64 = 5;

/// Longest encoding of a 64-bit varint.
const MAX_VARINT_BYTES: usize = 10;

/// A single decoded field value, borrowed from the underlying buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed32(u32),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
}

impl<'a> WireValue<'a> {
    /// Interprets the value as a signed 64-bit integer.
    ///
    /// Varints and 64-bit fixed values are reinterpreted bit-for-bit; 32-bit
    /// fixed values are sign-extended. Length-delimited values have no integer
    /// reading.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            WireValue::Varint(v) => Some(v as i64),
            WireValue::Fixed32(v) => Some(i64::from(v as i32)),
            WireValue::Fixed64(v) => Some(v as i64),
            WireValue::LengthDelimited(_) => None,
        }
    }

    /// Interprets a varint or 32-bit fixed value as an unsigned 32-bit integer.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            WireValue::Varint(v) => u32::try_from(v).ok(),
            WireValue::Fixed32(v) => Some(v),
            _ => None,
        }
    }

    /// UTF-8 view of a length-delimited value. Invalid UTF-8 yields `None`.
    pub fn as_str(&self) -> Option<&'a str> {
        match *self {
            WireValue::LengthDelimited(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Raw payload of a length-delimited value, usually an embedded message.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            WireValue::LengthDelimited(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub number: u32,
    pub value: WireValue<'a>,
}

/// Forward-only cursor producing the fields of one message.
#[derive(Debug, Clone)]
pub struct WireDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns the next field, or `None` once the buffer is exhausted or the
    /// remaining bytes cannot be read.
    pub fn next_field(&mut self) -> Option<Field<'a>> {
        while self.pos < self.buf.len() {
            let Some(key) = self.read_varint() else {
                return self.finish();
            };
            let number = (key >> 3) as u32;

            let value = match key & 0x7 {
                WIRE_VARINT => self.read_varint().map(WireValue::Varint),
                WIRE_FIXED64 => self.read_array::<8>().map(|b| WireValue::Fixed64(u64::from_le_bytes(b))),
                WIRE_LENGTH_DELIMITED => self.read_length_delimited().map(WireValue::LengthDelimited),
                WIRE_FIXED32 => self.read_array::<4>().map(|b| WireValue::Fixed32(u32::from_le_bytes(b))),
                // Group markers carry no payload of their own; the fields between
                // them are walked (and ignored by schema layers) like any other.
                WIRE_START_GROUP | WIRE_END_GROUP => continue,
                _ => None,
            };

            return match value {
                Some(value) => Some(Field { number, value }),
                None => self.finish(),
            };
        }

        None
    }

    fn finish(&mut self) -> Option<Field<'a>> {
        self.pos = self.buf.len();
        None
    }

    fn read_varint(&mut self) -> Option<u64> {
        let mut result = 0u64;

        for i in 0..MAX_VARINT_BYTES {
            let byte = *self.buf.get(self.pos)?;
            self.pos += 1;

            result |= u64::from(byte & 0x7F) << (7 * i);

            if byte & 0x80 == 0 {
                return Some(result);
            }
        }

        None
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes: [u8; N] = self.buf.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn read_length_delimited(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.read_varint()?).ok()?;
        let end = self.pos.checked_add(len)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }
}

impl<'a> Iterator for WireDecoder<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_field()
    }
}

impl std::iter::FusedIterator for WireDecoder<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(number: u32, wire_type: u8) -> u8 {
        ((number << 3) as u8) | wire_type
    }

    #[test]
    fn test_empty_buffer_has_no_fields() {
        assert_eq!(WireDecoder::new(&[]).next(), None);
    }

    #[test]
    fn test_reads_multi_byte_varint() {
        // field 1, varint 300
        let bytes = [key(1, 0), 0xAC, 0x02];
        let fields: Vec<_> = WireDecoder::new(&bytes).collect();

        assert_eq!(
            fields,
            vec![Field {
                number: 1,
                value: WireValue::Varint(300)
            }]
        );
    }

    #[test]
    fn test_reads_max_width_varint() {
        let mut bytes = vec![key(2, 0)];
        bytes.extend([0xFF; 9]);
        bytes.push(0x01);

        let field = WireDecoder::new(&bytes).next().unwrap();
        assert_eq!(field.value, WireValue::Varint(u64::MAX));
        assert_eq!(field.value.as_i64(), Some(-1));
    }

    #[test]
    fn test_reads_fixed_and_length_delimited_fields() {
        let mut bytes = vec![key(3, 5)];
        bytes.extend((-2i32).to_le_bytes());
        bytes.push(key(4, 1));
        bytes.extend(42u64.to_le_bytes());
        bytes.extend([key(5, 2), 3, b'a', b'b', b'c']);

        let fields: Vec<_> = WireDecoder::new(&bytes).collect();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].value.as_i64(), Some(-2));
        assert_eq!(fields[1].value, WireValue::Fixed64(42));
        assert_eq!(fields[2].number, 5);
        assert_eq!(fields[2].value.as_str(), Some("abc"));
    }

    #[test]
    fn test_truncated_varint_ends_stream() {
        let bytes = [key(1, 0), 0x96, 0x01, key(2, 0), 0x80];
        let mut decoder = WireDecoder::new(&bytes);

        assert_eq!(decoder.next().map(|f| f.value), Some(WireValue::Varint(150)));
        assert_eq!(decoder.next(), None);
        assert_eq!(decoder.remaining(), 0);
        assert_eq!(decoder.next(), None);
    }

    #[test]
    fn test_length_overrun_ends_stream() {
        let bytes = [key(1, 2), 10, b'x', b'y'];
        assert_eq!(WireDecoder::new(&bytes).next(), None);
    }

    #[test]
    fn test_truncated_fixed_ends_stream() {
        let bytes = [key(1, 1), 1, 2, 3];
        assert_eq!(WireDecoder::new(&bytes).next(), None);
    }

    #[test]
    fn test_group_markers_are_skipped() {
        let bytes = [key(7, 3), key(8, 0), 5, key(7, 4), key(9, 0), 1];
        let numbers: Vec<_> = WireDecoder::new(&bytes).map(|f| f.number).collect();

        assert_eq!(numbers, vec![8, 9]);
    }

    #[test]
    fn test_reserved_wire_type_ends_stream() {
        let bytes = [key(1, 0), 1, key(2, 6), 0, key(3, 0), 1];
        let numbers: Vec<_> = WireDecoder::new(&bytes).map(|f| f.number).collect();

        assert_eq!(numbers, vec![1]);
    }

    #[test]
    fn test_invalid_utf8_has_no_string_reading() {
        let bytes = [key(1, 2), 2, 0xC3, 0x28];
        let field = WireDecoder::new(&bytes).next().unwrap();

        assert_eq!(field.value.as_str(), None);
        assert_eq!(field.value.as_bytes(), Some(&[0xC3, 0x28][..]));
    }

    #[test]
    fn test_every_prefix_decodes_without_panicking() {
        let mut bytes = vec![key(1, 0), 0xAC, 0x02, key(2, 2), 4, b'r', b'o', b'u', b't'];
        bytes.push(key(3, 5));
        bytes.extend(7u32.to_le_bytes());
        bytes.push(key(4, 1));
        bytes.extend(9u64.to_le_bytes());

        let full = WireDecoder::new(&bytes).count();
        assert_eq!(full, 4);

        for end in 0..bytes.len() {
            let prefix = &bytes[..end];
            let mut decoder = WireDecoder::new(prefix);
            let count = decoder.by_ref().count();
            assert!(count <= full);
            assert_eq!(decoder.remaining(), 0);
        }
    }
}
