//! BER reader primitives.
//!
//! [`Reader`] is a cursor over a contiguous byte buffer that reads the BER
//! subset Glow uses: tag/length/value with definite short and long lengths
//! (up to four length bytes) and indefinite lengths terminated by two zero
//! bytes.
//!
//! Sub-readers returned by [`Reader::read_tagged`] come in two shapes. For
//! a definite length the sub-reader is bounded to exactly the value's
//! contents and the parent keeps everything after it. For an indefinite
//! length the sub-reader takes *all* remaining bytes and the parent is left
//! empty -- the caller drives the sub-reader until it hits the
//! end-of-contents marker, then continues with whichever reader still holds
//! bytes. [`pick_reader`] enforces that exactly one of them does.

use bytes::{Buf, Bytes};
use emberlib_core::{Error, Result, Value};

use crate::{BOOLEAN_TAG, INTEGER_TAG, REAL_TAG, RELATIVE_OID_TAG, UTF8_STRING_TAG};

/// Maximum number of length bytes in a definite long-form length.
const MAX_LENGTH_BYTES: u8 = 4;

/// Cursor over a BER-encoded byte buffer.
#[derive(Debug, Clone, Default)]
pub struct Reader {
    data: Bytes,
}

impl Reader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Remaining unread bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A copy of the remaining bytes, without advancing.
    pub fn remaining(&self) -> &[u8] {
        &self.data
    }

    /// Next byte without advancing.
    pub fn peek(&self) -> Result<u8> {
        self.data
            .first()
            .copied()
            .ok_or_else(|| Error::MalformedBer("peek past end of data".into()))
    }

    /// Read and consume one byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.data.is_empty() {
            return Err(Error::MalformedBer("read past end of data".into()));
        }
        let b = self.data[0];
        self.data.advance(1);
        Ok(b)
    }

    /// Read one tagged value, checking the tag byte against
    /// `class_fn(tag)`.
    ///
    /// Returns the sub-reader over the value contents and a flag that is
    /// `true` when the length was indefinite (the sub-reader then holds all
    /// remaining bytes and must be driven to its end-of-contents marker).
    pub fn read_tagged(&mut self, tag: u8, class_fn: fn(u8) -> u8) -> Result<(Reader, bool)> {
        let b = self.read_byte()?;
        let expected = class_fn(tag);
        if b != expected {
            return Err(Error::MalformedBer(format!(
                "expected tag 0x{expected:02X}, got 0x{b:02X}"
            )));
        }

        match self.read_length()? {
            Some(len) => {
                if len > self.data.len() {
                    return Err(Error::MalformedBer(format!(
                        "value length {len} exceeds remaining {} bytes",
                        self.data.len()
                    )));
                }
                Ok((Reader { data: self.data.split_to(len) }, false))
            }
            None => {
                let rest = self.data.split_to(self.data.len());
                Ok((Reader { data: rest }, true))
            }
        }
    }

    /// Read a length field. `None` means indefinite.
    fn read_length(&mut self) -> Result<Option<usize>> {
        let b = self.read_byte()?;
        if b & 0x80 == 0 {
            return Ok(Some(usize::from(b)));
        }

        let count = b & 0x7F;
        if count == 0 {
            return Ok(None);
        }
        if count > MAX_LENGTH_BYTES {
            return Err(Error::MalformedBer(format!(
                "length of length is {count} bytes, maximum is {MAX_LENGTH_BYTES}"
            )));
        }

        let mut len: usize = 0;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.read_byte()?);
        }
        Ok(Some(len))
    }

    /// Consume an end-of-contents marker if the cursor sits on one.
    ///
    /// Returns `true` when the reader is exhausted or two zero bytes were
    /// consumed; `false` (without consuming) otherwise.
    pub fn read_end(&mut self) -> Result<bool> {
        if self.data.is_empty() {
            return Ok(true);
        }
        if self.data.len() < 2 {
            return Ok(false);
        }
        if self.data[0] != 0x00 || self.data[1] != 0x00 {
            return Ok(false);
        }
        self.data.advance(2);
        Ok(true)
    }

    /// Decode a universal integer (tag 0x02), big-endian two's complement.
    pub fn decode_integer(&mut self) -> Result<i64> {
        let tag = self.read_byte()?;
        if tag != INTEGER_TAG {
            return Err(Error::MalformedBer(format!(
                "expected integer tag 0x02, got 0x{tag:02X}"
            )));
        }
        let len = self
            .read_length()?
            .ok_or_else(|| Error::MalformedBer("integer with indefinite length".into()))?;
        if len > self.data.len() {
            return Err(Error::MalformedBer("truncated integer".into()));
        }
        if len > 8 {
            return Err(Error::MalformedBer(format!("integer of {len} bytes")));
        }
        decode_integer_content(&self.data.split_to(len))
    }

    /// Decode a universal UTF-8 string (tag 0x0C). Invalid sequences are
    /// replaced rather than rejected; providers in the field are sloppy.
    pub fn decode_utf8(&mut self) -> Result<String> {
        let tag = self.read_byte()?;
        if tag != UTF8_STRING_TAG {
            return Err(Error::MalformedBer(format!(
                "expected UTF-8 string tag 0x0C, got 0x{tag:02X}"
            )));
        }
        let len = self
            .read_length()?
            .ok_or_else(|| Error::MalformedBer("string with indefinite length".into()))?;
        if len > self.data.len() {
            return Err(Error::MalformedBer("truncated string".into()));
        }
        let contents = self.data.split_to(len);
        Ok(String::from_utf8_lossy(&contents).into_owned())
    }

    /// Decode a relative object identifier (tag 0x0D) as its raw
    /// single-byte sub-identifiers, bit-exact with the request encoder.
    pub fn decode_oid(&mut self) -> Result<Vec<u8>> {
        let tag = self.read_byte()?;
        if tag != RELATIVE_OID_TAG {
            return Err(Error::MalformedBer(format!(
                "expected relative OID tag 0x0D, got 0x{tag:02X}"
            )));
        }
        let len = self
            .read_length()?
            .ok_or_else(|| Error::MalformedBer("OID with indefinite length".into()))?;
        if len > self.data.len() {
            return Err(Error::MalformedBer("truncated OID".into()));
        }
        Ok(self.data.split_to(len).to_vec())
    }

    /// Decode whatever BER value comes next into a dynamic [`Value`].
    ///
    /// Used for booleans, minima/maxima, and defaults, where the concrete
    /// type is only learned from the parameter's value-type field. Tags
    /// with no native mapping are preserved as [`Value::Unknown`].
    pub fn decode_any(&mut self) -> Result<Value> {
        let tag = self.read_byte()?;
        let len = self
            .read_length()?
            .ok_or_else(|| Error::MalformedBer("primitive with indefinite length".into()))?;
        if len > self.data.len() {
            return Err(Error::MalformedBer("truncated value".into()));
        }
        let contents = self.data.split_to(len);

        match tag {
            BOOLEAN_TAG => Ok(Value::Boolean(contents.iter().any(|&b| b != 0))),
            INTEGER_TAG => {
                if contents.len() > 8 {
                    return Err(Error::MalformedBer(format!(
                        "integer of {} bytes",
                        contents.len()
                    )));
                }
                decode_integer_content(&contents).map(Value::Integer)
            }
            REAL_TAG => decode_real_content(&contents).map(Value::Real),
            UTF8_STRING_TAG => Ok(Value::String(String::from_utf8_lossy(&contents).into_owned())),
            _ => Ok(Value::Unknown(contents.to_vec())),
        }
    }
}

/// Among the given readers, pick the one that still holds bytes.
///
/// After a value has been handled through a chain of sub-readers, exactly
/// one reader may have data left: the one the recursion should continue
/// with. Two non-empty readers mean the decoder lost track of a container
/// boundary, which is surfaced as
/// [`DecoderResidual`](emberlib_core::Error::DecoderResidual) rather than
/// silently misparsed.
pub fn pick_reader(candidates: Vec<Reader>) -> Result<Reader> {
    let mut found: Option<Reader> = None;
    for reader in candidates {
        if reader.is_empty() {
            continue;
        }
        if found.is_some() {
            return Err(Error::DecoderResidual(
                "more than one reader holds unread bytes".into(),
            ));
        }
        found = Some(reader);
    }
    Ok(found.unwrap_or_default())
}

/// Big-endian two's complement integer contents. Empty contents decode to
/// zero.
fn decode_integer_content(contents: &[u8]) -> Result<i64> {
    let mut out: i64 = match contents.first() {
        Some(&b) if b & 0x80 != 0 => -1,
        _ => 0,
    };
    for &b in contents {
        out = (out << 8) | i64::from(b);
    }
    Ok(out)
}

/// Binary BER REAL contents (X.690 8.5). Glow reals are base-2 doubles;
/// base 8/16 and the decimal form are handled for completeness.
fn decode_real_content(contents: &[u8]) -> Result<f64> {
    let Some(&head) = contents.first() else {
        return Ok(0.0);
    };

    if head & 0x80 != 0 {
        // Binary encoding.
        let sign = if head & 0x40 != 0 { -1.0 } else { 1.0 };
        let base: f64 = match (head >> 4) & 0x03 {
            0 => 2.0,
            1 => 8.0,
            2 => 16.0,
            _ => return Err(Error::MalformedBer("reserved real base".into())),
        };
        let scale = (head >> 2) & 0x03;

        let (exp_len, exp_start) = match head & 0x03 {
            3 => {
                let n = *contents
                    .get(1)
                    .ok_or_else(|| Error::MalformedBer("truncated real exponent".into()))?
                    as usize;
                (n, 2)
            }
            n => (n as usize + 1, 1),
        };
        if contents.len() < exp_start + exp_len {
            return Err(Error::MalformedBer("truncated real exponent".into()));
        }
        let exp_bytes = &contents[exp_start..exp_start + exp_len];
        let mut exponent: i64 = match exp_bytes.first() {
            Some(&b) if b & 0x80 != 0 => -1,
            _ => 0,
        };
        for &b in exp_bytes {
            exponent = (exponent << 8) | i64::from(b);
        }

        let mut mantissa: f64 = 0.0;
        for &b in &contents[exp_start + exp_len..] {
            mantissa = mantissa * 256.0 + f64::from(b);
        }

        Ok(sign * mantissa * 2f64.powi(i32::from(scale)) * base.powi(exponent as i32))
    } else if head & 0x40 != 0 {
        // Special values.
        match head {
            0x40 => Ok(f64::INFINITY),
            0x41 => Ok(f64::NEG_INFINITY),
            0x42 => Ok(f64::NAN),
            0x43 => Ok(-0.0),
            _ => Err(Error::MalformedBer("unknown special real".into())),
        }
    } else {
        // Decimal (ISO 6093) encoding: a number rendered as text.
        let text = String::from_utf8_lossy(&contents[1..]);
        text.trim()
            .parse::<f64>()
            .map_err(|_| Error::MalformedBer(format!("unparseable decimal real {text:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{application, context, universal};

    // ---------------------------------------------------------------
    // Tagged reads and lengths
    // ---------------------------------------------------------------

    #[test]
    fn read_tagged_definite_bounds_sub_reader() {
        let mut r = Reader::new(vec![0x60, 0x02, 0xAA, 0xBB, 0xCC]);
        let (sub, open) = r.read_tagged(0, application).unwrap();
        assert!(!open);
        assert_eq!(sub.remaining(), &[0xAA, 0xBB]);
        assert_eq!(r.remaining(), &[0xCC]);
    }

    #[test]
    fn read_tagged_indefinite_takes_all_remaining() {
        let mut r = Reader::new(vec![0xA0, 0x80, 0x01, 0x02, 0x00, 0x00]);
        let (sub, open) = r.read_tagged(0, context).unwrap();
        assert!(open);
        assert_eq!(sub.remaining(), &[0x01, 0x02, 0x00, 0x00]);
        assert!(r.is_empty());
    }

    #[test]
    fn read_tagged_wrong_tag_fails() {
        let mut r = Reader::new(vec![0x61, 0x00]);
        let err = r.read_tagged(0, application).unwrap_err();
        assert!(matches!(err, Error::MalformedBer(_)));
    }

    #[test]
    fn read_tagged_long_form_length() {
        let mut contents = vec![0x60, 0x82, 0x01, 0x00];
        contents.extend(std::iter::repeat(0x55).take(256));
        let mut r = Reader::new(contents);
        let (sub, open) = r.read_tagged(0, application).unwrap();
        assert!(!open);
        assert_eq!(sub.len(), 256);
    }

    #[test]
    fn read_tagged_rejects_oversized_length_of_length() {
        // 0xFF => 0x7F length bytes, far over the 4-byte maximum.
        let mut r = Reader::new(vec![0x60, 0xFF, 0x00]);
        let err = r.read_tagged(0, application).unwrap_err();
        assert!(matches!(err, Error::MalformedBer(_)));
    }

    #[test]
    fn read_tagged_rejects_truncated_contents() {
        let mut r = Reader::new(vec![0x60, 0x05, 0x01]);
        let err = r.read_tagged(0, application).unwrap_err();
        assert!(matches!(err, Error::MalformedBer(_)));
    }

    // ---------------------------------------------------------------
    // End-of-contents handling
    // ---------------------------------------------------------------

    #[test]
    fn read_end_consumes_marker() {
        let mut r = Reader::new(vec![0x00, 0x00, 0x61]);
        assert!(r.read_end().unwrap());
        assert_eq!(r.remaining(), &[0x61]);
    }

    #[test]
    fn read_end_true_on_exhausted_reader() {
        let mut r = Reader::new(Vec::new());
        assert!(r.read_end().unwrap());
    }

    #[test]
    fn read_end_false_without_marker() {
        let mut r = Reader::new(vec![0x61, 0x00]);
        assert!(!r.read_end().unwrap());
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn read_end_false_on_single_byte() {
        let mut r = Reader::new(vec![0x00]);
        assert!(!r.read_end().unwrap());
        assert_eq!(r.len(), 1);
    }

    // ---------------------------------------------------------------
    // Primitive decoding
    // ---------------------------------------------------------------

    #[test]
    fn decode_integer_positive() {
        let mut r = Reader::new(vec![0x02, 0x01, 0x20]);
        assert_eq!(r.decode_integer().unwrap(), 32);
    }

    #[test]
    fn decode_integer_multi_byte() {
        let mut r = Reader::new(vec![0x02, 0x02, 0x01, 0x00]);
        assert_eq!(r.decode_integer().unwrap(), 256);
    }

    #[test]
    fn decode_integer_negative_sign_extends() {
        let mut r = Reader::new(vec![0x02, 0x01, 0xFF]);
        assert_eq!(r.decode_integer().unwrap(), -1);

        let mut r = Reader::new(vec![0x02, 0x02, 0xFF, 0x7F]);
        assert_eq!(r.decode_integer().unwrap(), -129);
    }

    #[test]
    fn decode_integer_wrong_tag() {
        let mut r = Reader::new(vec![0x04, 0x01, 0x00]);
        assert!(r.decode_integer().is_err());
    }

    #[test]
    fn decode_utf8_string() {
        let mut r = Reader::new(vec![0x0C, 0x05, b'G', b'a', b'i', b'n', b'1']);
        assert_eq!(r.decode_utf8().unwrap(), "Gain1");
    }

    #[test]
    fn decode_utf8_tolerates_invalid_sequences() {
        let mut r = Reader::new(vec![0x0C, 0x02, 0xFF, 0xFE]);
        let s = r.decode_utf8().unwrap();
        assert_eq!(s.chars().count(), 2);
    }

    #[test]
    fn decode_oid_components() {
        let mut r = Reader::new(vec![0x0D, 0x03, 0x01, 0x00, 0x07]);
        assert_eq!(r.decode_oid().unwrap(), vec![1, 0, 7]);
    }

    #[test]
    fn decode_oid_empty() {
        let mut r = Reader::new(vec![0x0D, 0x00]);
        assert_eq!(r.decode_oid().unwrap(), Vec::<u8>::new());
    }

    // ---------------------------------------------------------------
    // decode_any
    // ---------------------------------------------------------------

    #[test]
    fn decode_any_boolean() {
        let mut r = Reader::new(vec![0x01, 0x01, 0xFF]);
        assert_eq!(r.decode_any().unwrap(), Value::Boolean(true));

        let mut r = Reader::new(vec![0x01, 0x01, 0x00]);
        assert_eq!(r.decode_any().unwrap(), Value::Boolean(false));
    }

    #[test]
    fn decode_any_integer() {
        let mut r = Reader::new(vec![0x02, 0x01, 0x2A]);
        assert_eq!(r.decode_any().unwrap(), Value::Integer(42));
    }

    #[test]
    fn decode_any_real_base2() {
        // 0x80: binary, positive, base 2, scale 0, one exponent byte.
        // exponent -1, mantissa 3 => 1.5
        let mut r = Reader::new(vec![0x09, 0x03, 0x80, 0xFF, 0x03]);
        assert_eq!(r.decode_any().unwrap(), Value::Real(1.5));
    }

    #[test]
    fn decode_any_real_zero_length() {
        let mut r = Reader::new(vec![0x09, 0x00]);
        assert_eq!(r.decode_any().unwrap(), Value::Real(0.0));
    }

    #[test]
    fn decode_any_real_negative() {
        // Sign bit set: -(2 * 2^1) = -4
        let mut r = Reader::new(vec![0x09, 0x03, 0xC0, 0x01, 0x02]);
        assert_eq!(r.decode_any().unwrap(), Value::Real(-4.0));
    }

    #[test]
    fn decode_any_string() {
        let mut r = Reader::new(vec![0x0C, 0x02, b'd', b'B']);
        assert_eq!(r.decode_any().unwrap(), Value::String("dB".into()));
    }

    #[test]
    fn decode_any_unknown_tag_preserves_contents() {
        let mut r = Reader::new(vec![0x04, 0x02, 0xDE, 0xAD]);
        assert_eq!(r.decode_any().unwrap(), Value::Unknown(vec![0xDE, 0xAD]));
    }

    #[test]
    fn decode_any_consumes_exactly_one_value() {
        let mut r = Reader::new(vec![0x02, 0x01, 0x05, 0x0C, 0x01, b'x']);
        assert_eq!(r.decode_any().unwrap(), Value::Integer(5));
        assert_eq!(r.decode_any().unwrap(), Value::String("x".into()));
        assert!(r.is_empty());
    }

    // ---------------------------------------------------------------
    // pick_reader
    // ---------------------------------------------------------------

    #[test]
    fn pick_reader_selects_the_non_empty_one() {
        let a = Reader::new(Vec::new());
        let b = Reader::new(vec![0x01]);
        let picked = pick_reader(vec![a, b]).unwrap();
        assert_eq!(picked.remaining(), &[0x01]);
    }

    #[test]
    fn pick_reader_all_empty_yields_empty() {
        let picked = pick_reader(vec![Reader::default(), Reader::default()]).unwrap();
        assert!(picked.is_empty());
    }

    #[test]
    fn pick_reader_two_non_empty_is_residual_error() {
        let a = Reader::new(vec![0x01]);
        let b = Reader::new(vec![0x02]);
        assert!(matches!(
            pick_reader(vec![a, b]),
            Err(Error::DecoderResidual(_))
        ));
    }

    #[test]
    fn universal_class_is_identity() {
        let mut r = Reader::new(vec![0x31, 0x00]);
        let (sub, open) = r.read_tagged(0x31, universal).unwrap();
        assert!(!open);
        assert!(sub.is_empty());
    }
}
