//! Byte helpers shared by every codec in the crate.
//!
//! - hex / ascii rendering for logs, hex parsing for the simulator
//! - sub-slice search
//! - [`ByteWriter`] / [`ByteReader`]: little-endian field access
//! - IEEE 11073 32-bit FLOAT packing
//!
//! ```text
//!  FLOAT (u32, little-endian on the wire)
//! ┌──────────────┬──────────────────────────────┐
//! │ exponent i8  │   mantissa i24 (two's comp.) │
//! │  bits 31..24 │        bits 23..0            │
//! └──────────────┴──────────────────────────────┘
//!  value = mantissa × 10^exponent
//! ```

use std::fmt::Write as _;

use crate::error::DecodeError;

// ── FLOAT special values ─────────────────────────────────────

pub const FLOAT_NAN: u32 = 0x007F_FFFF;
pub const FLOAT_NRES: u32 = 0x0080_0000;
pub const FLOAT_POSITIVE_INFINITY: u32 = 0x007F_FFFE;
pub const FLOAT_NEGATIVE_INFINITY: u32 = 0x0080_0002;

const MANTISSA_MAX: i64 = 0x007F_FFFD;
const MANTISSA_MIN: i64 = -0x007F_FFFD;

/// Most digits after the decimal point an i8 exponent can express (-128).
pub const MAX_FLOAT_PRECISION: u8 = 128;

/// Pack `value` with `precision` digits after the decimal point.
///
/// The mantissa is `round(value * 10^precision)`, never truncated.
/// Precision is clamped to [`MAX_FLOAT_PRECISION`].
pub fn encode_float(value: f64, precision: u8) -> u32 {
    if value.is_nan() {
        return FLOAT_NAN;
    }
    let precision = precision.min(MAX_FLOAT_PRECISION);
    let scaled = (value * 10f64.powi(i32::from(precision))).round();
    if scaled > MANTISSA_MAX as f64 {
        return FLOAT_POSITIVE_INFINITY;
    }
    if scaled < MANTISSA_MIN as f64 {
        return FLOAT_NEGATIVE_INFINITY;
    }
    let mantissa = (scaled as i32 as u32) & 0x00FF_FFFF;
    let exponent = (-i16::from(precision)) as i8 as u8;
    (u32::from(exponent) << 24) | mantissa
}

/// Unpack a FLOAT. Negative exponents divide so decimal values come back exact.
pub fn decode_float(raw: u32) -> f64 {
    match raw {
        FLOAT_NAN | FLOAT_NRES => return f64::NAN,
        FLOAT_POSITIVE_INFINITY => return f64::INFINITY,
        FLOAT_NEGATIVE_INFINITY => return f64::NEG_INFINITY,
        _ => {}
    }
    // Sign-extend the 24-bit mantissa.
    let mantissa = ((raw << 8) as i32 >> 8) as f64;
    let exponent = (raw >> 24) as u8 as i8;
    if exponent < 0 {
        mantissa / 10f64.powi(-i32::from(exponent))
    } else {
        mantissa * 10f64.powi(i32::from(exponent))
    }
}

/// Digits after the decimal point encoded in a FLOAT (0 for non-negative exponents).
pub fn float_precision(raw: u32) -> u8 {
    let exponent = (raw >> 24) as u8 as i8;
    if exponent < 0 { exponent.unsigned_abs() } else { 0 }
}

// ── Rendering / parsing ──────────────────────────────────────

pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// `0x01 0x02 …` rendering used in log lines.
pub fn to_formatted_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "0x{b:02X}");
    }
    out
}

/// Parse a hex string. Whitespace is ignored; odd digit counts are rejected.
pub fn from_hex(text: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}

/// Printable ASCII verbatim, everything else as `.`.
pub fn to_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Index of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ── Writer ───────────────────────────────────────────────────

/// Append-only little-endian writer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Low 48 bits of `value`.
    pub fn u48(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes()[..6]);
        self
    }

    pub fn float(&mut self, value: f64, precision: u8) -> &mut Self {
        self.u32(encode_float(value, precision))
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

// ── Reader ───────────────────────────────────────────────────

/// Cursor over a byte slice. Every read past the end is a [`DecodeError::Truncated`].
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn u48(&mut self) -> Result<u64, DecodeError> {
        let raw: [u8; 6] = self.array()?;
        let mut wide = [0u8; 8];
        wide[..6].copy_from_slice(&raw);
        Ok(u64::from_le_bytes(wide))
    }

    /// Raw FLOAT word; pair with [`decode_float`] / [`float_precision`].
    pub fn float_raw(&mut self) -> Result<u32, DecodeError> {
        self.u32()
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

// ── Tests ────────────────────────────────────────────────────
