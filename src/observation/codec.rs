//! Observation TLV codec.
//!
//! ```text
//! ┌───────┬─────────┬───────────────────────────────────────────────────┐
//! │ class │ len u16 │ body                                              │
//! │  1B   │   2B    │ flags u16                                         │
//! │       │         │ handle  [0x00010921][2][id]                       │
//! │       │         │ type    [0x0001092F][4][code]      flag 0x0001    │
//! │       │         │ time    [0x00010990][8][timestamp] flag 0x0002    │
//! │       │         │ patient u8                         flag 0x0020    │
//! │       │         │ supplemental count u8 + u32s       flag 0x0040    │
//! │       │         │ value bytes (per class)                           │
//! └───────┴─────────┴───────────────────────────────────────────────────┘
//! ```
//!
//! Decoding is tolerant: an attribute whose code or length differs from
//! what the layout expects is logged and parsed using the declared
//! length. Only running out of bytes, an undecodable class byte or bundles
//! nested past [`MAX_BUNDLE_DEPTH`] fail.

use log::warn;

use crate::bytes::{ByteReader, ByteWriter, decode_float, float_precision};
use crate::clock::Timestamp;
use crate::error::DecodeError;

use super::{
    NumericComponent, Observation, ObservationClass, ObservationType, ObservationValue,
    SampleArray, TlvEntry, TlvValue, UnitCode,
};

// ── Attribute codes ──────────────────────────────────────────

pub const ATTR_HANDLE: u32 = 0x0001_0921;
pub const ATTR_TYPE: u32 = 0x0001_092F;
pub const ATTR_TIMESTAMP: u32 = 0x0001_0990;
pub const ATTR_UNIT: u32 = 0x0001_0996;
pub const ATTR_NUMERIC_VALUE: u32 = 0x0001_0A56;
pub const ATTR_SAMPLE_ARRAY_VALUE: u32 = 0x0001_096E;

// ── Header flags ─────────────────────────────────────────────

pub const FLAG_TYPE_PRESENT: u16 = 0x0001;
pub const FLAG_TIMESTAMP_PRESENT: u16 = 0x0002;
pub const FLAG_PATIENT_PRESENT: u16 = 0x0020;
pub const FLAG_SUPPLEMENTAL_PRESENT: u16 = 0x0040;

/// Component value type tag for numeric compound members.
const COMPONENT_NUMERIC: u8 = 1;

/// Precision of the sample-array header FLOATs.
const SAMPLE_HEADER_PRECISION: u8 = 2;

pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Deepest bundle nesting [`decode`] follows.
pub const MAX_BUNDLE_DEPTH: u8 = 8;

// ── Encode ───────────────────────────────────────────────────

/// Encode `obs`. Bundled observations omit their timestamp.
pub fn encode(obs: &Observation, bundled: bool) -> Vec<u8> {
    let mut flags = 0u16;
    if obs.kind != ObservationType::Unknown {
        flags |= FLAG_TYPE_PRESENT;
    }
    if !bundled {
        flags |= FLAG_TIMESTAMP_PRESENT;
    }
    if obs.patient_id.is_some() {
        flags |= FLAG_PATIENT_PRESENT;
    }
    if !obs.supplemental_info.is_empty() {
        flags |= FLAG_SUPPLEMENTAL_PRESENT;
    }

    let mut body = ByteWriter::with_capacity(64);
    body.u16(flags);
    attribute(&mut body, ATTR_HANDLE, &obs.id.to_le_bytes());
    if flags & FLAG_TYPE_PRESENT != 0 {
        attribute(&mut body, ATTR_TYPE, &obs.kind.code().to_le_bytes());
    }
    if flags & FLAG_TIMESTAMP_PRESENT != 0 {
        attribute(&mut body, ATTR_TIMESTAMP, &obs.timestamp.to_bytes());
    }
    if let Some(patient) = obs.patient_id {
        body.u8(patient);
    }
    if flags & FLAG_SUPPLEMENTAL_PRESENT != 0 {
        let info = capped(&obs.supplemental_info, "supplemental info");
        body.u8(info.len() as u8);
        for kind in info {
            body.u32(kind.code());
        }
    }
    encode_value(&mut body, &obs.value);

    let body = body.into_vec();
    let len = u16::try_from(body.len()).unwrap_or_else(|_| {
        warn!(
            "OBS: body of {} bytes exceeds the length field, saturating",
            body.len()
        );
        u16::MAX
    });

    let mut out = ByteWriter::with_capacity(body.len() + 3);
    out.u8(obs.class().as_u8()).u16(len).bytes(&body);
    out.into_vec()
}

/// Stored-record framing: `record_number u32 ++ observation`.
pub fn encode_stored(record_number: u32, obs: &Observation) -> Vec<u8> {
    let encoded = encode(obs, false);
    let mut out = ByteWriter::with_capacity(encoded.len() + 4);
    out.u32(record_number).bytes(&encoded);
    out.into_vec()
}

fn attribute(w: &mut ByteWriter, code: u32, value: &[u8]) {
    let len = u16::try_from(value.len()).unwrap_or_else(|_| {
        warn!(
            "OBS: attribute 0x{:08X} of {} bytes exceeds the length field, saturating",
            code,
            value.len()
        );
        u16::MAX
    });
    w.u32(code).u16(len).bytes(value);
}

/// First 255 entries of a u8-counted list.
fn capped<'a, T>(items: &'a [T], what: &str) -> &'a [T] {
    if items.len() > usize::from(u8::MAX) {
        warn!("OBS: {} has {} entries, sending 255", what, items.len());
        &items[..usize::from(u8::MAX)]
    } else {
        items
    }
}

fn encode_value(w: &mut ByteWriter, value: &ObservationValue) {
    match value {
        ObservationValue::SimpleNumeric {
            value,
            precision,
            unit,
        } => {
            attribute(w, ATTR_UNIT, &unit.code().to_le_bytes());
            w.u32(ATTR_NUMERIC_VALUE).u16(4).float(*value, *precision);
        }
        ObservationValue::CompoundNumeric {
            components,
            precision,
        } => {
            let components = capped(components, "compound");
            w.u8(components.len() as u8);
            for c in components {
                w.u32(c.kind.code())
                    .u8(COMPONENT_NUMERIC)
                    .u32(c.unit.code())
                    .float(c.value, *precision);
            }
        }
        ObservationValue::SampleArray(sa) => {
            attribute(w, ATTR_UNIT, &sa.unit.code().to_le_bytes());
            let (min, max) = sa.scaled_extremes();
            let mut inner = ByteWriter::with_capacity(sa.samples.len() + 26);
            inner
                .float(sa.scale_factor, SAMPLE_HEADER_PRECISION)
                .float(sa.scale_offset, SAMPLE_HEADER_PRECISION)
                .i32(min)
                .i32(max)
                .float(sa.sample_period_secs, SAMPLE_HEADER_PRECISION)
                .u8(sa.samples_per_period)
                .u8(sa.bytes_per_sample)
                .u32(sa.samples.len() as u32)
                .bytes(&sa.samples);
            let inner = inner.into_vec();
            attribute(w, ATTR_SAMPLE_ARRAY_VALUE, &inner);
        }
        ObservationValue::SimpleDiscrete(code) => {
            w.u32(*code);
        }
        ObservationValue::String(text) => {
            let text = truncate_utf8(text, MAX_STRING_LEN);
            w.u16(text.len() as u16).bytes(text.as_bytes());
        }
        ObservationValue::Tlv(entries) => {
            let entries = capped(entries, "TLV");
            w.u8(entries.len() as u8);
            for entry in entries {
                let bytes = match &entry.value {
                    TlvValue::Utf8(s) => truncate_utf8(s, MAX_STRING_LEN).as_bytes().to_vec(),
                    TlvValue::Uint32(v) => v.to_le_bytes().to_vec(),
                    TlvValue::Float32(v) => v.to_le_bytes().to_vec(),
                    TlvValue::Struct(raw) => raw[..raw.len().min(MAX_STRING_LEN)].to_vec(),
                };
                w.u32(entry.kind.code())
                    .u16(bytes.len() as u16)
                    .u8(entry.value.format())
                    .bytes(&bytes);
            }
        }
        ObservationValue::CompoundDiscreteEvent(codes) => {
            let codes = capped(codes, "event list");
            w.u8(codes.len() as u8);
            for code in codes {
                w.u32(*code);
            }
        }
        ObservationValue::CompoundState {
            supported_mask,
            state_or_event,
            value,
        } => {
            let width = supported_mask.len().min(usize::from(u8::MAX));
            if state_or_event.len() != width || value.len() != width {
                warn!("OBS: compound state widths differ, padding to {}", width);
            }
            w.u8(width as u8);
            for field in [supported_mask, state_or_event, value] {
                let mut padded = field.clone();
                padded.resize(width, 0);
                w.bytes(&padded);
            }
        }
        ObservationValue::Bundle(children) => {
            let children = capped(children, "bundle");
            w.u8(children.len() as u8);
            for child in children {
                w.bytes(&encode(child, true));
            }
        }
    }
}

/// Longest prefix of `text` within `max` bytes ending on a char boundary.
fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ── Decode ───────────────────────────────────────────────────

pub fn decode(bytes: &[u8]) -> Result<Observation, DecodeError> {
    let mut r = ByteReader::new(bytes);
    let obs = decode_from(&mut r, None, 0)?;
    if r.remaining() > 0 {
        warn!("OBS: {} trailing bytes after observation", r.remaining());
    }
    Ok(obs)
}

/// Split the stored-record framing written by [`encode_stored`].
pub fn decode_stored(bytes: &[u8]) -> Result<(u32, Observation), DecodeError> {
    let mut r = ByteReader::new(bytes);
    let record_number = r.u32()?;
    let obs = decode_from(&mut r, None, 0)?;
    Ok((record_number, obs))
}

fn decode_from(
    r: &mut ByteReader<'_>,
    inherited: Option<Timestamp>,
    depth: u8,
) -> Result<Observation, DecodeError> {
    if depth > MAX_BUNDLE_DEPTH {
        return Err(DecodeError::NestedTooDeep(MAX_BUNDLE_DEPTH));
    }
    let class_byte = r.u8()?;
    let class = ObservationClass::from_u8(class_byte);
    if class == ObservationClass::Unknown {
        return Err(DecodeError::UnsupportedClass(class_byte));
    }
    let len = usize::from(r.u16()?);
    let mut b = ByteReader::new(r.take(len)?);

    let flags = b.u16()?;
    let id = ByteReader::new(expect_attribute(&mut b, ATTR_HANDLE, 2, "handle")?).u16()?;

    let kind = if flags & FLAG_TYPE_PRESENT != 0 {
        let code = ByteReader::new(expect_attribute(&mut b, ATTR_TYPE, 4, "type")?).u32()?;
        ObservationType::from_code(code)
    } else {
        ObservationType::Unknown
    };

    let timestamp = if flags & FLAG_TIMESTAMP_PRESENT != 0 {
        Timestamp::from_bytes(expect_attribute(
            &mut b,
            ATTR_TIMESTAMP,
            Timestamp::ENCODED_LEN,
            "timestamp",
        )?)?
    } else {
        inherited.unwrap_or_default()
    };

    let patient_id = if flags & FLAG_PATIENT_PRESENT != 0 {
        Some(b.u8()?)
    } else {
        None
    };

    let mut supplemental_info = Vec::new();
    if flags & FLAG_SUPPLEMENTAL_PRESENT != 0 {
        let count = b.u8()?;
        for _ in 0..count {
            supplemental_info.push(ObservationType::from_code(b.u32()?));
        }
    }

    let value = decode_value(class, &mut b, timestamp, depth)?;
    if b.remaining() > 0 {
        warn!(
            "OBS: {} unread bytes in {:?} body",
            b.remaining(),
            class
        );
    }

    Ok(Observation {
        id,
        kind,
        timestamp,
        patient_id,
        supplemental_info,
        value,
    })
}

/// Read one `[code u32][len u16][value]` attribute, warning on mismatch.
fn expect_attribute<'a>(
    r: &mut ByteReader<'a>,
    code: u32,
    len: usize,
    name: &str,
) -> Result<&'a [u8], DecodeError> {
    let found_code = r.u32()?;
    let found_len = usize::from(r.u16()?);
    if found_code != code {
        warn!(
            "OBS: {} attribute code 0x{:08X}, expected 0x{:08X}",
            name, found_code, code
        );
    }
    if found_len != len {
        warn!("OBS: {} attribute length {}, expected {}", name, found_len, len);
    }
    r.take(found_len)
}

fn decode_value(
    class: ObservationClass,
    b: &mut ByteReader<'_>,
    timestamp: Timestamp,
    depth: u8,
) -> Result<ObservationValue, DecodeError> {
    let value = match class {
        ObservationClass::SimpleNumeric => {
            let unit = ByteReader::new(expect_attribute(b, ATTR_UNIT, 4, "unit")?).u32()?;
            let raw = ByteReader::new(expect_attribute(b, ATTR_NUMERIC_VALUE, 4, "value")?)
                .float_raw()?;
            ObservationValue::SimpleNumeric {
                value: decode_float(raw),
                precision: float_precision(raw),
                unit: UnitCode::from_code(unit),
            }
        }
        ObservationClass::CompoundNumeric => {
            let count = b.u8()?;
            let mut components = Vec::with_capacity(usize::from(count));
            let mut precision = 0;
            for _ in 0..count {
                let kind = ObservationType::from_code(b.u32()?);
                let value_type = b.u8()?;
                if value_type != COMPONENT_NUMERIC {
                    warn!("OBS: component value type {}, expected numeric", value_type);
                }
                let unit = UnitCode::from_code(b.u32()?);
                let raw = b.float_raw()?;
                precision = float_precision(raw);
                components.push(NumericComponent {
                    kind,
                    unit,
                    value: decode_float(raw),
                });
            }
            ObservationValue::CompoundNumeric {
                components,
                precision,
            }
        }
        ObservationClass::SampleArray => {
            let unit = ByteReader::new(expect_attribute(b, ATTR_UNIT, 4, "unit")?).u32()?;
            let code = b.u32()?;
            if code != ATTR_SAMPLE_ARRAY_VALUE {
                warn!("OBS: sample array attribute code 0x{:08X}", code);
            }
            let inner_len = usize::from(b.u16()?);
            let mut inner = ByteReader::new(b.take(inner_len)?);
            let scale_factor = decode_float(inner.float_raw()?);
            let scale_offset = decode_float(inner.float_raw()?);
            let _min = inner.i32()?;
            let _max = inner.i32()?;
            let sample_period_secs = decode_float(inner.float_raw()?);
            let samples_per_period = inner.u8()?;
            let bytes_per_sample = inner.u8()?;
            let count = inner.u32()? as usize;
            let samples = inner.take(count)?.to_vec();
            ObservationValue::SampleArray(SampleArray {
                unit: UnitCode::from_code(unit),
                samples,
                scale_factor,
                scale_offset,
                sample_period_secs,
                samples_per_period,
                bytes_per_sample,
            })
        }
        ObservationClass::SimpleDiscrete => ObservationValue::SimpleDiscrete(b.u32()?),
        ObservationClass::String => {
            let len = usize::from(b.u16()?);
            ObservationValue::String(utf8_lossy(b.take(len)?, "string"))
        }
        ObservationClass::Tlv => {
            let count = b.u8()?;
            let mut entries = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                let kind = ObservationType::from_code(b.u32()?);
                let len = usize::from(b.u16()?);
                let format = b.u8()?;
                let data = b.take(len)?;
                let value = match format {
                    TlvValue::FORMAT_UTF8 => TlvValue::Utf8(utf8_lossy(data, "TLV")),
                    TlvValue::FORMAT_UINT32 => TlvValue::Uint32(ByteReader::new(data).u32()?),
                    TlvValue::FORMAT_FLOAT32 => {
                        TlvValue::Float32(f32::from_bits(ByteReader::new(data).u32()?))
                    }
                    TlvValue::FORMAT_STRUCT => TlvValue::Struct(data.to_vec()),
                    other => {
                        warn!("OBS: unknown TLV format 0x{:02X}, kept as struct", other);
                        TlvValue::Struct(data.to_vec())
                    }
                };
                entries.push(TlvEntry { kind, value });
            }
            ObservationValue::Tlv(entries)
        }
        ObservationClass::CompoundDiscreteEvent => {
            let count = b.u8()?;
            let mut codes = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                codes.push(b.u32()?);
            }
            ObservationValue::CompoundDiscreteEvent(codes)
        }
        ObservationClass::CompoundState => {
            let width = usize::from(b.u8()?);
            ObservationValue::CompoundState {
                supported_mask: b.take(width)?.to_vec(),
                state_or_event: b.take(width)?.to_vec(),
                value: b.take(width)?.to_vec(),
            }
        }
        ObservationClass::Bundle => {
            let count = b.u8()?;
            let mut children = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                children.push(decode_from(b, Some(timestamp), depth + 1)?);
            }
            ObservationValue::Bundle(children)
        }
        ObservationClass::Unknown => return Err(DecodeError::UnsupportedClass(class.as_u8())),
    };
    Ok(value)
}

fn utf8_lossy(bytes: &[u8], what: &str) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => {
            warn!("OBS: invalid UTF-8 in {}, decoding lossily", what);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
