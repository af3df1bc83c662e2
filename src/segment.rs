//! MTU-aware segmentation of encoded observations.
//!
//! A notification can carry at most `MTU - overhead` bytes, so every
//! encoded observation is sliced into segments with a one-byte header:
//!
//! ```text
//! ┌─────────────────────────────┬─────────────────────┐
//! │ header: seq<<2 | L<<1 | F   │  payload             │
//! │ (1B)                        │  (<= max_payload)    │
//! └─────────────────────────────┴─────────────────────┘
//! ```
//!
//! F marks the first segment of one `segment()` call's output and L the
//! last. The 6-bit sequence number is carried across calls so consecutive
//! messages look like one continuous stream to the receiver; it rolls over
//! from 63 to 0.

use log::debug;

use crate::error::SegmentError;

// ── Constants ────────────────────────────────────────────────

pub const FIRST_SEGMENT: u8 = 0x01;
pub const LAST_SEGMENT: u8 = 0x02;

/// Largest sequence number the 6-bit header field can carry.
pub const MAX_SEQUENCE: u8 = 63;

/// Sequence number a fresh logical session starts from.
pub const INITIAL_SEQUENCE: u8 = 1;

/// Per-notification overhead on the live observation characteristic.
pub const LEGACY_OVERHEAD: usize = 4;

/// Per-notification overhead on the stored-record send handler path.
pub const SEND_HANDLER_OVERHEAD: usize = 5;

const MAX_REASSEMBLY_SIZE: usize = 64 * 1024;

/// Next sequence number after `seq`, rolling 63 over to 0.
pub const fn next_sequence(seq: u8) -> u8 {
    if seq >= MAX_SEQUENCE { 0 } else { seq + 1 }
}

/// Usable payload per segment given every connected central's MTU.
///
/// `None` when nothing is connected.
pub fn max_payload_for(mtus: &[u16], overhead: usize) -> Option<usize> {
    let min = *mtus.iter().min()?;
    Some((min as usize).saturating_sub(overhead).max(1))
}

// ── Segment ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    header: u8,
    payload: Vec<u8>,
}

impl Segment {
    fn new(seq: u8, first: bool, last: bool, payload: &[u8]) -> Self {
        let mut header = (seq & MAX_SEQUENCE) << 2;
        if first {
            header |= FIRST_SEGMENT;
        }
        if last {
            header |= LAST_SEGMENT;
        }
        Self {
            header,
            payload: payload.to_vec(),
        }
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    pub fn sequence(&self) -> u8 {
        self.header >> 2
    }

    pub fn is_first(&self) -> bool {
        self.header & FIRST_SEGMENT != 0
    }

    pub fn is_last(&self) -> bool {
        self.header & LAST_SEGMENT != 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// `[header][payload]`, ready to notify.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Slice `bytes` into segments of at most `max_payload` bytes.
///
/// Returns the segments and the sequence number the next call should
/// start from. An empty buffer still yields one (empty) first+last segment.
pub fn segment(bytes: &[u8], max_payload: usize, start_seq: u8) -> (Vec<Segment>, u8) {
    let max_payload = max_payload.max(1);
    let mut seq = start_seq & MAX_SEQUENCE;

    if bytes.is_empty() {
        return (vec![Segment::new(seq, true, true, &[])], next_sequence(seq));
    }

    let total = bytes.len().div_ceil(max_payload);
    let mut segments = Vec::with_capacity(total);
    for (i, chunk) in bytes.chunks(max_payload).enumerate() {
        segments.push(Segment::new(seq, i == 0, i == total - 1, chunk));
        seq = next_sequence(seq);
    }
    debug!(
        "SEG: {} bytes -> {} segments (max payload {})",
        bytes.len(),
        total,
        max_payload
    );
    (segments, seq)
}

// ── Reassembly ───────────────────────────────────────────────

/// Receiver-side reassembly of a segmented message.
#[derive(Debug, Default)]
pub struct SegmentAssembler {
    data: Vec<u8>,
    expected_seq: u8,
    active: bool,
}

impl SegmentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.expected_seq = 0;
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed one notified segment. Yields the message when the last segment lands.
    pub fn feed(&mut self, segment: &[u8]) -> Result<Option<Vec<u8>>, SegmentError> {
        let (&header, payload) = segment.split_first().ok_or(SegmentError::Empty)?;
        let seq = header >> 2;

        if header & FIRST_SEGMENT != 0 {
            self.reset();
            self.active = true;
        } else if !self.active {
            return Err(SegmentError::NoStart);
        } else if seq != self.expected_seq {
            let expected = self.expected_seq;
            self.reset();
            return Err(SegmentError::Sequence { expected, got: seq });
        }

        if self.data.len() + payload.len() > MAX_REASSEMBLY_SIZE {
            self.reset();
            return Err(SegmentError::Overflow);
        }
        self.data.extend_from_slice(payload);
        self.expected_seq = next_sequence(seq);

        if header & LAST_SEGMENT != 0 {
            self.active = false;
            Ok(Some(core::mem::take(&mut self.data)))
        } else {
            Ok(None)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
