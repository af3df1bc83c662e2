//! GHS Features characteristic value.
//!
//! ```text
//! ┌────────┬─────────┬────────────────────────┬──────────────────────────┐
//! │ flags  │ count   │ type codes u32 LE × n  │ device specializations   │
//! │  1B    │  1B     │                        │ (flag 0x01 only)         │
//! └────────┴─────────┴────────────────────────┴──────────────────────────┘
//! ```
//!
//! Blood pressure is the only device specialization advertised.

use log::warn;

use crate::bytes::ByteWriter;
use crate::observation::ObservationType;

/// Device specialization bytes follow the type list.
pub const FLAG_DEVICE_SPECIALIZATIONS: u8 = 0x01;

/// One specialization: MDC_DEV_SPEC_PROFILE_BP, version 1.
pub const BP_SPECIALIZATION: [u8; 4] = [0x01, 0x07, 0x10, 0x01];

pub fn has_device_specializations(types: &[ObservationType]) -> bool {
    types.contains(&ObservationType::BloodPressureNonInvasive)
}

/// Features value advertising `types`.
pub fn encode(types: &[ObservationType]) -> Vec<u8> {
    let types = if types.len() > usize::from(u8::MAX) {
        warn!("GHS: {} feature types, advertising 255", types.len());
        &types[..usize::from(u8::MAX)]
    } else {
        types
    };
    let specialized = has_device_specializations(types);

    let mut w = ByteWriter::with_capacity(2 + types.len() * 4 + BP_SPECIALIZATION.len());
    w.u8(if specialized { FLAG_DEVICE_SPECIALIZATIONS } else { 0 })
        .u8(types.len() as u8);
    for kind in types {
        w.u32(kind.code());
    }
    if specialized {
        w.bytes(&BP_SPECIALIZATION);
    }
    w.into_vec()
}
