//! Observation generator behind the periodic emission tick.
//!
//! Values cycle deterministically through each type's plausible range so
//! a receiver (or a test) can predict every sample.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info};

use crate::clock::Timestamp;
use crate::observation::{
    NumericComponent, Observation, ObservationClass, ObservationType, ObservationValue,
    SampleArray, TlvEntry, TlvValue, UnitCode,
};

/// Steps in one value cycle.
const CYCLE_STEPS: u64 = 10;

const PPG_SAMPLES_PER_SECOND: usize = 50;
const PPG_SECONDS: usize = 5;
const PPG_CYCLES_PER_SECOND: f64 = 1.2;
const PPG_AMPLITUDE: f64 = 100.0;

const ALERT_CODES: [u32; 3] = [0x0002_0001, 0x0002_0002, 0x0002_0003];
const DRUG_NAME: &str = "Insulin";

pub struct ObservationEmitter {
    types: Vec<ObservationType>,
    intervals_ms: BTreeMap<ObservationType, u64>,
    default_period_ms: u64,
    bundled: bool,
    next_handle: u16,
    tick: u64,
}

impl ObservationEmitter {
    pub fn new(types: &[ObservationType], bundled: bool, default_period_ms: u64) -> Self {
        let mut emitter = Self {
            types: Vec::new(),
            intervals_ms: BTreeMap::new(),
            default_period_ms: default_period_ms.max(1),
            bundled,
            next_handle: 1,
            tick: 0,
        };
        for &kind in types {
            emitter.add_type(kind);
        }
        emitter
    }

    // ── Configuration ─────────────────────────────────────────

    pub fn add_type(&mut self, kind: ObservationType) {
        if kind != ObservationType::Unknown && !self.types.contains(&kind) {
            self.types.push(kind);
            info!("EMIT: + {}", kind);
        }
    }

    pub fn remove_type(&mut self, kind: ObservationType) {
        self.types.retain(|&t| t != kind);
        self.intervals_ms.remove(&kind);
        info!("EMIT: - {}", kind);
    }

    pub fn types(&self) -> &[ObservationType] {
        &self.types
    }

    pub fn set_bundled(&mut self, bundled: bool) {
        self.bundled = bundled;
    }

    pub fn is_bundled(&self) -> bool {
        self.bundled
    }

    pub fn set_update_interval(&mut self, kind: ObservationType, millis: u64) {
        self.intervals_ms.insert(kind, millis.max(1));
    }

    /// Smallest update interval among enabled types.
    pub fn period(&self) -> Duration {
        let ms = self
            .types
            .iter()
            .filter_map(|t| self.intervals_ms.get(t).copied())
            .min()
            .unwrap_or(self.default_period_ms);
        Duration::from_millis(ms)
    }

    /// Forget types, intervals and counters.
    pub fn reset(&mut self) {
        self.types.clear();
        self.intervals_ms.clear();
        self.next_handle = 1;
        self.tick = 0;
    }

    // ── Generation ────────────────────────────────────────────

    /// One observation per enabled type (numerics bundled if enabled).
    pub fn generate(&mut self, timestamp: Timestamp) -> Vec<Observation> {
        let phase = (self.tick % CYCLE_STEPS) as f64 / (CYCLE_STEPS - 1) as f64;
        self.tick += 1;

        let kinds = self.types.clone();
        let mut out: Vec<Observation> = kinds
            .into_iter()
            .filter_map(|kind| self.observation_of(kind, phase, timestamp))
            .collect();

        if self.bundled {
            let (numeric, rest): (Vec<_>, Vec<_>) = out.into_iter().partition(|o| {
                matches!(
                    o.class(),
                    ObservationClass::SimpleNumeric | ObservationClass::CompoundNumeric
                )
            });
            out = rest;
            if numeric.len() > 1 {
                let handle = self.handle();
                out.insert(0, Observation::bundle(handle, timestamp, numeric));
            } else {
                out.splice(0..0, numeric);
            }
        }
        debug!("EMIT: generated {} observations", out.len());
        out
    }

    fn handle(&mut self) -> u16 {
        let h = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        h
    }

    fn observation_of(
        &mut self,
        kind: ObservationType,
        phase: f64,
        timestamp: Timestamp,
    ) -> Option<Observation> {
        let value = match kind.value_class() {
            ObservationClass::SimpleNumeric => ObservationValue::SimpleNumeric {
                value: cycle(kind, phase),
                precision: kind.numeric_precision(),
                unit: kind.unit(),
            },
            ObservationClass::CompoundNumeric => ObservationValue::CompoundNumeric {
                components: [
                    ObservationType::BloodPressureSystolic,
                    ObservationType::BloodPressureDiastolic,
                ]
                .into_iter()
                .map(|component| NumericComponent {
                    kind: component,
                    unit: component.unit(),
                    value: cycle(component, phase).round(),
                })
                .collect(),
                precision: 0,
            },
            ObservationClass::SampleArray => ObservationValue::SampleArray(ppg_wave(phase)),
            ObservationClass::SimpleDiscrete => {
                let index = (self.tick as usize) % ALERT_CODES.len();
                ObservationValue::SimpleDiscrete(ALERT_CODES[index])
            }
            ObservationClass::String => ObservationValue::String(DRUG_NAME.to_owned()),
            ObservationClass::Tlv => ObservationValue::Tlv(vec![
                TlvEntry {
                    kind: ObservationType::DrugNameLabel,
                    value: TlvValue::Utf8(DRUG_NAME.to_owned()),
                },
                TlvEntry {
                    kind: ObservationType::DoseDrugBolus,
                    value: TlvValue::Float32(cycle(ObservationType::DoseDrugBolus, phase) as f32),
                },
            ]),
            _ => return None,
        };
        Some(Observation::new(self.handle(), kind, timestamp, value))
    }
}

/// Value at `phase` (0..=1) of `kind`'s sample range, at its precision.
fn cycle(kind: ObservationType, phase: f64) -> f64 {
    let (lo, hi) = kind.sample_range();
    let scale = 10f64.powi(i32::from(kind.numeric_precision()));
    ((lo + (hi - lo) * phase) * scale).round() / scale
}

fn ppg_wave(phase: f64) -> SampleArray {
    let total = PPG_SAMPLES_PER_SECOND * PPG_SECONDS;
    let samples = (0..total)
        .map(|i| {
            let t = i as f64 / PPG_SAMPLES_PER_SECOND as f64;
            let angle = 2.0 * std::f64::consts::PI * (PPG_CYCLES_PER_SECOND * t + phase);
            (angle.sin() * PPG_AMPLITUDE) as i8 as u8
        })
        .collect();
    let mut sa = SampleArray::new(UnitCode::Dimensionless, samples);
    sa.samples_per_period = PPG_SAMPLES_PER_SECOND as u8;
    sa
}
