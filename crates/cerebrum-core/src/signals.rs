//! C1 — Signal Buffer & Sequence Builder.
//!
//! Owns a bounded ring buffer of [`AtomicSignal`]s and periodically
//! materializes a [`DynamicSequence`] of normalized statistical features.
//! Exclusively owned by the orchestrator's pipeline thread; no other
//! component reaches into the buffer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use std::collections::VecDeque;
use std::time::Duration;

pub const STAT_FEATURE_LEN: usize = 18;
pub const LATENT_DIM: usize = 3;
const CAPACITY: usize = 1000;
const REBUILD_INTERVAL_US: u64 = 500_000;
const REBUILD_GROWTH_FRACTION: f64 = 0.2;
const MAX_INTERVAL_MS: f64 = 10_000.0;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("feature vector length mismatch: expected {expected}, got {got}")]
    FeatureLengthMismatch { expected: usize, got: usize },
    #[error("timestamp went backwards: last={last_us} new={new_us}")]
    NonMonotonicTimestamp { last_us: u64, new_us: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sensor {
    Keyboard,
    Mouse,
    Display,
    Battery,
    Network,
    Microphone,
    Camera,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEventType {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyClass {
    Alphanumeric,
    Control,
    Whitespace,
    Punctuation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseEventType {
    Move,
    ButtonDown,
    ButtonUp,
    Scroll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    None,
    Left,
    Right,
    Middle,
}

/// Sensor-tagged payload; exactly one variant is populated per signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SignalPayload {
    Keyboard {
        key_class: KeyClass,
        event: KeyEventType,
        is_alphanumeric: bool,
    },
    Mouse {
        dx: f32,
        dy: f32,
        button: MouseButton,
        event: MouseEventType,
    },
    Display {
        brightness: u8,
        on: bool,
    },
    Battery {
        percentage: u8,
        charging: bool,
    },
    Network {
        bandwidth_kbps: f32,
        active: bool,
    },
    Microphone {
        level: f32,
        frequency_hz: f32,
        speech_detected: bool,
    },
    Camera {
        lux: f32,
        face_detected: bool,
        motion_detected: bool,
        object_count: u16,
    },
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AtomicSignal {
    pub timestamp_us: u64,
    pub sensor: Sensor,
    pub payload: SignalPayload,
    pub app_fingerprint: u16,
}

/// Windowed summary consumed read-only by C2–C8, mutated only by C1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicSequence {
    pub stat_features: [f32; STAT_FEATURE_LEN],
    pub latent: [f32; LATENT_DIM],
    pub battery_pct: u8,
    pub battery_charging: bool,
    pub display_on: bool,
    pub network_active: bool,
    pub app_fingerprint: u16,
    pub last_updated_us: u64,
}

impl Default for DynamicSequence {
    fn default() -> Self {
        Self {
            stat_features: [0.0; STAT_FEATURE_LEN],
            latent: [0.0; LATENT_DIM],
            battery_pct: 100,
            battery_charging: false,
            display_on: true,
            network_active: false,
            app_fingerprint: 0,
            last_updated_us: 0,
        }
    }
}

pub struct SignalBuffer {
    ring: VecDeque<AtomicSignal>,
    capacity: usize,
    last_rebuild_us: u64,
    size_at_last_rebuild: usize,
    current: DynamicSequence,
    last_timestamp_us: u64,
}

impl Default for SignalBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBuffer {
    pub fn new() -> Self {
        Self {
            ring: VecDeque::with_capacity(CAPACITY),
            capacity: CAPACITY,
            last_rebuild_us: 0,
            size_at_last_rebuild: 0,
            current: DynamicSequence::default(),
            last_timestamp_us: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Appends a signal, evicting the oldest entry if at capacity.
    pub fn add_signal(&mut self, sig: AtomicSignal) -> Result<(), SignalError> {
        if sig.timestamp_us < self.last_timestamp_us {
            tracing::warn!(
                last_us = self.last_timestamp_us,
                new_us = sig.timestamp_us,
                "dropping non-monotonic signal"
            );
            return Err(SignalError::NonMonotonicTimestamp {
                last_us: self.last_timestamp_us,
                new_us: sig.timestamp_us,
            });
        }
        self.last_timestamp_us = sig.timestamp_us;

        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(sig);
        Ok(())
    }

    /// Whether the rebuild trigger conditions (§4.1) currently hold.
    pub fn should_rebuild(&self, now_us: u64) -> bool {
        if self.ring.is_empty() {
            return false;
        }
        let elapsed = now_us.saturating_sub(self.last_rebuild_us);
        let grown = self.ring.len() as f64
            >= self.size_at_last_rebuild as f64 + self.capacity as f64 * REBUILD_GROWTH_FRACTION;
        elapsed > REBUILD_INTERVAL_US || grown
    }

    pub fn current_sequence(&self) -> &DynamicSequence {
        &self.current
    }

    /// Walks the buffer once, computing normalized statistical features.
    /// Empty buffer yields a zero-vector sequence (caller then skips C2).
    pub fn rebuild(&mut self, now_us: u64) -> &DynamicSequence {
        self.last_rebuild_us = now_us;
        self.size_at_last_rebuild = self.ring.len();

        if self.ring.is_empty() {
            self.current = DynamicSequence::default();
            self.current.last_updated_us = now_us;
            return &self.current;
        }

        let mut key_intervals_ms: Vec<f64> = Vec::new();
        let mut last_key_us: Option<u64> = None;
        let mut alphanumeric = 0u32;
        let mut control = 0u32;
        let mut key_total = 0u32;
        let mut mouse_intensity_sum = 0f64;
        let mut mouse_samples = 0u32;
        let mut clicks = 0u32;
        let mut brightness_sum = 0f64;
        let mut brightness_samples = 0u32;
        let mut battery_delta_sum = 0f64;
        let mut last_battery: Option<u8> = None;
        let mut bandwidth_sum = 0f64;
        let mut bandwidth_samples = 0u32;

        let mut battery_pct = self.current.battery_pct;
        let mut battery_charging = self.current.battery_charging;
        let mut display_on = self.current.display_on;
        let mut network_active = self.current.network_active;
        let mut app_fingerprint = self.current.app_fingerprint;

        for sig in self.ring.iter() {
            app_fingerprint = sig.app_fingerprint;
            match sig.payload {
                SignalPayload::Keyboard {
                    key_class,
                    is_alphanumeric,
                    ..
                } => {
                    key_total += 1;
                    if is_alphanumeric {
                        alphanumeric += 1;
                    }
                    if matches!(key_class, KeyClass::Control) {
                        control += 1;
                    }
                    if let Some(last) = last_key_us {
                        key_intervals_ms.push((sig.timestamp_us.saturating_sub(last)) as f64 / 1000.0);
                    }
                    last_key_us = Some(sig.timestamp_us);
                }
                SignalPayload::Mouse { dx, dy, event, .. } => {
                    mouse_intensity_sum += dx.abs() as f64 + dy.abs() as f64;
                    mouse_samples += 1;
                    if matches!(event, MouseEventType::ButtonDown) {
                        clicks += 1;
                    }
                }
                SignalPayload::Display { brightness, on } => {
                    brightness_sum += brightness as f64;
                    brightness_samples += 1;
                    display_on = on;
                }
                SignalPayload::Battery { percentage, charging } => {
                    if let Some(last) = last_battery {
                        battery_delta_sum += (percentage as i16 - last as i16).unsigned_abs() as f64;
                    }
                    last_battery = Some(percentage);
                    battery_pct = percentage;
                    battery_charging = charging;
                }
                SignalPayload::Network { bandwidth_kbps, active } => {
                    bandwidth_sum += bandwidth_kbps as f64;
                    bandwidth_samples += 1;
                    network_active = active;
                }
                SignalPayload::Microphone { .. } | SignalPayload::Camera { .. } | SignalPayload::System => {}
            }
        }

        let (interval_mean, interval_stdev) = mean_stdev(&key_intervals_ms);
        let alphanumeric_ratio = ratio(alphanumeric, key_total);
        let control_ratio = ratio(control, key_total);
        let mouse_intensity = if mouse_samples > 0 {
            mouse_intensity_sum / mouse_samples as f64
        } else {
            0.0
        };
        let click_rate = ratio(clicks, mouse_samples.max(1));
        let brightness_mean = if brightness_samples > 0 {
            brightness_sum / brightness_samples as f64
        } else {
            0.0
        };
        let battery_delta_mean = if last_battery.is_some() {
            battery_delta_sum / self.ring.len() as f64
        } else {
            0.0
        };
        let bandwidth_mean = if bandwidth_samples > 0 {
            bandwidth_sum / bandwidth_samples as f64
        } else {
            0.0
        };

        let mut features = [0.0f32; STAT_FEATURE_LEN];
        features[0] = normalize_interval(interval_mean);
        features[1] = normalize_interval(interval_stdev);
        features[2] = clamp01(alphanumeric_ratio as f32);
        features[3] = clamp01(control_ratio as f32);
        features[4] = clamp01((mouse_intensity / 500.0) as f32);
        features[5] = clamp01(click_rate as f32);
        features[6] = clamp01((brightness_mean / 255.0) as f32);
        features[7] = clamp01(battery_delta_mean as f32 / 100.0);
        features[8] = clamp01((bandwidth_mean / 15000.0) as f32);
        features[9] = clamp01(app_fingerprint as f32 / 65535.0);
        // Slots 10..18 reserved for mic/camera aggregates; left at zero until
        // an external mic/camera pipeline populates them.

        self.current = DynamicSequence {
            stat_features: features,
            latent: self.current.latent,
            battery_pct,
            battery_charging,
            display_on,
            network_active,
            app_fingerprint,
            last_updated_us: now_us,
        };
        &self.current
    }

    pub fn set_latent(&mut self, latent: [f32; LATENT_DIM]) {
        self.current.latent = latent;
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_micros(REBUILD_INTERVAL_US)
    }
}

fn ratio(n: u32, d: u32) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

fn clamp01(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

fn normalize_interval(ms: f64) -> f32 {
    let num = (ms / 1000.0 + 1.0).log10();
    let denom = (MAX_INTERVAL_MS / 1000.0 + 1.0).log10();
    clamp01((num / denom) as f32)
}

fn mean_stdev(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(ts: u64, payload: SignalPayload) -> AtomicSignal {
        AtomicSignal {
            timestamp_us: ts,
            sensor: Sensor::System,
            payload,
            app_fingerprint: 42,
        }
    }

    #[test]
    fn empty_buffer_yields_zero_vector() {
        let mut buf = SignalBuffer::new();
        let seq = buf.rebuild(1_000_000);
        assert_eq!(seq.stat_features, [0.0; STAT_FEATURE_LEN]);
    }

    #[test]
    fn eviction_at_capacity_keeps_latest() {
        let mut buf = SignalBuffer::new();
        for i in 0..(CAPACITY as u64 + 10) {
            buf.add_signal(sig(i * 10, SignalPayload::System)).unwrap();
        }
        assert_eq!(buf.len(), CAPACITY);
    }

    #[test]
    fn rebuild_trigger_on_elapsed_time() {
        let buf = SignalBuffer::new();
        assert!(!buf.should_rebuild(100));
    }

    #[test]
    fn non_monotonic_timestamp_rejected() {
        let mut buf = SignalBuffer::new();
        buf.add_signal(sig(1000, SignalPayload::System)).unwrap();
        let err = buf.add_signal(sig(500, SignalPayload::System));
        assert!(err.is_err());
    }

    #[test]
    fn features_stay_within_unit_interval() {
        let mut buf = SignalBuffer::new();
        for i in 0..50 {
            buf.add_signal(sig(
                i * 10_000,
                SignalPayload::Keyboard {
                    key_class: KeyClass::Alphanumeric,
                    event: KeyEventType::Down,
                    is_alphanumeric: true,
                },
            ))
            .unwrap();
        }
        let seq = buf.rebuild(600_000);
        for f in seq.stat_features {
            assert!((0.0..=1.0).contains(&f));
        }
    }
}
