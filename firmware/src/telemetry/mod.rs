//! Detection telemetry for the firmware.
//!
//! Events land in the shared ring from `detect-core` and are mirrored to
//! defmt on the target (stdout on host builds) for bring-up.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use detect_core::telemetry::{DetectEvent, TelemetryRecorder, TelemetrySink};

use crate::instant::FirmwareInstant;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

pub type FirmwareRecorder = TelemetryRecorder<FirmwareInstant, TELEMETRY_RING_CAPACITY>;

pub struct LogTelemetry {
    recorder: FirmwareRecorder,
}

impl LogTelemetry {
    pub const fn new() -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
        }
    }

    pub fn recorder(&self) -> &FirmwareRecorder {
        &self.recorder
    }
}

impl Default for LogTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink<FirmwareInstant> for LogTelemetry {
    fn record(&mut self, timestamp: FirmwareInstant, event: DetectEvent) {
        self.recorder.push(timestamp, event);
        let elapsed_us = self
            .recorder
            .latest()
            .and_then(|record| record.elapsed_since_previous)
            .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
        emit_log(event, timestamp.as_micros(), elapsed_us);
    }
}

#[cfg(target_os = "none")]
fn emit_log(event: DetectEvent, timestamp_us: u64, delta_us: Option<u64>) {
    let code = event.to_raw();
    if let Some(delta) = delta_us {
        defmt::info!(
            "detect {=u16:#x} {} t={}us Δ={}us",
            code,
            defmt::Display2Format(&event),
            timestamp_us,
            delta
        );
    } else {
        defmt::info!(
            "detect {=u16:#x} {} t={}us",
            code,
            defmt::Display2Format(&event),
            timestamp_us
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(event: DetectEvent, timestamp_us: u64, delta_us: Option<u64>) {
    let code = event.to_raw();
    if let Some(delta) = delta_us {
        println!("detect {code:#x} {event} t={timestamp_us}us Δ={delta}us");
    } else {
        println!("detect {code:#x} {event} t={timestamp_us}us");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detect_core::protocol::ProtocolEvent;

    #[test]
    fn events_are_retained_with_spacing() {
        let mut telemetry = LogTelemetry::new();
        telemetry.record(
            FirmwareInstant::from_micros(100),
            DetectEvent::AttemptStarted { attempt: 1 },
        );
        telemetry.record(
            FirmwareInstant::from_micros(4_100),
            DetectEvent::Protocol(ProtocolEvent::ReadBlockZero),
        );

        let latest = telemetry.recorder().latest().unwrap();
        assert_eq!(
            latest.elapsed_since_previous,
            Some(core::time::Duration::from_millis(4))
        );
        assert_eq!(telemetry.recorder().len(), 2);
    }
}
