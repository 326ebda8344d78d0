//! Status LED pattern for a fatal halt.
//!
//! One cycle is `code` long pulses, a gap, then `total_stages` short pulses,
//! followed by a pause before the cycle repeats.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use embassy_time::Duration;

const CODE_ON: Duration = Duration::from_millis(600);
const STAGE_ON: Duration = Duration::from_millis(150);
const PULSE_OFF: Duration = Duration::from_millis(300);
const GROUP_GAP: Duration = Duration::from_millis(1_000);
const CYCLE_PAUSE: Duration = Duration::from_millis(2_000);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pulse {
    pub on: Duration,
    pub off: Duration,
}

/// One cycle of the halt pattern for `code` of `total_stages`.
pub fn halt_pattern(code: u8, total_stages: u8) -> impl Iterator<Item = Pulse> {
    let code_group = (1..=code).map(move |index| Pulse {
        on: CODE_ON,
        off: if index == code { GROUP_GAP } else { PULSE_OFF },
    });
    let stage_group = (1..=total_stages).map(move |index| Pulse {
        on: STAGE_ON,
        off: if index == total_stages {
            CYCLE_PAUSE
        } else {
            PULSE_OFF
        },
    });
    code_group.chain(stage_group)
}
