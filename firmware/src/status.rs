#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared detection status for later firmware stages.
//!
//! The detector owns its [`DetectionContext`] while it runs. Once it
//! returns, the result is published here for the glitch stage, which is
//! also the one that sets the detection-complete flag.

use detect_core::controller::{BoardVariant, DetectionContext};
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

const VARIANT_UNKNOWN: u8 = 0;
const VARIANT_MARIKO: u8 = 1;
const VARIANT_ERISTA: u8 = 2;

static BOARD_VARIANT: AtomicU8 = AtomicU8::new(VARIANT_UNKNOWN);
static DETECTION_COMPLETE: AtomicBool = AtomicBool::new(false);

const fn encode_variant(variant: BoardVariant) -> u8 {
    match variant {
        BoardVariant::Mariko => VARIANT_MARIKO,
        BoardVariant::Erista => VARIANT_ERISTA,
    }
}

#[cfg(test)]
const fn decode_variant(raw: u8) -> Option<BoardVariant> {
    match raw {
        VARIANT_MARIKO => Some(BoardVariant::Mariko),
        VARIANT_ERISTA => Some(BoardVariant::Erista),
        _ => None,
    }
}

/// Publishes the context left behind by a successful detection.
pub fn publish(context: &DetectionContext) {
    BOARD_VARIANT.store(encode_variant(context.board_variant()), Ordering::Release);
    DETECTION_COMPLETE.store(context.is_detection_complete(), Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_codes_round_trip() {
        for variant in [BoardVariant::Mariko, BoardVariant::Erista] {
            assert_eq!(decode_variant(encode_variant(variant)), Some(variant));
        }
        assert_eq!(decode_variant(VARIANT_UNKNOWN), None);
    }

    #[test]
    fn published_context_is_visible_to_later_stages() {
        let mut context = DetectionContext::new();
        context.set_board_variant(BoardVariant::Erista);

        publish(&context);
        assert_eq!(
            decode_variant(BOARD_VARIANT.load(Ordering::Acquire)),
            Some(BoardVariant::Erista)
        );
        assert!(!DETECTION_COMPLETE.load(Ordering::Acquire));
    }
}
