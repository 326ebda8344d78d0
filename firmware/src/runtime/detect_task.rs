use core::time::Duration;

use detect_core::config::DetectConfig;
use detect_core::controller::{BootDetector, DetectionContext};

use super::BOOT_DETECTED;
use crate::hw::Board;
use crate::status;
use crate::telemetry::LogTelemetry;

/// Window for the target to start reading its boot blocks after reset.
const BOOT_TIMEOUT: Duration = Duration::from_millis(100);

#[embassy_executor::task]
pub async fn run(board: Board<'static>) {
    let mut detector =
        BootDetector::with_telemetry(board, LogTelemetry::new(), DetectConfig::DEFAULT);
    let mut context = DetectionContext::new();

    // Blocks the executor until boot is confirmed; failure halts inside.
    if detector.wait_for_boot(&mut context, BOOT_TIMEOUT) {
        status::publish(&context);
        BOOT_DETECTED.signal(context.board_variant());
    }
}
