//! STM32G0 board wiring for the boot detector.

use detect_core::hardware::{
    CaptureEngine, CaptureQueue, ChannelMask, Clock, FatalHalt, PinControl, PinId, TargetControl,
    Word,
};
use embassy_stm32::gpio::{Flex, Output, OutputOpenDrain, Pull, Speed};
use embassy_stm32::usart::BufferedUartRx;
use embassy_time::{Duration, block_for};

use crate::capture::CaptureLink;
use crate::indicator::halt_pattern;
use crate::instant::{FirmwareInstant, to_embassy};

/// Bus pins followed by the trigger pin, indexed by [`PinId`].
pub const PIN_COUNT: usize = 4;

const RESET_PULSE: Duration = Duration::from_millis(10);

pub type UartCapture<'d> = CaptureLink<'static, BufferedUartRx<'d>>;

pub struct Board<'d> {
    capture: UartCapture<'d>,
    reset: OutputOpenDrain<'d>,
    pins: [Flex<'d>; PIN_COUNT],
    status_led: Output<'d>,
}

impl<'d> Board<'d> {
    pub fn new(
        capture: UartCapture<'d>,
        reset: OutputOpenDrain<'d>,
        pins: [Flex<'d>; PIN_COUNT],
        status_led: Output<'d>,
    ) -> Self {
        let mut board = Self {
            capture,
            reset,
            pins,
            status_led,
        };
        board.configure_pins();
        board
    }

    /// Bus pins sample with pull-ups; the trigger is driven low. Teardown
    /// leaves every pin analog, so each attempt starts here again.
    fn configure_pins(&mut self) {
        let [bus @ .., trigger] = &mut self.pins;
        for pin in bus.iter_mut() {
            pin.set_as_input(Pull::Up);
        }
        trigger.set_low();
        trigger.set_as_output(Speed::VeryHigh);
    }

    fn pin_mut(&mut self, pin: PinId) -> Option<&mut Flex<'d>> {
        self.pins.get_mut(usize::from(pin.number()))
    }

    fn blink_halt_pattern(&mut self, code: u8, total_stages: u8) {
        for pulse in halt_pattern(code, total_stages) {
            self.status_led.set_high();
            block_for(pulse.on);
            self.status_led.set_low();
            block_for(pulse.off);
        }
    }
}

impl CaptureEngine for Board<'_> {
    fn arm(&mut self) {
        self.configure_pins();
        self.capture.arm();
    }

    fn quiesce(&mut self) {
        self.capture.quiesce();
    }

    fn disable_channels(&mut self, mask: ChannelMask) {
        self.capture.disable_channels(mask);
    }
}

impl CaptureQueue for Board<'_> {
    fn is_empty(&self) -> bool {
        self.capture.is_empty()
    }

    fn dequeue(&mut self) -> Word {
        self.capture.dequeue()
    }

    fn try_dequeue(&mut self) -> Option<Word> {
        self.capture.try_dequeue()
    }
}

impl TargetControl for Board<'_> {
    fn reset_target(&mut self) {
        self.reset.set_low();
        block_for(RESET_PULSE);
        self.reset.set_high();
    }
}

// Flex has no pull accessor on its own; a floating input clears the pull
// before the pin drops back to analog.
impl PinControl for Board<'_> {
    fn disable(&mut self, pin: PinId) {
        if let Some(flex) = self.pin_mut(pin) {
            flex.set_as_analog();
        }
    }

    fn clear_pulls(&mut self, pin: PinId) {
        if let Some(flex) = self.pin_mut(pin) {
            flex.set_as_input(Pull::None);
        }
    }

    fn release_direction(&mut self, pin: PinId) {
        if let Some(flex) = self.pin_mut(pin) {
            flex.set_as_analog();
        }
    }
}

impl Clock for Board<'_> {
    type Instant = FirmwareInstant;

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant::now()
    }

    fn sleep(&mut self, duration: core::time::Duration) {
        block_for(to_embassy(duration));
    }
}

impl FatalHalt for Board<'_> {
    fn halt_with_error(&mut self, code: u8, total_stages: u8) -> ! {
        self.capture.quiesce();
        defmt::error!(
            "boot detect failed: stage code {}/{} (dropped {} words)",
            code,
            total_stages,
            self.capture.dropped()
        );
        loop {
            self.blink_halt_pattern(code, total_stages);
        }
    }
}
