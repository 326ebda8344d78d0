use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Flex, Level, Output, OutputOpenDrain, Speed};
use embassy_stm32::usart::{BufferedUart, Config as UartConfig, DataBits, Parity, StopBits};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::AtomicU8;

use detect_core::controller::BoardVariant;

use crate::capture::CaptureLink;
use crate::hw::Board;

mod detect_task;

/// Sampler links are sized for a few milliseconds of bus traffic.
const CAPTURE_UART_BUFFER_SIZE: usize = 256;
const CAPTURE_UART_BAUD: u32 = 2_000_000;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

/// Channel enable mask read by the sampler control path.
pub(super) static CAPTURE_CHANNELS: AtomicU8 = AtomicU8::new(0);
pub(super) static BOOT_DETECTED: Signal<ThreadModeRawMutex, BoardVariant> = Signal::new();

static mut UART_TX_BUFFER: [u8; CAPTURE_UART_BUFFER_SIZE] = [0; CAPTURE_UART_BUFFER_SIZE];
static mut UART_RX_BUFFER: [u8; CAPTURE_UART_BUFFER_SIZE] = [0; CAPTURE_UART_BUFFER_SIZE];

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA4,
        PA5,
        PA6,
        PA7,
        PB0,
        PB1,
        USART5,
        ..
    } = hal::init(config);

    let mut uart_config = UartConfig::default();
    uart_config.baudrate = CAPTURE_UART_BAUD;
    uart_config.data_bits = DataBits::DataBits8;
    uart_config.stop_bits = StopBits::STOP1;
    uart_config.parity = Parity::ParityNone;

    let uart = unsafe {
        BufferedUart::new(
            USART5,
            PB1,
            PB0,
            &mut UART_TX_BUFFER,
            &mut UART_RX_BUFFER,
            UartIrqs,
            uart_config,
        )
        .expect("failed to initialize capture UART")
    };
    let (_, uart_rx) = uart.split();

    let board = Board::new(
        CaptureLink::new(uart_rx, &CAPTURE_CHANNELS),
        OutputOpenDrain::new(PA4, Level::High, Speed::Low),
        [Flex::new(PA0), Flex::new(PA1), Flex::new(PA6), Flex::new(PA7)],
        Output::new(PA5, Level::Low, Speed::Low),
    );

    spawner
        .spawn(detect_task::run(board))
        .expect("failed to spawn boot detect task");

    let variant = BOOT_DETECTED.wait().await;
    defmt::info!(
        "boot detect: handing off to glitch stage ({})",
        defmt::Display2Format(&variant)
    );

    core::future::pending::<()>().await;
}
