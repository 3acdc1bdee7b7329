use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::spi::{Config as SpiConfig, Spi};
use embassy_stm32::time::Hertz;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, ThreadModeRawMutex};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use static_cell::StaticCell;
use stim_core::config::{PulseTimerConfig, StimConfig};
use stim_core::console::{CommandReply, ConsoleCommand};
use stim_core::shared::SharedState;
use stim_core::waveform::MemoryPatternStore;
use stim_core::{StimController, StimShared};

use crate::board::{
    EDGE_LEAD_OFFSET_TICKS, EDGE_TICKS_PER_US, REGULATION_OFFSET_US, StimBoard, StimPins,
};

mod background_task;
mod console_task;
mod tick_task;

/// Commands handed from the console to the background task.
pub(super) const COMMAND_QUEUE_DEPTH: usize = 4;
const DAC_SPI_FREQUENCY_HZ: u32 = 4_000_000;

pub(super) type FirmwareShared = StimShared<StimBoard<'static>>;
pub(super) type CommandQueue = Channel<ThreadModeRawMutex, ConsoleCommand, COMMAND_QUEUE_DEPTH>;
pub(super) type ReplyQueue = Channel<ThreadModeRawMutex, CommandReply, COMMAND_QUEUE_DEPTH>;
pub(super) type TickSignal = Signal<CriticalSectionRawMutex, ()>;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cortex_m::interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cortex_m::interrupt::enable();
            }
        }
    }
}

/// Runs the 1 ms tick above the thread-mode background and console tasks.
static TICK_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

static SHARED: StaticCell<FirmwareShared> = StaticCell::new();
pub(super) static COMMAND_QUEUE: CommandQueue = Channel::new();
pub(super) static REPLY_QUEUE: ReplyQueue = Channel::new();
pub(super) static TICK_SIGNAL: TickSignal = Signal::new();

// USART1 is unused on this board; its vector hosts the tick executor.
#[interrupt]
unsafe fn USART1() {
    unsafe { TICK_EXECUTOR.on_interrupt() }
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA4,
        PA5,
        PA7,
        PA8,
        PA9,
        PA10,
        PB0,
        PB1,
        PB2,
        PB3,
        PB4,
        PB5,
        SPI1,
        USART5,
        ..
    } = hal::init(config);

    let mut spi_config = SpiConfig::default();
    spi_config.frequency = Hertz(DAC_SPI_FREQUENCY_HZ);
    let spi = Spi::new_blocking_txonly(SPI1, PA5, PA7, spi_config);

    let board = StimBoard::new(
        StimPins {
            stim_enable: Output::new(PA0, Level::Low, Speed::VeryHigh),
            vos_enable: Output::new(PA1, Level::Low, Speed::Low),
            anode: Output::new(PA4, Level::Low, Speed::Low),
            amp_cs: Output::new(PA8, Level::High, Speed::VeryHigh),
            vos_cs: Output::new(PA9, Level::High, Speed::VeryHigh),
            outputs: [
                Output::new(PB2, Level::Low, Speed::VeryHigh),
                Output::new(PB3, Level::Low, Speed::VeryHigh),
                Output::new(PB4, Level::Low, Speed::VeryHigh),
                Output::new(PB5, Level::Low, Speed::VeryHigh),
            ],
            regulation: Input::new(PA10, Pull::None),
        },
        spi,
    );

    let timer = PulseTimerConfig::new(EDGE_TICKS_PER_US, EDGE_LEAD_OFFSET_TICKS, REGULATION_OFFSET_US)
        .expect("edge timer resolution");
    let stim_config = StimConfig {
        timer,
        ..StimConfig::default()
    };
    let shared: &'static FirmwareShared =
        SHARED.init(StimShared::new(SharedState::new(stim_config), board));
    let controller = StimController::new(MemoryPatternStore::new());

    defmt::info!("stimulator ready; waiting for governor");

    interrupt::USART1.set_priority(Priority::P1);
    let tick_spawner = TICK_EXECUTOR.start(interrupt::USART1);
    tick_spawner
        .spawn(tick_task::run(shared, &TICK_SIGNAL))
        .expect("failed to spawn tick task");

    spawner
        .spawn(background_task::run(
            shared,
            controller,
            &TICK_SIGNAL,
            &COMMAND_QUEUE,
            &REPLY_QUEUE,
        ))
        .expect("failed to spawn background task");

    spawner
        .spawn(console_task::run(&COMMAND_QUEUE, &REPLY_QUEUE, USART5, PB0, PB1))
        .expect("failed to spawn console task");

    core::future::pending::<()>().await;
}
