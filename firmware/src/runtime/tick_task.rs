use embassy_time::{Duration, Ticker};
use stim_core::config::TICK_PERIOD_MS;
use stim_core::scheduler::TickScheduler;

use super::{FirmwareShared, TickSignal};

#[embassy_executor::task]
pub async fn run(shared: &'static FirmwareShared, tick: &'static TickSignal) -> ! {
    let mut scheduler = TickScheduler::new();
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(TICK_PERIOD_MS)));

    loop {
        ticker.next().await;
        let _action = scheduler.run_tick(shared);
        tick.signal(());
    }
}
