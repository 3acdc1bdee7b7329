use embassy_futures::select::{Either, select};
use heapless::Vec;
use stim_core::StimController;
use stim_core::telemetry::TelemetryRecord;
use stim_core::waveform::MemoryPatternStore;

use super::{CommandQueue, FirmwareShared, ReplyQueue, TickSignal};
use crate::logging::{TelemetryCursor, log_reply};
use crate::status;

/// Telemetry records copied out of the critical section per pass.
const TELEMETRY_DRAIN_BATCH: usize = 8;

#[embassy_executor::task]
pub async fn run(
    shared: &'static FirmwareShared,
    mut controller: StimController<MemoryPatternStore>,
    tick: &'static TickSignal,
    commands: &'static CommandQueue,
    replies: &'static ReplyQueue,
) -> ! {
    let mut cursor = TelemetryCursor::new();

    loop {
        match select(tick.wait(), commands.receive()).await {
            Either::First(()) => {}
            Either::Second(command) => {
                let reply = controller.execute(shared, &command);
                log_reply(&reply, reply.is_ok());
                replies.send(reply).await;
            }
        }

        controller.update(shared);

        loop {
            let batch: Vec<TelemetryRecord, TELEMETRY_DRAIN_BATCH> = shared.with(|cell| {
                cell.state
                    .telemetry
                    .since(cursor.last())
                    .take(TELEMETRY_DRAIN_BATCH)
                    .copied()
                    .collect()
            });
            if cursor.forward(batch.iter()) < TELEMETRY_DRAIN_BATCH {
                break;
            }
        }

        status::publish(&controller.snapshot(shared));
    }
}
