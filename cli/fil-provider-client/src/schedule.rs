use crate::api::DealSchedule;

/// Chain epoch duration in seconds.
const EPOCH_SECONDS: i64 = 30;

/// Epochs in a 24 hour window.
const EPOCHS_PER_DAY: i64 = 2880;

/// Genesis timestamp the deal window is derived from when none is
/// configured. Network-specific policy, not a protocol constant.
pub const DEFAULT_GENESIS_TIMESTAMP: i64 = 1_667_326_380;

/// Default distance between now and the start of the deal window.
pub const DEFAULT_START_BUFFER_EPOCHS: i64 = 2 * EPOCHS_PER_DAY;

/// Default length of the deal window.
pub const DEFAULT_DURATION_EPOCHS: i64 = 200 * EPOCHS_PER_DAY;

/// Placement of a deal's validity window relative to the chain clock.
#[derive(Debug, Clone, Copy)]
pub struct DealScheduleParams {
    pub genesis_timestamp: i64,
    pub start_buffer_epochs: i64,
    pub duration_epochs: i64,
}

impl Default for DealScheduleParams {
    fn default() -> Self {
        Self {
            genesis_timestamp: DEFAULT_GENESIS_TIMESTAMP,
            start_buffer_epochs: DEFAULT_START_BUFFER_EPOCHS,
            duration_epochs: DEFAULT_DURATION_EPOCHS,
        }
    }
}

/// Derives the deal window from the wall clock: the current chain epoch
/// plus the configured buffer, for the configured duration.
pub fn deal_schedule(params: &DealScheduleParams, now_unix: i64) -> DealSchedule {
    let current_epoch = (now_unix - params.genesis_timestamp) / EPOCH_SECONDS;
    let start_epoch = current_epoch + params.start_buffer_epochs;

    DealSchedule {
        start_epoch,
        end_epoch: start_epoch + params.duration_epochs,
    }
}
