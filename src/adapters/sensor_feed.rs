//! Latest-frame sensor input.
//!
//! The acquisition task (ADC sampling, I²C accelerometer, NMEA parser)
//! publishes a converted [`SensorFrame`] into a shared [`FrameSignal`]; the
//! control loop drains it through [`SensorFeed`] once per cycle. A newer
//! frame overwrites an unread one. When nothing new arrived the feed hands
//! back the last-known frame, so a stalled producer looks like frozen
//! values rather than missing ones.

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::signal::Signal;
use log::info;

use crate::app::ports::SensorPort;
use crate::error::SensorError;
use crate::frame::SensorFrame;

/// Single-slot mailbox between acquisition and the control loop.
pub type FrameSignal = Signal<CriticalSectionRawMutex, SensorFrame>;

/// The board-level mailbox the acquisition task publishes into.
pub static FRAMES: FrameSignal = Signal::new();

pub struct SensorFeed<'a, M: RawMutex> {
    source: &'a Signal<M, SensorFrame>,
    last: Option<SensorFrame>,
    last_update_ms: Option<u64>,
}

impl<'a, M: RawMutex> SensorFeed<'a, M> {
    pub fn new(source: &'a Signal<M, SensorFrame>) -> Self {
        Self {
            source,
            last: None,
            last_update_ms: None,
        }
    }

    /// Milliseconds since the producer last delivered a frame.
    /// `None` before the first frame.
    pub fn frame_age_ms(&self, now_ms: u64) -> Option<u64> {
        self.last_update_ms.map(|t| now_ms.saturating_sub(t))
    }
}

impl<M: RawMutex> SensorPort for SensorFeed<'_, M> {
    fn read_frame(&mut self, now_ms: u64) -> Result<SensorFrame, SensorError> {
        if let Some(frame) = self.source.try_take() {
            if self.last.is_none() {
                info!("SensorFeed: first frame received");
            }
            self.last = Some(frame);
            self.last_update_ms = Some(now_ms);
        }
        self.last.clone().ok_or(SensorError::NoData)
    }
}
