//! Lockless communication between the real-time thread and the control thread.
//!
//! The audio callback may not log, lock, or allocate. Anything it wants the
//! rest of the program to know goes through one of two channels:
//!
//! - an `rtrb` ring of [`EngineEvent`]s (discrete occurrences such as an
//!   overrun; dropped when the ring is full),
//! - a `triple_buffer` holding the latest [`BlockMeter`] (running counters
//!   and peaks; the reader always sees the most recent complete write).

pub use rtrb;
pub use triple_buffer;

use rtdsp_core::{MAX_CHANNELS, Sample};
use std::time::Duration;

/// Events sent from the audio thread back to the control thread
///
/// IMPORTANT: All variants must be real-time safe (no heap data).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// The callback loop ran its first block
    Started {
        /// Sample rate the loop is running at
        sample_rate: u32,
        /// Frames per block
        block_size: usize,
    },
    /// A block took longer than its real-time budget
    Overrun {
        /// Block sequence number
        block: u64,
        /// Time spent processing
        elapsed: Duration,
        /// Allowed time (`block_size / sample_rate`)
        budget: Duration,
    },
    /// A node failed; its output was silenced for this block
    ProcessFailed {
        /// Block sequence number
        block: u64,
        /// Index of the first failing node in processing order;
        /// `None` when the graph had not been prepared
        node: Option<usize>,
    },
    /// The graph was busy (offline compute) so this block was silenced
    Contended {
        /// Block sequence number
        block: u64,
    },
}

/// Running statistics published by the audio thread after every block
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlockMeter {
    /// Blocks run through the callback
    pub blocks: u64,
    /// Blocks that exceeded their budget
    pub overruns: u64,
    /// Blocks in which at least one node failed
    pub failures: u64,
    /// Blocks silenced because the graph was busy
    pub contended: u64,
    /// Absolute peak of each output channel in the last block
    pub peaks: [Sample; MAX_CHANNELS],
    /// Processing time of the last block
    pub last_elapsed: Duration,
}

impl BlockMeter {
    /// Peak across all output channels of the last block.
    pub fn peak(&self) -> Sample {
        self.peaks.iter().fold(0.0_f32, |max, &p| max.max(p))
    }
}

/// Event sender (audio thread)
pub type EventSender = rtrb::Producer<EngineEvent>;
/// Event receiver (control thread)
pub type EventReceiver = rtrb::Consumer<EngineEvent>;
/// Meter writer (audio thread)
pub type MeterWriter = triple_buffer::Input<BlockMeter>;
/// Meter reader (control thread)
pub type MeterReader = triple_buffer::Output<BlockMeter>;

/// Create the channel pair for one run of the callback loop
pub fn create_channels(capacity: usize) -> (ControlChannels, AudioChannels) {
    let (event_tx, event_rx) = rtrb::RingBuffer::new(capacity);
    let (meter_tx, meter_rx) = triple_buffer::TripleBuffer::new(&BlockMeter::default()).split();

    let control = ControlChannels { event_rx, meter_rx };
    let audio = AudioChannels { event_tx, meter_tx };

    (control, audio)
}

/// Channels for the control thread (reads events and meter)
pub struct ControlChannels {
    /// Event receiver (Audio -> Control)
    pub event_rx: EventReceiver,
    /// Latest meter (Audio -> Control)
    pub meter_rx: MeterReader,
}

impl ControlChannels {
    /// Pop every pending event.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::with_capacity(self.event_rx.slots());
        while let Ok(event) = self.event_rx.pop() {
            events.push(event);
        }
        events
    }

    /// Most recent meter published by the audio thread.
    pub fn meter(&mut self) -> BlockMeter {
        *self.meter_rx.read()
    }
}

/// Channels for the audio thread (sends events, writes meter)
pub struct AudioChannels {
    /// Event sender (Audio -> Control)
    pub event_tx: EventSender,
    /// Meter writer (Audio -> Control)
    pub meter_tx: MeterWriter,
}

impl AudioChannels {
    /// Push an event, dropping it if the ring is full.
    ///
    /// Returns whether the event was queued.
    #[inline]
    pub fn report(&mut self, event: EngineEvent) -> bool {
        self.event_tx.push(event).is_ok()
    }

    /// Publish the latest meter.
    #[inline]
    pub fn publish(&mut self, meter: BlockMeter) {
        self.meter_tx.write(meter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let (mut control, mut audio) = create_channels(8);
        assert!(audio.report(EngineEvent::Contended { block: 3 }));
        assert_eq!(
            control.drain_events(),
            vec![EngineEvent::Contended { block: 3 }]
        );
        assert!(control.drain_events().is_empty());
    }

    #[test]
    fn test_full_ring_drops_events() {
        let (mut control, mut audio) = create_channels(2);
        assert!(audio.report(EngineEvent::Contended { block: 0 }));
        assert!(audio.report(EngineEvent::Contended { block: 1 }));
        assert!(!audio.report(EngineEvent::Contended { block: 2 }));
        assert_eq!(control.drain_events().len(), 2);
    }

    #[test]
    fn test_meter_latest_wins() {
        let (mut control, mut audio) = create_channels(2);
        assert_eq!(control.meter(), BlockMeter::default());

        let mut meter = BlockMeter {
            blocks: 1,
            ..BlockMeter::default()
        };
        audio.publish(meter);
        meter.blocks = 2;
        meter.peaks[1] = 0.75;
        audio.publish(meter);

        let seen = control.meter();
        assert_eq!(seen.blocks, 2);
        assert_eq!(seen.peak(), 0.75);
    }
}
