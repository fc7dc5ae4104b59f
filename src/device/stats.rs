//! Device statistics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Statistics about a running device.
#[derive(Debug, Clone, Default)]
pub struct DeviceStats {
    /// Mixing passes completed.
    pub blocks_rendered: u64,
    /// Bytes handed to the output.
    pub bytes_written: u64,
    /// Rewinds that moved back by at least one frame.
    pub rewinds_processed: u64,
    /// Times a playing stream ran out of data.
    pub underruns: u64,
    /// Streams unlinked because their producer failed.
    pub streams_killed: u64,
    /// Writes the output rejected.
    pub output_errors: u64,
}

/// State shared between the device thread and its handle.
pub(crate) struct DeviceState {
    pub running: AtomicBool,
    pub blocks_rendered: AtomicU64,
    pub bytes_written: AtomicU64,
    pub rewinds_processed: AtomicU64,
    pub underruns: AtomicU64,
    pub streams_killed: AtomicU64,
    pub output_errors: AtomicU64,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            blocks_rendered: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            rewinds_processed: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            streams_killed: AtomicU64::new(0),
            output_errors: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> DeviceStats {
        DeviceStats {
            blocks_rendered: self.blocks_rendered.load(Ordering::SeqCst),
            bytes_written: self.bytes_written.load(Ordering::SeqCst),
            rewinds_processed: self.rewinds_processed.load(Ordering::SeqCst),
            underruns: self.underruns.load(Ordering::SeqCst),
            streams_killed: self.streams_killed.load(Ordering::SeqCst),
            output_errors: self.output_errors.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_state_new() {
        let state = DeviceState::new();
        assert!(state.running.load(Ordering::SeqCst));
        assert_eq!(state.blocks_rendered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_device_stats_default() {
        let stats = DeviceStats::default();
        assert_eq!(stats.bytes_written, 0);
        assert_eq!(stats.streams_killed, 0);
    }

    #[test]
    fn test_snapshot_reads_counters() {
        let state = DeviceState::new();
        state.underruns.fetch_add(3, Ordering::SeqCst);
        state.bytes_written.fetch_add(512, Ordering::SeqCst);
        let stats = state.snapshot();
        assert_eq!(stats.underruns, 3);
        assert_eq!(stats.bytes_written, 512);
    }
}
