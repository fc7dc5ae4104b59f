//! Block sizing for packet-oriented transports.
//!
//! A transport that carries audio in fixed packets (a wireless link, a
//! datagram socket) decides how many bytes of PCM fit into one packet of a
//! given MTU. The device uses the write size as its period so each rendered
//! block fills exactly one packet.

use crate::sample::SampleSpec;

/// Maps a link MTU to the PCM bytes exchanged per packet.
pub trait BlockSizing {
    /// PCM bytes produced by decoding one packet read from a link with this MTU.
    fn read_block_size(&self, read_link_mtu: usize) -> usize;

    /// PCM bytes consumed to fill one packet for a link with this MTU.
    fn write_block_size(&self, write_link_mtu: usize) -> usize;
}

/// Sizing for uncompressed PCM: one packet carries whole frames only.
///
/// # Example
///
/// ```
/// use stream_mixer::transport::{BlockSizing, PcmBlockSizing};
/// use stream_mixer::{SampleFormat, SampleSpec};
///
/// let sizing = PcmBlockSizing::new(SampleSpec::new(SampleFormat::S16Le, 16000, 1));
/// assert_eq!(sizing.write_block_size(48), 48);
/// assert_eq!(sizing.read_block_size(49), 48);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PcmBlockSizing {
    spec: SampleSpec,
}

impl PcmBlockSizing {
    /// Creates sizing for `spec`.
    #[must_use]
    pub fn new(spec: SampleSpec) -> Self {
        Self { spec }
    }

    fn aligned(&self, mtu: usize) -> usize {
        let size = self.spec.frame_align(mtu);
        if size != mtu {
            tracing::debug!(
                mtu,
                block_size = size,
                frame_size = self.spec.frame_size(),
                "MTU is not frame aligned, rounding block size down"
            );
        }
        size
    }
}

impl BlockSizing for PcmBlockSizing {
    fn read_block_size(&self, read_link_mtu: usize) -> usize {
        self.aligned(read_link_mtu)
    }

    fn write_block_size(&self, write_link_mtu: usize) -> usize {
        self.aligned(write_link_mtu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFormat;

    #[test]
    fn test_block_size_is_frame_aligned() {
        let sizing = PcmBlockSizing::new(SampleSpec::new(SampleFormat::S24Le, 48000, 2));
        assert_eq!(sizing.write_block_size(672), 672);
        assert_eq!(sizing.write_block_size(670), 666);
        assert_eq!(sizing.read_block_size(5), 0);
    }
}
