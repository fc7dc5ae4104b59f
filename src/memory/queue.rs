//! Indexed block queue with holes, rewind history and prebuffering.

use std::collections::VecDeque;

use super::pool::MemChunk;

/// Reference point for [`MemBlockQueue::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Relative to the current write index.
    Relative,
    /// Absolute index.
    Absolute,
    /// Relative to the current read index.
    RelativeOnRead,
    /// Relative to the end of the stored data.
    RelativeEnd,
}

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The chunk is not a multiple of the queue's frame size.
    #[error("push of {length} bytes is not aligned to {base}")]
    Misaligned {
        /// Length of the rejected chunk.
        length: usize,
        /// Frame size of the queue.
        base: usize,
    },
    /// Accepting the chunk would exceed the maximum length.
    #[error("queue full, cannot accept {length} more bytes")]
    Full {
        /// Length of the rejected chunk.
        length: usize,
    },
}

#[derive(Debug)]
struct Item {
    index: i64,
    chunk: MemChunk,
}

impl Item {
    fn end(&self) -> i64 {
        self.index + self.chunk.len() as i64
    }
}

/// Queue of chunks addressed by absolute byte index.
///
/// Writers push at the write index, readers peek and drop at the read
/// index. Data between the two that was never written reads back as
/// silence. Up to `max_rewind` bytes behind the read index are retained so
/// the reader can [`rewind`](Self::rewind) and read them again.
///
/// # Example
///
/// ```
/// use stream_mixer::memory::MemBlockQueue;
/// use stream_mixer::{MemChunk, SampleFormat};
///
/// let mut q = MemBlockQueue::new("demo", 1024, 2, 0, 64, MemChunk::silence(SampleFormat::S16Le, 64));
/// q.push(&MemChunk::from_vec(vec![1, 2, 3, 4])).unwrap();
/// assert_eq!(q.length(), 4);
/// let chunk = q.peek().unwrap();
/// assert_eq!(chunk.as_bytes(), &[1, 2, 3, 4]);
/// q.drop_bytes(4);
/// q.rewind(4);
/// assert_eq!(q.peek().unwrap().as_bytes(), &[1, 2, 3, 4]);
/// ```
#[derive(Debug)]
pub struct MemBlockQueue {
    name: &'static str,
    blocks: VecDeque<Item>,
    read_index: i64,
    write_index: i64,
    max_length: usize,
    base: usize,
    prebuf: usize,
    in_prebuf: bool,
    max_rewind: usize,
    silence: MemChunk,
    align: Vec<u8>,
}

impl MemBlockQueue {
    /// Creates a queue.
    ///
    /// `base` is the frame size every push, drop and rewind is aligned to.
    /// `silence` is returned by [`peek`](Self::peek) for holes.
    #[must_use]
    pub fn new(
        name: &'static str,
        max_length: usize,
        base: usize,
        prebuf: usize,
        max_rewind: usize,
        silence: MemChunk,
    ) -> Self {
        let base = base.max(1);
        let mut q = Self {
            name,
            blocks: VecDeque::new(),
            read_index: 0,
            write_index: 0,
            max_length: align_up(max_length.max(base), base),
            base,
            prebuf: 0,
            in_prebuf: false,
            max_rewind: 0,
            silence,
            align: Vec::new(),
        };
        q.set_prebuf(prebuf);
        q.set_max_rewind(max_rewind);
        q
    }

    /// Name used in log messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Frame size of the queue.
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    /// Bytes between the read and write index, zero if the reader is ahead.
    #[must_use]
    pub fn length(&self) -> usize {
        (self.write_index - self.read_index).max(0) as usize
    }

    /// Returns true if nothing is queued ahead of the reader.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Current read index.
    #[must_use]
    pub fn read_index(&self) -> i64 {
        self.read_index
    }

    /// Current write index.
    #[must_use]
    pub fn write_index(&self) -> i64 {
        self.write_index
    }

    /// Maximum queued length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Bytes of history kept behind the read index.
    #[must_use]
    pub fn max_rewind(&self) -> usize {
        self.max_rewind
    }

    /// Sets the history size, rounded up to the frame size.
    pub fn set_max_rewind(&mut self, max_rewind: usize) {
        self.max_rewind = align_up(max_rewind, self.base);
        self.drop_backlog();
    }

    /// Sets how many bytes must be queued before reads begin.
    pub fn set_prebuf(&mut self, prebuf: usize) {
        self.prebuf = align_up(prebuf, self.base).min(self.max_length);
        self.in_prebuf = self.prebuf > 0 && self.length() < self.prebuf;
    }

    /// Re-enters prebuffering.
    pub fn prebuf_force(&mut self) {
        if self.prebuf > 0 {
            self.in_prebuf = true;
        }
    }

    /// Leaves prebuffering once enough data is queued. Returns true while
    /// still prebuffering.
    fn update_prebuf(&mut self) -> bool {
        if self.in_prebuf {
            if self.length() < self.prebuf {
                return true;
            }
            self.in_prebuf = false;
        }
        false
    }

    /// Returns true if a reader would get real data or silence right now.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        let prebuffering = self.in_prebuf && self.length() < self.prebuf;
        !prebuffering && self.length() > 0
    }

    /// Returns true if `length` more bytes fit.
    #[must_use]
    pub fn can_push(&self, length: usize) -> bool {
        let mut length = length as i64;
        if self.read_index > self.write_index {
            let d = self.read_index - self.write_index;
            if length > d {
                length -= d;
            } else {
                return true;
            }
        }
        let end = self.blocks.back().map_or(self.write_index, Item::end);
        // Overwriting already queued data is always allowed.
        if self.write_index + length > end
            && self.write_index + length - self.read_index > self.max_length as i64
        {
            return false;
        }
        true
    }

    /// Writes `chunk` at the write index, overwriting anything queued there,
    /// and advances the write index.
    pub fn push(&mut self, chunk: &MemChunk) -> Result<(), QueueError> {
        let length = chunk.len();
        if length % self.base != 0 {
            return Err(QueueError::Misaligned {
                length,
                base: self.base,
            });
        }
        if !self.can_push(length) {
            return Err(QueueError::Full { length });
        }
        if length == 0 {
            return Ok(());
        }

        let start = self.write_index;
        let end = start + length as i64;
        let mut i = self.blocks.partition_point(|it| it.end() <= start);

        // Cut the item overlapping the start of the new data.
        if let Some(item) = self.blocks.get_mut(i) {
            if item.index < start {
                let item_end = item.end();
                let head = (start - item.index) as usize;
                if item_end > end {
                    let tail = item
                        .chunk
                        .slice((end - item.index) as usize, (item_end - end) as usize);
                    item.chunk.truncate(head);
                    self.blocks.insert(i + 1, Item { index: end, chunk: tail });
                } else {
                    item.chunk.truncate(head);
                }
                i += 1;
            }
        }

        while self.blocks.get(i).is_some_and(|it| it.end() <= end) {
            self.blocks.remove(i);
        }

        if let Some(item) = self.blocks.get_mut(i) {
            if item.index < end {
                item.chunk.advance((end - item.index) as usize);
                item.index = end;
            }
        }

        let merged = i > 0
            && self
                .blocks
                .get_mut(i - 1)
                .is_some_and(|prev| prev.end() == start && prev.chunk.try_append(chunk));
        if !merged {
            self.blocks.insert(
                i,
                Item {
                    index: start,
                    chunk: chunk.clone(),
                },
            );
        }

        self.write_index = end;
        Ok(())
    }

    /// Like [`push`](Self::push) but accepts chunks of any length, holding
    /// back a trailing partial frame until the next call completes it.
    pub fn push_align(&mut self, chunk: &MemChunk) -> Result<(), QueueError> {
        if self.base == 1 || (self.align.is_empty() && chunk.len() % self.base == 0) {
            return self.push(chunk);
        }

        let mut data = std::mem::take(&mut self.align);
        data.extend_from_slice(chunk.as_bytes());
        let aligned = data.len() / self.base * self.base;
        let remainder = data.split_off(aligned);

        let result = if data.is_empty() {
            Ok(())
        } else {
            self.push(&MemChunk::from_vec(data))
        };
        self.align = remainder;
        result
    }

    fn current_read_position(&self) -> usize {
        let read = self.read_index;
        self.blocks.partition_point(|it| it.end() <= read)
    }

    /// Returns the data at the read index without consuming it.
    ///
    /// Holes come back as silence. Returns `None` only while prebuffering.
    pub fn peek(&mut self) -> Option<MemChunk> {
        if self.update_prebuf() {
            return None;
        }

        let i = self.current_read_position();
        match self.blocks.get(i) {
            Some(item) if item.index <= self.read_index => {
                let offset = (self.read_index - item.index) as usize;
                Some(item.chunk.slice(offset, item.chunk.len() - offset))
            }
            next => {
                let hole = match next {
                    Some(item) => (item.index - self.read_index) as usize,
                    None => self.length(),
                };
                let mut silence = self.silence.clone();
                if hole > 0 {
                    silence.truncate(hole);
                }
                Some(silence)
            }
        }
    }

    /// Consumes `length` bytes at the read index.
    ///
    /// Stops early while prebuffering. History older than `max_rewind`
    /// bytes behind the new read index is released.
    pub fn drop_bytes(&mut self, mut length: usize) {
        debug_assert!(length % self.base == 0);

        while length > 0 {
            if self.update_prebuf() {
                break;
            }
            let i = self.current_read_position();
            let Some(item) = self.blocks.get(i) else {
                self.read_index += length as i64;
                break;
            };
            let d = ((item.end() - self.read_index) as usize).min(length);
            self.read_index += d as i64;
            length -= d;
        }

        self.drop_backlog();
    }

    fn drop_backlog(&mut self) {
        let boundary = self.read_index - self.max_rewind as i64;
        while self.blocks.front().is_some_and(|it| it.end() <= boundary) {
            self.blocks.pop_front();
        }
    }

    /// Moves the read index back by `length` bytes, but never further than
    /// `max_rewind`. Returns how far it moved.
    pub fn rewind(&mut self, length: usize) -> usize {
        debug_assert!(length % self.base == 0);
        let rewound = length.min(self.max_rewind);
        if rewound < length {
            tracing::debug!(queue = self.name, length, max_rewind = self.max_rewind, "Rewind clamped");
        }
        self.read_index -= rewound as i64;
        rewound
    }

    /// Moves the write index.
    pub fn seek(&mut self, offset: i64, mode: SeekMode) {
        self.write_index = match mode {
            SeekMode::Relative => self.write_index + offset,
            SeekMode::Absolute => offset,
            SeekMode::RelativeOnRead => self.read_index + offset,
            SeekMode::RelativeEnd => self.blocks.back().map_or(self.read_index, Item::end) + offset,
        };
        self.drop_backlog();
    }

    /// Drops every queued block; the queue then reads back as silence.
    pub fn silence(&mut self) {
        self.blocks.clear();
    }

    /// Discards queued data and moves the write index back to the reader.
    pub fn flush_write(&mut self) {
        self.silence();
        self.write_index = self.read_index;
        self.prebuf_force();
    }

    /// Discards queued data and moves the reader up to the write index.
    pub fn flush_read(&mut self) {
        self.silence();
        self.read_index = self.write_index;
        self.prebuf_force();
    }

    /// Number of stored blocks, history included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

fn align_up(n: usize, base: usize) -> usize {
    n.div_ceil(base) * base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFormat;

    fn queue(max_length: usize, base: usize, max_rewind: usize) -> MemBlockQueue {
        MemBlockQueue::new(
            "test",
            max_length,
            base,
            0,
            max_rewind,
            MemChunk::silence(SampleFormat::U8, 64),
        )
    }

    fn chunk(bytes: &[u8]) -> MemChunk {
        MemChunk::from_vec(bytes.to_vec())
    }

    fn read_all(q: &mut MemBlockQueue) -> Vec<u8> {
        let mut out = Vec::new();
        while q.length() > 0 {
            let mut c = q.peek().unwrap();
            c.truncate(q.length());
            out.extend_from_slice(c.as_bytes());
            q.drop_bytes(c.len());
        }
        out
    }

    #[test]
    fn test_push_peek_drop() {
        let mut q = queue(64, 1, 0);
        q.push(&chunk(&[1, 2, 3])).unwrap();
        q.push(&chunk(&[4, 5])).unwrap();
        assert_eq!(q.length(), 5);
        assert_eq!(read_all(&mut q), vec![1, 2, 3, 4, 5]);
        assert_eq!(q.read_index(), 5);
        assert_eq!(q.block_count(), 0);
    }

    #[test]
    fn test_misaligned_push_rejected() {
        let mut q = queue(64, 2, 0);
        assert_eq!(
            q.push(&chunk(&[1, 2, 3])),
            Err(QueueError::Misaligned { length: 3, base: 2 })
        );
    }

    #[test]
    fn test_push_past_max_length_rejected() {
        let mut q = queue(4, 1, 0);
        q.push(&chunk(&[1, 2, 3])).unwrap();
        assert_eq!(q.push(&chunk(&[4, 5])), Err(QueueError::Full { length: 2 }));
        assert!(q.can_push(1));
    }

    #[test]
    fn test_seek_creates_silent_hole() {
        let mut q = queue(64, 1, 0);
        q.push(&chunk(&[1, 1])).unwrap();
        q.seek(3, SeekMode::Relative);
        q.push(&chunk(&[2, 2])).unwrap();
        assert_eq!(read_all(&mut q), vec![1, 1, 0x80, 0x80, 0x80, 2, 2]);
    }

    #[test]
    fn test_overwrite_inside_block() {
        let mut q = queue(64, 1, 0);
        q.push(&chunk(&[1, 2, 3, 4, 5, 6])).unwrap();
        q.seek(-4, SeekMode::Relative);
        q.push(&chunk(&[9, 9])).unwrap();
        assert_eq!(q.write_index(), 4);
        q.seek(0, SeekMode::RelativeEnd);
        assert_eq!(q.write_index(), 6);
        assert_eq!(read_all(&mut q), vec![1, 2, 9, 9, 5, 6]);
    }

    #[test]
    fn test_overwrite_spanning_blocks() {
        let mut q = queue(64, 1, 0);
        q.push(&chunk(&[1, 1])).unwrap();
        q.push(&chunk(&[2, 2])).unwrap();
        q.push(&chunk(&[3, 3])).unwrap();
        q.seek(1, SeekMode::Absolute);
        q.push(&chunk(&[7, 7, 7, 7])).unwrap();
        q.seek(6, SeekMode::Absolute);
        assert_eq!(read_all(&mut q), vec![1, 7, 7, 7, 7, 3]);
    }

    #[test]
    fn test_contiguous_pushes_merge() {
        let data = MemChunk::from_vec(vec![1, 2, 3, 4]);
        let mut q = queue(64, 1, 0);
        q.push(&data.slice(0, 2)).unwrap();
        q.push(&data.slice(2, 2)).unwrap();
        assert_eq!(q.block_count(), 1);
        assert_eq!(q.peek().unwrap().as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_rewind_replays_history() {
        let mut q = queue(64, 1, 4);
        q.push(&chunk(&[1, 2, 3, 4, 5, 6])).unwrap();
        q.drop_bytes(6);
        q.rewind(4);
        assert_eq!(q.length(), 4);
        assert_eq!(read_all(&mut q), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_rewind_stops_at_max_rewind() {
        let mut q = queue(64, 1, 4);
        q.push(&chunk(&[1, 2, 3, 4, 5, 6])).unwrap();
        q.drop_bytes(6);
        assert_eq!(q.rewind(6), 4);
        assert_eq!(q.length(), 4);
        assert_eq!(read_all(&mut q), vec![3, 4, 5, 6]);
        assert_eq!(q.rewind(4), 4);
    }

    #[test]
    fn test_backlog_released_past_max_rewind() {
        let mut q = queue(64, 1, 2);
        q.push(&chunk(&[1, 1])).unwrap();
        q.push(&chunk(&[2, 2])).unwrap();
        q.push(&chunk(&[3, 3])).unwrap();
        q.drop_bytes(6);
        assert_eq!(q.block_count(), 1);
    }

    #[test]
    fn test_empty_queue_peeks_silence() {
        let mut q = queue(64, 1, 0);
        let c = q.peek().unwrap();
        assert_eq!(c.len(), 64);
        assert!(c.as_bytes().iter().all(|b| *b == 0x80));
        assert!(!q.is_readable());
    }

    #[test]
    fn test_flush_write_discards() {
        let mut q = queue(64, 1, 0);
        q.push(&chunk(&[1, 2, 3])).unwrap();
        q.drop_bytes(1);
        q.flush_write();
        assert_eq!(q.length(), 0);
        assert_eq!(q.write_index(), 1);
    }

    #[test]
    fn test_flush_read_skips() {
        let mut q = queue(64, 1, 0);
        q.push(&chunk(&[1, 2, 3])).unwrap();
        q.flush_read();
        assert_eq!(q.read_index(), 3);
        assert!(q.is_empty());
    }

    #[test]
    fn test_prebuf_blocks_reads() {
        let mut q = MemBlockQueue::new("pre", 64, 1, 4, 0, MemChunk::silence(SampleFormat::U8, 8));
        q.push(&chunk(&[1, 2])).unwrap();
        assert!(q.peek().is_none());
        assert!(!q.is_readable());
        q.push(&chunk(&[3, 4])).unwrap();
        assert!(q.is_readable());
        assert_eq!(q.peek().unwrap().as_bytes(), &[1, 2]);
        q.drop_bytes(2);
        assert_eq!(q.peek().unwrap().as_bytes(), &[3, 4]);
    }

    #[test]
    fn test_push_align_holds_partial_frame() {
        let mut q = queue(64, 4, 0);
        q.push_align(&chunk(&[1, 2, 3])).unwrap();
        assert_eq!(q.length(), 0);
        q.push_align(&chunk(&[4, 5, 6, 7, 8, 9])).unwrap();
        assert_eq!(q.length(), 8);
        assert_eq!(read_all(&mut q), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_reader_ahead_of_writer() {
        let mut q = queue(64, 1, 0);
        q.drop_bytes(4);
        assert_eq!(q.length(), 0);
        q.push(&chunk(&[1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(q.length(), 2);
        assert_eq!(read_all(&mut q), vec![5, 6]);
    }
}
