use std::fmt::{self, Debug, Formatter};

const MIN_CAPACITY: usize = 512;
const DEFAULT_CAPACITY: usize = 4096;

/**
A fixed-capacity receive buffer with read and write cursors.

Incoming bytes land in [`space`](RecvBuffer::space) and are published with
[`commit`](RecvBuffer::commit); the engine takes them back out through
[`as_slice`](RecvBuffer::as_slice) and [`consume`](RecvBuffer::consume).
When a partial protocol element is stranded at the end of the buffer,
[`compact`](RecvBuffer::compact) moves the unread bytes to the front so the
rest can be appended by the next read.

The capacity is user-settable but never below 512 bytes.
*/
pub struct RecvBuffer {
    data: Vec<u8>,
    read: usize,
    write: usize,
}

impl Default for RecvBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Debug for RecvBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecvBuffer")
            .field("capacity", &self.data.len())
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}

impl RecvBuffer {
    /// Builds a buffer with the given capacity, clamped to at least 512.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            data: vec![0; capacity],
            read: 0,
            write: 0,
        }
    }

    /// Resizes the buffer, clamping to the 512-byte minimum and resetting
    /// both cursors. Any unread bytes are discarded, so this is only safe
    /// between requests.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(MIN_CAPACITY);
        self.data.clear();
        self.data.resize(capacity, 0);
        self.read = 0;
        self.write = 0;
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.write - self.read
    }

    /// Returns true if there are no unread bytes.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// The unread bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.read..self.write]
    }

    /// The writable tail of the buffer, for the transport to read into.
    /// Call [`compact`](RecvBuffer::compact) first if this comes back empty
    /// while unread bytes remain.
    pub fn space(&mut self) -> &mut [u8] {
        &mut self.data[self.write..]
    }

    /// Publishes `n` bytes previously written into [`space`](RecvBuffer::space).
    pub fn commit(&mut self, n: usize) {
        self.write += n;
        debug_assert!(self.write <= self.data.len());
    }

    /// Discards `n` unread bytes from the front. Cursors rewind to the start
    /// of the buffer once everything has been consumed.
    pub fn consume(&mut self, n: usize) {
        self.read += n;
        debug_assert!(self.read <= self.write);
        if self.read == self.write {
            self.read = 0;
            self.write = 0;
        }
    }

    /// Moves the unread bytes to the front of the buffer, making room at the
    /// tail for the rest of a partially received element.
    pub fn compact(&mut self) {
        if self.read == 0 {
            return;
        }
        self.data.copy_within(self.read..self.write, 0);
        self.write -= self.read;
        self.read = 0;
    }

    /// Compacts if the writable tail has been exhausted.
    pub fn make_room(&mut self) {
        if self.write == self.data.len() {
            self.compact();
        }
    }

    /// Drops all unread bytes.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Places `bytes` back at the front of an empty buffer, growing it if
    /// they do not fit. Used to return body bytes that arrived in the same
    /// read as the end of a response head.
    pub fn restore(&mut self, bytes: &[u8]) {
        debug_assert!(self.is_empty());
        if bytes.len() > self.data.len() {
            self.data.resize(bytes.len(), 0);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.read = 0;
        self.write = bytes.len();
    }
}

#[cfg(test)]
mod tests {
    use super::{RecvBuffer, MIN_CAPACITY};

    #[test]
    fn capacity_is_clamped() {
        let buffer = RecvBuffer::with_capacity(16);
        assert_eq!(buffer.capacity(), MIN_CAPACITY);

        let mut buffer = RecvBuffer::default();
        assert_eq!(buffer.capacity(), 4096);
        buffer.set_capacity(100);
        assert_eq!(buffer.capacity(), MIN_CAPACITY);
        buffer.set_capacity(64 * 1024);
        assert_eq!(buffer.capacity(), 64 * 1024);
    }

    #[test]
    fn commit_and_consume_move_the_cursors() {
        let mut buffer = RecvBuffer::with_capacity(512);
        buffer.space()[..5].copy_from_slice(b"hello");
        buffer.commit(5);
        assert_eq!(buffer.as_slice(), b"hello");

        buffer.consume(2);
        assert_eq!(buffer.as_slice(), b"llo");
        assert_eq!(buffer.len(), 3);

        buffer.consume(3);
        assert!(buffer.is_empty());
        assert_eq!(buffer.space().len(), 512);
    }

    #[test]
    fn compact_moves_unread_bytes_to_the_front() {
        let mut buffer = RecvBuffer::with_capacity(512);
        let n = buffer.capacity();
        for byte in buffer.space().iter_mut() {
            *byte = b'x';
        }
        buffer.commit(n);
        buffer.consume(n - 4);
        assert!(buffer.space().is_empty());

        buffer.make_room();
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.space().len(), n - 4);
    }

    #[test]
    fn restore_refills_an_empty_buffer() {
        let mut buffer = RecvBuffer::with_capacity(512);
        buffer.restore(b"leftover");
        assert_eq!(buffer.as_slice(), b"leftover");
    }
}
