//! Reusable read buffer.

/// Fixed-capacity byte buffer refilled from the engine.
///
/// Tracks the filled length (`top`) and the read position (`pos`), with
/// `pos <= top <= capacity` at all times.
#[derive(Debug)]
pub struct ReadBuffer {
    data: Vec<u8>,
    pos: usize,
    top: usize,
}

impl ReadBuffer {
    /// Creates an empty buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            pos: 0,
            top: 0,
        }
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of filled bytes.
    pub fn filled(&self) -> usize {
        self.top
    }

    /// Returns true when every filled byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.top
    }

    /// Bytes filled but not yet consumed.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..self.top]
    }

    /// Refills the buffer. `fill` receives the whole buffer and returns the
    /// number of bytes it wrote; larger counts are clamped to the capacity.
    pub fn refill<F>(&mut self, fill: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let written = fill(&mut self.data);
        self.top = written.min(self.data.len());
        self.pos = 0;
        self.top
    }

    /// Consumes `len` bytes, stopping at the filled length.
    pub fn advance(&mut self, len: usize) {
        self.pos = (self.pos + len).min(self.top);
    }

    /// Drops every unread byte.
    pub fn discard(&mut self) {
        self.pos = self.top;
    }
}
