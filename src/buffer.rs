//! Receive buffer for incremental frame parsing

use crate::{
    constants::MAX_BUFFER_SIZE,
    error::{EslError, EslResult},
};

/// Growable byte buffer with a consumed-prefix cursor.
///
/// Bytes are appended at the tail and extracted from `pos`; `compact()`
/// drops the consumed prefix so the allocation does not grow unbounded.
#[derive(Debug, Default)]
pub(crate) struct EslBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl EslBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data
            .extend_from_slice(bytes);
    }

    /// Unconsumed byte count.
    pub(crate) fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn check_size_limits(&self) -> EslResult<()> {
        if self.len() > MAX_BUFFER_SIZE {
            return Err(EslError::protocol_error(format!(
                "Receive buffer exceeded {} bytes",
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Remove and return everything before `pattern`, consuming the pattern too.
    pub(crate) fn extract_until_pattern(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let pending = &self.data[self.pos..];
        let idx = pending
            .windows(pattern.len())
            .position(|w| w == pattern)?;
        let out = pending[..idx].to_vec();
        self.pos += idx + pattern.len();
        Some(out)
    }

    /// Remove and return exactly `n` bytes, or `None` if fewer are buffered.
    pub(crate) fn extract_bytes(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.len() < n {
            return None;
        }
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Some(out)
    }

    pub(crate) fn compact(&mut self) {
        if self.pos > 0 {
            self.data
                .drain(..self.pos);
            self.pos = 0;
        }
    }
}
