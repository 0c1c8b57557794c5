//! Receive buffer with two-phase growth.
//!
//! The total size of a response may become known only after some bytes have
//! already arrived. Until then every chunk grows the buffer by exactly its own
//! size plus one terminator slot. The first time a nonzero total is reported the
//! buffer is grown once to `total + 1`, after which chunks are appended into the
//! reserved capacity.
//!
//! All reservations are fallible: an allocation failure is reported as a
//! [`BufferError`] instead of aborting the process.

/// Failure to grow a [`ReceiveBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The requested capacity could not be reserved.
    #[error("Failed to reserve {requested} bytes")]
    Allocation {
        /// Total capacity that was requested.
        requested: usize,
    },
}

/// An owned, growable byte region holding the body received for one task.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    bytes: Vec<u8>,
    total_reserved: bool,
}

impl ReceiveBuffer {
    /// Create an empty buffer in the size-unknown phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk in arrival order.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), BufferError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let headroom = usize::from(!self.total_reserved);
        let needed = chunk.len() + headroom;
        if self.bytes.capacity() - self.bytes.len() < needed {
            self.reserve(needed)?;
        }
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    /// Switch to the size-known phase, reserving room for `total` bytes plus a
    /// terminator slot.
    ///
    /// Only the first call with a nonzero total has any effect.
    pub fn reserve_total(&mut self, total: u64) -> Result<(), BufferError> {
        if self.total_reserved || total == 0 {
            return Ok(());
        }
        let target = usize::try_from(total)
            .ok()
            .and_then(|total| total.checked_add(1))
            .ok_or(BufferError::Allocation {
                requested: usize::MAX,
            })?;
        if target > self.bytes.len() {
            self.reserve(target - self.bytes.len())?;
        }
        self.total_reserved = true;
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> Result<(), BufferError> {
        self.bytes
            .try_reserve_exact(additional)
            .map_err(|_| BufferError::Allocation {
                requested: self.bytes.len().saturating_add(additional),
            })
    }

    /// The bytes received so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes received so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no bytes have been received.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Currently allocated capacity.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Whether the one-time total-size reservation has happened.
    pub fn is_total_reserved(&self) -> bool {
        self.total_reserved
    }
}
