//! Owned buffer descriptor passed across the receive/send boundary.
//!
//! The application allocates a [`Buffer`], hands it to
//! [`start_receive`](crate::Proactor::start_receive) or
//! [`start_send`](crate::Proactor::start_send), and gets it back through the
//! matching completion callback. The engine holds the buffer only while the
//! operation is pending and never retains a reference afterward. A buffer
//! still pending when its socket is torn down is dropped with the socket;
//! the close callback is the only notification in that case.

/// A fixed-capacity byte buffer with a used-length watermark.
///
/// For receives the capacity bounds how much a single read may deliver and
/// `len` is set to the byte count actually read. For sends `len` is the
/// number of bytes to transmit, set when the buffer is constructed from
/// existing data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    len: usize,
}

impl Buffer {
    /// Creates an empty buffer with `capacity` bytes of zeroed storage.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: 0,
        }
    }

    /// Creates a buffer whose used length covers all of `data`.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self { data, len }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Used length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes are used.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The used portion of the buffer.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Mutable view of the used portion.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Resets the used length to zero. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Consumes the buffer, returning the used bytes.
    #[must_use]
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.len);
        self.data
    }

    /// Full-capacity view used by the engine when reading from a socket.
    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data[..]
    }

    /// Records how many bytes of the storage are now used.
    ///
    /// Saturates at the capacity; the engine only ever passes counts
    /// returned by a read into this storage.
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }
}
