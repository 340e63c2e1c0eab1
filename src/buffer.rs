use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Pool of reusable buffers to avoid reallocating for every record.
#[derive(Debug, Default)]
pub(crate) struct BufferPool {
    free: VecDeque<Buf>,
}

impl BufferPool {
    pub fn pop(&mut self) -> Buf {
        let mut buf = self.free.pop_front().unwrap_or_default();
        buf.clear();
        buf
    }

    pub fn push(&mut self, buf: Buf) {
        self.free.push_back(buf);
    }
}

/// Byte buffer, a thin newtype over `Vec<u8>`.
#[derive(Default, PartialEq, Eq, Clone)]
pub struct Buf(Vec<u8>);

impl Buf {
    pub fn new() -> Self {
        Buf(Vec::new())
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Buf(slice.to_vec())
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn extend_from_slice(&mut self, slice: &[u8]) {
        self.0.extend_from_slice(slice);
    }

    pub fn push(&mut self, byte: u8) {
        self.0.push(byte);
    }

    pub fn resize(&mut self, new_len: usize, value: u8) {
        self.0.resize(new_len, value);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Buf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buf({} bytes)", self.0.len())
    }
}
