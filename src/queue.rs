use crate::buffer::Buf;
use crate::incoming::Incoming;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Incoming datagrams waiting to be consumed by the state machine.
#[derive(Default)]
pub(crate) struct QueueRx {
    inner: VecDeque<Incoming>,
}

impl Deref for QueueRx {
    type Target = VecDeque<Incoming>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for QueueRx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl fmt::Debug for QueueRx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueRx({} datagrams)", self.inner.len())
    }
}

/// Outgoing datagrams waiting to be polled by the caller.
#[derive(Default)]
pub(crate) struct QueueTx {
    inner: VecDeque<Buf>,
}

impl Deref for QueueTx {
    type Target = VecDeque<Buf>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for QueueTx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl fmt::Debug for QueueTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueueTx({} datagrams)", self.inner.len())
    }
}
