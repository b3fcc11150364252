use std::fmt::Display;

use tracing::trace;

use crate::{BlockKey, Result};

use super::Adapter;

/// Emits a trace event for every transfer before passing it on.
pub struct TracingAdapter<A> {
    id: String,
    inner: A,
}

impl<A> TracingAdapter<A> {
    pub fn new<ID>(inner: A, id: ID) -> Self
    where
        ID: Display,
    {
        let id = id.to_string();
        Self { id, inner }
    }

    pub fn get_ref(&self) -> &A {
        &self.inner
    }
}

impl<A> Adapter for TracingAdapter<A>
where
    A: Adapter,
{
    fn read(&self, key: BlockKey, buf: &mut [u8]) -> Result<()> {
        trace!("device.read({}, {}, {})", self.id, key, buf.len());
        self.inner.read(key, buf)
    }

    fn write(&self, key: BlockKey, buf: &[u8]) -> Result<()> {
        trace!("device.write({}, {}, {})", self.id, key, buf.len());
        self.inner.write(key, buf)
    }
}
