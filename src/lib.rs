//! A fixed-capacity block buffer cache.
//!
//! Every access to a device block goes through a [BufferCache]: callers lease a
//! slot for a `(device, block)` pair, read or modify its bytes while holding the
//! slot's exclusivity lock, optionally persist it, and then release the lease.
//! See [buffer_cache] for the locking protocol.
#![forbid(unsafe_op_in_unsafe_fn)]

use std::{io, result, sync::Arc};

use thiserror::Error;

pub mod buffer_cache;
mod config;
pub mod device;
pub mod sync;
mod types;
mod util;

pub use self::{
    buffer_cache::{Buf, BufferCache, CacheStats},
    config::{CacheConfig, ExhaustionPolicy},
    device::Adapter,
    sync::CancelToken,
    types::BlockKey,
};

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error {
    // Use `Arc` here so a single failure can be handed to several waiters.
    kind: Arc<ErrorKind>,
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The caller's [CancelToken] fired while it was waiting for a busy block.
    /// The lease was never granted.
    #[error("interrupted while waiting for a block")]
    Interrupted,
    #[error("a lock could not be acquired")]
    LockContended,
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(&'static str),
    /// The adapter failed to transfer a block.
    #[error("unexpected io error occurred: {0:?}")]
    Io(#[from] io::Error),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
        }
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    #[inline]
    fn from(error: E) -> Self {
        Error {
            kind: Arc::new(error.into()),
        }
    }
}

impl From<io::ErrorKind> for ErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        io::Error::from(kind).into()
    }
}

/// Halt on a broken invariant or an unrecoverable condition.
///
/// Contract breaches (releasing a buffer that is not held, refcount underflow)
/// and cache exhaustion end up here. They are not errors a caller can handle.
#[cold]
#[track_caller]
pub(crate) fn stop(reason: impl std::fmt::Display) -> ! {
    tracing::error!("buffer cache stopped: {}", reason);
    panic!("{}", reason)
}
