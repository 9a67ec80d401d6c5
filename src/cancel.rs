//! The two halves of a cancellation pair: a local flag polled at run
//! checkpoints, and the native token that reaches into the engine call.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SynthesisError;
use crate::native::{CancelToken, NativeApi};

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checkpoint: fails with [`SynthesisError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<(), SynthesisError> {
        if self.is_cancelled() {
            Err(SynthesisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Non-owning reference to a live native cancel token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelHandle(NonNull<CancelToken>);

// The engine's cancel tokens are thread-safe; the handle only carries the
// address between threads.
unsafe impl Send for CancelHandle {}
unsafe impl Sync for CancelHandle {}

impl CancelHandle {
    pub fn as_ptr(self) -> *mut CancelToken {
        self.0.as_ptr()
    }
}

/// Owns a native cancel token and destroys it on drop.
pub struct OwnedCancelToken {
    api: Arc<dyn NativeApi>,
    handle: CancelHandle,
}

impl OwnedCancelToken {
    /// Returns `None` when the engine could not allocate a token.
    pub fn create(api: &Arc<dyn NativeApi>) -> Option<Self> {
        let ptr = NonNull::new(api.create_cancel_token())?;
        Some(Self {
            api: Arc::clone(api),
            handle: CancelHandle(ptr),
        })
    }

    pub fn handle(&self) -> CancelHandle {
        self.handle
    }

    pub fn cancel(&self) {
        unsafe { self.api.cancel_token_cancel(self.handle.as_ptr()) }
    }
}

impl Drop for OwnedCancelToken {
    fn drop(&mut self) {
        unsafe { self.api.destroy_cancel_token(self.handle.as_ptr()) }
    }
}

impl std::fmt::Debug for OwnedCancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OwnedCancelToken").field(&self.handle).finish()
    }
}
