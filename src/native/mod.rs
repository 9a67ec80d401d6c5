//! The C-style boundary to the synthesis engine.
//!
//! Every string the engine hands back (results and error messages alike) is
//! owned by the engine and must be returned through
//! [`NativeApi::free_c_string`] exactly once.

use std::ffi::c_char;

#[cfg(feature = "native")]
pub mod linked;
#[cfg(any(test, feature = "loopback"))]
pub mod loopback;

#[cfg(feature = "native")]
pub use linked::LinkedNative;
#[cfg(any(test, feature = "loopback"))]
pub use loopback::{LoopbackBehavior, LoopbackNative, LoopbackStats};

/// Opaque engine instance.
#[repr(C)]
pub struct CEngine {
    _private: [u8; 0],
}

/// Opaque cancel token.
#[repr(C)]
pub struct CancelToken {
    _private: [u8; 0],
}

/// Function table of the `neutrino_tau_*` exports.
///
/// Calls that can fail return null and, when `err` is non-null, store an
/// engine-owned error string into it.
pub trait NativeApi: Send + Sync {
    unsafe fn create_engine(
        &self,
        engine_path: *const c_char,
        err: *mut *mut c_char,
    ) -> *mut CEngine;

    unsafe fn load_voice_sources_json(
        &self,
        engine: *mut CEngine,
        err: *mut *mut c_char,
    ) -> *mut c_char;

    unsafe fn destroy_engine(&self, engine: *mut CEngine);

    fn create_cancel_token(&self) -> *mut CancelToken;

    /// Idempotent.
    unsafe fn cancel_token_cancel(&self, token: *mut CancelToken);

    /// Must not be called while a synthesis using `token` is in flight.
    unsafe fn destroy_cancel_token(&self, token: *mut CancelToken);

    /// Blocks until synthesis finishes or `cancel_token` is cancelled.
    /// Exactly one of the return value and `*err` is non-null on return.
    unsafe fn synthesize(
        &self,
        engine: *mut CEngine,
        synthesis_task_json: *const c_char,
        cancel_token: *const CancelToken,
        err: *mut *mut c_char,
    ) -> *mut c_char;

    unsafe fn free_c_string(&self, cstr: *mut c_char);
}
