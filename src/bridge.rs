//! Framing of the blocking synthesis call: payload encoding, the
//! success-xor-error return contract, and release of engine-owned strings.

use std::borrow::Cow;
use std::ffi::{c_char, CStr, CString};
use std::ptr::NonNull;

use crate::cancel::CancelHandle;
use crate::engine::NativeEngine;
use crate::error::SynthesisError;
use crate::native::NativeApi;
use crate::payload::SynthesisTaskPayload;
use crate::response::{decode_response, SynthesisResponse};

const UNKNOWN_NATIVE_ERROR: &str = "Unknown native error";

/// An engine-owned C string, returned to the engine when dropped.
pub struct NativeString<'a> {
    api: &'a dyn NativeApi,
    ptr: NonNull<c_char>,
}

impl<'a> NativeString<'a> {
    /// Takes ownership of `ptr`; `None` for null.
    ///
    /// # Safety
    /// `ptr` must be null or a NUL-terminated string allocated by `api` that
    /// nothing else will free.
    pub unsafe fn from_raw(api: &'a dyn NativeApi, ptr: *mut c_char) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { api, ptr })
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }.to_string_lossy()
    }
}

impl Drop for NativeString<'_> {
    fn drop(&mut self) {
        unsafe { self.api.free_c_string(self.ptr.as_ptr()) }
    }
}

/// Error text from an optional error buffer, with a generic fallback for a
/// missing or blank message.
pub fn native_error_message(error: Option<&NativeString<'_>>) -> String {
    error
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_NATIVE_ERROR.to_string())
}

/// Both output buffers of one native call.
pub struct NativeReply<'a> {
    result: Option<NativeString<'a>>,
    error: Option<NativeString<'a>>,
}

impl NativeReply<'_> {
    /// Result text, or the engine's error. Buffers are freed when `self`
    /// goes out of scope.
    pub fn text(&self) -> Result<Cow<'_, str>, SynthesisError> {
        match &self.result {
            Some(result) => Ok(result.to_string_lossy()),
            None => Err(SynthesisError::Native(native_error_message(
                self.error.as_ref(),
            ))),
        }
    }

    pub fn decode(self) -> Result<SynthesisResponse, SynthesisError> {
        let text = self.text()?;
        decode_response(&text)
    }
}

pub fn encode_payload(payload: &SynthesisTaskPayload) -> Result<CString, SynthesisError> {
    let json =
        serde_json::to_string(payload).map_err(|e| SynthesisError::Encode(e.to_string()))?;
    CString::new(json).map_err(|e| SynthesisError::Encode(e.to_string()))
}

pub struct NativeBridge<'a> {
    engine: &'a NativeEngine,
}

impl<'a> NativeBridge<'a> {
    pub fn new(engine: &'a NativeEngine) -> Self {
        Self { engine }
    }

    /// Performs the blocking call. Whatever the engine hands back is owned
    /// by the returned reply.
    pub fn call(&self, payload: &CStr, cancel: CancelHandle) -> NativeReply<'a> {
        let api = self.engine.api();
        let mut error_ptr: *mut c_char = std::ptr::null_mut();
        let result_ptr = unsafe {
            api.synthesize(
                self.engine.as_ptr(),
                payload.as_ptr(),
                cancel.as_ptr(),
                &mut error_ptr,
            )
        };

        NativeReply {
            result: unsafe { NativeString::from_raw(api, result_ptr) },
            error: unsafe { NativeString::from_raw(api, error_ptr) },
        }
    }

    /// Encode, call and decode in one step, without cancellation checkpoints.
    pub fn synthesize(
        &self,
        payload: &SynthesisTaskPayload,
        cancel: CancelHandle,
    ) -> Result<SynthesisResponse, SynthesisError> {
        let request = encode_payload(payload)?;
        self.call(&request, cancel).decode()
    }
}
