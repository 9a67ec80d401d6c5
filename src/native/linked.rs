use std::ffi::c_char;

use super::{CEngine, CancelToken, NativeApi};

#[link(name = "neutrino_tau_native")]
extern "C" {
    fn neutrino_tau_create_engine(dll_path: *const c_char, err: *mut *mut c_char) -> *mut CEngine;
    fn neutrino_tau_load_voice_sources_json(
        engine: *mut CEngine,
        err: *mut *mut c_char,
    ) -> *mut c_char;
    fn neutrino_tau_destroy_engine(engine: *mut CEngine);
    fn neutrino_tau_create_cancel_token() -> *mut CancelToken;
    fn neutrino_tau_cancel_token_cancel(token: *mut CancelToken);
    fn neutrino_tau_destroy_cancel_token(token: *mut CancelToken);
    fn neutrino_tau_synthesize(
        engine: *mut CEngine,
        synthesis_task_json: *const c_char,
        cancel_token: *const CancelToken,
        err: *mut *mut c_char,
    ) -> *mut c_char;
    fn neutrino_tau_free_c_string(cstr: *mut c_char);
}

/// The prebuilt `neutrino_tau_native` library, linked at build time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedNative;

impl NativeApi for LinkedNative {
    unsafe fn create_engine(
        &self,
        engine_path: *const c_char,
        err: *mut *mut c_char,
    ) -> *mut CEngine {
        unsafe { neutrino_tau_create_engine(engine_path, err) }
    }

    unsafe fn load_voice_sources_json(
        &self,
        engine: *mut CEngine,
        err: *mut *mut c_char,
    ) -> *mut c_char {
        unsafe { neutrino_tau_load_voice_sources_json(engine, err) }
    }

    unsafe fn destroy_engine(&self, engine: *mut CEngine) {
        unsafe { neutrino_tau_destroy_engine(engine) }
    }

    fn create_cancel_token(&self) -> *mut CancelToken {
        unsafe { neutrino_tau_create_cancel_token() }
    }

    unsafe fn cancel_token_cancel(&self, token: *mut CancelToken) {
        unsafe { neutrino_tau_cancel_token_cancel(token) }
    }

    unsafe fn destroy_cancel_token(&self, token: *mut CancelToken) {
        unsafe { neutrino_tau_destroy_cancel_token(token) }
    }

    unsafe fn synthesize(
        &self,
        engine: *mut CEngine,
        synthesis_task_json: *const c_char,
        cancel_token: *const CancelToken,
        err: *mut *mut c_char,
    ) -> *mut c_char {
        unsafe { neutrino_tau_synthesize(engine, synthesis_task_json, cancel_token, err) }
    }

    unsafe fn free_c_string(&self, cstr: *mut c_char) {
        unsafe { neutrino_tau_free_c_string(cstr) }
    }
}
