//! C ABI over a process-wide `Host<LlamaBackend>`.
//!
//! Strings returned by this module are heap-allocated and must be released
//! with [`pocket_free_string`]. No call unwinds across the boundary.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr;

use llama_rs::LlamaBackend;
use once_cell::sync::Lazy;
use pocket_core::RuntimeConfig;
use tracing::error;

use crate::asset::DirAssetSource;
use crate::host::Host;
use crate::logging::init_logging;
use crate::paths::default_cache_dir;

static HOST: Lazy<Host<LlamaBackend>> = Lazy::new(|| {
    init_logging();
    Host::new(LlamaBackend, RuntimeConfig::default().with_env_overrides())
});

fn catch_panic<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(_) => {
            error!("internal panic caught at the C boundary");
            fallback
        }
    }
}

/// Borrow a NUL-terminated UTF-8 argument. `None` for null or invalid UTF-8.
unsafe fn str_arg<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    CStr::from_ptr(p).to_str().ok()
}

fn into_c_string(s: String) -> *mut c_char {
    let cs = CString::new(s).unwrap_or_else(|e| {
        let mut bytes = e.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).unwrap_or_default()
    });
    cs.into_raw()
}

/// Stage `model_file_name` from the `assets_dir` bundle into `cache_dir`
/// (null means the default cache) and load it.
///
/// # Safety
/// Every non-null pointer must reference a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pocket_load_model(
    assets_dir: *const c_char,
    model_file_name: *const c_char,
    cache_dir: *const c_char,
) -> bool {
    catch_panic(false, || {
        let (Some(assets_dir), Some(name)) = (str_arg(assets_dir), str_arg(model_file_name))
        else {
            error!("pocket_load_model: null or non-UTF-8 argument");
            return false;
        };
        let cache: PathBuf = match str_arg(cache_dir) {
            Some(dir) => PathBuf::from(dir),
            None => default_cache_dir(),
        };
        HOST.load_model(&DirAssetSource::new(Path::new(assets_dir)), name, &cache)
    })
}

#[no_mangle]
pub extern "C" fn pocket_unload_model() {
    catch_panic((), || HOST.unload_model())
}

/// # Safety
/// `prompt` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn pocket_generate_text(prompt: *const c_char) -> *mut c_char {
    catch_panic(ptr::null_mut(), || {
        let text = match str_arg(prompt) {
            Some(prompt) => HOST.generate_text(prompt),
            None => "Error: Invalid prompt.".to_string(),
        };
        into_c_string(text)
    })
}

#[no_mangle]
pub extern "C" fn pocket_status() -> *mut c_char {
    catch_panic(ptr::null_mut(), || into_c_string(HOST.status()))
}

#[no_mangle]
pub extern "C" fn pocket_cancel() {
    catch_panic((), || HOST.cancel())
}

/// # Safety
/// `s` must be null or a pointer previously returned by this library and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn pocket_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interior_nul_is_stripped() {
        let p = into_c_string("a\0b".to_string());
        let back = unsafe { CString::from_raw(p) };
        assert_eq!(back.to_str().unwrap(), "ab");
    }

    #[test]
    fn null_arguments_are_rejected_without_touching_the_engine() {
        let ok = unsafe { pocket_load_model(ptr::null(), ptr::null(), ptr::null()) };
        assert!(!ok);
        let out = unsafe { pocket_generate_text(ptr::null()) };
        let text = unsafe { CStr::from_ptr(out) }.to_str().unwrap().to_owned();
        unsafe { pocket_free_string(out) };
        assert!(text.starts_with("Error:"));
    }
}
