// llama-rs/src/model.rs

use std::ffi::CString;
use std::os::raw::c_char;
use std::path::Path;
use std::ptr::NonNull;

use llama_cpp_sys_2::{
    llama_model, llama_model_free, llama_model_get_vocab, llama_model_load_from_file,
    llama_token_to_piece, llama_tokenize, llama_vocab, llama_vocab_eos, llama_vocab_n_tokens,
};
use pocket_abi::{ModelParams, Token, Vocabulary};
use tracing::debug;

use crate::ffi::model_params;

/// Loaded weights plus the vocabulary they carry.
pub struct LlamaModel {
    model: NonNull<llama_model>,
    vocab: NonNull<llama_vocab>,
}

impl LlamaModel {
    pub fn load(path: &Path, params: &ModelParams) -> Result<Self, String> {
        let path_str = path.to_str().ok_or_else(|| "non-UTF8 model path".to_string())?;
        let c_path = CString::new(path_str).map_err(|_| "invalid model path".to_string())?;

        debug!(path = path_str, "[ffi] llama_model_load_from_file");
        let raw = unsafe { llama_model_load_from_file(c_path.as_ptr(), model_params(params)) };
        let model = NonNull::new(raw)
            .ok_or_else(|| format!("llama_model_load_from_file failed for {path_str}"))?;

        let vocab = unsafe { llama_model_get_vocab(model.as_ptr()) } as *mut llama_vocab;
        match NonNull::new(vocab) {
            Some(vocab) => Ok(Self { model, vocab }),
            None => {
                unsafe { llama_model_free(model.as_ptr()) };
                Err("llama_model_get_vocab returned null".into())
            }
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut llama_model {
        self.model.as_ptr()
    }

    #[inline]
    fn vocab_ptr(&self) -> *const llama_vocab {
        self.vocab.as_ptr()
    }
}

impl Vocabulary for LlamaModel {
    fn n_tokens(&self) -> usize {
        unsafe { llama_vocab_n_tokens(self.vocab_ptr()) }.max(0) as usize
    }

    fn eos(&self) -> Token {
        Token(unsafe { llama_vocab_eos(self.vocab_ptr()) })
    }

    /// Two-pass tokenize: probe with an empty buffer for the size, then fill.
    fn tokenize(
        &self,
        text: &str,
        add_special: bool,
        parse_special: bool,
    ) -> Result<Vec<Token>, String> {
        let text_len =
            i32::try_from(text.len()).map_err(|_| "prompt exceeds i32::MAX bytes".to_string())?;
        let text_ptr = text.as_ptr() as *const c_char;

        let probe = unsafe {
            llama_tokenize(
                self.vocab_ptr(),
                text_ptr,
                text_len,
                std::ptr::null_mut(),
                0,
                add_special,
                parse_special,
            )
        };
        if probe == 0 {
            return Ok(Vec::new());
        }
        if probe == i32::MIN {
            return Err("llama_tokenize overflowed".into());
        }
        let needed = probe.unsigned_abs() as usize;

        let mut buf = vec![0i32; needed];
        let filled = unsafe {
            llama_tokenize(
                self.vocab_ptr(),
                text_ptr,
                text_len,
                buf.as_mut_ptr(),
                needed as i32,
                add_special,
                parse_special,
            )
        };
        if filled < 0 {
            return Err(format!("llama_tokenize(fill) failed: {filled}"));
        }
        buf.truncate(filled as usize);
        Ok(buf.into_iter().map(Token).collect())
    }

    fn token_to_piece(&self, token: Token, buf: &mut [u8], special: bool) -> i32 {
        let len = buf.len().min(i32::MAX as usize) as i32;
        unsafe {
            llama_token_to_piece(
                self.vocab_ptr(),
                token.0,
                buf.as_mut_ptr() as *mut c_char,
                len,
                0, // lstrip
                special,
            )
        }
    }
}

impl Drop for LlamaModel {
    fn drop(&mut self) {
        debug!("[ffi] llama_model_free");
        unsafe { llama_model_free(self.model.as_ptr()) };
    }
}

// SAFETY: llama.cpp models are immutable after load; all mutable state lives
// in contexts. The vocab pointer is owned by the model and dies with it.
unsafe impl Send for LlamaModel {}
unsafe impl Sync for LlamaModel {}
