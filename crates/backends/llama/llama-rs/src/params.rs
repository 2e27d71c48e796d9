// llama-rs/src/params.rs
//
// Backend-independent resolution of context knobs. The FFI layer applies the
// results on top of llama.cpp's own defaults.

use pocket_abi::ContextParams;

/// Half the logical cores, at least one.
pub fn default_threads() -> i32 {
    (num_cpus::get() / 2).clamp(1, i32::MAX as usize) as i32
}

/// Thread count for both single-token and batch decoding.
pub fn resolve_threads(params: &ContextParams) -> i32 {
    match params.n_threads {
        Some(n) if n > 0 => n,
        _ => default_threads(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threads_is_positive() {
        assert!(default_threads() >= 1);
    }

    #[test]
    fn explicit_threads_win_and_nonsense_falls_back() {
        let mut p = ContextParams::default();
        p.n_threads = Some(3);
        assert_eq!(resolve_threads(&p), 3);
        p.n_threads = Some(0);
        assert_eq!(resolve_threads(&p), default_threads());
        p.n_threads = None;
        assert_eq!(resolve_threads(&p), default_threads());
    }
}
