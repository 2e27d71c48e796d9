/// Wrapper for a model token (ID). Using a newtype avoids accidental
/// mixing with unrelated `i32`s and keeps conversions explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Token(pub i32);

impl From<i32> for Token {
    #[inline]
    fn from(value: i32) -> Self {
        Token(value)
    }
}

impl From<Token> for i32 {
    #[inline]
    fn from(token: Token) -> i32 {
        token.0
    }
}

/// Logical sequence id inside one context's KV cache (matches `llama_seq_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqId(pub i32);

/// Absolute token position inside a sequence (matches `llama_pos`).
pub type Pos = i32;

/// Position sentinel meaning "to the end of the sequence" in range operations.
pub const POS_END: Pos = -1;

/// Logits index meaning "the last token decoded with logits enabled".
pub const LAST_LOGITS: i32 = -1;
