use pocket_abi::{Token, Vocabulary};

/// Starting size of the token-to-text buffer; grown on demand.
pub const INITIAL_PIECE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceError {
    /// The token renders to nothing.
    Empty,
    /// The backend reported failure with this code.
    Failed(i32),
}

/// Growable scratch buffer for rendering single tokens.
///
/// The backend reports either the written length or, when the buffer is too
/// small, the negated size it needs; the buffer grows to that size and the
/// render is retried once.
#[derive(Debug)]
pub struct PieceBuffer {
    buf: Vec<u8>,
}

impl Default for PieceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceBuffer {
    pub fn new() -> Self {
        Self {
            buf: vec![0; INITIAL_PIECE_CAPACITY],
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes for `token`, valid until the next render.
    pub fn render<V: Vocabulary>(&mut self, vocab: &V, token: Token) -> Result<&[u8], PieceError> {
        let mut n = vocab.token_to_piece(token, &mut self.buf, true);
        if n < 0 {
            let needed = n.unsigned_abs() as usize;
            if needed <= self.buf.len() {
                return Err(PieceError::Failed(n));
            }
            self.buf.resize(needed, 0);
            n = vocab.token_to_piece(token, &mut self.buf, true);
        }
        match n {
            0 => Err(PieceError::Empty),
            n if n < 0 || n as usize > self.buf.len() => Err(PieceError::Failed(n)),
            n => Ok(&self.buf[..n as usize]),
        }
    }
}
