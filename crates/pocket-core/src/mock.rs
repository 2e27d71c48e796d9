//! Scripted in-memory engine. Emits a fixed reply sequence, keeps a fake KV
//! cache, and records every engagement, allocation, decode and release so
//! tests can assert on the core's bookkeeping.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pocket_abi::{
    ContextParams, InferenceBackend, InferenceContext, ModelParams, Pos, SeqId, Token, TokenBatch,
    Vocabulary,
};

pub const UNK: Token = Token(0);
pub const BOS: Token = Token(1);
pub const EOS: Token = Token(2);

/// What the fake model knows and how it misbehaves.
#[derive(Debug, Clone)]
pub struct MockScript {
    /// Piece text by token id.
    pub vocab: Vec<String>,
    pub n_ctx: usize,
    pub add_bos: bool,
    /// Token favoured after each successful decode since the last reset
    /// (index 0 is the row produced by priming). Past the end, EOS wins.
    pub replies: Vec<i32>,
    /// Replaces every logits row when set (tie-break tests).
    pub row_override: Option<Vec<f32>>,
    /// Zero-based decode call (counting from the last reset) that reports failure.
    pub fail_decode_at: Option<usize>,
    /// Logits disappear once this many decodes happened since the last reset.
    pub withhold_logits_after: Option<usize>,
    pub memory_available: bool,
    pub reject_seq_rm: bool,
    pub fail_batch_alloc: bool,
    /// Batch allocations that succeed before every further one fails.
    pub fail_batch_alloc_after: Option<usize>,
    pub fail_load: bool,
    pub fail_context: bool,
    /// Tokens whose rendering fails outright.
    pub broken_pieces: Vec<i32>,
}

impl MockScript {
    /// Small chat vocabulary: `<unk> <s> </s> Hello , world ! how are you ?` plus one long piece.
    pub fn chat() -> Self {
        let vocab = [
            "<unk>",
            "<s>",
            "</s>",
            "Hello",
            ",",
            " world",
            "!",
            " how",
            " are",
            " you",
            "?",
            " supercalifragilisticexpialidocious-and-then-some",
            "a",
            "",
            "\u{e9}",
        ];
        Self {
            vocab: vocab.iter().map(|s| s.to_string()).collect(),
            n_ctx: 64,
            add_bos: true,
            replies: vec![4, 5, 6],
            row_override: None,
            fail_decode_at: None,
            withhold_logits_after: None,
            memory_available: true,
            reject_seq_rm: false,
            fail_batch_alloc: false,
            fail_batch_alloc_after: None,
            fail_load: false,
            fail_context: false,
            broken_pieces: Vec::new(),
        }
    }

    pub fn with_replies(mut self, replies: &[i32]) -> Self {
        self.replies = replies.to_vec();
        self
    }

    pub fn with_n_ctx(mut self, n_ctx: usize) -> Self {
        self.n_ctx = n_ctx;
        self
    }

    pub fn token_of(&self, piece: &str) -> Option<Token> {
        self.vocab
            .iter()
            .position(|p| p.trim() == piece)
            .map(|i| Token(i as i32))
    }
}

/// One token slot as submitted to `decode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub token: Token,
    pub pos: Pos,
    pub seq: SeqId,
    pub logits: bool,
}

/// Everything the fake engine observed.
#[derive(Debug, Clone, Default)]
pub struct MockLedger {
    pub engage_calls: usize,
    pub disengage_calls: usize,
    pub models_alive: usize,
    pub contexts_alive: usize,
    pub batches_alive: usize,
    pub batches_allocated: usize,
    pub seq_rm_calls: usize,
    /// Every batch handed to `decode`, in order, including failed ones.
    pub decoded: Vec<Vec<Slot>>,
    /// Fake KV cache: `(seq, pos, token)`.
    pub kv: Vec<(SeqId, Pos, Token)>,
    /// Teardown order ("context", "model").
    pub drops: Vec<&'static str>,
}

impl MockLedger {
    pub fn engaged(&self) -> bool {
        self.engage_calls > self.disengage_calls
    }

    pub fn kv_len(&self, seq: SeqId) -> usize {
        self.kv.iter().filter(|(s, _, _)| *s == seq).count()
    }
}

type Shared = Arc<Mutex<MockLedger>>;

fn lock(shared: &Shared) -> MutexGuard<'_, MockLedger> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct MockBackend {
    script: Arc<MockScript>,
    ledger: Shared,
}

impl MockBackend {
    pub fn new(script: MockScript) -> Self {
        Self {
            script: Arc::new(script),
            ledger: Arc::new(Mutex::new(MockLedger::default())),
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn ledger(&self) -> MockLedger {
        lock(&self.ledger).clone()
    }

    pub fn script(&self) -> &MockScript {
        &self.script
    }

    /// Model + context pair outside of any runtime, for engine-level tests.
    pub fn open(&self) -> (MockModel, MockContext) {
        let model = MockModel::new(Arc::clone(&self.script), Arc::clone(&self.ledger));
        let ctx = MockContext::new(
            Arc::clone(&self.script),
            Arc::clone(&self.ledger),
            self.script.n_ctx,
        );
        (model, ctx)
    }
}

impl InferenceBackend for MockBackend {
    type Model = MockModel;
    type Context = MockContext;

    fn engage(&self) {
        lock(&self.ledger).engage_calls += 1;
    }

    fn disengage(&self) {
        lock(&self.ledger).disengage_calls += 1;
    }

    fn load_model(&self, path: &Path, _params: &ModelParams) -> Result<MockModel, String> {
        if self.script.fail_load {
            return Err("scripted load failure".into());
        }
        if !path.exists() {
            return Err(format!("no such file: {}", path.display()));
        }
        Ok(MockModel::new(
            Arc::clone(&self.script),
            Arc::clone(&self.ledger),
        ))
    }

    fn new_context(
        &self,
        _model: &MockModel,
        params: &ContextParams,
    ) -> Result<MockContext, String> {
        if self.script.fail_context {
            return Err("scripted context failure".into());
        }
        let n_ctx = params
            .n_ctx
            .map(|n| n as usize)
            .unwrap_or(self.script.n_ctx);
        Ok(MockContext::new(
            Arc::clone(&self.script),
            Arc::clone(&self.ledger),
            n_ctx,
        ))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub struct MockModel {
    script: Arc<MockScript>,
    ledger: Shared,
}

impl MockModel {
    fn new(script: Arc<MockScript>, ledger: Shared) -> Self {
        lock(&ledger).models_alive += 1;
        Self { script, ledger }
    }
}

impl Drop for MockModel {
    fn drop(&mut self) {
        let mut l = lock(&self.ledger);
        l.models_alive -= 1;
        l.drops.push("model");
    }
}

impl Vocabulary for MockModel {
    fn n_tokens(&self) -> usize {
        self.script.vocab.len()
    }

    fn eos(&self) -> Token {
        EOS
    }

    fn tokenize(
        &self,
        text: &str,
        add_special: bool,
        _parse_special: bool,
    ) -> Result<Vec<Token>, String> {
        let mut out = Vec::new();
        if add_special && self.script.add_bos {
            out.push(BOS);
        }
        for word in text.split_whitespace() {
            let tok = self
                .script
                .token_of(word)
                .filter(|t| t.0 > EOS.0)
                .ok_or_else(|| format!("unknown word {word:?}"))?;
            out.push(tok);
        }
        Ok(out)
    }

    fn token_to_piece(&self, token: Token, buf: &mut [u8], _special: bool) -> i32 {
        if self.script.broken_pieces.contains(&token.0) {
            return -1;
        }
        let Some(piece) = self.script.vocab.get(token.0 as usize) else {
            return -1;
        };
        let bytes = piece.as_bytes();
        if bytes.len() > buf.len() {
            return -(bytes.len() as i32);
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        bytes.len() as i32
    }
}

pub struct MockContext {
    script: Arc<MockScript>,
    ledger: Shared,
    n_ctx: usize,
    decodes_since_reset: usize,
    row: Option<Vec<f32>>,
}

impl MockContext {
    fn new(script: Arc<MockScript>, ledger: Shared, n_ctx: usize) -> Self {
        lock(&ledger).contexts_alive += 1;
        Self {
            script,
            ledger,
            n_ctx,
            decodes_since_reset: 0,
            row: None,
        }
    }

    fn row_after(&self, decodes: usize) -> Vec<f32> {
        if let Some(row) = &self.script.row_override {
            return row.clone();
        }
        let mut row = vec![0.0; self.script.vocab.len()];
        let favoured = self
            .script
            .replies
            .get(decodes - 1)
            .copied()
            .unwrap_or(EOS.0);
        if let Some(slot) = row.get_mut(favoured as usize) {
            *slot = 1.0;
        }
        row
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        let mut l = lock(&self.ledger);
        l.contexts_alive -= 1;
        l.drops.push("context");
    }
}

impl InferenceContext for MockContext {
    type Batch = MockBatch;

    fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    fn seq_rm(&mut self, seq: SeqId, p0: Pos, p1: Pos) -> Option<bool> {
        if !self.script.memory_available {
            return None;
        }
        let mut l = lock(&self.ledger);
        l.seq_rm_calls += 1;
        if self.script.reject_seq_rm {
            return Some(false);
        }
        l.kv
            .retain(|(s, p, _)| !(*s == seq && *p >= p0 && (p1 < 0 || *p < p1)));
        drop(l);
        // Like llama.cpp, clearing memory leaves the last logits row in place.
        self.decodes_since_reset = 0;
        Some(true)
    }

    fn batch(&self, n_tokens: usize) -> Option<MockBatch> {
        if self.script.fail_batch_alloc {
            return None;
        }
        let mut l = lock(&self.ledger);
        if self
            .script
            .fail_batch_alloc_after
            .is_some_and(|n| l.batches_allocated >= n)
        {
            return None;
        }
        l.batches_alive += 1;
        l.batches_allocated += 1;
        Some(MockBatch {
            slots: Vec::with_capacity(n_tokens),
            capacity: n_tokens,
            ledger: Arc::clone(&self.ledger),
        })
    }

    fn decode(&mut self, batch: &MockBatch) -> i32 {
        let call = self.decodes_since_reset;
        let mut l = lock(&self.ledger);
        l.decoded.push(batch.slots.clone());

        if self.script.fail_decode_at == Some(call) {
            return 1;
        }
        // Overlapping positions mean the caller forgot to clear the sequence.
        let clash = batch.slots.iter().any(|slot| {
            l.kv
                .iter()
                .any(|(s, p, _)| *s == slot.seq && *p == slot.pos)
        });
        if clash || batch.slots.iter().any(|s| s.pos as usize >= self.n_ctx) {
            return -1;
        }
        for slot in &batch.slots {
            l.kv.push((slot.seq, slot.pos, slot.token));
        }
        drop(l);

        self.decodes_since_reset += 1;
        self.row = batch
            .slots
            .last()
            .filter(|s| s.logits)
            .map(|_| self.row_after(self.decodes_since_reset));
        0
    }

    fn logits_ith(&self, _i: i32, n_vocab: usize) -> Option<&[f32]> {
        if let Some(limit) = self.script.withhold_logits_after {
            if self.decodes_since_reset >= limit {
                return None;
            }
        }
        let row = self.row.as_ref()?;
        Some(&row[..n_vocab.min(row.len())])
    }
}

pub struct MockBatch {
    slots: Vec<Slot>,
    capacity: usize,
    ledger: Shared,
}

impl TokenBatch for MockBatch {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, token: Token, pos: Pos, seq: SeqId, logits: bool) -> Result<(), String> {
        if self.slots.len() >= self.capacity {
            return Err(format!("batch full ({} slots)", self.capacity));
        }
        self.slots.push(Slot {
            token,
            pos,
            seq,
            logits,
        });
        Ok(())
    }
}

impl Drop for MockBatch {
    fn drop(&mut self) {
        lock(&self.ledger).batches_alive -= 1;
    }
}
