use crate::base::CancellationToken;
use crate::env::Env;
use crate::errors::Canceled;

/// A handler's margin request towards the surrounding newline budget.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SepConstraint {
    pub min_nl: u32,
}

impl SepConstraint {
    pub const NONE: SepConstraint = SepConstraint { min_nl: 0 };

    pub fn min(min_nl: u32) -> Self {
        SepConstraint { min_nl }
    }
}

/// Mutable serialization context threaded through the handlers: the
/// output buffer, the pending newline budget, and the pre-edit source
/// for selective reuse.
pub struct SerializerState<'e> {
    pub env: &'e Env,
    out: String,
    pending_min_nl: u32,
    orig_src: Option<String>,
    cancel: Option<CancellationToken>,
    /// End offset of the last source-reused sibling; lets the walk
    /// carry over the separator run between two reused ranges.
    last_reuse_end: Option<u32>,
}

impl<'e> SerializerState<'e> {
    pub fn new(env: &'e Env, orig_src: Option<String>, cancel: Option<CancellationToken>) -> Self {
        SerializerState {
            env,
            out: String::new(),
            pending_min_nl: 0,
            orig_src,
            cancel,
            last_reuse_end: None,
        }
    }

    #[inline]
    pub fn take_last_reuse_end(&mut self) -> Option<u32> {
        self.last_reuse_end.take()
    }

    #[inline]
    pub fn note_reuse_end(&mut self, end: u32) {
        self.last_reuse_end = Some(end);
    }

    #[inline]
    pub fn break_reuse_run(&mut self) {
        self.last_reuse_end = None;
    }

    #[inline]
    pub fn orig_src(&self) -> Option<&str> {
        self.orig_src.as_deref()
    }

    #[inline]
    pub fn check_cancel(&self) -> Result<(), Canceled> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    /// Raises the newline requirement between the previous chunk and
    /// the next one. Budgets never shrink.
    pub fn require_newlines(&mut self, min_nl: u32) {
        self.pending_min_nl = self.pending_min_nl.max(min_nl);
    }

    /// True at the start of the output or right after a newline.
    pub fn at_sol(&self) -> bool {
        self.pending_min_nl > 0 || self.out.is_empty() || self.out.ends_with('\n')
    }

    fn flush_separator(&mut self) {
        let min = std::mem::replace(&mut self.pending_min_nl, 0);

        if min == 0 || self.out.is_empty() {
            return;
        }

        let trailing = self.out.chars().rev().take_while(|&c| c == '\n').count() as u32;

        for _ in trailing..min {
            self.out.push('\n');
        }
    }

    pub fn emit(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }

        self.flush_separator();
        self.out.push_str(chunk);
    }

    /// Emits a chunk that surrounding reflows must never split; it
    /// lands in the output atomically with its separator resolved up
    /// front.
    pub fn emit_constrained(&mut self, chunk: &str) {
        self.emit(chunk);
    }

    #[inline]
    pub fn output(&self) -> &str {
        &self.out
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_budget_tops_up_existing_newlines() {
        let env = Env::default();
        let mut state = SerializerState::new(&env, None, None);

        state.emit("a\n");
        state.require_newlines(2);
        state.emit("b");

        assert_eq!(state.output(), "a\n\nb");
    }

    #[test]
    fn budget_never_shrinks_and_resets_after_flush() {
        let env = Env::default();
        let mut state = SerializerState::new(&env, None, None);

        state.emit("a");
        state.require_newlines(2);
        state.require_newlines(1);
        state.emit("b");
        state.emit("c");

        assert_eq!(state.output(), "a\n\nbc");
    }

    #[test]
    fn no_leading_margin_at_document_start() {
        let env = Env::default();
        let mut state = SerializerState::new(&env, None, None);

        state.require_newlines(2);
        state.emit("a");

        assert_eq!(state.output(), "a");
    }

    #[test]
    fn sol_tracking() {
        let env = Env::default();
        let mut state = SerializerState::new(&env, None, None);

        assert!(state.at_sol());

        state.emit("text");
        assert!(!state.at_sol());

        state.emit("line\n");
        assert!(state.at_sol());
    }
}
