//! The pull-based operator protocol and the concrete operators built on it.
//!
//! Every plan node implements [`Operator`]: a capability trait with per-kind
//! hooks (`init`, `fetch_next`, `fetch_next_ready`, `cleanup_inner`,
//! `rewind_inner`) and a provided driving surface (`open`, `next`,
//! `next_ready`, `rewind`, `cleanup`) that owns the lifecycle state machine.
//! Shared child/state bookkeeping lives in the composed [`OperatorBase`]
//! instead of an inheritance chain.
//!
//! Pull protocol:
//! - [`Operator::next`] blocks until the next batch or end of stream.
//! - [`Operator::next_ready`] never blocks; `None` means "nothing ready yet"
//!   until [`Operator::eos`]/[`Operator::eoi`] report a terminal state.
//!
//! EOS is hard: no more data, ever. EOI is soft: an iterative plan may
//! [`Operator::rewind`] the tree and run another round.

pub mod aggregate;
pub mod consumer;
pub mod filter;
pub mod insert;
pub mod project;
pub mod raw_scan;
pub mod rename;
pub mod root;
pub mod tuple_source;
pub mod union_all;

use std::fmt::Debug;

use weft_error::{Result, WeftError};
use weft_sheaf::batch::TupleBatch;
use weft_sheaf::field::Schema;

use crate::env::ExecEnv;

pub type BoxedOperator = Box<dyn Operator>;

/// Lifecycle state of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    #[default]
    Created,
    Open,
    Closed,
}

/// Shared bookkeeping every operator composes: lifecycle state, terminal
/// flags, and the child list.
#[derive(Debug, Default)]
pub struct OperatorBase {
    state: ExecState,
    eos: bool,
    eoi: bool,
    children: Vec<BoxedOperator>,
}

impl OperatorBase {
    /// Base for a leaf operator (no children).
    pub fn leaf() -> Self {
        Self::default()
    }

    pub fn unary(child: BoxedOperator) -> Self {
        Self::nary(vec![child])
    }

    pub fn nary(children: Vec<BoxedOperator>) -> Self {
        OperatorBase {
            children,
            ..Default::default()
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ExecState) {
        self.state = state;
    }

    pub fn eos(&self) -> bool {
        self.eos
    }

    pub fn eoi(&self) -> bool {
        self.eoi
    }

    pub fn set_eos(&mut self) {
        self.eos = true;
    }

    pub fn set_eoi(&mut self) {
        self.eoi = true;
    }

    pub fn clear_eoi(&mut self) {
        self.eoi = false;
    }

    pub fn children(&self) -> &[BoxedOperator] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<BoxedOperator> {
        &mut self.children
    }

    pub fn child_mut(&mut self, idx: usize) -> Result<&mut BoxedOperator> {
        let num = self.children.len();
        self.children.get_mut(idx).ok_or_else(|| {
            WeftError::illegal_state(format!(
                "Operator expected a child at index {idx}, has {num}"
            ))
        })
    }

    pub fn replace_children(&mut self, children: Vec<BoxedOperator>) {
        self.children = children;
    }

    pub fn check_open(&self, what: &str) -> Result<()> {
        match self.state {
            ExecState::Open => Ok(()),
            other => Err(WeftError::illegal_state(format!(
                "Cannot call {what} in state {other:?}"
            ))),
        }
    }
}

pub trait Operator: Debug + Send {
    fn base(&self) -> &OperatorBase;

    fn base_mut(&mut self) -> &mut OperatorBase;

    /// The fixed output schema. Available once children are attached, before
    /// `open`.
    fn schema(&self) -> &Schema;

    /// One-time setup from the environment context. Children are already
    /// open when this runs. Configuration failures abort plan startup.
    fn init(&mut self, _env: &ExecEnv) -> Result<()> {
        Ok(())
    }

    /// Blocking pull hook. `None` means end of stream, unless the hook set
    /// the EOI flag first.
    fn fetch_next(&mut self) -> Result<Option<TupleBatch>>;

    /// Non-blocking pull hook. `None` means "nothing ready"; hooks signal
    /// terminal states through the base flags, never by blocking.
    fn fetch_next_ready(&mut self) -> Result<Option<TupleBatch>>;

    /// Release runtime resources. Children are cleaned separately.
    fn cleanup_inner(&mut self) -> Result<()> {
        Ok(())
    }

    /// Reset iteration-local state (not connection state) for another round.
    fn rewind_inner(&mut self, _env: &ExecEnv) -> Result<()> {
        Ok(())
    }

    // --- provided driving surface ---

    /// Created → Open. Opens children first, then runs `init`. If init
    /// fails, everything opened or reserved so far is cleaned up before the
    /// error propagates.
    fn open(&mut self, env: &ExecEnv) -> Result<()> {
        if self.base().state() != ExecState::Created {
            return Err(WeftError::illegal_state(format!(
                "Cannot open operator in state {:?}",
                self.base().state()
            )));
        }

        let mut child_err = None;
        for child in self.base_mut().children_mut() {
            if let Err(err) = child.open(env) {
                child_err = Some(err);
                break;
            }
        }
        if let Some(err) = child_err {
            for child in self.base_mut().children_mut() {
                let _ = child.cleanup();
            }
            return Err(err);
        }

        if let Err(err) = self.init(env) {
            // Partially-initialized operators still get a cleanup pass so
            // reserved channels and connections are not leaked.
            self.base_mut().set_state(ExecState::Open);
            let _ = self.cleanup();
            return Err(err);
        }

        self.base_mut().set_state(ExecState::Open);
        Ok(())
    }

    /// Blocking pull. Returns `None` at a terminal state; consult
    /// [`eos`](Self::eos)/[`eoi`](Self::eoi) to tell which.
    fn next(&mut self) -> Result<Option<TupleBatch>> {
        self.base().check_open("next")?;
        if self.base().eos() || self.base().eoi() {
            return Ok(None);
        }
        let batch = self.fetch_next()?;
        if batch.is_none() && !self.base().eoi() {
            self.base_mut().set_eos();
        }
        Ok(batch)
    }

    /// Non-blocking pull. `None` while nothing is ready and at terminal
    /// states.
    fn next_ready(&mut self) -> Result<Option<TupleBatch>> {
        self.base().check_open("next_ready")?;
        if self.base().eos() || self.base().eoi() {
            return Ok(None);
        }
        self.fetch_next_ready()
    }

    /// Hard terminal: no more data will ever be produced.
    fn eos(&self) -> bool {
        self.base().eos()
    }

    /// Soft terminal: the current round is over, a rewind may follow.
    fn eoi(&self) -> bool {
        self.base().eoi()
    }

    /// Reset after EOI for another round. Children that also reported EOI
    /// are rewound first.
    fn rewind(&mut self, env: &ExecEnv) -> Result<()> {
        self.base().check_open("rewind")?;
        if !self.base().eoi() {
            return Err(WeftError::illegal_state(
                "Cannot rewind an operator that has not reported EOI",
            ));
        }
        let mut child_err = None;
        for child in self.base_mut().children_mut() {
            if child.eoi() {
                if let Err(err) = child.rewind(env) {
                    child_err = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = child_err {
            return Err(err);
        }
        self.rewind_inner(env)?;
        self.base_mut().clear_eoi();
        Ok(())
    }

    /// Release runtime resources, recursively. Idempotent; a no-op before
    /// `open`; always safe to call after a mid-stream failure. The first
    /// error encountered is reported, but every operator in the subtree
    /// still gets its cleanup pass.
    fn cleanup(&mut self) -> Result<()> {
        match self.base().state() {
            ExecState::Created | ExecState::Closed => return Ok(()),
            ExecState::Open => {}
        }

        let mut first_err: Option<WeftError> = None;
        for child in self.base_mut().children_mut() {
            if let Err(err) = child.cleanup() {
                first_err.get_or_insert(err);
            }
        }
        if let Err(err) = self.cleanup_inner() {
            first_err.get_or_insert(err);
        }
        self.base_mut().set_state(ExecState::Closed);

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Structural access for plan assembly.
    fn children(&self) -> &[BoxedOperator] {
        self.base().children()
    }

    /// Attach children after construction. Only valid before `open`.
    /// Operators with schema or arity requirements override this to
    /// validate eagerly.
    fn set_children(&mut self, children: Vec<BoxedOperator>) -> Result<()> {
        if self.base().state() != ExecState::Created {
            return Err(WeftError::illegal_state(
                "Children can only be attached before open",
            ));
        }
        self.base_mut().replace_children(children);
        Ok(())
    }
}
