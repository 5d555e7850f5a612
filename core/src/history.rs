//! The history stack: committed world states with undo and redo.
//!
//! RULE: Every operation returns a new stack value; nothing here does
//! I/O or mutates a stack another caller holds. States are shared via
//! `Arc`, so cloning a stack copies pointers, not worlds.

use crate::{error::HistoryBoundsError, world::WorldState};
use std::sync::Arc;

/// One cell of a persistent list of states, nearest first. Stacks that
/// share a prefix share its cells.
#[derive(Debug, PartialEq, Eq)]
struct Link {
    state: Arc<WorldState>,
    next:  Option<Arc<Link>>,
}

impl Link {
    fn cons(state: Arc<WorldState>, next: Option<Arc<Link>>) -> Option<Arc<Link>> {
        Some(Arc::new(Link { state, next }))
    }
}

impl Drop for Link {
    // Iterative: dropping a long chain must not recurse per cell.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(link) = next {
            next = match Arc::try_unwrap(link) {
                Ok(mut owned) => owned.next.take(),
                Err(_) => None,
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStack {
    current:    Arc<WorldState>,
    /// Undo side, nearest first.
    past:       Option<Arc<Link>>,
    past_len:   usize,
    /// Redo tail, nearest first.
    future:     Option<Arc<Link>>,
    future_len: usize,
    max_depth:  Option<usize>,
}

impl HistoryStack {
    pub fn new(root: WorldState) -> Self {
        Self {
            current:    Arc::new(root),
            past:       None,
            past_len:   0,
            future:     None,
            future_len: 0,
            max_depth:  None,
        }
    }

    /// Keep at most `depth` states; pushing past it evicts the oldest,
    /// which moves the undo root forward. A depth of 0 is treated as 1.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth.max(1));
        self.evict();
        self
    }

    /// Append `state` at the current position, discarding any redo tail.
    /// Earlier states are shared with `self`, not copied.
    pub fn push(&self, state: WorldState) -> Self {
        let mut next = Self {
            current:    Arc::new(state),
            past:       Link::cons(Arc::clone(&self.current), self.past.clone()),
            past_len:   self.past_len + 1,
            future:     None,
            future_len: 0,
            max_depth:  self.max_depth,
        };
        next.evict();
        next
    }

    pub fn undo(&self) -> Result<Self, HistoryBoundsError> {
        let Some(prev) = &self.past else {
            return Err(HistoryBoundsError::AtRoot);
        };
        Ok(Self {
            current:    Arc::clone(&prev.state),
            past:       prev.next.clone(),
            past_len:   self.past_len - 1,
            future:     Link::cons(Arc::clone(&self.current), self.future.clone()),
            future_len: self.future_len + 1,
            max_depth:  self.max_depth,
        })
    }

    pub fn redo(&self) -> Result<Self, HistoryBoundsError> {
        let Some(next) = &self.future else {
            return Err(HistoryBoundsError::NoRedo);
        };
        Ok(Self {
            current:    Arc::clone(&next.state),
            past:       Link::cons(Arc::clone(&self.current), self.past.clone()),
            past_len:   self.past_len + 1,
            future:     next.next.clone(),
            future_len: self.future_len - 1,
            max_depth:  self.max_depth,
        })
    }

    pub fn current(&self) -> &WorldState {
        &self.current
    }

    pub fn current_arc(&self) -> Arc<WorldState> {
        Arc::clone(&self.current)
    }

    pub fn can_undo(&self) -> bool {
        self.past_len > 0
    }

    pub fn can_redo(&self) -> bool {
        self.future_len > 0
    }

    /// Index of the current state, counting from the undo root.
    pub fn position(&self) -> usize {
        self.past_len
    }

    /// Number of states held, including the redo tail.
    pub fn len(&self) -> usize {
        self.past_len + 1 + self.future_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn redo_len(&self) -> usize {
        self.future_len
    }

    /// Drop the oldest undo states beyond `max_depth`. The current state
    /// and the redo tail are never evicted. Rebuilds at most `max_depth`
    /// cells, and only when over the bound.
    fn evict(&mut self) {
        let Some(max) = self.max_depth else { return };
        let total = self.len();
        if total <= max {
            return;
        }
        let keep = self.past_len.saturating_sub(total - max);
        let mut kept = Vec::with_capacity(keep);
        let mut cursor = self.past.as_deref();
        while let Some(link) = cursor {
            if kept.len() == keep {
                break;
            }
            kept.push(Arc::clone(&link.state));
            cursor = link.next.as_deref();
        }
        self.past = kept.into_iter().rev().fold(None, |next, state| Link::cons(state, next));
        self.past_len = keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::WorldGraph, world::Economy};

    fn state(tick: u64) -> WorldState {
        WorldState::from_parts(tick, WorldGraph::default(), Economy::default(), Vec::new())
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let stack = HistoryStack::new(state(0)).push(state(1));
        let undone = stack.undo().unwrap();
        assert_eq!(undone.current().tick(), 0);
        let redone = undone.redo().unwrap();
        assert_eq!(redone.current().tick(), 1);
        assert_eq!(redone, stack);
    }

    #[test]
    fn bounds_are_enforced() {
        let root = HistoryStack::new(state(0));
        assert_eq!(root.undo().unwrap_err(), HistoryBoundsError::AtRoot);
        assert_eq!(root.redo().unwrap_err(), HistoryBoundsError::NoRedo);
    }

    #[test]
    fn push_after_undo_discards_redo_tail() {
        let stack = HistoryStack::new(state(0)).push(state(1)).push(state(2));
        let rewound = stack.undo().unwrap().undo().unwrap();
        assert_eq!(rewound.redo_len(), 2);
        let branched = rewound.push(state(1));
        assert_eq!(branched.len(), 2);
        assert!(!branched.can_redo());
    }

    #[test]
    fn operations_leave_the_receiver_alone() {
        let stack = HistoryStack::new(state(0)).push(state(1));
        let _ = stack.undo().unwrap();
        let _ = stack.push(state(2));
        assert_eq!(stack.current().tick(), 1);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn push_shares_earlier_states() {
        let base = HistoryStack::new(state(0)).push(state(1));
        let longer = base.push(state(2));
        let prior = longer.undo().unwrap();
        assert!(Arc::ptr_eq(&prior.current_arc(), &base.current_arc()));
        let root = prior.undo().unwrap();
        assert!(Arc::ptr_eq(&root.current_arc(), &base.undo().unwrap().current_arc()));
    }

    #[test]
    fn long_unbounded_history_builds_and_drops() {
        let mut stack = HistoryStack::new(state(0));
        for tick in 1..=200_000 {
            stack = stack.push(state(tick));
        }
        assert_eq!(stack.len(), 200_001);
        assert_eq!(stack.position(), 200_000);
        assert_eq!(stack.undo().unwrap().current().tick(), 199_999);
        drop(stack);
    }

    #[test]
    fn max_depth_evicts_oldest() {
        let mut stack = HistoryStack::new(state(0)).with_max_depth(3);
        for tick in 1..=5 {
            stack = stack.push(state(tick));
        }
        assert_eq!(stack.len(), 3);
        let root = stack.undo().unwrap().undo().unwrap();
        assert_eq!(root.current().tick(), 3);
        assert!(root.undo().is_err());
    }
}
