//! Stop conditions for multi-step runs
//!
//! A [`StopCondition`] is a pure predicate the runner evaluates after each
//! completed step. Conditions are built from the four constructors below and
//! compose with [`any_of`].
//!
//! ```rust
//! use laksa::stop::{any_of, max_steps, no_more_tools};
//!
//! let stop = any_of(vec![max_steps(5), no_more_tools()]);
//! ```

use std::sync::Arc;

use crate::types::Step;

/// Decides whether a multi-step run should terminate.
///
/// `step_count` is the 1-based index of the just-completed step and
/// `last_step` that step's record. Implementations must be pure.
pub trait StopCondition: Send + Sync {
    fn should_stop(&self, step_count: usize, last_step: &Step) -> bool;
}

impl<F> StopCondition for F
where
    F: Fn(usize, &Step) -> bool + Send + Sync,
{
    fn should_stop(&self, step_count: usize, last_step: &Step) -> bool {
        self(step_count, last_step)
    }
}

/// Stop once `n` steps have completed.
pub fn max_steps(n: usize) -> Arc<dyn StopCondition> {
    Arc::new(move |step_count: usize, _: &Step| step_count >= n)
}

/// Stop when the last step requested no tools.
pub fn no_more_tools() -> Arc<dyn StopCondition> {
    Arc::new(|_: usize, last_step: &Step| last_step.tool_calls.is_empty())
}

/// Stop once the last step's calls include the named tool.
pub fn until_tool_seen(name: impl Into<String>) -> Arc<dyn StopCondition> {
    let name = name.into();
    Arc::new(move |_: usize, last_step: &Step| {
        last_step.tool_calls.iter().any(|c| c.name == name)
    })
}

/// Short-circuit OR over the given conditions.
pub fn any_of(conditions: Vec<Arc<dyn StopCondition>>) -> Arc<dyn StopCondition> {
    Arc::new(move |step_count: usize, last_step: &Step| {
        conditions
            .iter()
            .any(|c| c.should_stop(step_count, last_step))
    })
}
