// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The action engine executes finite state machine descriptions against a
//! device session.
//!
//! A [`Machine`] is a set of named states with one initial state and one or
//! more final states. States may run entry / exit actions, follow guarded
//! `always` transitions, or invoke an effect ([`Task`] or [`Nested`]
//! machine) whose completion selects the next state.
//!
//! Executing a machine returns an [`Execution`], a stream of [`ActionState`]
//! snapshots beginning with [`ActionState::Pending`] and ending with exactly
//! one [`ActionState::Completed`] or [`ActionState::Error`].
//!
//! ```text
//! Start -> (invoke dependency) -> CheckDependency -> (guard) -> DoWork -> CheckWork -> Success | Error
//! ```

use std::sync::Arc;

use crate::{api::DeviceApi, Error};

mod machine;
pub use machine::{Action, Guard, Machine, MachineBuilder, OutputFn, StateBuilder};

mod effect;
pub use effect::{Apply, Nested, Runnable, Step, Task};

mod execution;
pub use execution::{Canceller, Execution, MAX_ALWAYS_CHAIN};

mod interaction;
pub use interaction::{Intermediate, UserInteractionRequired};

/// Machine execution context, owned by a single execution
#[derive(Clone, PartialEq, Debug)]
pub struct Context<S, I> {
    /// Accumulated internal state
    pub state: S,

    /// Current intermediate value
    pub intermediate: I,
}

/// Public snapshot of an executing action
#[derive(Clone, PartialEq, Debug)]
pub enum ActionState<O, E, I> {
    /// Action in progress, may recur
    Pending(I),

    /// Action completed, terminal
    Completed(O),

    /// Action failed, terminal
    Error(E),
}

impl<O, E, I> ActionState<O, E, I> {
    /// Check whether this snapshot terminates the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionState::Pending(_))
    }
}

/// Device action, a workflow described as a [`Machine`]
pub trait DeviceAction: Send + Sync {
    /// Internal machine state
    type State: Send + 'static;

    /// Action output
    type Output: Send + 'static;

    /// Build the machine for this action and its input
    fn make_machine(&self) -> Result<Machine<Self::State, Intermediate, Self::Output, Error>, Error>;

    /// Execute the action against a device
    fn execute(&self, api: Arc<dyn DeviceApi>) -> Execution<Self::Output, Error, Intermediate> {
        match self.make_machine() {
            Ok(m) => m.execute(api),
            Err(e) => Execution::failed(Intermediate::none(), e),
        }
    }
}

#[cfg(test)]
mod test;
