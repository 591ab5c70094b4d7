// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Machine descriptions and builder

use std::{collections::HashMap, future::Future, sync::Arc};

use super::{
    effect::{Nested, Runnable, Task},
    Context,
};
use crate::{api::DeviceApi, Error};

/// Action run on state entry / exit
pub type Action<S, I> = Arc<dyn Fn(&mut Context<S, I>) + Send + Sync>;

/// Guard predicate for `always` transitions
pub type Guard<S, I> = Arc<dyn Fn(&Context<S, I>) -> bool + Send + Sync>;

/// Mapping from final context to machine result
pub type OutputFn<S, I, O, E> = Arc<dyn Fn(&Context<S, I>) -> Result<O, E> + Send + Sync>;

pub(crate) struct Transition<S, I> {
    pub guard: Option<Guard<S, I>>,
    pub target: usize,
}

pub(crate) struct StateNode<S, I, E> {
    pub name: &'static str,
    pub is_final: bool,
    pub entry: Vec<Action<S, I>>,
    pub exit: Vec<Action<S, I>>,
    pub always: Vec<Transition<S, I>>,
    pub invoke: Option<Box<dyn Runnable<S, I, E>>>,
}

/// Validated machine definition, states stored in an arena keyed by index
pub(crate) struct Definition<S, I, O, E> {
    pub id: &'static str,
    pub states: Vec<StateNode<S, I, E>>,
    pub index: HashMap<&'static str, usize>,
    pub initial: usize,
    pub output: OutputFn<S, I, O, E>,
}

/// Finite state machine description with its initial context
///
/// Built with [`Machine::builder`], executed with [`Machine::execute`].
pub struct Machine<S, I, O, E> {
    pub(crate) def: Arc<Definition<S, I, O, E>>,
    pub(crate) context: Context<S, I>,
}

impl<S, I, O, E> Machine<S, I, O, E> {
    /// Create a builder for a machine with the provided initial context
    pub fn builder(id: &'static str, state: S, intermediate: I) -> MachineBuilder<S, I, O, E> {
        MachineBuilder {
            id,
            context: Context {
                state,
                intermediate,
            },
            states: vec![],
            initial: None,
            output: None,
        }
    }

    /// Machine identifier
    pub fn id(&self) -> &'static str {
        self.def.id
    }

    /// Initial context
    pub fn context(&self) -> &Context<S, I> {
        &self.context
    }

    /// Names of the states in this machine
    pub fn states(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.def.states.iter().map(|s| s.name)
    }
}

/// Builder for [`Machine`] descriptions
pub struct MachineBuilder<S, I, O, E> {
    id: &'static str,
    context: Context<S, I>,
    states: Vec<StateBuilder<S, I, E>>,
    initial: Option<&'static str>,
    output: Option<OutputFn<S, I, O, E>>,
}

impl<S, I, O, E> MachineBuilder<S, I, O, E> {
    /// Set the initial state
    pub fn initial(mut self, name: &'static str) -> Self {
        self.initial = Some(name);
        self
    }

    /// Add a state, configured by the provided closure
    pub fn state(
        mut self,
        name: &'static str,
        f: impl FnOnce(StateBuilder<S, I, E>) -> StateBuilder<S, I, E>,
    ) -> Self {
        self.states.push(f(StateBuilder::new(name, false)));
        self
    }

    /// Add a final (terminal) state
    pub fn final_state(mut self, name: &'static str) -> Self {
        self.states.push(StateBuilder::new(name, true));
        self
    }

    /// Set the output function applied on reaching a final state
    pub fn output(
        mut self,
        f: impl Fn(&Context<S, I>) -> Result<O, E> + Send + Sync + 'static,
    ) -> Self {
        self.output = Some(Arc::new(f));
        self
    }

    /// Validate and build the machine
    pub fn build(self) -> Result<Machine<S, I, O, E>, Error> {
        let id = self.id;
        let invalid = |msg: String| Error::InvalidMachine(format!("{id}: {msg}"));

        // Index state names
        let mut index = HashMap::new();
        for (i, s) in self.states.iter().enumerate() {
            if index.insert(s.name, i).is_some() {
                return Err(invalid(format!("duplicate state {}", s.name)));
            }
        }

        let resolve = |from: &str, target: &str| -> Result<usize, Error> {
            index
                .get(target)
                .copied()
                .ok_or_else(|| invalid(format!("unknown target {target} from {from}")))
        };

        let initial = match self.initial {
            Some(n) => resolve("initial", n)?,
            None => return Err(invalid("missing initial state".to_string())),
        };

        let output = match self.output {
            Some(o) => o,
            None => return Err(invalid("missing output".to_string())),
        };

        if !self.states.iter().any(|s| s.is_final) {
            return Err(invalid("no final state".to_string()));
        }

        // Resolve transitions
        let mut states = Vec::with_capacity(self.states.len());
        for s in self.states {
            if s.is_final && (!s.always.is_empty() || s.invoke.is_some()) {
                return Err(invalid(format!("transition out of final state {}", s.name)));
            }
            if !s.is_final && s.always.is_empty() && s.invoke.is_none() {
                return Err(invalid(format!("state {} has no transitions", s.name)));
            }

            let mut always = Vec::with_capacity(s.always.len());
            for (target, guard) in s.always {
                always.push(Transition {
                    guard,
                    target: resolve(s.name, target)?,
                });
            }

            if let Some(r) = &s.invoke {
                for t in r.targets()? {
                    resolve(s.name, t)?;
                }
            }

            states.push(StateNode {
                name: s.name,
                is_final: s.is_final,
                entry: s.entry,
                exit: s.exit,
                always,
                invoke: s.invoke,
            });
        }

        Ok(Machine {
            def: Arc::new(Definition {
                id,
                states,
                index,
                initial,
                output,
            }),
            context: self.context,
        })
    }
}

/// Builder for a single machine state
pub struct StateBuilder<S, I, E> {
    name: &'static str,
    is_final: bool,
    entry: Vec<Action<S, I>>,
    exit: Vec<Action<S, I>>,
    always: Vec<(&'static str, Option<Guard<S, I>>)>,
    invoke: Option<Box<dyn Runnable<S, I, E>>>,
}

impl<S, I, E> StateBuilder<S, I, E> {
    fn new(name: &'static str, is_final: bool) -> Self {
        Self {
            name,
            is_final,
            entry: vec![],
            exit: vec![],
            always: vec![],
            invoke: None,
        }
    }

    /// Add an action run when the state is entered
    pub fn entry(mut self, f: impl Fn(&mut Context<S, I>) + Send + Sync + 'static) -> Self {
        self.entry.push(Arc::new(f));
        self
    }

    /// Add an action run when the state is exited
    pub fn exit(mut self, f: impl Fn(&mut Context<S, I>) + Send + Sync + 'static) -> Self {
        self.exit.push(Arc::new(f));
        self
    }

    /// Add an unconditional `always` transition
    pub fn always(mut self, target: &'static str) -> Self {
        self.always.push((target, None));
        self
    }

    /// Add a guarded `always` transition, evaluated in insertion order
    pub fn always_if(
        mut self,
        target: &'static str,
        guard: impl Fn(&Context<S, I>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.always.push((target, Some(Arc::new(guard))));
        self
    }

    /// Invoke an effect (task or nested machine) on entering this state
    pub fn invoke(mut self, r: impl Runnable<S, I, E> + 'static) -> Self {
        self.invoke = Some(Box::new(r));
        self
    }

    /// Invoke a [`Task`], configuring its transitions with `transitions`
    pub fn task<V, F, Fut>(
        self,
        name: &'static str,
        f: F,
        transitions: impl FnOnce(Task<S, I, E, V>) -> Task<S, I, E, V>,
    ) -> Self
    where
        S: Send + 'static,
        I: Send + 'static,
        E: From<Error> + Send + 'static,
        V: Send + 'static,
        F: Fn(&Context<S, I>, Arc<dyn DeviceApi>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.invoke(transitions(Task::new(name, f)))
    }

    /// Invoke a [`Nested`] machine, folding its result with `on_done` before
    /// transitioning to `target`
    pub fn nested<CS, CO, CE>(
        self,
        name: &'static str,
        factory: impl Fn(&Context<S, I>) -> Result<Machine<CS, I, CO, CE>, Error>
            + Send
            + Sync
            + 'static,
        target: &'static str,
        on_done: impl Fn(&mut Context<S, I>, Result<CO, CE>) + Send + Sync + 'static,
    ) -> Self
    where
        S: Send + 'static,
        I: Clone + Send + 'static,
        E: From<Error> + Send + 'static,
        CS: Send + 'static,
        CO: Send + 'static,
        CE: From<Error> + Send + 'static,
    {
        self.invoke(Nested::<S, I, E, CS, CO, CE>::new(name, factory).on_done(target, on_done))
    }
}
