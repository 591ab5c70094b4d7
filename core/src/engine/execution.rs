// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Machine interpreter and execution handles

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context as TaskContext, Poll},
};

use futures::{Stream, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use super::{
    effect::{Apply, Step},
    machine::Definition,
    ActionState, Context, Machine,
};
use crate::{api::DeviceApi, Error};

/// Maximum chain of `always` transitions without an effect
pub const MAX_ALWAYS_CHAIN: usize = 64;

/// Snapshot emitter shared by the interpreter and the canceller
///
/// Taking the sender on the terminal snapshot makes the terminal emission
/// exactly-once and closes the update stream.
pub(crate) struct Emitter<O, E, I> {
    tx: Arc<Mutex<Option<UnboundedSender<ActionState<O, E, I>>>>>,
}

impl<O, E, I> Clone for Emitter<O, E, I> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<O, E, I> Emitter<O, E, I> {
    fn new(tx: UnboundedSender<ActionState<O, E, I>>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<UnboundedSender<ActionState<O, E, I>>>> {
        match self.tx.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    /// Emit a pending snapshot, ignored once terminated
    fn pending(&self, i: I) {
        if let Some(tx) = self.lock().as_ref() {
            let _ = tx.send(ActionState::Pending(i));
        }
    }

    /// Emit the terminal snapshot, returns false if already terminated
    fn terminal(&self, s: ActionState<O, E, I>) -> bool {
        match self.lock().take() {
            Some(tx) => {
                let _ = tx.send(s);
                true
            }
            None => false,
        }
    }
}

/// Cancellation handle for an [`Execution`]
pub struct Canceller<O, E, I> {
    emitter: Emitter<O, E, I>,
    token: CancellationToken,
}

impl<O, E, I> Clone for Canceller<O, E, I> {
    fn clone(&self) -> Self {
        Self {
            emitter: self.emitter.clone(),
            token: self.token.clone(),
        }
    }
}

impl<O, E: From<Error>, I> Canceller<O, E, I> {
    /// Cancel the execution
    ///
    /// Emits a terminal cancellation error and closes the update stream,
    /// results of in-flight effects are discarded. No-op once terminated.
    pub fn cancel(&self) {
        self.token.cancel();

        if self
            .emitter
            .terminal(ActionState::Error(E::from(Error::Cancelled)))
        {
            debug!("Execution cancelled");
        }
    }

    /// Check whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Running machine execution
///
/// A stream of [`ActionState`] snapshots starting with a pending snapshot and
/// ending with exactly one completed or error snapshot.
pub struct Execution<O, E, I> {
    updates: UnboundedReceiverStream<ActionState<O, E, I>>,
    canceller: Canceller<O, E, I>,
}

impl<O, E, I> Unpin for Execution<O, E, I> {}

impl<O, E: From<Error>, I> Execution<O, E, I> {
    /// Create an execution that has already failed, emitting the provided
    /// pending snapshot followed by the error
    pub fn failed(initial: I, e: E) -> Self {
        let (tx, rx) = unbounded_channel();
        let emitter = Emitter::new(tx);
        emitter.pending(initial);
        emitter.terminal(ActionState::Error(e));

        Self {
            updates: UnboundedReceiverStream::new(rx),
            canceller: Canceller {
                emitter,
                token: CancellationToken::new(),
            },
        }
    }

    /// Cancel the execution, see [`Canceller::cancel`]
    pub fn cancel(&self) {
        self.canceller.cancel()
    }

    /// Fetch a cancellation handle for use alongside the update stream
    pub fn canceller(&self) -> Canceller<O, E, I> {
        self.canceller.clone()
    }

    /// Split into update stream and cancellation handle
    pub fn into_parts(
        self,
    ) -> (
        UnboundedReceiverStream<ActionState<O, E, I>>,
        Canceller<O, E, I>,
    ) {
        (self.updates, self.canceller)
    }

    /// Drain the update stream, returning the terminal result
    pub async fn result(mut self) -> Result<O, E> {
        while let Some(s) = self.updates.next().await {
            match s {
                ActionState::Pending(_) => continue,
                ActionState::Completed(o) => return Ok(o),
                ActionState::Error(e) => return Err(e),
            }
        }

        Err(E::from(Error::Unknown(
            "execution ended without result".to_string(),
        )))
    }
}

impl<O, E, I> Stream for Execution<O, E, I> {
    type Item = ActionState<O, E, I>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.updates.poll_next_unpin(cx)
    }
}

impl<S, I, O, E> Machine<S, I, O, E>
where
    S: Send + 'static,
    I: Clone + Send + 'static,
    O: Send + 'static,
    E: From<Error> + Send + 'static,
{
    /// Execute the machine against the provided device API
    ///
    /// Spawns the interpreter on the current tokio runtime.
    pub fn execute(self, api: Arc<dyn DeviceApi>) -> Execution<O, E, I> {
        self.execute_with(api, CancellationToken::new())
    }

    /// Execute the machine with an existing cancellation token
    pub fn execute_with(self, api: Arc<dyn DeviceApi>, token: CancellationToken) -> Execution<O, E, I> {
        let (tx, rx) = unbounded_channel();
        let emitter = Emitter::new(tx);

        let canceller = Canceller {
            emitter: emitter.clone(),
            token: token.clone(),
        };

        tokio::spawn(interpret(self, api, token, emitter));

        Execution {
            updates: UnboundedReceiverStream::new(rx),
            canceller,
        }
    }
}

/// Run a user supplied action, mapping panics to [`Error::Unknown`]
fn guarded<T>(id: &str, f: impl FnOnce() -> T) -> Result<T, Error> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|_| Error::Unknown(format!("machine {id} action panicked")))
}

fn enter<S, I, O, E>(
    def: &Definition<S, I, O, E>,
    ctx: &mut Context<S, I>,
    state: usize,
) -> Result<(), Error> {
    for a in &def.states[state].entry {
        guarded(def.id, || a(ctx))?;
    }
    Ok(())
}

fn exit<S, I, O, E>(
    def: &Definition<S, I, O, E>,
    ctx: &mut Context<S, I>,
    state: usize,
) -> Result<(), Error> {
    for a in &def.states[state].exit {
        guarded(def.id, || a(ctx))?;
    }
    Ok(())
}

/// Follow `always` transitions until none apply
fn settle<S, I, O, E>(
    def: &Definition<S, I, O, E>,
    ctx: &mut Context<S, I>,
    current: &mut usize,
) -> Result<(), Error> {
    for _ in 0..MAX_ALWAYS_CHAIN {
        let node = &def.states[*current];

        let mut next = None;
        for t in &node.always {
            let c: &Context<S, I> = ctx;
            let pass = match &t.guard {
                Some(g) => guarded(def.id, || g(c))?,
                None => true,
            };

            if pass {
                next = Some(t.target);
                break;
            }
        }

        let next = match next {
            Some(n) => n,
            None => return Ok(()),
        };

        debug!(
            "{}: {} -> {} (always)",
            def.id, node.name, def.states[next].name
        );

        exit(def, ctx, *current)?;
        *current = next;
        enter(def, ctx, next)?;
    }

    Err(Error::Unknown(format!(
        "machine {} exceeded {MAX_ALWAYS_CHAIN} always transitions",
        def.id
    )))
}

/// Apply an effect completion and move to the target state
fn transition<S, I, O, E>(
    def: &Definition<S, I, O, E>,
    ctx: &mut Context<S, I>,
    current: &mut usize,
    target: &'static str,
    apply: Apply<S, I>,
) -> Result<(), Error> {
    let next = match def.index.get(target) {
        Some(n) => *n,
        None => {
            return Err(Error::InvalidMachine(format!(
                "{}: unknown target {target}",
                def.id
            )))
        }
    };

    debug!("{}: {} -> {}", def.id, def.states[*current].name, target);

    exit(def, ctx, *current)?;
    guarded(def.id, || apply(ctx))?;
    *current = next;
    enter(def, ctx, next)?;

    settle(def, ctx, current)
}

/// Machine interpreter
async fn interpret<S, I, O, E>(
    machine: Machine<S, I, O, E>,
    api: Arc<dyn DeviceApi>,
    token: CancellationToken,
    emitter: Emitter<O, E, I>,
) where
    S: Send + 'static,
    I: Clone + Send + 'static,
    O: Send + 'static,
    E: From<Error> + Send + 'static,
{
    let Machine { def, mut context } = machine;
    let id = def.id;

    debug!("{id}: start");

    // Enter the initial state and settle
    let mut current = def.initial;
    let r = enter(&def, &mut context, current).and_then(|_| settle(&def, &mut context, &mut current));

    emitter.pending(context.intermediate.clone());

    if let Err(e) = r {
        emitter.terminal(ActionState::Error(E::from(e)));
        return;
    }

    loop {
        if token.is_cancelled() {
            emitter.terminal(ActionState::Error(E::from(Error::Cancelled)));
            return;
        }

        let node = &def.states[current];

        // Final states map the context to the machine output
        if node.is_final {
            debug!("{id}: done ({})", node.name);

            let s = match guarded(id, || (def.output)(&context)) {
                Ok(Ok(o)) => ActionState::Completed(o),
                Ok(Err(e)) => ActionState::Error(e),
                Err(e) => ActionState::Error(E::from(e)),
            };
            emitter.terminal(s);

            return;
        }

        let invoke = match &node.invoke {
            Some(v) => v,
            None => {
                warn!("{id}: stuck in state {}", node.name);

                let e = Error::Unknown(format!("machine {id} stuck in state {}", node.name));
                emitter.terminal(ActionState::Error(E::from(e)));
                return;
            }
        };

        debug!("{id}: {} invoking {}", node.name, invoke.name());

        let mut steps = invoke.run(&context, api.clone(), token.clone());

        // Await effect completion, republishing progress
        let outcome = loop {
            let step = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    emitter.terminal(ActionState::Error(E::from(Error::Cancelled)));
                    return;
                }
                s = steps.next() => s,
            };

            match step {
                Some(Step::Progress(i)) => {
                    context.intermediate = i.clone();
                    emitter.pending(i);
                }
                Some(Step::Done(target, apply)) => break Ok((target, apply)),
                Some(Step::Failed(e)) => break Err(e),
                None => {
                    break Err(E::from(Error::Unknown(format!(
                        "effect {} ended without result",
                        invoke.name()
                    ))))
                }
            }
        };
        drop(steps);

        let (target, apply) = match outcome {
            Ok(v) => v,
            Err(e) => {
                debug!("{id}: effect {} failed", invoke.name());
                emitter.terminal(ActionState::Error(e));
                return;
            }
        };

        // Discard results arriving after cancellation
        if token.is_cancelled() {
            emitter.terminal(ActionState::Error(E::from(Error::Cancelled)));
            return;
        }

        if let Err(e) = transition(&def, &mut context, &mut current, target, apply) {
            emitter.terminal(ActionState::Error(E::from(e)));
            return;
        }

        if !def.states[current].is_final {
            emitter.pending(context.intermediate.clone());
        }
    }
}
