// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Effects invoked by machine states
//!
//! Leaf effects ([`Task`]) and nested machines ([`Nested`]) share the
//! [`Runnable`] shape, a stream of [`Step`]s ending in a single result.

use std::{
    future::Future,
    marker::PhantomData,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use futures::{
    future::{self, BoxFuture},
    stream::{self, BoxStream},
    FutureExt, StreamExt,
};
use tokio_util::sync::CancellationToken;

use super::{ActionState, Context, Machine};
use crate::{api::DeviceApi, Error};

/// Context update applied when an effect completes
pub type Apply<S, I> = Box<dyn FnOnce(&mut Context<S, I>) + Send>;

/// Effect progress
pub enum Step<S, I, E> {
    /// Intermediate value to be republished by the invoking machine
    Progress(I),

    /// Effect completed, apply the update and transition to the named state
    Done(&'static str, Apply<S, I>),

    /// Effect failed with no mapping, terminates the invoking machine
    Failed(E),
}

/// Shared shape of effects invoked by machine states
pub trait Runnable<S, I, E>: Send + Sync {
    /// Effect name for logging
    fn name(&self) -> &'static str;

    /// States this effect may transition to, used for validation
    fn targets(&self) -> Result<Vec<&'static str>, Error>;

    /// Start the effect against the current context
    fn run(
        &self,
        ctx: &Context<S, I>,
        api: Arc<dyn DeviceApi>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Step<S, I, E>>;
}

type TaskFn<S, I, V, E> =
    Arc<dyn Fn(&Context<S, I>, Arc<dyn DeviceApi>) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

type MapFn<S, I, V> = Arc<dyn Fn(&mut Context<S, I>, V) + Send + Sync>;

fn panicked(kind: &str, name: &str) -> Error {
    Error::Unknown(format!("{kind} {name} panicked"))
}

/// Asynchronous leaf effect (command send, timer, plain computation)
pub struct Task<S, I, E, V> {
    name: &'static str,
    run: TaskFn<S, I, V, E>,
    on_done: Option<(&'static str, MapFn<S, I, V>)>,
    on_error: Option<(&'static str, MapFn<S, I, E>)>,
}

impl<S, I, E, V> Task<S, I, E, V>
where
    S: 'static,
    I: 'static,
    E: 'static,
    V: 'static,
{
    /// Create a task from an async closure
    ///
    /// The returned future must not borrow the context, clone required
    /// values before the `async move` block.
    pub fn new<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: Fn(&Context<S, I>, Arc<dyn DeviceApi>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let run: TaskFn<S, I, V, E> =
            Arc::new(move |ctx: &Context<S, I>, api: Arc<dyn DeviceApi>| f(ctx, api).boxed());

        Self {
            name,
            run,
            on_done: None,
            on_error: None,
        }
    }

    /// Transition to `target` on success, applying `f` to the context
    pub fn on_done(
        mut self,
        target: &'static str,
        f: impl Fn(&mut Context<S, I>, V) + Send + Sync + 'static,
    ) -> Self {
        self.on_done = Some((target, Arc::new(f)));
        self
    }

    /// Transition to `target` on failure, applying `f` to the context
    ///
    /// Without an error mapping a failure terminates the machine.
    pub fn on_error(
        mut self,
        target: &'static str,
        f: impl Fn(&mut Context<S, I>, E) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some((target, Arc::new(f)));
        self
    }
}

impl<S, I, E, V> Runnable<S, I, E> for Task<S, I, E, V>
where
    S: Send + 'static,
    I: Send + 'static,
    E: From<Error> + Send + 'static,
    V: Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn targets(&self) -> Result<Vec<&'static str>, Error> {
        let mut t = match &self.on_done {
            Some((target, _)) => vec![*target],
            None => {
                return Err(Error::InvalidMachine(format!(
                    "task {} missing on_done",
                    self.name
                )))
            }
        };

        if let Some((target, _)) = &self.on_error {
            t.push(*target);
        }

        Ok(t)
    }

    fn run(
        &self,
        ctx: &Context<S, I>,
        api: Arc<dyn DeviceApi>,
        _cancel: CancellationToken,
    ) -> BoxStream<'static, Step<S, I, E>> {
        let name = self.name;

        // Start the task, catching panics in the synchronous prologue
        let fut = match catch_unwind(AssertUnwindSafe(|| (self.run)(ctx, api))) {
            Ok(f) => f,
            Err(_) => future::ready(Err(E::from(panicked("task", name)))).boxed(),
        };

        let on_done = self.on_done.clone();
        let on_error = self.on_error.clone();

        let f = async move {
            let r = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(r) => r,
                Err(_) => Err(E::from(panicked("task", name))),
            };

            match (r, on_done, on_error) {
                (Ok(v), Some((target, f)), _) => {
                    let apply: Apply<S, I> = Box::new(move |ctx: &mut Context<S, I>| f(ctx, v));
                    Step::Done(target, apply)
                }
                (Ok(_), None, _) => Step::Failed(E::from(Error::InvalidMachine(format!(
                    "task {name} missing on_done"
                )))),
                (Err(e), _, Some((target, f))) => {
                    let apply: Apply<S, I> = Box::new(move |ctx: &mut Context<S, I>| f(ctx, e));
                    Step::Done(target, apply)
                }
                (Err(e), _, None) => Step::Failed(e),
            }
        };

        stream::once(f).boxed()
    }
}

type FactoryFn<S, I, CS, CO, CE> =
    Arc<dyn Fn(&Context<S, I>) -> Result<Machine<CS, I, CO, CE>, Error> + Send + Sync>;

/// Nested machine effect
///
/// Child pending snapshots are republished by the parent, the child result is
/// folded into the parent context before the parent transitions.
pub struct Nested<S, I, E, CS, CO, CE> {
    name: &'static str,
    factory: FactoryFn<S, I, CS, CO, CE>,
    on_done: Option<(&'static str, MapFn<S, I, Result<CO, CE>>)>,
    _e: PhantomData<fn() -> E>,
}

impl<S, I, E, CS, CO, CE> Nested<S, I, E, CS, CO, CE>
where
    S: 'static,
    I: 'static,
    CS: 'static,
    CO: 'static,
    CE: 'static,
{
    /// Create a nested effect from a child machine factory
    pub fn new(
        name: &'static str,
        factory: impl Fn(&Context<S, I>) -> Result<Machine<CS, I, CO, CE>, Error>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name,
            factory: Arc::new(factory),
            on_done: None,
            _e: PhantomData,
        }
    }

    /// Transition to `target` once the child terminates, folding its result
    pub fn on_done(
        mut self,
        target: &'static str,
        f: impl Fn(&mut Context<S, I>, Result<CO, CE>) + Send + Sync + 'static,
    ) -> Self {
        self.on_done = Some((target, Arc::new(f)));
        self
    }
}

impl<S, I, E, CS, CO, CE> Runnable<S, I, E> for Nested<S, I, E, CS, CO, CE>
where
    S: Send + 'static,
    I: Clone + Send + 'static,
    E: From<Error> + Send + 'static,
    CS: Send + 'static,
    CO: Send + 'static,
    CE: From<Error> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn targets(&self) -> Result<Vec<&'static str>, Error> {
        match &self.on_done {
            Some((target, _)) => Ok(vec![*target]),
            None => Err(Error::InvalidMachine(format!(
                "nested {} missing on_done",
                self.name
            ))),
        }
    }

    fn run(
        &self,
        ctx: &Context<S, I>,
        api: Arc<dyn DeviceApi>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Step<S, I, E>> {
        let name = self.name;

        let (target, on_done) = match &self.on_done {
            Some((t, f)) => (*t, f.clone()),
            None => {
                let e = Error::InvalidMachine(format!("nested {name} missing on_done"));
                return stream::once(future::ready(Step::Failed(E::from(e)))).boxed();
            }
        };

        // Build the child machine from the parent context
        let machine = match catch_unwind(AssertUnwindSafe(|| (self.factory)(ctx))) {
            Ok(Ok(m)) => m,
            Ok(Err(e)) => return stream::once(future::ready(Step::Failed(E::from(e)))).boxed(),
            Err(_) => {
                let e = panicked("nested", name);
                return stream::once(future::ready(Step::Failed(E::from(e)))).boxed();
            }
        };

        // Child inherits cancellation from the parent
        let exec = machine.execute_with(api, cancel.child_token());

        exec.map(move |s| match s {
            ActionState::Pending(i) => Step::Progress(i),
            ActionState::Completed(o) => {
                let f = on_done.clone();
                let apply: Apply<S, I> = Box::new(move |ctx: &mut Context<S, I>| f(ctx, Ok(o)));
                Step::Done(target, apply)
            }
            ActionState::Error(e) => {
                let f = on_done.clone();
                let apply: Apply<S, I> = Box::new(move |ctx: &mut Context<S, I>| f(ctx, Err(e)));
                Step::Done(target, apply)
            }
        })
        .boxed()
    }
}
