// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::{
    stream::{self, BoxStream},
    StreamExt,
};

use ledger_dmk_apdu::{os::GetAppAndVersion, DeviceModelId, ResponseFrame};

use super::*;
use crate::{
    api::RefresherBlocker, state::SessionState, DeviceStatus, Error, WorkflowError,
};

/// Minimal device API returning queued responses
struct MockApi {
    state: Mutex<SessionState>,
    responses: Mutex<VecDeque<ResponseFrame>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockApi {
    fn new(responses: Vec<ResponseFrame>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::new(DeviceModelId::NanoX)),
            responses: Mutex::new(responses.into()),
            sent: Mutex::new(vec![]),
        })
    }
}

#[async_trait::async_trait]
impl DeviceApi for MockApi {
    async fn send_raw_frame(&self, frame: &[u8]) -> Result<ResponseFrame, Error> {
        self.sent.lock().unwrap().push(frame.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::Timeout)
    }

    fn device_model(&self) -> DeviceModelId {
        DeviceModelId::NanoX
    }

    fn session_state(&self) -> SessionState {
        self.state.lock().unwrap().clone()
    }

    fn update_session_state(&self, f: Box<dyn FnOnce(SessionState) -> SessionState + Send + '_>) {
        let mut s = self.state.lock().unwrap();
        *s = f(s.clone());
    }

    fn subscribe(&self) -> BoxStream<'static, SessionState> {
        stream::iter(vec![self.session_state()]).boxed()
    }

    fn disable_refresher(&self, name: &str) -> RefresherBlocker {
        RefresherBlocker::new(name, || ())
    }
}

fn api() -> Arc<dyn DeviceApi> {
    MockApi::new(vec![])
}

type Snapshot<O> = ActionState<O, Error, Intermediate>;

fn pending(i: UserInteractionRequired) -> Snapshot<u32> {
    ActionState::Pending(Intermediate::new(i))
}

fn terminal_count<O>(s: &[Snapshot<O>]) -> usize {
    s.iter().filter(|s| s.is_terminal()).count()
}

/// Single task machine returning a fixed value
fn value_machine(v: u32) -> Machine<u32, Intermediate, u32, Error> {
    Machine::builder("value", 0u32, Intermediate::none())
        .initial("Start")
        .state("Start", |s| {
            s.invoke(
                Task::new("value", move |_ctx, _api| async move { Ok::<_, Error>(v) })
                    .on_done("Success", |ctx, v| ctx.state = v),
            )
        })
        .final_state("Success")
        .output(|ctx| Ok(ctx.state))
        .build()
        .unwrap()
}

/// Two step child machine updating the intermediate value in each step
fn child_machine(fail: bool) -> Machine<(), Intermediate, u32, Error> {
    Machine::builder("child", (), Intermediate::none())
        .initial("Unlock")
        .state("Unlock", |s| {
            s.entry(|ctx| ctx.intermediate = UserInteractionRequired::UnlockDevice.into())
                .invoke(
                    Task::new("unlock", |_ctx, _api| async { Ok::<_, Error>(()) })
                        .on_done("Confirm", |_ctx, _| ()),
                )
        })
        .state("Confirm", move |s| {
            s.entry(|ctx| ctx.intermediate = UserInteractionRequired::ConfirmOpenApp.into())
                .invoke(
                    Task::new("confirm", move |_ctx, _api| async move {
                        match fail {
                            true => Err(Error::Workflow(WorkflowError::RefusedByUser)),
                            false => Ok(7u32),
                        }
                    })
                    .on_done("Done", |_ctx, _| ()),
                )
        })
        .final_state("Done")
        .output(|_ctx| Ok(7))
        .build()
        .unwrap()
}

#[derive(Clone, Default)]
struct ParentState {
    child: Option<Result<u32, Error>>,
}

/// Parent machine invoking the child, then a second task if the child succeeded
fn parent_machine(fail: bool, entered_b: Arc<AtomicBool>) -> Machine<ParentState, Intermediate, u32, Error> {
    Machine::builder("parent", ParentState::default(), Intermediate::none())
        .initial("A")
        .state("A", move |s| {
            s.nested(
                "child",
                move |_ctx| Ok(child_machine(fail)),
                "CheckA",
                |ctx, r| ctx.state.child = Some(r),
            )
        })
        .state("CheckA", |s| {
            s.always_if("Error", |ctx| matches!(ctx.state.child, Some(Err(_))))
                .always("B")
        })
        .state("B", move |s| {
            s.entry(|ctx| ctx.intermediate = Intermediate::none())
                .invoke(
                    Task::new("b", move |_ctx, _api| {
                        entered_b.store(true, Ordering::SeqCst);
                        async { Ok::<_, Error>(()) }
                    })
                    .on_done("Success", |_ctx, _| ()),
                )
        })
        .final_state("Success")
        .final_state("Error")
        .output(|ctx| match &ctx.state.child {
            Some(r) => r.clone(),
            None => Err(Error::Unknown("no child result".to_string())),
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn terminal_exactly_once() {
    let s: Vec<_> = value_machine(5).execute(api()).collect().await;

    assert_eq!(
        s,
        vec![pending(UserInteractionRequired::None), ActionState::Completed(5)]
    );
    assert_eq!(terminal_count(&s), 1);
}

#[tokio::test]
async fn execution_result() {
    assert_eq!(value_machine(9).execute(api()).result().await, Ok(9));
}

#[tokio::test]
async fn task_sends_command() {
    let resp = ResponseFrame::new(
        vec![0x01, 0x03, b'a', b'p', b'p', 0x01, b'1', 0x00],
        0x9000,
    );
    let mock = MockApi::new(vec![resp]);
    let a: Arc<dyn DeviceApi> = mock.clone();

    let m = Machine::builder("cmd", String::new(), Intermediate::none())
        .initial("Send")
        .state("Send", |s| {
            s.task(
                "get_app",
                |_ctx, api| async move { api.send_command(&GetAppAndVersion).await },
                |t| t.on_done("Success", |ctx, v| ctx.state = v.name),
            )
        })
        .final_state("Success")
        .output(|ctx| Ok(ctx.state.clone()))
        .build()
        .unwrap();

    assert_eq!(m.execute(a).result().await, Ok("app".to_string()));
    assert_eq!(
        mock.sent.lock().unwrap().as_slice(),
        &[vec![0xb0, 0x01, 0x00, 0x00, 0x00]]
    );
}

#[tokio::test]
async fn cancel_in_flight() {
    let m = Machine::builder("slow", (), Intermediate::none())
        .initial("Wait")
        .state("Wait", |s| {
            s.invoke(
                Task::new("sleep", |_ctx, _api| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, Error>(())
                })
                .on_done("Success", |_ctx, _| ()),
            )
        })
        .final_state("Success")
        .output(|_ctx| Ok(()))
        .build()
        .unwrap();

    let mut exec = m.execute(api());

    assert_eq!(
        exec.next().await,
        Some(ActionState::Pending(Intermediate::none()))
    );

    exec.cancel();

    assert_eq!(exec.next().await, Some(ActionState::Error(Error::Cancelled)));
    assert_eq!(exec.next().await, None);
}

#[tokio::test]
async fn cancel_after_completion_is_noop() {
    let (updates, canceller) = value_machine(1).execute(api()).into_parts();

    let s: Vec<_> = updates.collect().await;
    canceller.cancel();

    assert_eq!(s.last(), Some(&ActionState::Completed(1)));
    assert_eq!(terminal_count(&s), 1);
}

#[tokio::test]
async fn nested_pending_forwarded() {
    let child: Vec<_> = child_machine(false).execute(api()).collect().await;
    let child_pending: Vec<_> = child.iter().filter(|s| !s.is_terminal()).cloned().collect();

    assert_eq!(
        child_pending,
        vec![
            pending(UserInteractionRequired::UnlockDevice),
            pending(UserInteractionRequired::ConfirmOpenApp),
        ]
    );

    let entered_b = Arc::new(AtomicBool::new(false));
    let parent: Vec<_> = parent_machine(false, entered_b.clone())
        .execute(api())
        .collect()
        .await;

    // Initial parent pending, then exactly the child's pending values
    assert_eq!(parent[0], pending(UserInteractionRequired::None));
    assert_eq!(&parent[1..3], child_pending.as_slice());

    // Parent continues to B after the child completes
    assert_eq!(parent[3], pending(UserInteractionRequired::None));
    assert_eq!(parent.last(), Some(&ActionState::Completed(7)));
    assert_eq!(terminal_count(&parent), 1);
    assert!(entered_b.load(Ordering::SeqCst));
}

#[tokio::test]
async fn nested_error_terminates_parent() {
    let entered_b = Arc::new(AtomicBool::new(false));
    let s: Vec<_> = parent_machine(true, entered_b.clone())
        .execute(api())
        .collect()
        .await;

    assert_eq!(
        s.last(),
        Some(&ActionState::Error(Error::Workflow(
            WorkflowError::RefusedByUser
        )))
    );
    assert_eq!(terminal_count(&s), 1);
    assert!(!entered_b.load(Ordering::SeqCst));
}

#[tokio::test]
async fn on_error_maps_failure() {
    let m = Machine::builder("mapped", None::<Error>, Intermediate::none())
        .initial("Send")
        .state("Send", |s| {
            s.invoke(
                Task::new("busy", |_ctx, _api| async { Err::<(), _>(Error::DeviceBusy) })
                    .on_done("Success", |_ctx, _| ())
                    .on_error("Error", |ctx, e| ctx.state = Some(e)),
            )
        })
        .final_state("Success")
        .final_state("Error")
        .output(|ctx| match &ctx.state {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        })
        .build()
        .unwrap();

    assert_eq!(m.execute(api()).result().await, Err(Error::DeviceBusy));
}

#[tokio::test]
async fn task_panic_is_caught() {
    let m = Machine::builder("panic", (), Intermediate::none())
        .initial("Start")
        .state("Start", |s| {
            s.invoke(
                Task::new("panic", |_ctx, _api| async {
                    if true {
                        panic!("task failure");
                    }
                    Ok::<_, Error>(())
                })
                .on_done("Success", |_ctx, _| ()),
            )
        })
        .final_state("Success")
        .output(|_ctx| Ok(()))
        .build()
        .unwrap();

    let s: Vec<_> = m.execute(api()).collect().await;

    assert_eq!(terminal_count(&s), 1);
    assert!(matches!(s.last(), Some(ActionState::Error(Error::Unknown(_)))));
}

#[tokio::test]
async fn always_loop_is_bounded() {
    let m = Machine::builder("loop", (), Intermediate::none())
        .initial("A")
        .state("A", |s| s.always("B"))
        .state("B", |s| s.always("A"))
        .final_state("Success")
        .output(|_ctx| Ok::<_, Error>(()))
        .build()
        .unwrap();

    let s: Vec<_> = m.execute(api()).collect().await;

    assert_eq!(s[0], ActionState::Pending(Intermediate::none()));
    assert!(matches!(s[1], ActionState::Error(Error::Unknown(_))));
    assert_eq!(s.len(), 2);
}

#[tokio::test]
async fn stuck_state_errors() {
    let m = Machine::builder("stuck", (), Intermediate::none())
        .initial("A")
        .state("A", |s| s.always_if("Success", |_ctx| false))
        .final_state("Success")
        .output(|_ctx| Ok::<_, Error>(()))
        .build()
        .unwrap();

    let r = m.execute(api()).result().await;
    assert!(matches!(r, Err(Error::Unknown(_))));
}

#[tokio::test]
async fn entry_and_exit_actions() {
    let m = Machine::builder("actions", Vec::<&'static str>::new(), Intermediate::none())
        .initial("A")
        .state("A", |s| {
            s.entry(|ctx| ctx.state.push("enter A"))
                .exit(|ctx| ctx.state.push("exit A"))
                .always("B")
        })
        .state("B", |s| {
            s.entry(|ctx| ctx.state.push("enter B")).task(
                "noop",
                |_ctx, _api| async { Ok::<_, Error>(()) },
                |t| t.on_done("Success", |ctx, _| ctx.state.push("done B")),
            )
        })
        .final_state("Success")
        .output(|ctx| Ok(ctx.state.clone()))
        .build()
        .unwrap();

    assert_eq!(
        m.execute(api()).result().await,
        Ok(vec!["enter A", "exit A", "enter B", "done B"])
    );
}

#[test]
fn invalid_machines() {
    type B = MachineBuilder<(), Intermediate, (), Error>;

    let base = || -> B {
        Machine::builder("invalid", (), Intermediate::none()).output(|_ctx| Ok(()))
    };

    // Unknown target
    let r = base()
        .initial("A")
        .state("A", |s| s.always("Missing"))
        .final_state("Success")
        .build();
    assert!(matches!(r, Err(Error::InvalidMachine(_))));

    // Missing initial state
    let r = base().state("A", |s| s.always("Success")).final_state("Success").build();
    assert!(matches!(r, Err(Error::InvalidMachine(_))));

    // Duplicate state
    let r = base()
        .initial("A")
        .state("A", |s| s.always("Success"))
        .state("A", |s| s.always("Success"))
        .final_state("Success")
        .build();
    assert!(matches!(r, Err(Error::InvalidMachine(_))));

    // No final state
    let r = base().initial("A").state("A", |s| s.always("A")).build();
    assert!(matches!(r, Err(Error::InvalidMachine(_))));

    // Task without completion transition
    let r = base()
        .initial("A")
        .state("A", |s| s.invoke(Task::new("t", |_ctx, _api| async { Ok::<_, Error>(()) })))
        .final_state("Success")
        .build();
    assert!(matches!(r, Err(Error::InvalidMachine(_))));

    // Valid machine
    let m = base()
        .initial("A")
        .state("A", |s| s.always("Success"))
        .final_state("Success")
        .build()
        .unwrap();
    assert_eq!(m.id(), "invalid");
    assert_eq!(m.states().collect::<Vec<_>>(), vec!["A", "Success"]);
    assert_eq!(m.context().intermediate, Intermediate::none());
}

/// Action whose machine fails validation
struct BrokenAction;

impl DeviceAction for BrokenAction {
    type State = ();
    type Output = ();

    fn make_machine(&self) -> Result<Machine<(), Intermediate, (), Error>, Error> {
        Machine::builder("broken", (), Intermediate::none())
            .initial("A")
            .state("A", |s| s.always("Missing"))
            .final_state("Success")
            .output(|_ctx| Ok(()))
            .build()
    }
}

#[tokio::test]
async fn invalid_action_stream() {
    let updates: Vec<_> = BrokenAction.execute(api()).collect().await;

    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], ActionState::Pending(Intermediate::none()));
    assert!(matches!(&updates[1], ActionState::Error(Error::InvalidMachine(_))));
}

#[tokio::test]
async fn session_state_updates() {
    let mock = MockApi::new(vec![]);
    let a: Arc<dyn DeviceApi> = mock.clone();

    a.update_session_state(Box::new(|s| s.with_status(DeviceStatus::Locked)));
    assert_eq!(a.session_state().device_status, DeviceStatus::Locked);

    let first = a.subscribe().next().await.unwrap();
    assert_eq!(first.device_status, DeviceStatus::Locked);
}
