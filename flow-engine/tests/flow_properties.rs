//! Integration tests for the concrete scenarios and a few of the universal
//! properties a graph of this shape must satisfy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flow_core::{
    BoxMessage, Context, Endpoint, EndpointId, ErrorCategory, FlowResult, Message, Sink, Source,
};
use flow_engine::Builder;

type Id = EndpointId;

#[derive(Default, Clone, Copy)]
struct Visitor;

/// A message with a fixed activate/drain_to set and a one-shot list of
/// successors handed back from `accept`.
struct Msg {
    activate: Vec<Id>,
    drain_to: Vec<Id>,
    successors: Mutex<Option<Vec<Msg>>>,
}

impl Msg {
    fn draining(sink: Id) -> Self {
        Self {
            activate: Vec::new(),
            drain_to: vec![sink],
            successors: Mutex::new(Some(Vec::new())),
        }
    }

    fn activating(target: Id, then_accept_to: Vec<Msg>) -> Self {
        Self {
            activate: vec![target],
            drain_to: Vec::new(),
            successors: Mutex::new(Some(then_accept_to)),
        }
    }
}

#[async_trait]
impl Message<Id, Visitor> for Msg {
    async fn activate(&self, _ctx: &Context) -> Vec<Id> {
        self.activate.clone()
    }

    async fn drain_to(&self, _ctx: &Context) -> Vec<Id> {
        self.drain_to.clone()
    }

    async fn accept(self: Box<Self>, _ctx: &Context, _visitor: &Visitor) -> FlowResult<Vec<BoxMessage<Id, Visitor>>> {
        let successors = self.successors.lock().expect("poisoned").take().unwrap_or_default();
        Ok(successors
            .into_iter()
            .map(|m| Box::new(m) as BoxMessage<Id, Visitor>)
            .collect())
    }
}

/// A source that plays back a fixed, ordered script of `next()` results.
struct ScriptedSource {
    id: Id,
    steps: Mutex<VecDeque<FlowResult<(Vec<BoxMessage<Id, Visitor>>, bool)>>>,
    activate_calls: AtomicUsize,
    close_calls: AtomicUsize,
    block_until_cancelled: bool,
}

impl ScriptedSource {
    fn new(id: impl Into<Id>, steps: Vec<FlowResult<(Vec<BoxMessage<Id, Visitor>>, bool)>>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            steps: Mutex::new(steps.into()),
            activate_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            block_until_cancelled: false,
        })
    }

    fn blocking(id: impl Into<Id>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            steps: Mutex::new(VecDeque::new()),
            activate_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            block_until_cancelled: true,
        })
    }
}

#[async_trait]
impl Endpoint<Id> for ScriptedSource {
    fn id(&self) -> Id {
        self.id.clone()
    }

    async fn activate(&self, _ctx: &Context) -> FlowResult<()> {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _ctx: &Context) -> FlowResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Source<Id, Visitor> for ScriptedSource {
    async fn next(&self, ctx: &Context) -> FlowResult<(Vec<BoxMessage<Id, Visitor>>, bool)> {
        if self.block_until_cancelled {
            ctx.cancelled().await;
            return Ok((Vec::new(), false));
        }
        let next = self.steps.lock().expect("poisoned").pop_front();
        next.unwrap_or(Ok((Vec::new(), false)))
    }
}

/// A sink that records how many messages it drained and can be told to
/// fail on its next call.
struct RecordingSink {
    id: Id,
    drained: AtomicUsize,
    fail_next: Mutex<Option<String>>,
}

impl RecordingSink {
    fn new(id: impl Into<Id>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            drained: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
        })
    }

    fn failing(id: impl Into<Id>, message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            drained: AtomicUsize::new(0),
            fail_next: Mutex::new(Some(message.into())),
        })
    }
}

#[async_trait]
impl Endpoint<Id> for RecordingSink {
    fn id(&self) -> Id {
        self.id.clone()
    }

    async fn activate(&self, _ctx: &Context) -> FlowResult<()> {
        Ok(())
    }

    async fn close(&self, _ctx: &Context) -> FlowResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Sink<Id, Visitor> for RecordingSink {
    async fn drain(&self, _ctx: &Context, batch: Vec<flow_core::ArcMessage<Id, Visitor>>) -> FlowResult<()> {
        if let Some(message) = self.fail_next.lock().expect("poisoned").take() {
            return Err(flow_core::FlowError::new(ErrorCategory::Drain, message));
        }
        self.drained.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn s1_single_source_single_sink() {
    let sink = RecordingSink::new("sink1");
    let source = ScriptedSource::new("src1", vec![Ok((vec![Box::new(Msg::draining(EndpointId::from("sink1")))], false))]);

    let flow = Builder::<Id, Visitor>::new(Visitor)
        .activate_source(source)
        .activate_sink(sink.clone())
        .build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");
    flow.wait().await.expect("wait should succeed");

    assert_eq!(sink.drained.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s2_accept_fan_out_to_single_sink() {
    let sink = RecordingSink::new("sink1");
    let child = Msg::draining(EndpointId::from("sink1"));
    let parent = Msg {
        activate: Vec::new(),
        drain_to: Vec::new(),
        successors: Mutex::new(Some(vec![child])),
    };
    let source = ScriptedSource::new("src1", vec![Ok((vec![Box::new(parent)], false))]);

    let flow = Builder::<Id, Visitor>::new(Visitor)
        .activate_source(source)
        .activate_sink(sink.clone())
        .build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");
    flow.wait().await.expect("wait should succeed");

    assert_eq!(sink.drained.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn accept_fan_out_to_two_successors_both_reach_the_sink() {
    // `accept` returning K=2 successors pushes the first into the requeue
    // queue and tail-chains the second (spec §4.3); both must still reach
    // their sink, which exercises the requeue path S2 does not.
    let sink = RecordingSink::new("sink1");
    let c1 = Msg::draining(EndpointId::from("sink1"));
    let c2 = Msg::draining(EndpointId::from("sink1"));
    let parent = Msg {
        activate: Vec::new(),
        drain_to: Vec::new(),
        successors: Mutex::new(Some(vec![c1, c2])),
    };
    let source = ScriptedSource::new("src1", vec![Ok((vec![Box::new(parent)], false))]);

    let flow = Builder::<Id, Visitor>::new(Visitor)
        .activate_source(source)
        .activate_sink(sink.clone())
        .build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");
    flow.wait().await.expect("wait should succeed");

    assert_eq!(sink.drained.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn s3_lazy_activation_is_triggered_exactly_once() {
    let sink = RecordingSink::new("sink1");
    let lazy_id: Id = EndpointId::from("lazy-src");

    let lazy_source = ScriptedSource::new(
        lazy_id.clone(),
        vec![Ok((vec![Box::new(Msg::draining(EndpointId::from("sink1")))], false))],
    );

    let eager_message = Msg::activating(lazy_id.clone(), Vec::new());
    let eager_source = ScriptedSource::new("src1", vec![Ok((vec![Box::new(eager_message)], false))]);

    let flow = Builder::<Id, Visitor>::new(Visitor)
        .activate_source(eager_source)
        .activate_sink(sink.clone())
        .source(lazy_source.clone())
        .build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");
    flow.wait().await.expect("wait should succeed");

    assert_eq!(lazy_source.activate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.drained.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s4_source_error_is_reported_as_source_category() {
    let cause = flow_core::FlowError::new(ErrorCategory::Source, "boom");
    let source = ScriptedSource::new("src1", vec![Err(cause)]);

    let flow = Builder::<Id, Visitor>::new(Visitor).activate_source(source).build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");
    let result = flow.wait().await;

    let err = result.expect_err("a source error must fail the flow");
    assert_eq!(err.category(), ErrorCategory::Source);
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn s5_drain_error_is_reported_as_drain_category() {
    let sink = RecordingSink::failing("sink1", "sink rejected batch");
    let source = ScriptedSource::new("src1", vec![Ok((vec![Box::new(Msg::draining(EndpointId::from("sink1")))], false))]);

    let flow = Builder::<Id, Visitor>::new(Visitor)
        .activate_source(source)
        .activate_sink(sink)
        .build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");
    let result = flow.wait().await;

    let err = result.expect_err("a drain error must fail the flow");
    assert_eq!(err.category(), ErrorCategory::Drain);
}

#[tokio::test(start_paused = true)]
async fn s6_external_cancellation_surfaces_as_cancelled() {
    let source = ScriptedSource::blocking("src1");
    let flow = Builder::<Id, Visitor>::new(Visitor).activate_source(source.clone()).build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");

    let ctx_for_cancel = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx_for_cancel.cancel();
    });

    let result = flow.wait().await;
    let err = result.expect_err("external cancellation must fail the flow");
    assert_eq!(err.category(), ErrorCategory::Cancelled);
    assert_eq!(source.close_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_rejects_a_second_start() {
    let source = ScriptedSource::new("src1", vec![Ok((Vec::new(), false))]);
    let flow = Builder::<Id, Visitor>::new(Visitor).activate_source(source).build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("first run should succeed");
    let second = flow.run(&ctx).await;

    assert_eq!(second.expect_err("second run must fail").category(), ErrorCategory::AlreadyRunning);
    flow.wait().await.expect("wait should still observe the first run's success");
}

#[tokio::test]
async fn flow_with_no_eager_drivers_completes_immediately() {
    let flow = Builder::<Id, Visitor>::new(Visitor)
        .sink(RecordingSink::new("lazy-sink"))
        .build();

    let ctx = Context::new();
    flow.run(&ctx).await.expect("run should succeed");
    flow.wait().await.expect("a flow with nothing eager to drive finishes immediately");
}
