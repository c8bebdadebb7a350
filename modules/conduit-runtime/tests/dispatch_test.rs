//! Dispatch façade behavior against the in-process loopback engine.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use conduit_runtime::{
    ControlChannel, DeliveryClass, DeliveryEnvelope, DispatchError,
    EvaluationHandler, EventPayload, EventRuntime, LoopbackEngine, NoopHandler,
};
use conduit_wire::{
    Codec, CodecError, EventObject, Record, SchemaDescriptor, TypeRegistry, WireEntry, WireNode,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PriceTick {
    symbol: String,
    price: f64,
}

impl EventObject for PriceTick {
    const TYPE_NAME: &'static str = "acme.market.PriceTick";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Unregistered {
    n: u32,
}

impl EventObject for Unregistered {
    const TYPE_NAME: &'static str = "acme.market.Unregistered";
}

fn codec() -> Codec {
    let registry = Arc::new(TypeRegistry::new());
    for name in ["acme.Trigger", "acme.Follow", "acme.External"] {
        registry.declare(SchemaDescriptor::new(name)).unwrap();
    }
    registry
        .register::<PriceTick>(SchemaDescriptor::of::<PriceTick>().serializable())
        .unwrap();
    Codec::with_registry(registry)
}

fn runtime_over(engine: &Arc<LoopbackEngine>) -> EventRuntime {
    EventRuntime::new(engine.instance_id().to_string(), codec(), engine.clone())
}

fn same_channel(a: &Arc<dyn ControlChannel>, b: &Arc<dyn ControlChannel>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn type_names(events: &[DeliveryEnvelope]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e.payload.type_name().map(str::to_string))
        .collect()
}

// ---------------------------------------------------------------------------
// Channel lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn channel_identity_is_stable_until_dispose() {
    let engine = Arc::new(LoopbackEngine::new("engine-1", Arc::new(NoopHandler)));
    let runtime = runtime_over(&engine);

    let first = runtime.channels().channel().await.unwrap();
    for _ in 0..5 {
        let again = runtime.channels().channel().await.unwrap();
        assert!(same_channel(&first, &again));
    }
    assert_eq!(engine.connections(), 1);

    runtime.dispose().await;
    assert!(runtime.is_disposed().await);
    assert!(matches!(
        runtime.channels().channel().await,
        Err(DispatchError::Disposed)
    ));

    let err = runtime
        .send_record("acme.External", &Record::new().with("n", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Disposed));

    // Second dispose is a no-op.
    runtime.dispose().await;
}

#[tokio::test]
async fn concurrent_first_use_establishes_once() {
    let engine = Arc::new(LoopbackEngine::new("engine-1", Arc::new(NoopHandler)));
    let runtime = Arc::new(runtime_over(&engine));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let runtime = runtime.clone();
            tokio::spawn(async move {
                runtime
                    .send_record("acme.External", &Record::new().with("seq", i))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(engine.connections(), 1);
    assert_eq!(engine.pending(), 16);
}

#[tokio::test]
async fn runtimes_never_share_a_channel() {
    let engine = Arc::new(LoopbackEngine::new("engine-1", Arc::new(NoopHandler)));
    let a = runtime_over(&engine);
    let b = runtime_over(&engine);

    let ca = a.channels().channel().await.unwrap();
    let cb = b.channels().channel().await.unwrap();

    assert!(!same_channel(&ca, &cb));
    assert_eq!(engine.connections(), 2);

    a.dispose().await;
    b.send_record("acme.External", &Record::new()).await.unwrap();
}

#[tokio::test]
async fn disposed_runtime_reports_disposed_before_encoding() {
    let engine = Arc::new(LoopbackEngine::new("engine-1", Arc::new(NoopHandler)));
    let runtime = runtime_over(&engine);
    runtime.dispose().await;

    let err = runtime
        .send_record("acme.Nope", &Record::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Disposed), "got {err:?}");

    let err = runtime
        .route_object(&Unregistered { n: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Disposed), "got {err:?}");

    let mut tree = WireNode::root();
    tree.entries.push(WireEntry::keyed("x").with_type("i64"));
    let err = runtime.route_tree(tree).await.unwrap_err();
    assert!(matches!(err, DispatchError::Disposed), "got {err:?}");

    let tick = PriceTick {
        symbol: "ACME".into(),
        price: 1.0,
    };
    let err = runtime.send_object(&tick).await.unwrap_err();
    assert!(matches!(err, DispatchError::Disposed), "got {err:?}");

    assert!(runtime.codec().serializers().is_empty());
    assert_eq!(engine.connections(), 0);
}

// ---------------------------------------------------------------------------
// Fail fast before any channel work
// ---------------------------------------------------------------------------

#[tokio::test]
async fn undeclared_event_type_fails_before_connecting() {
    let engine = Arc::new(LoopbackEngine::new("engine-1", Arc::new(NoopHandler)));
    let runtime = runtime_over(&engine);

    let err = runtime
        .send_record("acme.Nope", &Record::new().with("x", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Codec(CodecError::UnresolvedType(_))));

    let err = runtime
        .route_object(&Unregistered { n: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Codec(CodecError::NotSerializable(_))));

    let mut tree = WireNode::root();
    tree.entries.push(WireEntry::keyed("x").with_type("i64"));
    let err = runtime.send_tree(tree).await.unwrap_err();
    assert!(matches!(err, DispatchError::Codec(CodecError::Malformed(_))));

    assert_eq!(engine.connections(), 0);
    assert!(!runtime.channels().is_open().await);
}

#[tokio::test]
async fn payloads_carry_type_metadata() {
    let engine = Arc::new(LoopbackEngine::new("engine-1", Arc::new(NoopHandler)));
    let runtime = runtime_over(&engine);

    runtime
        .send_object(&PriceTick {
            symbol: "ACME".into(),
            price: 12.5,
        })
        .await
        .unwrap();
    runtime
        .send_record("acme.External", &Record::new().with("symbol", "ACME"))
        .await
        .unwrap();

    let mut tree = WireNode::root();
    tree.entries
        .push(WireEntry::keyed("raw").with_type("string").with_text("yes"));
    runtime.send_tree(tree.clone()).await.unwrap();

    engine.run_until_idle().await.unwrap();
    let events = engine.evaluated();

    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.instance_id == "engine-1"));
    assert!(events.iter().all(|e| e.delivery == DeliveryClass::Send));

    match &events[0].payload {
        EventPayload::Named { type_name, body } => {
            assert_eq!(type_name, PriceTick::TYPE_NAME);
            let tick: PriceTick = serde_json::from_str(body).unwrap();
            assert_eq!(tick.price, 12.5);
        }
        other => panic!("expected named payload, got {other:?}"),
    }
    assert_eq!(events[1].payload.type_name(), Some("acme.External"));
    assert_eq!(
        events[2].payload,
        EventPayload::Structural {
            type_name: None,
            tree
        }
    );
}

// ---------------------------------------------------------------------------
// Route priority
// ---------------------------------------------------------------------------

/// Routes a follow-up event whenever it evaluates the trigger.
struct RoutingHandler {
    runtime: Arc<OnceLock<Arc<EventRuntime>>>,
}

#[async_trait]
impl EvaluationHandler for RoutingHandler {
    async fn evaluate(&self, envelope: &DeliveryEnvelope) -> Result<()> {
        if envelope.payload.type_name() == Some("acme.Trigger") {
            let runtime = self
                .runtime
                .get()
                .ok_or_else(|| anyhow::anyhow!("runtime not wired"))?;
            runtime
                .route_record("acme.Follow", &Record::new().with("from", "trigger"))
                .await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn routed_event_is_evaluated_before_pending_send() {
    let slot = Arc::new(OnceLock::new());
    let engine = Arc::new(LoopbackEngine::new(
        "engine-1",
        Arc::new(RoutingHandler {
            runtime: slot.clone(),
        }),
    ));
    let runtime = Arc::new(runtime_over(&engine));
    assert!(slot.set(runtime.clone()).is_ok());

    runtime
        .send_record("acme.Trigger", &Record::new())
        .await
        .unwrap();
    runtime
        .send_record("acme.External", &Record::new())
        .await
        .unwrap();

    assert_eq!(engine.run_until_idle().await.unwrap(), 3);

    let events = engine.evaluated();
    assert_eq!(
        type_names(&events),
        vec!["acme.Trigger", "acme.Follow", "acme.External"]
    );
    assert_eq!(events[1].delivery, DeliveryClass::Route);
}
