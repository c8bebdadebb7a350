//! Serializer classification and concurrent first use.

use std::sync::{Arc, Barrier};
use std::thread;

use conduit_wire::{
    Codec, CodecError, EventObject, ObjectValue, Record, SchemaDescriptor, SerializerCache,
    TypeRegistry, Value,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Heartbeat {
    node: String,
    uptime_secs: u64,
}

impl EventObject for Heartbeat {
    const TYPE_NAME: &'static str = "acme.ops.Heartbeat";
}

/// Derived type whose base declares the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DiskAlert {
    id: String,
    severity: u8,
    #[serde(default)]
    mount: String,
}

impl EventObject for DiskAlert {
    const TYPE_NAME: &'static str = "acme.ops.DiskAlert";
}

/// Same shape as `DiskAlert` but every member is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StrictAlert {
    id: String,
    severity: u8,
    mount: String,
}

impl EventObject for StrictAlert {
    const TYPE_NAME: &'static str = "acme.ops.StrictAlert";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Opaque {
    secret: String,
}

impl EventObject for Opaque {
    const TYPE_NAME: &'static str = "acme.ops.Opaque";
}

fn registry() -> Arc<TypeRegistry> {
    let registry = Arc::new(TypeRegistry::new());
    registry
        .register::<Heartbeat>(SchemaDescriptor::of::<Heartbeat>().serializable())
        .unwrap();
    registry
        .declare(SchemaDescriptor::new("acme.ops.Alert").with_contract(["id", "severity"]))
        .unwrap();
    registry
        .register::<DiskAlert>(SchemaDescriptor::of::<DiskAlert>().with_parent("acme.ops.Alert"))
        .unwrap();
    registry
        .register::<StrictAlert>(
            SchemaDescriptor::of::<StrictAlert>().with_parent("acme.ops.Alert"),
        )
        .unwrap();
    registry
        .register::<Opaque>(SchemaDescriptor::of::<Opaque>())
        .unwrap();
    registry
}

#[test]
fn concurrent_first_use_caches_one_encoder() {
    let registry = registry();
    let cache = Arc::new(SerializerCache::new());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let encoder = cache.encoder_for::<Heartbeat>(&registry).unwrap();
                let body = encoder
                    .encode(&Heartbeat {
                        node: format!("n{i}"),
                        uptime_secs: 10,
                    })
                    .unwrap();
                (encoder, body)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(cache.len(), 1);
    let first = &results[0].0;
    for (encoder, body) in &results {
        assert!(Arc::ptr_eq(first, encoder));
        assert!(body.contains("\"uptime_secs\":10"));
    }
}

#[test]
fn directly_serializable_type_writes_every_member() {
    let registry = registry();
    let cache = SerializerCache::new();

    let encoder = cache.encoder_for::<Heartbeat>(&registry).unwrap();
    assert_eq!(encoder.contract_schema(), Heartbeat::TYPE_NAME);
    assert!(encoder.members().is_none());
}

#[test]
fn hierarchy_contract_projects_members() {
    let registry = registry();
    let cache = SerializerCache::new();

    let encoder = cache.encoder_for::<DiskAlert>(&registry).unwrap();
    assert_eq!(encoder.contract_schema(), "acme.ops.Alert");

    let body = encoder
        .encode(&DiskAlert {
            id: "a-1".into(),
            severity: 3,
            mount: "/var".into(),
        })
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({"id": "a-1", "severity": 3}));
}

#[test]
fn projected_value_decodes_with_defaults() {
    let codec = Codec::with_registry(registry());
    let alert = DiskAlert {
        id: "a-2".into(),
        severity: 5,
        mount: "/data".into(),
    };

    let record = Record::new().with("alert", ObjectValue::new(alert));
    let decoded = codec.decode(&codec.encode(&record).unwrap()).unwrap();

    let restored = decoded
        .get("alert")
        .and_then(Value::as_object)
        .and_then(|o| o.downcast_ref::<DiskAlert>())
        .unwrap();
    assert_eq!(restored.id, "a-2");
    assert_eq!(restored.severity, 5);
    assert_eq!(restored.mount, "");
}

#[test]
fn projection_that_cannot_be_read_back_is_not_serializable() {
    let codec = Codec::with_registry(registry());
    let alert = StrictAlert {
        id: "a-3".into(),
        severity: 2,
        mount: "/srv".into(),
    };

    let record = Record::new().with("alert", ObjectValue::new(alert.clone()));
    let err = codec.encode(&record).unwrap_err();
    assert!(matches!(err, CodecError::NotSerializable(_)), "got {err:?}");

    let err = codec.encode_event(&alert).unwrap_err();
    assert!(matches!(err, CodecError::NotSerializable(_)), "got {err:?}");
}

#[test]
fn type_without_any_contract_is_not_serializable() {
    let registry = registry();
    let cache = SerializerCache::new();

    let err = cache.encoder_for::<Opaque>(&registry).unwrap_err();
    assert!(matches!(err, CodecError::NotSerializable(_)));
    assert!(cache.is_empty());
}

#[test]
fn failed_classification_is_not_cached() {
    let registry = Arc::new(TypeRegistry::new());
    let cache = SerializerCache::new();

    assert!(cache.encoder_for::<Heartbeat>(&registry).is_err());

    registry
        .register::<Heartbeat>(SchemaDescriptor::of::<Heartbeat>().serializable())
        .unwrap();
    assert!(cache.encoder_for::<Heartbeat>(&registry).is_ok());
    assert_eq!(cache.len(), 1);
}
