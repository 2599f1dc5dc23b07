//! Verifies the spans and warnings emitted by `NamespaceStore` operations.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use tenantkv_namespace::{NamespaceStore, QuotaConfig, keys::namespace_prefix};
use tenantkv_storage::{MemoryBackend, StorageBackend};
use tracing::{Level, Subscriber};
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

/// Span name, parent span name and field names.
type SpanRecord = (String, Option<String>, Vec<String>);

#[derive(Clone, Default)]
struct Collector {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
    warnings: Arc<Mutex<usize>>,
    event_fields: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for Collector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let parent = span.parent().map(|p| p.name().to_owned());
            let fields = attrs.metadata().fields().iter().map(|f| f.name().to_owned()).collect();
            self.spans.lock().expect("lock poisoned").push((span.name().to_owned(), parent, fields));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            *self.warnings.lock().expect("lock poisoned") += 1;
        }
        self.event_fields
            .lock()
            .expect("lock poisoned")
            .extend(event.metadata().fields().iter().map(|f| f.name().to_owned()));
    }
}

impl Collector {
    fn names(&self) -> Vec<String> {
        self.spans.lock().expect("lock poisoned").iter().map(|(name, ..)| name.clone()).collect()
    }

    fn parent_of(&self, name: &str) -> Option<String> {
        self.spans
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|(n, ..)| n == name)
            .and_then(|(_, parent, _)| parent.clone())
    }

    fn fields_of(&self, name: &str) -> Vec<String> {
        self.spans
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|(n, ..)| n == name)
            .map(|(_, _, fields)| fields.clone())
            .unwrap_or_default()
    }
}

#[tokio::test]
async fn store_operations_create_spans() {
    let collector = Collector::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector.clone()));

    let store = NamespaceStore::new(MemoryBackend::new());
    store.insert("alice", "k", b"v", &QuotaConfig::UNLIMITED).await.unwrap();
    store.retrieve("alice", "k").await.unwrap();
    store.list("alice").await.unwrap();
    store.delete("alice", "k").await.unwrap();

    let recorded = collector.names();
    for name in ["insert", "retrieve", "list", "delete", "with_conflict_retry"] {
        assert!(recorded.iter().any(|s| s == name), "missing span '{name}', recorded: {recorded:?}");
    }
}

#[tokio::test]
async fn backend_spans_nest_under_store_spans() {
    let collector = Collector::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector.clone()));

    let store = NamespaceStore::new(MemoryBackend::new());
    store.list("alice").await.unwrap();

    assert_eq!(collector.parent_of("transaction").as_deref(), Some("list"));
}

#[tokio::test]
async fn undecodable_keys_are_logged_as_warnings() {
    let collector = Collector::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector.clone()));

    let backend = MemoryBackend::new();
    let store = NamespaceStore::new(backend.clone());
    backend
        .set(format!("{}%%%", namespace_prefix("alice")).into_bytes(), b"junk".to_vec())
        .await
        .unwrap();

    assert!(store.list("alice").await.unwrap().is_empty());
    assert_eq!(*collector.warnings.lock().expect("lock poisoned"), 1);
}

#[tokio::test]
async fn account_identifiers_are_recorded_only_as_lengths() {
    let collector = Collector::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector.clone()));

    let backend = MemoryBackend::new();
    let store = NamespaceStore::new(backend.clone());
    backend
        .set(format!("{}%%%", namespace_prefix("user@example.com")).into_bytes(), b"junk".to_vec())
        .await
        .unwrap();

    store.insert("user@example.com", "k", b"v", &QuotaConfig::UNLIMITED).await.unwrap();
    store.retrieve("user@example.com", "k").await.unwrap();
    store.list("user@example.com").await.unwrap();
    store.delete("user@example.com", "k").await.unwrap();

    for span in ["insert", "retrieve", "list", "delete"] {
        let fields = collector.fields_of(span);
        assert!(fields.iter().any(|f| f == "account_len"), "{span} fields: {fields:?}");
        assert!(!fields.iter().any(|f| f == "account" || f == "key" || f == "value"), "{span} fields: {fields:?}");
    }

    let event_fields = collector.event_fields.lock().expect("lock poisoned").clone();
    assert!(event_fields.iter().any(|f| f == "physical_key_len"), "events: {event_fields:?}");
    assert!(!event_fields.iter().any(|f| f == "account" || f == "physical_key"), "events: {event_fields:?}");
}
