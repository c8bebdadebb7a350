//! Forwarding from queue updates to the dispatch façade.

use std::fmt;
use std::sync::Arc;

use conduit_consumer::UpdateNotification;
use conduit_runtime::{DispatchError, EventRuntime};
use conduit_wire::{CodecError, SchemaDescriptor, TypeRegistry};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

/// Comma-separated event type names, blanks ignored.
pub fn parse_event_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Event types named by `CONDUIT_EVENT_TYPES`.
pub fn event_types_from_env() -> Vec<String> {
    parse_event_types(&std::env::var("CONDUIT_EVENT_TYPES").unwrap_or_default())
}

/// Declare record event types so the runtime accepts them.
pub fn declare_event_types(registry: &TypeRegistry, names: &[String]) -> Result<(), CodecError> {
    for name in names {
        registry.declare(SchemaDescriptor::new(name.as_str()))?;
    }
    info!(count = names.len(), "Event types declared");
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardStats {
    pub forwarded: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl fmt::Display for ForwardStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "forwarded={} failed={} skipped={}",
            self.forwarded, self.failed, self.skipped
        )
    }
}

/// Send every new event of every update until the sender side closes or the
/// runtime is disposed.
pub async fn forward_updates(
    mut updates: UnboundedReceiver<UpdateNotification>,
    runtime: Arc<EventRuntime>,
) -> ForwardStats {
    let mut stats = ForwardStats::default();

    while let Some(update) = updates.recv().await {
        let Some(event_type) = update.event_type.as_deref() else {
            warn!(
                statement_id = update.statement_id.as_str(),
                "Update has no event type, skipped"
            );
            stats.skipped += update.new_events.len() as u64;
            continue;
        };

        for record in &update.new_events {
            match runtime.send_record(event_type, record).await {
                Ok(()) => stats.forwarded += 1,
                Err(DispatchError::Disposed) => {
                    info!("Runtime disposed, forwarding stopped");
                    return stats;
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        statement_id = update.statement_id.as_str(),
                        event_type,
                        error = %e,
                        "Forwarding failed"
                    );
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_event_types_skips_blanks() {
        assert_eq!(
            parse_event_types(" acme.A, ,acme.B,,"),
            vec!["acme.A".to_string(), "acme.B".to_string()]
        );
        assert!(parse_event_types("").is_empty());
    }
}
