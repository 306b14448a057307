use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ordered_dispatch::{load_config, DispatchConfig, Handler, Scheduler, SharedHandler};

const KEYS: usize = 8;
const EVENTS_PER_KEY: u64 = 1_000;

#[derive(Debug, Clone)]
struct SequencedEvent {
    stream: Uuid,
    seq: u64,
}

/// Flags any event that arrives out of order for its stream.
struct SequenceCheck {
    last_seen: Mutex<HashMap<Uuid, u64>>,
    violations: AtomicU64,
}

impl Handler<SequencedEvent> for SequenceCheck {
    fn name(&self) -> &str {
        "sequence-check"
    }

    fn handle(&self, event: &SequencedEvent, _asynchronous: bool) -> Result<()> {
        let mut last_seen = self
            .last_seen
            .lock()
            .map_err(|_| anyhow::anyhow!("sequence table poisoned"))?;
        let expected = last_seen.get(&event.stream).map_or(0, |n| n + 1);
        if event.seq != expected {
            self.violations.fetch_add(1, Ordering::Relaxed);
            warn!(stream = %event.stream, expected, got = event.seq, "Out-of-order delivery");
        }
        last_seen.insert(event.stream, event.seq);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ordered_dispatch=info".parse()?))
        .init();

    let config = match std::env::var("DISPATCH_CONFIG") {
        Ok(path) => load_config(&PathBuf::from(path))?,
        Err(_) => DispatchConfig::from_env()?,
    };
    info!(?config, "Ordered dispatch load run starting");

    let checker = Arc::new(SequenceCheck {
        last_seen: Mutex::new(HashMap::new()),
        violations: AtomicU64::new(0),
    });
    let handlers: Vec<SharedHandler<SequencedEvent>> = vec![checker.clone()];

    let scheduler: Scheduler<Uuid, SharedHandler<SequencedEvent>, SequencedEvent> =
        Scheduler::from_parts(
            Arc::new(config.build_executor()),
            config.build_pool(Handle::current()),
        );

    let streams: Vec<Uuid> = (0..KEYS).map(|_| Uuid::new_v4()).collect();
    let started = Instant::now();

    let producers: Vec<_> = streams
        .iter()
        .map(|&stream| {
            let scheduler = scheduler.clone();
            let handlers = handlers.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                for seq in 0..EVENTS_PER_KEY {
                    scheduler
                        .submit(stream, handlers.clone(), SequencedEvent { stream, seq })
                        .with_context(|| format!("submit failed for stream {stream}"))?;
                }
                Ok(())
            })
        })
        .collect();

    for producer in producers {
        producer.await??;
    }

    let expected = KEYS as u64 * EVENTS_PER_KEY;
    while scheduler.snapshot().delivered_count < expected {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let snapshot = scheduler.snapshot();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        violations = checker.violations.load(Ordering::Relaxed),
        "Load run complete"
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
