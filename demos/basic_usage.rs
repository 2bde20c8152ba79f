// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic local-state usage example.
//!
//! Demonstrates:
//! 1. Opening a JSON file backend in a temporary directory
//! 2. Loading the synchronous engine and watching the loading signal
//! 3. Optimistic writes, awaited and detached
//! 4. A watched projection with derived setter names
//! 5. The asynchronous engine over the same file
//! 6. Displaying the captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Instant;

use local_state::{AsyncState, JsonFileBackend, Projection, StateKey, SyncState};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

const VOLUME: StateKey<u8> = StateKey::new("volume");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           local-state: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Backend
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"theme": "dark", "volume": 4}"#)?;
    println!("📦 Backend file: {}", path.display());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Load the sync engine
    // ─────────────────────────────────────────────────────────────────────────
    let state = Arc::new(SyncState::new(Arc::new(JsonFileBackend::new(&path))));
    state.subscribe_loading(|loading| println!("   └─ loading: {}", loading));

    println!("\n🚀 Loading cache... (state: {})", state.load_state());
    state.load(false).await?;
    println!("   ✅ State: {}, {} keys cached", state.load_state(), state.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Optimistic writes
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Writing...");
    state.subscribe("theme", |value| println!("   └─ theme changed → {:?}", value));

    let start = Instant::now();
    let pending = state.set("theme", json!("light"));
    println!("   ⚡ Visible after {:?}: {:?}", start.elapsed(), state.get("theme"));
    pending.await?;
    println!("   ✅ Persisted after {:?}", start.elapsed());

    state.set_typed(&VOLUME, &7)?.detach().await??;
    println!("   ✅ volume (typed) = {:?}", state.get_typed(&VOLUME)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Watched projection
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔗 Projection over [theme, volume, muted]...");
    let watched = Projection::new(state.clone(), &["theme", "volume", "muted"])?.watch();
    watched
        .setter("setMuted")
        .ok_or("setter not derived")?
        .set(json!(true))
        .await?;
    let mut snapshot: Vec<_> = watched.snapshot().into_iter().collect();
    snapshot.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in snapshot {
        println!("   └─ {} = {:?}", key, value);
    }
    println!("   └─ generation: {}", *watched.changes().borrow());
    drop(watched);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Async engine over the same file
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading back through the async engine...");
    let reader = AsyncState::new(Arc::new(JsonFileBackend::new(&path)));
    let values = reader.multi_get(&["theme", "volume", "muted", "missing"]).await?;
    let mut values: Vec<_> = values.into_iter().collect();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in values {
        println!("   └─ {} → {:?}", key, value);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Print every captured metric, sorted by name.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{}", v),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.4}", samples.len(), sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
