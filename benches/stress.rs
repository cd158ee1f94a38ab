//! In-process stress run: spins up one engine over a throwaway journal
//! and hammers it with concurrent hold/book/cancel traffic plus readers.
//! Run with `cargo bench`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use ulid::Ulid;

use seatgrid::engine::{CanceledBy, Engine};
use seatgrid::{EngineConfig, LogSink, Span, SystemClock};

const WORKERS: usize = 16;
const OPS_PER_WORKER: usize = 250;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn bench_journal_path() -> PathBuf {
    let dir = std::env::temp_dir().join("seatgrid_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("stress_{}.journal", Ulid::new()));
    let _ = std::fs::remove_file(&path);
    path
}

/// One coworking, four workspaces of five seats each, two weeks of slots.
async fn setup(engine: &Engine) -> Vec<Ulid> {
    let open = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let close = NaiveTime::from_hms_opt(21, 0, 0).unwrap();
    let cw = engine
        .create_coworking("Bench".into(), "0 Loop Rd".into(), "UTC".into(), open, close)
        .await
        .unwrap();

    let mut slot_ids = Vec::new();
    for w in 0..4 {
        let ws = engine
            .create_workspace(
                cw.id,
                format!("W{w}"),
                5,
                Decimal::new(400 + w as i64 * 50, 0),
                None,
            )
            .await
            .unwrap();
        for s in 0..5 {
            engine.create_seat(ws.id, format!("S{s}")).await.unwrap();
        }
        engine
            .generate_slots(
                ws.id,
                NaiveDate::from_ymd_opt(2030, 6, 3).unwrap(),
                NaiveDate::from_ymd_opt(2030, 6, 14).unwrap(),
                None,
                None,
                60,
            )
            .await
            .unwrap();

        let window = Span::new(
            NaiveDate::from_ymd_opt(2030, 6, 1)
                .unwrap()
                .and_time(NaiveTime::MIN)
                .and_utc()
                .timestamp_millis(),
            NaiveDate::from_ymd_opt(2030, 6, 20)
                .unwrap()
                .and_time(NaiveTime::MIN)
                .and_utc()
                .timestamp_millis(),
        );
        for info in engine
            .open_slots_for_workspace(ws.id, window, None)
            .await
            .unwrap()
        {
            slot_ids.push(info.slot_id);
        }
    }
    slot_ids
}

/// Each worker walks its own stripe of slots: hold, book, cancel, repeat.
async fn churn_worker(
    engine: Arc<Engine>,
    slot_ids: Arc<Vec<Ulid>>,
    worker: usize,
) -> Vec<Duration> {
    let user = Ulid::new();
    let mut latencies = Vec::with_capacity(OPS_PER_WORKER);
    for i in 0..OPS_PER_WORKER {
        // Deterministic stripe with a prime stride so workers collide
        // on some slots and race for them.
        let slot = slot_ids[(worker * 7 + i * 13) % slot_ids.len()];
        let start = Instant::now();
        if let Ok(_expires) = engine.hold_slot(user, slot).await {
            match engine.confirm_booking(user, slot, None).await {
                Ok(booking) => {
                    engine
                        .cancel_booking(booking.id, CanceledBy::Admin, None)
                        .await
                        .expect("cancel failed");
                }
                Err(e) => panic!("confirm after hold failed: {e}"),
            }
        }
        latencies.push(start.elapsed());
    }
    latencies
}

async fn reader_worker(engine: Arc<Engine>, slot_ids: Arc<Vec<Ulid>>) -> Vec<Duration> {
    let mut latencies = Vec::with_capacity(OPS_PER_WORKER);
    for i in 0..OPS_PER_WORKER {
        let slot = slot_ids[(i * 31) % slot_ids.len()];
        let start = Instant::now();
        engine.is_slot_available(slot).await.expect("query failed");
        latencies.push(start.elapsed());
    }
    latencies
}

#[tokio::main]
async fn main() {
    let engine = Arc::new(
        Engine::new(
            bench_journal_path(),
            EngineConfig::default(),
            Arc::new(SystemClock),
            Arc::new(LogSink),
        )
        .unwrap(),
    );

    let slot_ids = Arc::new(setup(&engine).await);
    println!(
        "stress: {WORKERS} writers + {WORKERS} readers over {} slots",
        slot_ids.len()
    );

    let started = Instant::now();
    let mut writers = Vec::new();
    let mut readers = Vec::new();
    for w in 0..WORKERS {
        writers.push(tokio::spawn(churn_worker(
            engine.clone(),
            slot_ids.clone(),
            w,
        )));
        readers.push(tokio::spawn(reader_worker(engine.clone(), slot_ids.clone())));
    }

    let mut write_lat = Vec::new();
    for h in writers {
        write_lat.extend(h.await.unwrap());
    }
    let mut read_lat = Vec::new();
    for h in readers {
        read_lat.extend(h.await.unwrap());
    }
    let elapsed = started.elapsed();

    let ops = write_lat.len() + read_lat.len();
    println!(
        "completed {ops} ops in {:.2}s ({:.0} ops/s)",
        elapsed.as_secs_f64(),
        ops as f64 / elapsed.as_secs_f64()
    );
    print_latency("hold/book/cancel cycle", &mut write_lat);
    print_latency("availability check", &mut read_lat);

    engine.compact_journal().await.unwrap();
    println!("journal compacted");
}
