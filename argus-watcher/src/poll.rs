//! The polling task: snapshot the watched-files map, re-stat each entry,
//! and publish change events into the ring. Fans out across a tiered
//! concurrency model driven purely by how many files are currently
//! watched (spec section 4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus_core::{ArgusError, FileStat, StatCache};
use argus_ring::EventRing;
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::debug;

use crate::config::ErrorHandler;
use crate::watcher::WatchEntry;

pub(crate) struct PollContext {
    pub files: Arc<DashMap<String, WatchEntry>>,
    pub stat_cache: Arc<StatCache>,
    pub ring: Arc<EventRing>,
    pub error_handler: Option<ErrorHandler>,
}

const WORKER_POOL_SIZE: usize = 8;
const INLINE_THRESHOLD: usize = 1;
const FAN_OUT_THRESHOLD: usize = 8;

pub(crate) async fn run(
    poll_interval: Duration,
    ctx: Arc<PollContext>,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_signal.notified() => break,
        }

        if !running.load(Ordering::Acquire) {
            break;
        }

        let snapshot: Vec<(String, FileStat)> = ctx
            .files
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().file.last_stat))
            .collect();

        run_tiered_check(snapshot, &ctx).await;
    }
}

async fn run_tiered_check(snapshot: Vec<(String, FileStat)>, ctx: &Arc<PollContext>) {
    match snapshot.len() {
        0 => {}
        n if n <= INLINE_THRESHOLD => {
            for item in snapshot {
                check_one(item, ctx).await;
            }
        }
        n if n <= FAN_OUT_THRESHOLD => {
            let mut set = tokio::task::JoinSet::new();
            for item in snapshot {
                let ctx = Arc::clone(ctx);
                set.spawn(async move { check_one(item, &ctx).await });
            }
            while set.join_next().await.is_some() {}
        }
        _ => run_via_worker_pool(snapshot, ctx).await,
    }
}

async fn run_via_worker_pool(snapshot: Vec<(String, FileStat)>, ctx: &Arc<PollContext>) {
    let (tx, rx) = tokio::sync::mpsc::channel::<(String, FileStat)>(snapshot.len().max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut workers = Vec::with_capacity(WORKER_POOL_SIZE);
    for _ in 0..WORKER_POOL_SIZE {
        let rx = Arc::clone(&rx);
        let ctx = Arc::clone(ctx);
        workers.push(tokio::spawn(async move {
            loop {
                let item = { rx.lock().await.recv().await };
                match item {
                    Some(item) => check_one(item, &ctx).await,
                    None => break,
                }
            }
        }));
    }

    for item in snapshot {
        if tx.send(item).await.is_err() {
            break;
        }
    }
    drop(tx);

    for worker in workers {
        let _ = worker.await;
    }
}

async fn check_one(item: (String, FileStat), ctx: &PollContext) {
    let (path, previous) = item;

    let fresh = match ctx.stat_cache.refresh(&path) {
        Ok(stat) => stat,
        Err(io_err) => {
            debug!(path = %path, error = %io_err, "stat failed for watched file");
            if let Some(handler) = &ctx.error_handler {
                handler(&ArgusError::file_not_found(path.clone(), io_err.to_string()), &path);
            }
            return;
        }
    };

    // The file may have been unwatched between the snapshot and this
    // check; only update state and emit events while it's still present.
    let Some(mut entry) = ctx.files.get_mut(&path) else {
        return;
    };
    entry.file.last_stat = fresh;
    drop(entry);

    let (is_create, is_delete, is_modify) = match (previous.exists, fresh.exists) {
        (true, false) => (false, true, false),
        (false, true) => (true, false, false),
        (true, true)
            if fresh.mod_time_ns != previous.mod_time_ns || fresh.size != previous.size =>
        {
            (false, false, true)
        }
        _ => return,
    };

    ctx.ring
        .write_change(&path, fresh.mod_time_ns, fresh.size, is_create, is_delete, is_modify);
}
