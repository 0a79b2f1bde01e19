//! Durable one-shot timer registry
//!
//! Every "do X after N seconds" behavior in the system goes through this
//! registry. A task is persisted to the key/value store before an in-process
//! timer is armed, so liveness derives entirely from storage: after a
//! restart, `initialize` re-arms pending tasks and immediately dispatches
//! overdue ones ("fires at least once after restart, never before due").
//!
//! Cancellation is race-safe by re-validation: cancel deletes the persisted
//! record, and an in-flight timer re-reads the record on expiry and treats
//! an absent (or superseded) record as a no-op.

use crate::error::Result;
use crate::store::{task_key, KvStore, TypedStore, TASK_PREFIX};
use futures::future::BoxFuture;
use roomcast_common::time::epoch_seconds;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Delays below this are "already due"; callers act synchronously instead of
/// arming a timer, avoiding sub-second timer storms at expiry boundaries
pub const NEAR_DUE_SECONDS: f64 = 0.3;

// Two fire_at values within this are the same scheduling generation
const FIRE_AT_EPSILON: f64 = 1e-6;

/// Kinds of scheduled work; one handler per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Track-end: advance the room's playback
    CutMusic,
    /// Delayed room destruction
    DestroyRoom,
    /// Routine: periodic room summary to all members
    BroadcastBaseInfo,
    /// Routine: online-user digest to room admins
    DispatchOnlineUsers,
    /// Routine: destroy the room if its creator went offline
    CheckCreatorOnline,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::CutMusic => write!(f, "cut_music"),
            TaskKind::DestroyRoom => write!(f, "destroy_room"),
            TaskKind::BroadcastBaseInfo => write!(f, "broadcast_base_info"),
            TaskKind::DispatchOnlineUsers => write!(f, "dispatch_online_users"),
            TaskKind::CheckCreatorOnline => write!(f, "check_creator_online"),
        }
    }
}

/// A persisted one-shot task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub kind: TaskKind,
    /// Due time, fractional epoch seconds
    pub fire_at: f64,
    pub payload: Value,
}

/// What the registry does with the record after a handler returns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rearm {
    /// One-shot complete: delete the record
    Done,
    /// Recur: move this record's due time to now + seconds and re-arm.
    /// The task id stays stable, so side pointers remain valid, and the
    /// period drifts by execution time rather than wall clock.
    After(f64),
    /// Leave the record untouched; the handler manages follow-up itself
    Keep,
}

/// Handler invoked when a task of a given kind fires
pub type TaskHandler = Arc<dyn Fn(ScheduledTask) -> BoxFuture<'static, Result<Rearm>> + Send + Sync>;

/// Wrap an async fn/closure as a [`TaskHandler`]
pub fn handler<F, Fut>(f: F) -> TaskHandler
where
    F: Fn(ScheduledTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Rearm>> + Send + 'static,
{
    Arc::new(move |task| Box::pin(f(task)))
}

struct RegistryInner {
    handlers: HashMap<TaskKind, TaskHandler>,
    /// Tasks that fired before any handler was subscribed for their kind
    buffered: HashMap<TaskKind, Vec<ScheduledTask>>,
}

/// Persisted, restart-safe one-shot scheduler
pub struct TimerRegistry {
    store: Arc<dyn KvStore>,
    inner: Mutex<RegistryInner>,
}

impl TimerRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            inner: Mutex::new(RegistryInner {
                handlers: HashMap::new(),
                buffered: HashMap::new(),
            }),
        })
    }

    /// Persist a task, then arm an in-process timer for it
    pub async fn schedule(
        self: &Arc<Self>,
        kind: TaskKind,
        payload: Value,
        delay_seconds: f64,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let fire_at = epoch_seconds() + delay_seconds.max(0.0);
        let task = ScheduledTask {
            id,
            kind,
            fire_at,
            payload,
        };
        TypedStore::put(&self.store, &task_key(id), &task).await?;
        self.arm(id, fire_at);
        debug!("Scheduled {} task {} in {:.3}s", kind, id, delay_seconds);
        Ok(id)
    }

    /// Delete the persisted record; an in-flight timer becomes a no-op
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        self.store.delete(&task_key(id)).await?;
        debug!("Canceled task {}", id);
        Ok(())
    }

    /// Register the handler for a kind; last registration wins. Tasks of
    /// this kind that fired earlier are flushed to the new handler.
    pub fn subscribe(self: &Arc<Self>, kind: TaskKind, handler: TaskHandler) {
        let backlog = {
            let mut inner = self.inner.lock().unwrap();
            inner.handlers.insert(kind, handler);
            inner.buffered.remove(&kind).unwrap_or_default()
        };
        for task in backlog {
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                registry.dispatch(task).await;
            });
        }
    }

    /// Scan all persisted tasks: dispatch the overdue ones immediately,
    /// re-arm the rest for their remaining delay. Must run once at process
    /// start before any timer is considered live.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        let ids = self.store.list_ids(TASK_PREFIX).await?;
        let now = epoch_seconds();
        let mut overdue = 0usize;
        let mut armed = 0usize;

        for id in ids {
            let Some(task) = TypedStore::get::<ScheduledTask>(&self.store, &id).await? else {
                continue;
            };
            if task.fire_at <= now {
                overdue += 1;
                self.dispatch(task).await;
            } else {
                armed += 1;
                self.arm(task.id, task.fire_at);
            }
        }

        info!(
            "Timer registry initialized: {} overdue dispatched, {} re-armed",
            overdue, armed
        );
        Ok(())
    }

    /// Spawn the in-process timer for a task.
    ///
    /// The timer captures the fire_at it was armed with; if the record has
    /// been rescheduled by the time it elapses, this timer is stale.
    fn arm(self: &Arc<Self>, id: Uuid, fire_at: f64) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let delay = (fire_at - epoch_seconds()).max(0.0);
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            registry.fire(id, fire_at).await;
        });
    }

    /// Re-validate against storage, then dispatch
    async fn fire(self: &Arc<Self>, id: Uuid, armed_fire_at: f64) {
        let task = match TypedStore::get::<ScheduledTask>(&self.store, &task_key(id)).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("Task {} fired after cancel; ignoring", id);
                return;
            }
            Err(e) => {
                error!("Failed to re-read task {} at fire time: {}", id, e);
                return;
            }
        };

        if (task.fire_at - armed_fire_at).abs() > FIRE_AT_EPSILON {
            debug!("Task {} was rescheduled; stale timer ignored", id);
            return;
        }

        self.dispatch(task).await;
    }

    /// Hand the task to its subscriber and apply the rearm decision.
    /// Handler errors are terminal here: logged, record left in place so the
    /// task re-fires on the next restart.
    async fn dispatch(self: &Arc<Self>, task: ScheduledTask) {
        let handler = {
            let mut inner = self.inner.lock().unwrap();
            match inner.handlers.get(&task.kind) {
                Some(h) => Arc::clone(h),
                None => {
                    debug!("No handler for {} yet; buffering task {}", task.kind, task.id);
                    inner.buffered.entry(task.kind).or_default().push(task);
                    return;
                }
            }
        };

        let id = task.id;
        let kind = task.kind;
        match handler(task.clone()).await {
            Err(e) => {
                error!("Handler for {} task {} failed: {}", kind, id, e);
            }
            Ok(Rearm::Keep) => {}
            Ok(Rearm::Done) => {
                if let Err(e) = self.cancel(id).await {
                    error!("Failed to clear completed task {}: {}", id, e);
                }
            }
            Ok(Rearm::After(seconds)) => {
                let fire_at = epoch_seconds() + seconds.max(0.0);
                let next = ScheduledTask { fire_at, ..task };
                match TypedStore::put(&self.store, &task_key(id), &next).await {
                    Ok(()) => self.arm(id, fire_at),
                    Err(e) => error!("Failed to reschedule task {}: {}", id, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_registry() -> Arc<TimerRegistry> {
        TimerRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_fire_dispatches_payload_once() {
        let registry = memory_registry();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        registry.subscribe(
            TaskKind::CutMusic,
            handler(move |task| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(task.payload);
                    Ok(Rearm::Done)
                }
            }),
        );

        let id = registry
            .schedule(TaskKind::CutMusic, json!({"track": "t1"}), 0.05)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["track"], "t1");
        drop(seen);

        // Done removed the record
        assert!(registry.store.get(&task_key(id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keep_leaves_record_in_place() {
        let registry = memory_registry();
        registry.subscribe(
            TaskKind::DestroyRoom,
            handler(|_| async { Ok(Rearm::Keep) }),
        );

        let id = registry
            .schedule(TaskKind::DestroyRoom, json!({}), 0.05)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Firing is a notification, not a consumption
        assert!(registry.store.get(&task_key(id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_before_fire_suppresses_handler() {
        let registry = memory_registry();
        let fired = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&fired);
        registry.subscribe(
            TaskKind::CutMusic,
            handler(move |_| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(Rearm::Done)
                }
            }),
        );

        let id = registry
            .schedule(TaskKind::CutMusic, json!({}), 0.1)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.cancel(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tasks_fired_before_subscribe_are_buffered() {
        let registry = memory_registry();

        registry
            .schedule(TaskKind::BroadcastBaseInfo, json!({"n": 1}), 0.02)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.subscribe(
            TaskKind::BroadcastBaseInfo,
            handler(move |task| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(task.payload);
                    Ok(Rearm::Done)
                }
            }),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["n"], 1);
    }

    #[tokio::test]
    async fn test_rearm_after_chains_with_stable_id() {
        let registry = memory_registry();
        let fired = Arc::new(AtomicUsize::new(0));

        let count = Arc::clone(&fired);
        registry.subscribe(
            TaskKind::DispatchOnlineUsers,
            handler(move |_| {
                let count = Arc::clone(&count);
                async move {
                    let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Ok(Rearm::After(0.03))
                    } else {
                        Ok(Rearm::Done)
                    }
                }
            }),
        );

        let id = registry
            .schedule(TaskKind::DispatchOnlineUsers, json!({}), 0.03)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(registry.store.get(&task_key(id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_handler_error_is_isolated_and_leaves_record() {
        let registry = memory_registry();
        let good_fired = Arc::new(AtomicUsize::new(0));

        registry.subscribe(
            TaskKind::CutMusic,
            handler(|_| async { Err(crate::error::Error::Provider("upstream down".into())) }),
        );
        let count = Arc::clone(&good_fired);
        registry.subscribe(
            TaskKind::DestroyRoom,
            handler(move |_| {
                let count = Arc::clone(&count);
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(Rearm::Done)
                }
            }),
        );

        let bad = registry
            .schedule(TaskKind::CutMusic, json!({}), 0.02)
            .await
            .unwrap();
        registry
            .schedule(TaskKind::DestroyRoom, json!({}), 0.04)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // The failing handler never prevented the other task from firing,
        // and its record stays for the next restart to retry
        assert_eq!(good_fired.load(Ordering::SeqCst), 1);
        assert!(registry.store.get(&task_key(bad)).await.unwrap().is_some());
    }
}
