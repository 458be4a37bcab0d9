//! Lightweight cooperative tasks (§3 "Fiber") and the supervisor that
//! cascades termination over a keyed set of them (§3 "Supervisor").
//!
//! A [`Fiber`] is `{id, state: Active|Terminated, stateChange: stream}` in
//! the original. The Rust translation keeps the shape exactly: `state` is
//! a `tokio::sync::watch` cell (a single monotonic `Active -> Terminated`
//! transition, never reversed) and `stateChange` is the `watch::Receiver`
//! itself, which already behaves like a stream that completes (stops
//! changing) once `Terminated` is observed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// `Active`/`Terminated` lifecycle of a fiber (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    Active,
    Terminated,
}

impl FiberState {
    pub fn is_terminated(self) -> bool {
        matches!(self, FiberState::Terminated)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FiberError {
    #[error("supervisor is terminated, cannot observe new task {id}")]
    TerminatedError { id: String },
    #[error("task id {id} is already observed by this supervisor")]
    UniqueTaskIdError { id: String },
}

/// A named, independently terminable unit of work.
///
/// Agents, sessions, and sockets all implement `Task` so a [`Supervisor`]
/// can observe them uniformly without knowing their concrete type.
pub trait Task: Send + Sync {
    fn id(&self) -> &str;

    /// Request termination. Idempotent: terminating an already-terminated
    /// task is a no-op (§8 "Idempotent termination").
    fn terminate(&self);

    fn is_terminated(&self) -> bool;

    /// A receiver that observes the monotonic `Active -> Terminated`
    /// transition.
    fn subscribe(&self) -> watch::Receiver<FiberState>;
}

/// A bare fiber: `{id, state, stateChange}` (§3).
#[derive(Debug)]
pub struct Fiber {
    id: String,
    tx: watch::Sender<FiberState>,
}

impl Fiber {
    pub fn new(id: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(FiberState::Active);
        Self { id: id.into(), tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> FiberState {
        *self.tx.borrow()
    }

    pub fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    /// Transition to `Terminated`. A no-op if already terminated, since
    /// the transition is single and monotonic.
    pub fn terminate(&self) {
        if self.is_terminated() {
            return;
        }
        tracing::debug!(id = %self.id, "fiber terminated");
        // A send error means every receiver has dropped; the state is
        // still authoritative via `borrow`, but there is no one left to
        // notify, which is fine.
        let _ = self.tx.send(FiberState::Terminated);
    }

    pub fn subscribe(&self) -> watch::Receiver<FiberState> {
        self.tx.subscribe()
    }

    /// Resolves once this fiber reaches `Terminated` (including if it
    /// already has).
    pub async fn terminated(&self) {
        let mut rx = self.subscribe();
        while !rx.borrow().is_terminated() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Task for Fiber {
    fn id(&self) -> &str {
        Fiber::id(self)
    }

    fn terminate(&self) {
        Fiber::terminate(self)
    }

    fn is_terminated(&self) -> bool {
        Fiber::is_terminated(self)
    }

    fn subscribe(&self) -> watch::Receiver<FiberState> {
        Fiber::subscribe(self)
    }
}

/// A fiber that additionally owns a keyed set of observed tasks (§3
/// "Supervisor"). Observing a terminated task auto-removes it; terminating
/// the supervisor terminates every task it still holds, then transitions
/// itself.
pub struct Supervisor {
    fiber: Fiber,
    tasks: Arc<Mutex<HashMap<String, Arc<dyn Task>>>>,
    /// Latches `true` the first time `tasks` becomes non-empty. Per §9
    /// "Supervisor / auto-termination": a session must distinguish "never
    /// had tasks" from "had tasks and now empty" — comparing the count to
    /// zero naively would auto-terminate a session that hasn't spawned
    /// its first agent yet.
    ever_nonempty: Mutex<bool>,
    count_tx: watch::Sender<usize>,
}

impl Supervisor {
    pub fn new(id: impl Into<String>) -> Self {
        let (count_tx, _rx) = watch::channel(0);
        Self {
            fiber: Fiber::new(id),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            ever_nonempty: Mutex::new(false),
            count_tx,
        }
    }

    pub fn id(&self) -> &str {
        self.fiber.id()
    }

    pub fn is_terminated(&self) -> bool {
        self.fiber.is_terminated()
    }

    pub fn task_count(&self) -> usize {
        *self.count_tx.borrow()
    }

    /// Whether the task count has ever been positive. Combined with
    /// `task_count() == 0`, this is the latching condition for session
    /// auto-termination (§4.5, §8 "Session auto-termination").
    pub fn has_ever_had_tasks(&self) -> bool {
        *self.ever_nonempty.lock()
    }

    pub fn subscribe_task_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    pub fn subscribe(&self) -> watch::Receiver<FiberState> {
        self.fiber.subscribe()
    }

    /// Observe a task under the given id. Fails if the supervisor is
    /// already terminated, or if the id is already in use.
    ///
    /// Spawns a background watcher that removes the task from the set
    /// (and decrements the count) the moment it terminates, per §3
    /// "Observing a terminated fiber auto-removes it."
    pub fn observe(&self, task: Arc<dyn Task>) -> Result<(), FiberError> {
        if self.is_terminated() {
            return Err(FiberError::TerminatedError {
                id: task.id().to_string(),
            });
        }
        let id = task.id().to_string();
        {
            let mut tasks = self.tasks.lock();
            if tasks.contains_key(&id) {
                return Err(FiberError::UniqueTaskIdError { id });
            }
            tasks.insert(id.clone(), task.clone());
        }
        self.bump_count();

        let mut state_rx = task.subscribe();
        let tasks = self.tasks.clone();
        let count_tx = self.count_tx.clone();
        tokio::spawn(async move {
            loop {
                if state_rx.borrow().is_terminated() {
                    break;
                }
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
            if tasks.lock().remove(&id).is_some() {
                let n = count_tx.borrow().saturating_sub(1);
                let _ = count_tx.send(n);
                tracing::debug!(%id, "task auto-removed after termination");
            }
        });
        Ok(())
    }

    fn bump_count(&self) {
        let n = {
            let tasks = self.tasks.lock();
            tasks.len()
        };
        if n > 0 {
            *self.ever_nonempty.lock() = true;
        }
        let _ = self.count_tx.send(n);
    }

    /// Terminate every observed task, then transition the supervisor
    /// itself to `Terminated`. Idempotent.
    pub fn terminate(&self) {
        if self.is_terminated() {
            return;
        }
        let tasks: Vec<Arc<dyn Task>> = self.tasks.lock().values().cloned().collect();
        for task in tasks {
            task.terminate();
        }
        self.fiber.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct TestTask(Fiber);

    impl TestTask {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self(Fiber::new(id)))
        }
    }

    impl Task for TestTask {
        fn id(&self) -> &str {
            self.0.id()
        }
        fn terminate(&self) {
            self.0.terminate()
        }
        fn is_terminated(&self) -> bool {
            self.0.is_terminated()
        }
        fn subscribe(&self) -> watch::Receiver<FiberState> {
            self.0.subscribe()
        }
    }

    #[test]
    fn fiber_terminate_is_idempotent() {
        let f = Fiber::new("x");
        f.terminate();
        f.terminate();
        assert!(f.is_terminated());
    }

    #[tokio::test]
    async fn observing_a_terminated_task_auto_removes_it() {
        let sup = Supervisor::new("sup");
        let t = TestTask::new("a");
        sup.observe(t.clone()).unwrap();
        assert_eq!(sup.task_count(), 1);
        assert!(sup.has_ever_had_tasks());

        t.terminate();
        // give the watcher task a turn
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sup.task_count(), 0);
        assert!(sup.has_ever_had_tasks());
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let sup = Supervisor::new("sup");
        sup.observe(TestTask::new("dup")).unwrap();
        let err = sup.observe(TestTask::new("dup")).unwrap_err();
        assert!(matches!(err, FiberError::UniqueTaskIdError { .. }));
    }

    #[test]
    fn terminated_supervisor_rejects_new_observations() {
        let sup = Supervisor::new("sup");
        sup.terminate();
        let err = sup.observe(TestTask::new("late")).unwrap_err();
        assert!(matches!(err, FiberError::TerminatedError { .. }));
    }

    #[test]
    fn terminate_cascades_to_tasks() {
        let sup = Supervisor::new("sup");
        let t = TestTask::new("child");
        sup.observe(t.clone()).unwrap();
        sup.terminate();
        assert!(t.is_terminated());
        assert!(sup.is_terminated());
    }

    #[test]
    fn terminate_twice_is_idempotent() {
        let sup = Supervisor::new("sup");
        sup.terminate();
        sup.terminate();
        assert!(sup.is_terminated());
    }
}
