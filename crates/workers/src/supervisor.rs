//! The worker lifecycle supervisor.
//!
//! One slot per role, fixed at construction. Each worker moves through
//! `idle -> running -> crashed -> restarting -> running`, with `failed` as
//! the terminal state once the restart budget is exhausted. Spawn and crash
//! paths hold separate keyed locks, so a command-initiated start never
//! deadlocks against an asynchronously reported crash.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use deskhive_core::{
    ChatMessage, ClientError, ConversationWindow, DomainEvent, EventBus, RoleProfile,
    WorkerClient, WorkerClientFactory, WorkerError, WorkerRole, WorkerStatus,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::lock::KeyedLock;

const DEFAULT_HISTORY_WINDOW: usize = 10;
const DEFAULT_MAX_MESSAGE_LEN: usize = 65_536;
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Backoff policy for automatic worker restarts.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Consecutive failures tolerated before a worker is marked failed.
    pub max_attempts: u32,
    /// Delay before the first restart; doubles on every repeat failure.
    pub base_delay: Duration,
    /// Ceiling on the escalated delay.
    pub max_delay: Duration,
    /// A worker that runs this long without crashing counts as healthy
    /// again and its failure streak is forgotten.
    pub cooldown: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            cooldown: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart attempt number `attempts`.
    fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Mutable per-worker state, guarded by the slot mutex.
struct WorkerState {
    status: WorkerStatus,
    restart_attempts: u32,
    /// Set when a (re)start succeeds. Drives the cooldown check.
    last_restart_at: Option<Instant>,
    /// Sliding window of the most recent messages, oldest dropped first.
    conversation: ConversationWindow,
    /// Exclusively owned remote handle; None unless running.
    client: Option<Arc<dyn WorkerClient>>,
}

/// One arena entry per configured role.
struct WorkerSlot {
    profile: RoleProfile,
    state: Mutex<WorkerState>,
}

/// Supervises the fixed set of conversational workers.
///
/// All lifecycle state lives in this instance: the slot arena, both lock
/// maps, the restart queue and the pending timers. Nothing is shared across
/// independent supervisors.
pub struct WorkerSupervisor {
    workers: HashMap<WorkerRole, WorkerSlot>,
    /// None when no API credential is configured; starting then fails
    /// with `NoCredential` instead of failing construction.
    factory: Option<Arc<dyn WorkerClientFactory>>,
    events: Arc<EventBus>,
    restart: RestartPolicy,
    history_window: usize,
    max_message_len: usize,
    /// Serializes the start path per role.
    spawn_locks: KeyedLock<WorkerRole>,
    /// Serializes crash handling per role, independent of the spawn lock.
    crash_locks: KeyedLock<WorkerRole>,
    /// Roles with a restart scheduled but not yet fired.
    restart_queue: StdMutex<HashSet<WorkerRole>>,
    /// Live restart timers, aborted at shutdown.
    pending_restarts: StdMutex<HashMap<WorkerRole, JoinHandle<()>>>,
}

impl WorkerSupervisor {
    /// Create a supervisor with one idle slot per role and built-in
    /// profiles. Pass `None` as factory when no credential is configured.
    pub fn new(factory: Option<Arc<dyn WorkerClientFactory>>, events: Arc<EventBus>) -> Self {
        let workers = WorkerRole::all()
            .into_iter()
            .map(|role| {
                let slot = WorkerSlot {
                    profile: RoleProfile {
                        display_name: role.display_name().to_string(),
                        seed_prompt: role.default_seed_prompt().to_string(),
                        model_id: DEFAULT_MODEL.to_string(),
                    },
                    state: Mutex::new(WorkerState {
                        status: WorkerStatus::Idle,
                        restart_attempts: 0,
                        last_restart_at: None,
                        conversation: ConversationWindow::new(DEFAULT_HISTORY_WINDOW),
                        client: None,
                    }),
                };
                (role, slot)
            })
            .collect();

        Self {
            workers,
            factory,
            events,
            restart: RestartPolicy::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            spawn_locks: KeyedLock::new(),
            crash_locks: KeyedLock::new(),
            restart_queue: StdMutex::new(HashSet::new()),
            pending_restarts: StdMutex::new(HashMap::new()),
        }
    }

    /// Replace the restart policy.
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    /// Set how many conversation messages each worker keeps.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Set the maximum accepted message length, in characters.
    pub fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_message_len = max;
        self
    }

    /// Override the resolved profile for one role.
    pub fn with_profile(mut self, role: WorkerRole, profile: RoleProfile) -> Self {
        if let Some(slot) = self.workers.get_mut(&role) {
            slot.profile = profile;
        }
        self
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    /// Bring a worker to `running`. Idempotent: returns immediately when it
    /// already is. Construction failures are routed into the crash handler
    /// (which schedules a retry) and reported as `Unavailable`.
    pub async fn ensure_started(self: &Arc<Self>, role: WorkerRole) -> Result<(), WorkerError> {
        let slot = self.slot(role)?;
        let _guard = self.spawn_locks.acquire(role).await;

        // Re-check under the lock: a concurrent caller may have won the race
        if slot.state.lock().await.status == WorkerStatus::Running {
            return Ok(());
        }

        let Some(factory) = &self.factory else {
            return Err(WorkerError::NoCredential);
        };

        match factory.create(role) {
            Ok(client) => {
                let mut state = slot.state.lock().await;
                if let Some(last) = state.last_restart_at {
                    if last.elapsed() >= self.restart.cooldown {
                        state.restart_attempts = 0;
                    }
                }
                let mut conversation = ConversationWindow::new(self.history_window);
                conversation.push(ChatMessage::system(slot.profile.seed_prompt.clone()));
                state.conversation = conversation;
                state.client = Some(client);
                state.status = WorkerStatus::Running;
                state.last_restart_at = Some(Instant::now());
                drop(state);

                info!(role = %role, model = %slot.profile.model_id, "Worker started");
                self.events.publish(DomainEvent::WorkerStarted {
                    role,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(role = %role, error = %e, "Worker client construction failed");
                self.handle_crash(role).await;
                Err(WorkerError::Unavailable { role })
            }
        }
    }

    /// Boxed indirection for the restart timer. `ensure_started` and
    /// `handle_crash` are mutually recursive through the spawned timer
    /// task; a nameable `Send` future breaks the trait-inference cycle.
    fn ensure_started_boxed(
        self: Arc<Self>,
        role: WorkerRole,
    ) -> Pin<Box<dyn Future<Output = Result<(), WorkerError>> + Send>> {
        Box::pin(async move { self.ensure_started(role).await })
    }

    /// Send a message to a worker and return its reply.
    ///
    /// Starts the worker first when it is not running. The user message and
    /// the reply both enter the sliding window; the remote call itself runs
    /// without holding the worker's state lock.
    pub async fn send(
        self: &Arc<Self>,
        role: WorkerRole,
        message: impl Into<String>,
    ) -> Result<String, WorkerError> {
        let message = message.into();
        let len = message.chars().count();
        if len > self.max_message_len {
            return Err(WorkerError::MessageTooLong {
                len,
                max: self.max_message_len,
            });
        }
        let slot = self.slot(role)?;

        let running = slot.state.lock().await.status == WorkerStatus::Running;
        if !running {
            self.ensure_started(role).await?;
        }

        let (client, window) = {
            let mut state = slot.state.lock().await;
            if state.status != WorkerStatus::Running {
                return Err(WorkerError::Unavailable { role });
            }
            let Some(client) = state.client.clone() else {
                return Err(WorkerError::Unavailable { role });
            };
            state.conversation.push(ChatMessage::user(message));
            (client, state.conversation.messages())
        };

        debug!(role = %role, window = window.len(), "Dispatching to remote worker");
        match client
            .send_conversation(&slot.profile.model_id, &window)
            .await
        {
            Ok(reply) => {
                let mut state = slot.state.lock().await;
                state.conversation.push(ChatMessage::assistant(reply.clone()));
                drop(state);
                self.events.publish(DomainEvent::WorkerOutput {
                    role,
                    text: reply.clone(),
                    timestamp: Utc::now(),
                });
                Ok(reply)
            }
            // The remote rejected the configured model: a configuration
            // problem, not a worker failure
            Err(ClientError::ModelNotFound(model)) => Err(WorkerError::InvalidModel(model)),
            Err(e) => {
                self.events.publish(DomainEvent::WorkerError {
                    role,
                    message: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.handle_crash(role).await;
                Err(WorkerError::RequestFailed {
                    role,
                    reason: e.to_string(),
                })
            }
        }
    }

    // ── Crash handling ────────────────────────────────────────────────

    /// React to a worker failure: escalate the failure streak, then either
    /// give up (`failed`, after `max_attempts` rapid failures) or schedule a
    /// delayed restart. At most one restart is ever pending per role; the
    /// role leaves the queue only when the scheduled attempt fires, so
    /// repeat crash reports during the delay window are no-ops.
    pub async fn handle_crash(self: &Arc<Self>, role: WorkerRole) {
        let Ok(slot) = self.slot(role) else {
            return;
        };
        let _guard = self.crash_locks.acquire(role).await;

        {
            let queue = self.restart_queue.lock().unwrap();
            if queue.contains(&role) {
                debug!(role = %role, "Restart already queued, ignoring crash report");
                return;
            }
        }

        let (attempts, delay) = {
            let mut state = slot.state.lock().await;
            if state.status == WorkerStatus::Failed {
                return;
            }
            state.status = WorkerStatus::Crashed;
            state.client = None;

            // A worker that survived past the cooldown is healthy again;
            // one that never started has no healthy period to credit
            let healthy = state
                .last_restart_at
                .map(|at| at.elapsed() >= self.restart.cooldown)
                .unwrap_or(false);
            if healthy {
                state.restart_attempts = 0;
            } else {
                state.restart_attempts += 1;
            }
            let attempts = state.restart_attempts;

            if attempts >= self.restart.max_attempts {
                state.status = WorkerStatus::Failed;
                drop(state);
                warn!(role = %role, attempts, "Worker restart budget exhausted");
                self.events.publish(DomainEvent::WorkerPermanentlyFailed {
                    role,
                    attempts,
                    timestamp: Utc::now(),
                });
                return;
            }

            state.status = WorkerStatus::Restarting;
            (attempts, self.restart.delay_for(attempts))
        };

        self.restart_queue.lock().unwrap().insert(role);
        info!(
            role = %role,
            attempts,
            delay_ms = delay.as_millis() as u64,
            "Worker restart scheduled"
        );

        let sup = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The attempt fires now; later crash reports may queue again
            sup.restart_queue.lock().unwrap().remove(&role);
            if let Err(e) = sup.ensure_started_boxed(role).await {
                warn!(role = %role, error = %e, "Scheduled restart failed");
            }
        });
        self.pending_restarts.lock().unwrap().insert(role, timer);
    }

    /// Stop everything: cancel pending restart timers, clear the restart
    /// queue, release every client handle and conversation, and return all
    /// workers to `idle`. Safe to call repeatedly and from any state.
    pub async fn shutdown(&self) {
        let timers: Vec<JoinHandle<()>> = {
            let mut pending = self.pending_restarts.lock().unwrap();
            pending.drain().map(|(_, handle)| handle).collect()
        };
        for timer in timers {
            timer.abort();
        }
        self.restart_queue.lock().unwrap().clear();

        for (role, slot) in &self.workers {
            let mut state = slot.state.lock().await;
            state.client = None;
            state.conversation.clear();
            state.status = WorkerStatus::Idle;
            state.restart_attempts = 0;
            state.last_restart_at = None;
            debug!(role = %role, "Worker stopped");
        }
        info!("Worker supervisor shut down");
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Current lifecycle state of one worker.
    pub async fn status(&self, role: WorkerRole) -> WorkerStatus {
        match self.workers.get(&role) {
            Some(slot) => slot.state.lock().await.status,
            None => WorkerStatus::Idle,
        }
    }

    /// Lifecycle state of every worker.
    pub async fn all_statuses(&self) -> HashMap<WorkerRole, WorkerStatus> {
        let mut statuses = HashMap::new();
        for (role, slot) in &self.workers {
            statuses.insert(*role, slot.state.lock().await.status);
        }
        statuses
    }

    /// The current conversation window of one worker, oldest first.
    pub async fn conversation(&self, role: WorkerRole) -> Vec<ChatMessage> {
        match self.workers.get(&role) {
            Some(slot) => slot.state.lock().await.conversation.messages(),
            None => Vec::new(),
        }
    }

    /// The resolved profile for one role.
    pub fn profile(&self, role: WorkerRole) -> Option<&RoleProfile> {
        self.workers.get(&role).map(|slot| &slot.profile)
    }

    fn slot(&self, role: WorkerRole) -> Result<&WorkerSlot, WorkerError> {
        self.workers
            .get(&role)
            .ok_or_else(|| WorkerError::UnknownRole(role.to_string()))
    }
}
