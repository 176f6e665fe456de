//! Router: the session registry and the fan-out policy.
//!
//! The router runs as one tokio task draining an unbounded mailbox of
//! [`RouterCommand`]s.  Every insert, remove and broadcast happens on that
//! task, so the registry needs no lock.  Callers talk to it through a
//! cloneable [`RouterHandle`]; the task exits once every handle is dropped.
//!
//! # Fan-out
//!
//! A [`StateUpdate`] is delivered to every registered session except the one
//! it came from.  Delivery only pushes onto the recipient's unbounded outbound
//! queue, so a slow client never stalls the router or the other recipients.
//! A recipient whose queue is closed is retired and the loop carries on;
//! its id stays reserved until that session sends its own `SessionEnded`.
//!
//! # Ordering
//!
//! For a fixed (origin, recipient) pair, updates arrive in the order the
//! origin published them: the origin publishes sequentially into this one
//! mailbox, the mailbox is processed in order, and each outbound queue is FIFO.

use std::collections::HashMap;

use relay_core::{IdAllocator, SessionId, StateUpdate};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ── Errors ────────────────────────────────────────────────────────────────────

/// The router task is no longer running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("router task has stopped")]
    Closed,

    /// Every id in the allocator's range is in use.
    #[error("no free session id available")]
    IdsExhausted,
}

/// A delivery hit a session whose writer has already exited.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("recipient session is gone")]
    SessionGone,
}

// ── Session handle ────────────────────────────────────────────────────────────

/// The router's view of one session: the sending end of its outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    outbound: mpsc::UnboundedSender<StateUpdate>,
}

/// The receiving end of a session's outbound queue, drained by its writer.
pub type OutboundQueue = mpsc::UnboundedReceiver<StateUpdate>;

impl SessionHandle {
    /// Creates a handle and the queue its writer task will drain.
    pub fn channel() -> (Self, OutboundQueue) {
        let (outbound, queue) = mpsc::unbounded_channel();
        (Self { outbound }, queue)
    }

    /// Enqueues `update` for the session's writer and returns immediately.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::SessionGone`] if the writer has dropped its queue.
    pub fn deliver_state(&self, update: StateUpdate) -> Result<(), DeliveryError> {
        self.outbound
            .send(update)
            .map_err(|_| DeliveryError::SessionGone)
    }
}

// ── Mailbox ───────────────────────────────────────────────────────────────────

/// Messages accepted by the router task.
#[derive(Debug)]
pub enum RouterCommand {
    /// Register a new session; the allocated id is sent back on `reply`.
    SessionStarted {
        handle: SessionHandle,
        reply: oneshot::Sender<Result<SessionId, RouterError>>,
    },
    /// Fan an update out to every session except its origin.
    StateUpdate(StateUpdate),
    /// Remove a session.  Unknown ids are ignored.
    SessionEnded(SessionId),
    /// Report the number of registered sessions.
    SessionCount { reply: oneshot::Sender<usize> },
}

/// Cloneable client side of the router mailbox.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    mailbox: mpsc::UnboundedSender<RouterCommand>,
}

impl RouterHandle {
    /// Registers a session and returns its freshly allocated id.
    ///
    /// # Errors
    ///
    /// [`RouterError::Closed`] if the router task has stopped, or
    /// [`RouterError::IdsExhausted`] if no id is free.
    pub async fn session_started(&self, handle: SessionHandle) -> Result<SessionId, RouterError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(RouterCommand::SessionStarted { handle, reply })
            .map_err(|_| RouterError::Closed)?;
        rx.await.map_err(|_| RouterError::Closed)?
    }

    /// Queues an update for fan-out.  Returns as soon as it is in the mailbox.
    pub fn state_update(&self, update: StateUpdate) -> Result<(), RouterError> {
        self.mailbox
            .send(RouterCommand::StateUpdate(update))
            .map_err(|_| RouterError::Closed)
    }

    /// Unregisters a session.  Safe to call more than once.
    pub fn session_ended(&self, id: SessionId) {
        // A stopped router has no registry left to clean up.
        let _ = self.mailbox.send(RouterCommand::SessionEnded(id));
    }

    /// Number of sessions currently registered.
    pub async fn session_count(&self) -> Result<usize, RouterError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(RouterCommand::SessionCount { reply })
            .map_err(|_| RouterError::Closed)?;
        rx.await.map_err(|_| RouterError::Closed)
    }
}

// ── Router task ───────────────────────────────────────────────────────────────

/// One registry entry.
///
/// A session whose queue was found closed during a broadcast is retired, not
/// removed: its id stays reserved until the session's own `SessionEnded`
/// arrives, so the id cannot be handed to a new session while the old one is
/// still shutting down.
enum Slot {
    Live(SessionHandle),
    Retired,
}

/// Registry state owned by the router task.
pub struct Router {
    sessions: HashMap<SessionId, Slot>,
    ids: IdAllocator,
}

impl Router {
    /// Spawns a router with an entropy-seeded id allocator.
    pub fn spawn() -> (RouterHandle, JoinHandle<()>) {
        Self::spawn_with(IdAllocator::new())
    }

    /// Spawns a router that draws ids from `ids`.
    pub fn spawn_with(ids: IdAllocator) -> (RouterHandle, JoinHandle<()>) {
        let (mailbox, inbox) = mpsc::unbounded_channel();
        let router = Self {
            sessions: HashMap::new(),
            ids,
        };
        let task = tokio::spawn(router.run(inbox));
        (RouterHandle { mailbox }, task)
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<RouterCommand>) {
        while let Some(command) = inbox.recv().await {
            self.handle(command);
        }
        debug!("router mailbox closed; {} sessions dropped", self.sessions.len());
    }

    fn handle(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::SessionStarted { handle, reply } => {
                let result = self.register(handle);
                // If the session gave up waiting, nobody knows the id and no
                // SessionEnded will ever arrive for it, so release it now.
                if let Err(Ok(id)) = reply.send(result) {
                    debug!(session = %id, "session went away before receiving its id");
                    self.sessions.remove(&id);
                }
            }
            RouterCommand::StateUpdate(update) => self.fan_out(update),
            RouterCommand::SessionEnded(id) => {
                if self.sessions.remove(&id).is_some() {
                    debug!(session = %id, "session unregistered");
                }
            }
            RouterCommand::SessionCount { reply } => {
                let _ = reply.send(self.live_count());
            }
        }
    }

    fn register(&mut self, handle: SessionHandle) -> Result<SessionId, RouterError> {
        let Some(id) = self.ids.allocate(&self.sessions) else {
            warn!(
                "session id space exhausted ({} sessions)",
                self.sessions.len()
            );
            return Err(RouterError::IdsExhausted);
        };
        self.sessions.insert(id, Slot::Live(handle));
        Ok(id)
    }

    fn live_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    fn fan_out(&mut self, update: StateUpdate) {
        let origin = update.session_id;

        for (id, slot) in self.sessions.iter_mut() {
            if *id == origin {
                continue;
            }
            let Slot::Live(handle) = slot else {
                continue;
            };
            if handle.deliver_state(update).is_err() {
                debug!(session = %id, origin = %origin, "recipient gone during broadcast");
                // Keep the id reserved until the session unregisters itself.
                *slot = Slot::Retired;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use relay_core::Position;

    fn update_from(origin: SessionId, x: i64) -> StateUpdate {
        StateUpdate {
            health: 100,
            position: Position { x, y: 0 },
            session_id: origin,
        }
    }

    async fn register(router: &RouterHandle) -> (SessionId, OutboundQueue) {
        let (handle, queue) = SessionHandle::channel();
        let id = router.session_started(handle).await.unwrap();
        (id, queue)
    }

    #[tokio::test]
    async fn test_fan_out_skips_origin() {
        // Arrange
        let (router, _task) = Router::spawn();
        let (a, mut qa) = register(&router).await;
        let (_b, mut qb) = register(&router).await;
        let (_c, mut qc) = register(&router).await;

        // Act
        router.state_update(update_from(a, 5)).unwrap();
        router.session_count().await.unwrap(); // barrier: fan-out processed

        // Assert
        assert_eq!(qb.try_recv().unwrap(), update_from(a, 5));
        assert_eq!(qc.try_recv().unwrap(), update_from(a, 5));
        assert!(qa.try_recv().is_err(), "origin must not receive its own update");
    }

    #[tokio::test]
    async fn test_per_origin_fifo() {
        let (router, _task) = Router::spawn();
        let (a, _qa) = register(&router).await;
        let (_b, mut qb) = register(&router).await;

        for x in 0..50 {
            router.state_update(update_from(a, x)).unwrap();
        }
        router.session_count().await.unwrap();

        for x in 0..50 {
            assert_eq!(qb.try_recv().unwrap().position.x, x);
        }
    }

    #[tokio::test]
    async fn test_session_ended_is_idempotent() {
        let (router, _task) = Router::spawn();
        let (a, _qa) = register(&router).await;
        let (_b, _qb) = register(&router).await;

        router.session_ended(a);
        router.session_ended(a);

        assert_eq!(router.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_removed_session_never_receives() {
        let (router, _task) = Router::spawn();
        let (a, _qa) = register(&router).await;
        let (b, mut qb) = register(&router).await;

        router.session_ended(b);
        router.state_update(update_from(a, 1)).unwrap();
        router.session_count().await.unwrap();

        assert!(qb.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_recipient_is_removed_and_others_still_served() {
        // Arrange: three sessions, the middle one's writer is gone.
        let (router, _task) = Router::spawn();
        let (a, _qa) = register(&router).await;
        let (_b, qb) = register(&router).await;
        let (_c, mut qc) = register(&router).await;
        drop(qb);

        // Act
        router.state_update(update_from(a, 1)).unwrap();
        router.state_update(update_from(a, 2)).unwrap();

        // Assert
        assert_eq!(router.session_count().await.unwrap(), 2);
        assert_eq!(qc.try_recv().unwrap().position.x, 1);
        assert_eq!(qc.try_recv().unwrap().position.x, 2);
    }

    #[tokio::test]
    async fn test_ids_unique_under_tiny_id_space() {
        // Only 4 ids exist, so the seeded RNG collides constantly.
        let ids = IdAllocator::with_rng(1..=4, StdRng::seed_from_u64(7));
        let (router, _task) = Router::spawn_with(ids);

        let mut seen = Vec::new();
        let mut queues = Vec::new();
        for _ in 0..4 {
            let (id, q) = register(&router).await;
            assert!(!seen.contains(&id));
            seen.push(id);
            queues.push(q);
        }

        let (handle, _q) = SessionHandle::channel();
        assert_eq!(
            router.session_started(handle).await,
            Err(RouterError::IdsExhausted)
        );
    }

    #[tokio::test]
    async fn test_freed_id_can_be_reused() {
        let ids = IdAllocator::with_rng(1..=1, StdRng::seed_from_u64(1));
        let (router, _task) = Router::spawn_with(ids);
        let (first, _q1) = register(&router).await;

        router.session_ended(first);
        let (second, _q2) = register(&router).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_start_and_end_leaves_consistent_registry() {
        let (router, _task) = Router::spawn();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let router = router.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _queue) = SessionHandle::channel();
                let id = router.session_started(handle).await.unwrap();
                router.state_update(update_from(id, i)).unwrap();
                if i % 2 == 0 {
                    router.session_ended(id);
                }
                // Keep odd sessions' queues alive past the count below.
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let mid_count = router.session_count().await.unwrap();

        for t in tasks {
            t.await.unwrap();
        }

        // Odd sessions never unregistered; their queues are now closed, so
        // the next broadcast retires them.
        let (witness, _witness_queue) = register(&router).await;
        router.state_update(update_from(witness, 0)).unwrap();

        assert!(mid_count <= 16);
        assert_eq!(router.session_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purged_id_is_not_reissued_before_session_ends() {
        // Arrange: x's queue is closed, so the next broadcast retires it.
        let ids = IdAllocator::with_rng(1..=3, StdRng::seed_from_u64(3));
        let (router, _task) = Router::spawn_with(ids);
        let (x, qx) = register(&router).await;
        let (y, _qy) = register(&router).await;
        drop(qx);
        router.state_update(update_from(y, 1)).unwrap();

        // Act: a newcomer registers, then x's late SessionEnded arrives.
        let (z, mut qz) = register(&router).await;
        router.session_ended(x);
        router.state_update(update_from(y, 2)).unwrap();

        // Assert
        assert_ne!(z, x, "retired id must stay reserved");
        assert_eq!(router.session_count().await.unwrap(), 2);
        assert_eq!(qz.try_recv().unwrap().position.x, 2);
    }

    #[tokio::test]
    async fn test_retired_id_is_released_by_session_ended() {
        let ids = IdAllocator::with_rng(1..=2, StdRng::seed_from_u64(3));
        let (router, _task) = Router::spawn_with(ids);
        let (x, qx) = register(&router).await;
        let (y, _qy) = register(&router).await;
        drop(qx);
        router.state_update(update_from(y, 1)).unwrap();

        let (early, _q) = SessionHandle::channel();
        let refused = router.session_started(early).await;
        router.session_ended(x);
        let (late, _q2) = SessionHandle::channel();
        let reissued = router.session_started(late).await;

        assert_eq!(refused, Err(RouterError::IdsExhausted));
        assert_eq!(reissued, Ok(x));
    }

    #[tokio::test]
    async fn test_router_exits_when_handles_dropped() {
        let (router, task) = Router::spawn();
        drop(router);
        task.await.unwrap();
    }

    #[test]
    fn test_deliver_to_closed_queue_is_session_gone() {
        let (handle, queue) = SessionHandle::channel();
        drop(queue);
        let result = handle.deliver_state(update_from(SessionId::new(9), 0));

        assert_eq!(result, Err(DeliveryError::SessionGone));
    }
}
