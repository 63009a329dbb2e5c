//! Per-session coordinator actor.
//!
//! Each session is owned by one [`SessionCoordinator`] running in its own
//! tokio task. Commands arrive over an mpsc channel and are handled strictly
//! one at a time, so the check-ledger / increment-counts / record-token
//! sequence of a vote never interleaves with another command for the same
//! session. Different sessions run on different tasks and proceed in
//! parallel. The only suspension points inside a command are storage calls.
//!
//! Outside code talks to the actor through a cloneable [`CoordinatorHandle`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::expiry::ExpiryTimer;
use super::validation::validate_ballot;
use super::{
    NewSession, Session, SessionId, SessionRecord, SessionStatus, SessionView, VoteAck,
    VoterLedger, CLOSED_MESSAGE, VOTE_ACCEPTED_MESSAGE,
};
use crate::broadcast::{BroadcastMessage, Broadcaster, Subscription};
use crate::error::PollError;
use crate::logging::redact_token;
use crate::session::ClosedNotice;
use crate::storage::SessionStorage;
use crate::Result;

/// Default lifetime of a session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Capacity of each coordinator's command mailbox.
const MAILBOX_CAPACITY: usize = 64;

/// Coordinator settings shared by every session.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Time from `init` until the session is wiped.
    pub session_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Init {
        params: NewSession,
        reply: Reply<Session>,
    },
    Snapshot {
        voter_token: Option<String>,
        reply: Reply<SessionView>,
    },
    SubmitVote {
        choice_ids: Vec<String>,
        voter_token: String,
        reply: Reply<VoteAck>,
    },
    Close {
        reply: Reply<Session>,
    },
    Export {
        reply: Reply<Session>,
    },
    Subscribe {
        reply: Reply<Subscription>,
    },
    Expire {
        reply: Reply<()>,
    },
}

/// Cloneable sender side of a coordinator.
///
/// A coordinator stops once its session expires, or after answering a
/// command for a session that was never created. Every later call through
/// the handle reports [`PollError::NotFound`].
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    id: SessionId,
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Spawn a coordinator task for `id` and return its handle.
    ///
    /// The coordinator loads any persisted record lazily on its first command.
    pub fn spawn(
        id: SessionId,
        storage: Arc<dyn SessionStorage>,
        config: CoordinatorConfig,
    ) -> Self {
        Self::spawn_with_exit_hook(id, storage, config, || {})
    }

    /// Like [`spawn`](Self::spawn), running `on_exit` once the coordinator
    /// has stopped. By then [`is_stopped`](Self::is_stopped) reports `true`.
    pub(crate) fn spawn_with_exit_hook<F>(
        id: SessionId,
        storage: Arc<dyn SessionStorage>,
        config: CoordinatorConfig,
        on_exit: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let coordinator = SessionCoordinator {
            id,
            storage,
            config,
            rx,
            self_tx: tx.downgrade(),
            broadcaster: Broadcaster::new(),
            record: None,
            loaded: false,
            expired: false,
            timer: None,
        };
        tokio::spawn(async move {
            coordinator.run().await;
            on_exit();
        });
        Self { id, tx }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether the coordinator task has stopped.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Create the session.
    pub async fn init(&self, params: NewSession) -> Result<Session> {
        self.request(|reply| Command::Init { params, reply }).await
    }

    /// Read the session as seen by `voter_token`.
    pub async fn snapshot(&self, voter_token: Option<&str>) -> Result<SessionView> {
        let voter_token = voter_token.map(str::to_string);
        self.request(|reply| Command::Snapshot { voter_token, reply })
            .await
    }

    /// Cast a ballot.
    pub async fn submit_vote(
        &self,
        choice_ids: Vec<String>,
        voter_token: impl Into<String>,
    ) -> Result<VoteAck> {
        let voter_token = voter_token.into();
        self.request(|reply| Command::SubmitVote {
            choice_ids,
            voter_token,
            reply,
        })
        .await
    }

    /// Stop accepting votes. Closing a closed session succeeds unchanged.
    pub async fn close(&self) -> Result<Session> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Read the full session for export.
    pub async fn export(&self) -> Result<Session> {
        self.request(|reply| Command::Export { reply }).await
    }

    /// Open a live channel whose first message is an `Init` snapshot.
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.request(|reply| Command::Subscribe { reply }).await
    }

    /// Wipe the session and stop the coordinator.
    pub async fn expire(&self) -> Result<()> {
        self.request(|reply| Command::Expire { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    fn stopped(&self) -> PollError {
        PollError::NotFound(self.id.to_string())
    }
}

/// Single-writer owner of one session's record.
struct SessionCoordinator {
    id: SessionId,
    storage: Arc<dyn SessionStorage>,
    config: CoordinatorConfig,
    rx: mpsc::Receiver<Command>,
    self_tx: mpsc::WeakSender<Command>,
    broadcaster: Broadcaster,
    record: Option<SessionRecord>,
    loaded: bool,
    expired: bool,
    timer: Option<ExpiryTimer>,
}

impl SessionCoordinator {
    async fn run(mut self) {
        debug!(session = %self.id, "coordinator started");

        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
            if self.should_stop() {
                break;
            }
        }

        debug!(session = %self.id, "coordinator stopped");
    }

    /// Stop after expiry, or when no session exists for this ID so that
    /// lookups of unknown IDs do not leave idle coordinators behind.
    fn should_stop(&self) -> bool {
        self.expired || (self.loaded && self.record.is_none())
    }

    async fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller went away; nothing to do.
        match command {
            Command::Init { params, reply } => {
                let _ = reply.send(self.init(params).await);
            }
            Command::Snapshot { voter_token, reply } => {
                let _ = reply.send(self.snapshot(voter_token.as_deref()).await);
            }
            Command::SubmitVote {
                choice_ids,
                voter_token,
                reply,
            } => {
                let _ = reply.send(self.submit_vote(choice_ids, voter_token).await);
            }
            Command::Close { reply } => {
                let _ = reply.send(self.close().await);
            }
            Command::Export { reply } => {
                let _ = reply.send(self.export().await);
            }
            Command::Subscribe { reply } => {
                let _ = reply.send(self.subscribe().await);
            }
            Command::Expire { reply } => {
                let _ = reply.send(self.expire().await);
            }
        }
    }

    /// Load the persisted record on first use.
    ///
    /// A record whose expiry has already passed is wiped instead of loaded.
    async fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        match self.storage.load(&self.id).await? {
            Some(record) if record.is_overdue(Utc::now()) => {
                info!(session = %self.id, expires_at = %record.expires_at, "session overdue, expiring");
                self.expire().await?;
            }
            Some(record) => {
                debug!(session = %self.id, "session restored from storage");
                self.arm_timer(record.expires_at);
                self.record = Some(record);
            }
            None => {}
        }

        self.loaded = true;
        Ok(())
    }

    fn loaded_record(&self) -> Result<&SessionRecord> {
        self.record
            .as_ref()
            .ok_or_else(|| PollError::NotFound(self.id.to_string()))
    }

    async fn init(&mut self, params: NewSession) -> Result<Session> {
        self.ensure_loaded().await?;
        if self.expired {
            return Err(PollError::NotFound(self.id.to_string()));
        }
        if self.record.is_some() {
            return Err(PollError::SessionExists(self.id.to_string()));
        }

        let now = Utc::now();
        let session = params.into_session(self.id, now)?;
        let record = SessionRecord {
            session: session.clone(),
            voters: VoterLedger::new(),
            expires_at: self.expiry_from(now),
        };

        self.storage.save(&record).await?;
        self.arm_timer(record.expires_at);
        info!(
            session = %self.id,
            mode = %session.mode,
            options = session.options.len(),
            expires_at = %record.expires_at,
            "session created"
        );
        self.record = Some(record);

        Ok(session)
    }

    async fn snapshot(&mut self, voter_token: Option<&str>) -> Result<SessionView> {
        self.ensure_loaded().await?;
        let record = self.loaded_record()?;
        Ok(SessionView::for_voter(record, voter_token))
    }

    async fn submit_vote(&mut self, choice_ids: Vec<String>, voter_token: String) -> Result<VoteAck> {
        self.ensure_loaded().await?;
        let record = self.loaded_record()?;

        if !record.session.status.accepts_votes() {
            return Err(PollError::Closed(self.id.to_string()));
        }
        validate_ballot(&record.session, &choice_ids, &voter_token)?;
        if record.voters.contains(&voter_token) {
            return Err(PollError::AlreadyVoted);
        }

        let mut next = record.clone();
        next.session.apply_ballot(&choice_ids);
        next.voters.insert(voter_token.as_str());

        // Commit in memory only once the write is durable.
        self.storage.save(&next).await?;
        let options = next.session.options.clone();
        self.record = Some(next);

        let delivered = self.broadcaster.publish(&BroadcastMessage::Update(options));
        debug!(
            session = %self.id,
            voter = %redact_token(&voter_token),
            choices = ?choice_ids,
            delivered,
            "vote accepted"
        );

        Ok(VoteAck {
            message: VOTE_ACCEPTED_MESSAGE.to_string(),
            voted_at: Utc::now(),
        })
    }

    async fn close(&mut self) -> Result<Session> {
        self.ensure_loaded().await?;
        let record = self.loaded_record()?;

        let mut next = record.clone();
        match next.session.status.transition_to(SessionStatus::Closed) {
            Ok(true) => {}
            // Repeat close keeps the original closed_at and announces nothing.
            Ok(false) | Err(_) => return Ok(record.session.clone()),
        }
        let closed_at = Utc::now();
        next.session.closed_at = Some(closed_at);

        self.storage.save(&next).await?;
        let session = next.session.clone();
        self.record = Some(next);

        self.broadcaster
            .publish(&BroadcastMessage::Closed(ClosedNotice {
                message: CLOSED_MESSAGE.to_string(),
                closed_at: Some(closed_at),
            }));
        info!(session = %self.id, total_votes = session.total_votes(), "session closed");

        Ok(session)
    }

    async fn export(&mut self) -> Result<Session> {
        self.ensure_loaded().await?;
        Ok(self.loaded_record()?.session.clone())
    }

    async fn subscribe(&mut self) -> Result<Subscription> {
        self.ensure_loaded().await?;
        let session = self.loaded_record()?.session.clone();
        Ok(self.broadcaster.subscribe(BroadcastMessage::Init(session)))
    }

    /// Erase the record, ledger and timer together, then stop.
    async fn expire(&mut self) -> Result<()> {
        self.storage.delete(&self.id).await?;

        let had_state = self.record.take().is_some();
        self.timer = None;
        self.expired = true;
        self.broadcaster.disconnect_all();

        if had_state {
            info!(session = %self.id, "session expired");
        } else {
            debug!(session = %self.id, "expire on empty session");
        }
        Ok(())
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.session_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Start the one-shot expiry timer. Only called from `init` or when
    /// restoring a persisted record, so a session is never re-armed.
    fn arm_timer(&mut self, due: DateTime<Utc>) {
        let weak = self.self_tx.clone();
        let id = self.id;
        self.timer = Some(ExpiryTimer::schedule(due, move || async move {
            let Some(tx) = weak.upgrade() else {
                return;
            };
            let (reply, rx) = oneshot::channel();
            if tx.send(Command::Expire { reply }).await.is_err() {
                return;
            }
            drop(tx);
            if let Ok(Err(e)) = rx.await {
                warn!(session = %id, error = %e, "scheduled expiry failed");
            }
        }));
    }
}
