//! Event dispatch
//!
//! Reads platform events and hands them to one worker task per community.
//! A worker applies its community's events strictly in arrival order;
//! workers for different communities run in parallel. On shutdown the
//! dispatcher stops reading and waits for every worker to drain its queue,
//! so no attribution is cut off halfway through a ledger write.

use crate::events::PlatformEvent;
use crate::invite::CommunityId;
use crate::notice::JoinNotice;
use crate::source::ReplaySource;
use crate::tracker::InviteTracker;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

/// Counters reported when a dispatch run ends
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events parsed and dispatched
    pub events: u64,
    /// Lines that were not valid events
    pub malformed: u64,
}

enum WorkItem {
    Event(PlatformEvent),
    /// Acknowledged once everything queued before it has been applied
    Barrier(oneshot::Sender<()>),
}

/// Routes platform events to per-community workers
pub struct Dispatcher {
    tracker: Arc<InviteTracker>,
    replay: Arc<ReplaySource>,
    notices: mpsc::UnboundedSender<JoinNotice>,
    workers: HashMap<CommunityId, mpsc::UnboundedSender<WorkItem>>,
    tasks: JoinSet<()>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        tracker: Arc<InviteTracker>,
        replay: Arc<ReplaySource>,
        notices: mpsc::UnboundedSender<JoinNotice>,
    ) -> Self {
        Self {
            tracker,
            replay,
            notices,
            workers: HashMap::new(),
            tasks: JoinSet::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Process an event log until end of input or Ctrl-C
    pub async fn run<R>(self, reader: R) -> std::io::Result<DispatchStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let interrupted = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C, running until end of input");
                std::future::pending::<()>().await;
            }
        };
        self.run_until(reader, interrupted).await
    }

    /// Process an event log until end of input or until `shutdown` resolves
    pub async fn run_until<R, S>(mut self, reader: R, shutdown: S) -> std::io::Result<DispatchStats>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        let mut segments = reader.split(b'\n');
        tokio::pin!(shutdown);
        let mut read_error = None;

        loop {
            tokio::select! {
                segment = segments.next_segment() => match segment {
                    Ok(Some(bytes)) => self.dispatch_bytes(bytes).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Event log read failed, draining in-flight events");
                        read_error = Some(e);
                        break;
                    }
                },
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested, draining in-flight events");
                    break;
                }
            }
        }

        self.shutdown().await;
        match read_error {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }

    async fn dispatch_bytes(&mut self, bytes: Vec<u8>) {
        match String::from_utf8(bytes) {
            Ok(line) => self.dispatch_line(&line).await,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e.utf8_error(), "Skipping event line that is not UTF-8");
            }
        }
    }

    /// Parse and dispatch one event log line
    ///
    /// Blank lines and `#` comments are ignored; malformed lines are logged
    /// and skipped.
    pub async fn dispatch_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        match PlatformEvent::from_line(line) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, line, "Skipping malformed event");
            }
        }
    }

    pub async fn dispatch(&mut self, event: PlatformEvent) {
        self.stats.events += 1;

        if let PlatformEvent::Ready { communities } = event {
            // Invite lists recorded before `ready` must be visible to the
            // initial fetch
            self.settle().await;
            self.tracker.initialize(&communities).await;
            return;
        }

        let Some(community) = event.community().cloned() else {
            return;
        };

        let sent = self.worker(&community).send(WorkItem::Event(event));
        if let Err(mpsc::error::SendError(WorkItem::Event(event))) = sent {
            // Worker is gone (it panicked); start a fresh one for this event
            tracing::error!(%community, "Community worker stopped, restarting");
            self.workers.remove(&community);
            let _ = self.worker(&community).send(WorkItem::Event(event));
        }
    }

    /// Wait until every worker has applied everything queued so far
    pub async fn settle(&mut self) {
        let mut pending = Vec::with_capacity(self.workers.len());
        for sender in self.workers.values() {
            let (done, wait) = oneshot::channel();
            if sender.send(WorkItem::Barrier(done)).is_ok() {
                pending.push(wait);
            }
        }
        for wait in pending {
            let _ = wait.await;
        }
    }

    /// Close every worker queue and wait for the workers to finish
    pub async fn shutdown(&mut self) {
        self.workers.clear();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Community worker panicked");
            }
        }
        tracing::info!(
            events = self.stats.events,
            malformed = self.stats.malformed,
            "Event dispatch finished"
        );
    }

    fn worker(&mut self, community: &CommunityId) -> &mpsc::UnboundedSender<WorkItem> {
        let tasks = &mut self.tasks;
        let tracker = &self.tracker;
        let replay = &self.replay;
        let notices = &self.notices;

        self.workers.entry(community.clone()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            tasks.spawn(community_worker(
                community.clone(),
                Arc::clone(tracker),
                Arc::clone(replay),
                notices.clone(),
                receiver,
            ));
            tracing::debug!(%community, "Started community worker");
            sender
        })
    }
}

async fn community_worker(
    community: CommunityId,
    tracker: Arc<InviteTracker>,
    replay: Arc<ReplaySource>,
    notices: mpsc::UnboundedSender<JoinNotice>,
    mut queue: mpsc::UnboundedReceiver<WorkItem>,
) {
    while let Some(item) = queue.recv().await {
        match item {
            WorkItem::Barrier(done) => {
                let _ = done.send(());
            }
            WorkItem::Event(event) => apply(&community, &tracker, &replay, &notices, event).await,
        }
    }
}

async fn apply(
    community: &CommunityId,
    tracker: &InviteTracker,
    replay: &ReplaySource,
    notices: &mpsc::UnboundedSender<JoinNotice>,
    event: PlatformEvent,
) {
    match event {
        PlatformEvent::Invites { invites, .. } => {
            replay.set_invites(community.clone(), invites);
        }
        PlatformEvent::InviteCreate { .. }
        | PlatformEvent::InviteDelete { .. }
        | PlatformEvent::CommunityCreate { .. } => {
            if let Err(e) = tracker.refresh(community).await {
                tracing::warn!(%community, error = %e, "Invite snapshot not refreshed");
            }
        }
        PlatformEvent::CommunityDelete { .. } => {
            tracker.forget(community).await;
            replay.remove(community);
        }
        PlatformEvent::MemberJoin { member, .. } => {
            match tracker.attribute_join(community, &member).await {
                Ok(result) => {
                    let _ = notices.send(JoinNotice::new(community.clone(), member, &result));
                }
                Err(e) => {
                    tracing::warn!(%community, member = %member, error = %e, "Skipping attribution for join");
                }
            }
        }
        PlatformEvent::Ready { .. } => {}
    }
}
