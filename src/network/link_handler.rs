use std::fmt;

use tokio::sync::mpsc;
use tonic::Status;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::proto::Snapshot;
use crate::subscription::Mailbox;
use crate::subscription::SubscriptionGuard;

/// Link lifecycle: `Init -> Subscribed -> Closed` or `Init -> Rejected -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Init,
    Subscribed,
    Rejected,
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            LinkState::Init => "INIT",
            LinkState::Subscribed => "SUBSCRIBED",
            LinkState::Rejected => "REJECTED",
            LinkState::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

pub(crate) type SnapshotSender = mpsc::Sender<Result<Snapshot, Status>>;

/// Per-link delivery task.
///
/// Moves snapshots from the link's mailbox to the gRPC response stream on the
/// link's own task, so a slow peer only ever delays itself. Owns the
/// subscription guard: when the task ends the subscriber is unregistered.
pub(crate) struct LinkHandler {
    link: String,
    address: String,
    mailbox: Mailbox,
    guard: SubscriptionGuard,
}

impl LinkHandler {
    pub(crate) fn new(
        link: String,
        address: String,
        mailbox: Mailbox,
        guard: SubscriptionGuard,
    ) -> Self {
        Self {
            link,
            address,
            mailbox,
            guard,
        }
    }

    pub(crate) async fn run(
        mut self,
        response_sender: SnapshotSender,
    ) {
        let mut sequence: u64 = 0;

        loop {
            tokio::select! {
                _ = response_sender.closed() => {
                    debug!(link = %self.link, "link closed by peer");
                    break;
                }
                payload = self.mailbox.recv() => {
                    let Some(payload) = payload else {
                        // The registry let go of this subscriber (shutdown or teardown).
                        let _ = response_sender
                            .send(Err(Status::unavailable("subscription closed by server")))
                            .await;
                        break;
                    };

                    sequence += 1;
                    let snapshot = Snapshot {
                        sequence,
                        address: self.address.clone(),
                        content_type: payload.content_type.to_string(),
                        payload: payload.body.to_vec(),
                    };
                    trace!(link = %self.link, sequence, "sending snapshot");
                    if response_sender.send(Ok(snapshot)).await.is_err() {
                        debug!(link = %self.link, "response stream dropped");
                        break;
                    }
                }
            }
        }

        info!(
            link = %self.link,
            address = %self.address,
            subscriber_id = self.guard.subscriber_id(),
            delivered = sequence,
            state = %LinkState::Closed,
            "link state"
        );
    }
}
