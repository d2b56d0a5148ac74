//! gRPC front end: one `Subscribe` call is one link.

use autometrics::autometrics;
use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::parse_filter;
use super::LinkHandler;
use super::LinkState;
use crate::proto::subscription_service_server::SubscriptionService;
use crate::proto::Snapshot;
use crate::proto::SubscribeRequest;
use crate::subscription::mailbox;
use crate::subscription::ResourceDatabase;
use crate::SubscriptionConfig;
use crate::API_SLO;

/// Implements the generated `SubscriptionService` on top of a
/// [`ResourceDatabase`].
#[derive(Clone)]
pub struct SubscriptionServer {
    database: ResourceDatabase,
    link_buffer_size: usize,
}

impl SubscriptionServer {
    pub fn new(
        database: ResourceDatabase,
        config: &SubscriptionConfig,
    ) -> Self {
        Self {
            database,
            link_buffer_size: config.link_buffer_size,
        }
    }
}

#[tonic::async_trait]
impl SubscriptionService for SubscriptionServer {
    type SubscribeStream = ReceiverStream<Result<Snapshot, Status>>;

    /// Opens a link on `request.address`.
    ///
    /// Fails with `NOT_FOUND` before streaming anything if no domain is bound
    /// to the address. The link stays open until the client cancels or the
    /// server shuts down.
    #[cfg_attr(not(doc), autometrics(objective = API_SLO))]
    #[tracing::instrument(skip_all, fields(address = %request.get_ref().address))]
    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> std::result::Result<Response<Self::SubscribeStream>, Status> {
        let peer = request.remote_addr();
        let SubscribeRequest {
            address,
            filter,
            link_name,
        } = request.into_inner();

        let link = if link_name.is_empty() { nanoid!() } else { link_name };
        debug!(%link, ?peer, state = %LinkState::Init, "link state");

        let key = parse_filter(filter.as_ref());
        let (subscriber, mailbox) = mailbox();
        let guard = match self.database.subscribe(&address, key.clone(), subscriber) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(%link, state = %LinkState::Rejected, "link rejected: {}", e);
                return Err(e.into());
            }
        };

        info!(
            %link,
            key = %key,
            subscriber_id = guard.subscriber_id(),
            state = %LinkState::Subscribed,
            "link state"
        );

        let (response_sender, response_receiver) = mpsc::channel(self.link_buffer_size);
        let handler = LinkHandler::new(link, address, mailbox, guard);
        tokio::spawn(handler.run(response_sender));

        Ok(Response::new(ReceiverStream::new(response_receiver)))
    }
}
