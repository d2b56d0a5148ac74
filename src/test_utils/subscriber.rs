use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::plugin::Payload;
use crate::subscription::next_subscriber_id;
use crate::subscription::Subscriber;
use crate::subscription::SubscriberId;
use crate::Result;
use crate::SubscriptionError;

/// Subscriber keeping every payload pushed to it
#[derive(Debug)]
pub(crate) struct RecordingSubscriber {
    id: SubscriberId,
    payloads: Mutex<Vec<Payload>>,
    failing: AtomicBool,
}

impl RecordingSubscriber {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: next_subscriber_id(),
            payloads: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub(crate) fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().clone()
    }

    pub(crate) fn push_count(&self) -> usize {
        self.payloads.lock().len()
    }

    /// Makes every later push fail as if the link had gone away.
    pub(crate) fn fail_pushes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl Subscriber for RecordingSubscriber {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn push(
        &self,
        payload: Payload,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SubscriptionError::PushFailed { subscriber_id: self.id }.into());
        }
        self.payloads.lock().push(payload);
        Ok(())
    }
}
