use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::models::AdSlot;
use crate::transport::{AdTransport, CampaignRequest, TrackingRequest};

/// Sends tap-through tracking in the background. Results are only logged.
#[derive(Clone)]
pub struct Tracker {
    transport: Arc<dyn AdTransport>,
    request: CampaignRequest,
}

impl Tracker {
    #[must_use]
    pub fn new(transport: Arc<dyn AdTransport>, request: CampaignRequest) -> Self {
        Self { transport, request }
    }

    /// Fires a tracking request for `slot`.
    ///
    /// Returns `None` when called outside of a tokio runtime.
    pub fn track(&self, slot: &AdSlot, campaign_account: Option<String>) -> Option<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("Cannot track ad {}: {}", slot.id, err);
                return None;
            }
        };

        let mut base = self.request.clone();
        base.campaign_account = campaign_account;
        let request = TrackingRequest::new(base, slot.id.clone(), slot.link.clone());
        let transport = Arc::clone(&self.transport);

        Some(handle.spawn(async move {
            match transport.fetch_tracking(&request).await {
                Ok(()) => log::debug!("Tracked tap on ad {}", request.ad_id),
                Err(report) => log::warn!("Tracking ad {} failed: {:?}", request.ad_id, report),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotDefaults;
    use crate::test_support::tests::{test_campaign_request, ScriptedTransport};
    use crate::transport::Operation;

    #[tokio::test]
    async fn test_track_sends_ad_id_and_link() {
        let transport = Arc::new(ScriptedTransport::new());
        let tracker = Tracker::new(transport.clone(), test_campaign_request());
        let mut slot = AdSlot::new("a", &SlotDefaults::default());
        slot.link = Some("https://example.com/a".to_string());

        tracker
            .track(&slot, Some("acme-main".to_string()))
            .expect("runtime is available")
            .await
            .expect("tracking task should finish");

        let sent = transport.tracking_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].ad_id, "a");
        assert_eq!(sent[0].ad_link.as_deref(), Some("https://example.com/a"));
        assert_eq!(sent[0].request.operation, Operation::TrackAd);
        assert_eq!(sent[0].request.campaign_account.as_deref(), Some("acme-main"));
    }

    #[tokio::test]
    async fn test_tracking_failure_is_swallowed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_tracking();
        let tracker = Tracker::new(transport.clone(), test_campaign_request());
        let slot = AdSlot::new("a", &SlotDefaults::default());

        let handle = tracker.track(&slot, None).expect("runtime is available");
        assert!(handle.await.is_ok());
        assert_eq!(transport.tracking_requests().len(), 1);
    }

    #[test]
    fn test_track_without_runtime_is_skipped() {
        let tracker = Tracker::new(Arc::new(ScriptedTransport::new()), test_campaign_request());
        let slot = AdSlot::new("a", &SlotDefaults::default());
        assert!(tracker.track(&slot, None).is_none());
    }
}
