#[cfg(test)]
pub mod tests {
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;
    use error_stack::Report;
    use tokio::sync::Notify;

    use crate::constants::EMPTY_CAMPAIGN_SENTINEL;
    use crate::controller::{LinkHandler, SlideRenderer};
    use crate::error::{AdReelError, TransportErrorKind};
    use crate::models::{AdSlot, ScreenDensity, Transition};
    use crate::package::{encode_package, CampaignPackage, PackageFile};
    use crate::parser::{AttrValue, CampaignAttributes, CampaignDocument, SlotEntry};
    use crate::settings::Settings;
    use crate::transport::{AdTransport, CampaignRequest, Operation, TrackingRequest};

    pub fn create_test_settings_toml() -> String {
        r#"
            [server]
            campaign_url = "https://ads.example.com/campaign"

            [policy]
            max_errors = 10
            max_delay_ticks = 30

            [device]
            app_id = "com.example.app"
            device_id = "device-1"

            [[surfaces]]
            account_id = "acme"
            campaign_id = "spring"
            base_view_index = "+0"
            "#
        .to_string()
    }

    /// Test settings with the staging root moved under `staging_root`.
    pub fn create_test_settings(staging_root: &Path) -> Settings {
        let mut settings =
            Settings::from_toml_validated(&create_test_settings_toml()).expect("Invalid config");
        settings.staging.root = staging_root.to_path_buf();
        settings
    }

    pub fn test_campaign_request() -> CampaignRequest {
        CampaignRequest {
            operation: Operation::GetAdSet,
            tracking: false,
            account_id: "acme".to_string(),
            app_id: "com.example.app".to_string(),
            campaign_account: None,
            campaign_id: "spring".to_string(),
            custom_spec: None,
            device_id: "device-1".to_string(),
            screen_density: ScreenDensity::Xhdpi,
            view_width: 320,
            view_height: 50,
        }
    }

    /// Builds a compressed campaign payload with one image per slot.
    pub fn campaign_payload(campaign_id: &str, slots: &[(&str, u64)]) -> Bytes {
        campaign_payload_with(
            CampaignAttributes {
                id: Some(campaign_id.to_string()),
                ..CampaignAttributes::default()
            },
            slots,
        )
    }

    pub fn campaign_payload_with(campaign: CampaignAttributes, slots: &[(&str, u64)]) -> Bytes {
        build_payload(campaign, slots, "image")
    }

    /// A well-formed package none of whose slots can be shown.
    pub fn video_only_payload(campaign_id: &str) -> Bytes {
        build_payload(
            CampaignAttributes {
                id: Some(campaign_id.to_string()),
                ..CampaignAttributes::default()
            },
            &[("clip", 1_000)],
            "video",
        )
    }

    fn build_payload(campaign: CampaignAttributes, slots: &[(&str, u64)], kind: &str) -> Bytes {
        let entries = slots
            .iter()
            .map(|(id, duration)| SlotEntry {
                id: Some((*id).to_string()),
                kind: Some(kind.to_string()),
                media: Some(format!("{id}.png")),
                link: Some(format!("https://example.com/{id}")),
                duration: Some(AttrValue::Integer(
                    i64::try_from(*duration).expect("duration fits"),
                )),
                ..SlotEntry::default()
            })
            .collect();
        let files = slots
            .iter()
            .map(|(id, _)| PackageFile::from_bytes(format!("{id}.png"), &media_bytes()))
            .collect();
        let package = CampaignPackage {
            document: CampaignDocument {
                campaign,
                slots: entries,
            },
            files,
        };
        Bytes::from(encode_package(&package).expect("should encode package"))
    }

    /// Poorly compressible bytes so packages stay above the minimum size.
    fn media_bytes() -> Vec<u8> {
        let mut state: u32 = 0x2545_f491;
        (0..256)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state.to_le_bytes()[0]
            })
            .collect()
    }

    pub enum Scripted {
        Payload(Bytes),
        Fail(TransportErrorKind),
    }

    /// Transport answering from a script; the empty-campaign sentinel once
    /// the script runs out.
    #[derive(Default)]
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        campaign_requests: Mutex<Vec<CampaignRequest>>,
        tracking_requests: Mutex<Vec<TrackingRequest>>,
        fail_tracking: AtomicBool,
        gate: Mutex<Option<Arc<Notify>>>,
        entered: Notify,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, response: Scripted) {
            self.script.lock().expect("script lock").push_back(response);
        }

        pub fn push_payload(&self, payload: Bytes) {
            self.push(Scripted::Payload(payload));
        }

        pub fn push_failure(&self, kind: TransportErrorKind) {
            self.push(Scripted::Fail(kind));
        }

        pub fn fail_tracking(&self) {
            self.fail_tracking.store(true, Ordering::SeqCst);
        }

        /// Makes the next campaign fetch wait until the returned notify fires.
        pub fn hold_next_fetch(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().expect("gate lock") = Some(Arc::clone(&gate));
            gate
        }

        /// Resolves once a campaign fetch has started.
        pub async fn fetch_started(&self) {
            self.entered.notified().await;
        }

        pub fn campaign_requests(&self) -> Vec<CampaignRequest> {
            self.campaign_requests.lock().expect("requests lock").clone()
        }

        pub fn tracking_requests(&self) -> Vec<TrackingRequest> {
            self.tracking_requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl AdTransport for ScriptedTransport {
        async fn fetch_campaign(
            &self,
            request: &CampaignRequest,
        ) -> Result<Bytes, Report<AdReelError>> {
            self.campaign_requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            self.entered.notify_one();

            let gate = self.gate.lock().expect("gate lock").take();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            let next = self.script.lock().expect("script lock").pop_front();
            match next {
                Some(Scripted::Payload(bytes)) => Ok(bytes),
                Some(Scripted::Fail(kind)) => Err(Report::new(AdReelError::Transport {
                    kind,
                    detail: "scripted failure".to_string(),
                })),
                None => Ok(Bytes::from_static(&[EMPTY_CAMPAIGN_SENTINEL])),
            }
        }

        async fn fetch_tracking(
            &self,
            request: &TrackingRequest,
        ) -> Result<(), Report<AdReelError>> {
            self.tracking_requests
                .lock()
                .expect("requests lock")
                .push(request.clone());
            if self.fail_tracking.load(Ordering::SeqCst) {
                return Err(Report::new(AdReelError::Transport {
                    kind: TransportErrorKind::Connect,
                    detail: "scripted tracking failure".to_string(),
                }));
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RenderCall {
        Slide {
            id: String,
            transition_in: Transition,
            transition_out: Transition,
        },
        ClearDynamic {
            static_len: usize,
        },
    }

    /// Renderer that records every call; clones share the log.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingRenderer {
        calls: Arc<Mutex<Vec<RenderCall>>>,
    }

    impl RecordingRenderer {
        pub fn calls(&self) -> Vec<RenderCall> {
            self.calls.lock().expect("calls lock").clone()
        }

        pub fn rendered_ids(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    RenderCall::Slide { id, .. } => Some(id),
                    RenderCall::ClearDynamic { .. } => None,
                })
                .collect()
        }
    }

    impl SlideRenderer for RecordingRenderer {
        fn render_slide(
            &mut self,
            slot: &AdSlot,
            transition_in: Transition,
            transition_out: Transition,
        ) {
            self.calls.lock().expect("calls lock").push(RenderCall::Slide {
                id: slot.id.clone(),
                transition_in,
                transition_out,
            });
        }

        fn clear_dynamic(&mut self, static_len: usize) {
            self.calls
                .lock()
                .expect("calls lock")
                .push(RenderCall::ClearDynamic { static_len });
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum LinkCall {
        InApp(String),
        External(String),
    }

    #[derive(Debug, Default)]
    pub struct RecordingLinks {
        calls: Mutex<Vec<LinkCall>>,
    }

    impl RecordingLinks {
        pub fn calls(&self) -> Vec<LinkCall> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl LinkHandler for RecordingLinks {
        fn open_in_app(&self, param: &str) {
            self.calls
                .lock()
                .expect("calls lock")
                .push(LinkCall::InApp(param.to_string()));
        }

        fn open_external(&self, url: &str) {
            self.calls
                .lock()
                .expect("calls lock")
                .push(LinkCall::External(url.to_string()));
        }
    }
}
