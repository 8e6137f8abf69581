//! Headless host: runs every configured surface against a logging renderer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use adreel_common::controller::{LinkHandler, SlideRenderer};
use adreel_common::coordinator::AdService;
use adreel_common::logging::{init_logging, level_for};
use adreel_common::models::{AdSlot, Transition};
use adreel_common::settings::Settings;
use adreel_common::transport::NetworkSwitch;
use log::LevelFilter;

use crate::config::load_and_merge_config;
use crate::error::CliError;

/// Renderer that reports slide changes through the log.
pub struct LogRenderer {
    label: String,
}

impl LogRenderer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl SlideRenderer for LogRenderer {
    fn render_slide(&mut self, slot: &AdSlot, transition_in: Transition, transition_out: Transition) {
        let media = slot
            .media
            .as_ref()
            .map_or_else(|| "-".to_string(), |media| media.path().display().to_string());
        log::info!(
            "[{}] showing {} ({} / {}, {} ms) media {}",
            self.label,
            slot.id,
            transition_in,
            transition_out,
            slot.display_duration_ms,
            media
        );
    }

    fn clear_dynamic(&mut self, static_len: usize) {
        log::debug!("[{}] dropping campaign slides past {}", self.label, static_len);
    }
}

/// Link handler that only logs where a tap would lead.
pub struct LogLinks;

impl LinkHandler for LogLinks {
    fn open_in_app(&self, param: &str) {
        log::info!("Would open in-app destination '{}'", param);
    }

    fn open_external(&self, url: &str) {
        log::info!("Would open {}", url);
    }
}

/// Loads the configuration and runs the service until ctrl-c or until
/// `duration_secs` elapsed.
pub fn run(
    file: &Path,
    duration_secs: Option<u64>,
    offline: bool,
    verbose: bool,
) -> Result<(), CliError> {
    let (settings, _) = load_and_merge_config(file, verbose)?;
    let level = if verbose {
        LevelFilter::Debug
    } else {
        level_for(settings.debug_enabled())
    };
    init_logging(level).map_err(|e| CliError::Logging(format!("{e:?}")))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(serve(settings, duration_secs.map(Duration::from_secs), offline))
}

async fn serve(
    settings: Settings,
    duration: Option<Duration>,
    offline: bool,
) -> Result<(), CliError> {
    if settings.surfaces.is_empty() {
        return Err(CliError::NoSurfaces);
    }

    let network = Arc::new(NetworkSwitch::new(!offline));
    let service = AdService::with_http(&settings, network);

    let mut ids = Vec::new();
    let mut tasks = Vec::new();
    for surface in &settings.surfaces {
        let label = format!(
            "{}/{}",
            surface.normalized_account_id(),
            surface.normalized_campaign_id()
        );
        let mut controller = service
            .attach(
                surface,
                Box::new(LogRenderer::new(label.clone())),
                Arc::new(LogLinks),
            )
            .map_err(|e| CliError::Attach {
                surface: label,
                reason: format!("{e:?}"),
            })?;
        controller.show_initial();
        ids.push(controller.id());
        tasks.push(tokio::spawn(async move { controller.run().await }));
    }
    log::info!("Running {} surfaces", ids.len());

    match duration {
        Some(duration) => {
            tokio::select! {
                () = tokio::time::sleep(duration) => {}
                result = tokio::signal::ctrl_c() => result.map_err(CliError::Runtime)?,
            }
        }
        None => tokio::signal::ctrl_c().await.map_err(CliError::Runtime)?,
    }

    log::info!("Shutting down");
    for id in ids.into_iter().rev() {
        service.detach(id, true);
    }
    service.shutdown().await;
    for task in tasks {
        if let Err(err) = task.await {
            log::warn!("Surface task ended abnormally: {}", err);
        }
    }
    Ok(())
}
