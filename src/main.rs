use kiosk_overlay::logging;
use kiosk_overlay::overlay::{OverlayCallbacks, OverlayHttpServer, OverlayStateManager};
use kiosk_overlay::settings::OverlaySettings;
use std::sync::Arc;

// Collaborators (assistant, scheduler, bus handlers) attach in the embedding
// process; standalone we only log what the display asked for.
fn logging_callbacks() -> OverlayCallbacks {
    OverlayCallbacks::new()
        .on_stop_request(|id| {
            tracing::info!(event_id = id, "stop requested");
            Ok(())
        })
        .on_snooze_request(|id, minutes| {
            tracing::info!(event_id = id, minutes, "snooze requested");
            Ok(())
        })
        .on_delay_reminder(|id, seconds| {
            tracing::info!(event_id = id, seconds, "reminder delay requested");
            Ok(())
        })
        .on_trigger_update(|| {
            tracing::info!("update requested");
            Ok(())
        })
}

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "overlay_settings.json".into());
    let settings = OverlaySettings::load(&path)?;
    logging::init(settings.debug_logging, settings.log_file_path());

    let clocks = settings.clock_configs();
    tracing::info!(count = clocks.len(), "configured overlay clocks");
    let state = Arc::new(OverlayStateManager::with_max_clocks(
        clocks,
        settings.max_clocks,
    ));
    state.set_change_listener(|change| {
        tracing::debug!(version = change.version, reason = %change.reason, "overlay updated");
    });

    let server = OverlayHttpServer::new(
        settings.server.clone(),
        settings.theme.clone(),
        Arc::clone(&state),
        logging_callbacks(),
    );
    server.start()?;

    loop {
        std::thread::park();
    }
}
