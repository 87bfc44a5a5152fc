use tracing::debug;

use crate::config::Settings;
use crate::transport::{metadata_agent, USER_AGENT};

/// Best-effort error reporting to the configured webhook. Delivery is not
/// this crate's problem: every failure is swallowed after a debug log, and
/// the sink is skipped entirely unless the user opted in.
pub fn report_error(settings: &Settings, context: &str, message: &str) {
    if !settings.notifications {
        return;
    }
    let Some(webhook) = settings.error_webhook.as_deref() else {
        return;
    };
    let payload = serde_json::json!({
        "content": format!("Error in tacklebox ({context}):\n{message}"),
    });
    let result = metadata_agent()
        .post(webhook)
        .set("User-Agent", USER_AGENT)
        .send_json(payload);
    if let Err(err) = result {
        debug!("error report not delivered: {err}");
    }
}
