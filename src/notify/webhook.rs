//! Webhook delivery of failure events.

use reqwest::blocking::Client;

use super::NotificationEvent;

/// POSTs the event as a JSON object. Besides the event fields the payload
/// carries a `text` line so chat-ops receivers render something readable
/// without a template. The response status is not acted upon; delivery is
/// best-effort.
pub(crate) fn post_event(
    client: &Client,
    url: &str,
    event: &NotificationEvent,
) -> Result<(), reqwest::Error> {
    let payload = payload_for(event);
    let response = client.post(url).json(&payload).send()?;
    log::debug!(
        target: "notify::webhook",
        "webhook for connection {} answered {}",
        event.connection_id,
        response.status()
    );
    Ok(())
}

fn payload_for(event: &NotificationEvent) -> serde_json::Value {
    let mut payload = serde_json::to_value(event).unwrap_or_default();
    if let serde_json::Value::Object(map) = &mut payload {
        map.insert(
            "text".to_string(),
            serde_json::Value::String(event.webhook_text()),
        );
    }
    payload
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
