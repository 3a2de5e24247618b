use {
    anyhow::Result,
    tokio::sync::broadcast::error::RecvError,
    tracing::{info, warn},
};

use {
    wabridge_config::WabridgeConfig,
    wabridge_whatsapp::{ACK_READ, InboundEvent, InboundMessage, Session},
};

/// Log inbound messages and read receipts until Ctrl+C.
pub async fn handle_receive(config: &WabridgeConfig) -> Result<()> {
    let session = Session::with_sidecar(&config.whatsapp);
    // Subscribe first so nothing that arrives during startup is missed.
    let mut events = session.subscribe();

    let outcome = async {
        info!("initializing WhatsApp client");
        session.initialize().await?;
        info!("waiting for authentication");
        session.wait_for_ready(None).await?;
        info!("client ready, listening for messages (Ctrl+C to stop)");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(InboundEvent::Message(message)) => log_message(&message),
                    Ok(InboundEvent::Ack { message_id, ack }) if ack == ACK_READ => {
                        info!(message_id, "message read");
                    },
                    Ok(InboundEvent::Ack { .. }) => {},
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "receiver fell behind, events dropped");
                    },
                    Err(RecvError::Closed) => break,
                },
            }
        }
        anyhow::Ok(())
    }
    .await;

    info!("stopping client");
    if let Err(e) = session.destroy().await {
        warn!(error = %e, "session teardown failed");
    }
    outcome
}

fn log_message(message: &InboundMessage) {
    info!(
        from = message.sender_name.as_deref().unwrap_or(message.sender_number()),
        number = message.sender_number(),
        chat = message.chat_name.as_deref().unwrap_or("Individual"),
        time = %format_timestamp(message.timestamp),
        "new message: {}",
        message.body
    );
    if let Some(media) = &message.media {
        info!(
            mimetype = %media.mimetype,
            filename = media.filename.as_deref().unwrap_or("N/A"),
            "message has media"
        );
    }
}

/// RFC 3339 for a unix timestamp, or the raw number when out of range.
fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_as_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }
}
