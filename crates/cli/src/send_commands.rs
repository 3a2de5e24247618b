use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result, bail},
    clap::Subcommand,
    tracing::{info, warn},
};

use {
    wabridge_config::WabridgeConfig,
    wabridge_whatsapp::{MessageDescriptor, Session, get_chat_id},
};

/// WhatsApp rejects videos above roughly this size.
pub const VIDEO_SIZE_LIMIT: u64 = 16 * 1024 * 1024;

#[derive(Subcommand)]
pub enum SendAction {
    /// Send a text message.
    SendText {
        /// Phone number in any format; non-digits are ignored.
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        message: String,
    },
    /// Send an image from disk.
    SendImage {
        #[arg(long)]
        to: String,
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Send a video from disk.
    SendVideo {
        #[arg(long)]
        to: String,
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        caption: Option<String>,
    },
}

/// Bring a session up, send once, and tear it down whatever the outcome.
pub async fn handle_send(config: &WabridgeConfig, action: SendAction) -> Result<()> {
    let session = Session::with_sidecar(&config.whatsapp);
    let outcome = send(&session, action).await;
    if let Err(e) = session.destroy().await {
        warn!(error = %e, "session teardown failed");
    }

    let sent = outcome?;
    println!("Message ID: {}", sent.id);
    Ok(())
}

async fn send(session: &Session, action: SendAction) -> Result<MessageDescriptor> {
    info!("initializing WhatsApp client");
    session.initialize().await?;
    info!("waiting for authentication");
    session.wait_for_ready(None).await?;

    let sent = match action {
        SendAction::SendText { to, message } => {
            let chat_id = get_chat_id(&to);
            info!(chat_id, "sending text message");
            session.send_text_message(&chat_id, &message).await?
        },
        SendAction::SendImage { to, path, caption } => {
            check_media_file(&path, None)?;
            let chat_id = get_chat_id(&to);
            info!(chat_id, path = %path.display(), "sending image");
            session
                .send_media(&chat_id, &path, caption.as_deref())
                .await?
        },
        SendAction::SendVideo { to, path, caption } => {
            check_media_file(&path, Some(VIDEO_SIZE_LIMIT))?;
            let chat_id = get_chat_id(&to);
            info!(chat_id, path = %path.display(), "sending video");
            session
                .send_media(&chat_id, &path, caption.as_deref())
                .await?
        },
    };
    Ok(sent)
}

/// Fail when the file is missing; warn when it exceeds `size_limit`.
/// Returns whether the limit was exceeded.
fn check_media_file(path: &Path, size_limit: Option<u64>) -> Result<bool> {
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }
    let size = std::fs::metadata(path)
        .with_context(|| format!("cannot stat {}", path.display()))?
        .len();

    match size_limit {
        Some(limit) if size > limit => {
            warn!(
                path = %path.display(),
                size_mb = size / (1024 * 1024),
                limit_mb = limit / (1024 * 1024),
                "file is larger than WhatsApp accepts, the send will likely fail"
            );
            Ok(true)
        },
        _ => Ok(false),
    }
}
