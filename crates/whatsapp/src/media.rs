//! Media payloads built from files on disk or from base64 supplied by callers.

use std::path::Path;

use {
    base64::{
        Engine as _, alphabet,
        engine::{
            DecodePaddingMode,
            general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        },
    },
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// MIME type assumed for base64 media when the caller gives none.
pub const DEFAULT_MIMETYPE: &str = "image/jpeg";

/// Accepts padded and unpadded input, as browsers' `atob` does.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Binary content plus the metadata the client needs to send it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub mimetype: String,
    /// Base64-encoded content.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl std::fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPayload")
            .field("mimetype", &self.mimetype)
            .field("data_len", &self.data.len())
            .field("filename", &self.filename)
            .field("caption", &self.caption)
            .finish()
    }
}

impl MediaPayload {
    /// Build from base64 text. A `data:<mime>;base64,` prefix is accepted
    /// and its MIME type is used unless `mimetype` is given explicitly.
    ///
    /// Line breaks and other ASCII whitespace are stripped and padding is
    /// optional; the normalized text is what gets forwarded.
    pub fn from_base64(
        mimetype: Option<&str>,
        data: &str,
        filename: Option<String>,
    ) -> Result<Self> {
        let (uri_mime, data) = split_data_uri(data.trim());
        let data: String = data
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if data.is_empty() {
            return Err(Error::media("empty base64 data"));
        }
        LENIENT
            .decode(&data)
            .map_err(|e| Error::media(format!("invalid base64 data: {e}")))?;

        let mimetype = mimetype
            .filter(|m| !m.is_empty())
            .or(uri_mime)
            .unwrap_or(DEFAULT_MIMETYPE)
            .to_string();

        Ok(Self {
            mimetype,
            data,
            filename,
            caption: None,
        })
    }

    /// Read a file and encode it. The MIME type is guessed from the
    /// extension and the file name is kept for the recipient.
    pub async fn from_file_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::media(format!("cannot read media file {}: {e}", path.display()))
        })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        Ok(Self {
            mimetype: mime_for_path(path).to_string(),
            data: STANDARD.encode(bytes),
            filename,
            caption: None,
        })
    }

    /// Attach a caption. Empty captions are dropped.
    #[must_use]
    pub fn with_caption(mut self, caption: Option<&str>) -> Self {
        self.caption = caption.filter(|c| !c.is_empty()).map(str::to_string);
        self
    }
}

fn split_data_uri(input: &str) -> (Option<&str>, &str) {
    let Some(rest) = input.strip_prefix("data:") else {
        return (None, input);
    };
    match rest.split_once(";base64,") {
        Some((mime, data)) => ((!mime.is_empty()).then_some(mime), data),
        None => (None, input),
    }
}

/// MIME type from a file extension.
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "3gp" => "video/3gpp",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" | "opus" => "audio/ogg",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
