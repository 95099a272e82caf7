use serde::Serialize;

use crate::constants::{CODE_EXTENSIONS, OFFICE_EXTENSIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewType {
    Image,
    Video,
    Audio,
    Pdf,
    Text,
    Code,
    Office,
    Unsupported,
}

impl PreviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewType::Image => "image",
            PreviewType::Video => "video",
            PreviewType::Audio => "audio",
            PreviewType::Pdf => "pdf",
            PreviewType::Text => "text",
            PreviewType::Code => "code",
            PreviewType::Office => "office",
            PreviewType::Unsupported => "unsupported",
        }
    }

    pub fn supports_preview(&self) -> bool {
        *self != PreviewType::Unsupported
    }
}

fn extension(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Rendering category for a file, by MIME type first, then by extension.
pub fn preview_type(mime: &str, name: &str) -> PreviewType {
    if mime.starts_with("image/") {
        return PreviewType::Image;
    }
    if mime.starts_with("video/") {
        return PreviewType::Video;
    }
    if mime.starts_with("audio/") {
        return PreviewType::Audio;
    }
    if mime == "application/pdf" {
        return PreviewType::Pdf;
    }
    if mime.starts_with("text/") {
        return PreviewType::Text;
    }

    let ext = extension(name);
    if OFFICE_EXTENSIONS.contains(ext.as_str()) {
        PreviewType::Office
    } else if CODE_EXTENSIONS.contains(ext.as_str()) {
        PreviewType::Code
    } else {
        PreviewType::Unsupported
    }
}
