//! Attachment classification.

use crate::common::types::AttachmentKind;
use crate::config::types::AttachmentIcons;

/// Map a MIME type to an attachment kind.
///
/// `None` means the message carries no attachment. Images flagged as
/// stickers by the origin platform are stickers.
pub fn classify(mime_type: Option<&str>, is_sticker: bool) -> Option<AttachmentKind> {
    let mime_type = mime_type?.trim();
    if mime_type.is_empty() {
        return None;
    }

    let category = mime_type
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let kind = match category.as_str() {
        "audio" => AttachmentKind::Audio,
        "image" if is_sticker => AttachmentKind::Sticker,
        "image" => AttachmentKind::Image,
        "video" => AttachmentKind::Video,
        _ => AttachmentKind::Document,
    };
    Some(kind)
}

/// Text prefix announcing an attachment on the platform without inline
/// attachment rendering.
pub fn icon(icons: &AttachmentIcons, kind: Option<AttachmentKind>) -> &str {
    match kind {
        Some(kind) => icons.for_kind(kind),
        None => "",
    }
}

/// Filename used when the origin platform did not provide one.
pub fn default_filename(mime_type: Option<&str>) -> String {
    format!("file.{}", extension(mime_type.unwrap_or_default()))
}

fn extension(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" => "jpeg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "video/mp4" => "mp4",
        "video/3gpp" => "3gp",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "text/plain" => "txt",
        _ => "bin",
    }
}
