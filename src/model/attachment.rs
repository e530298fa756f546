//! Attachment descriptors.
//!
//! Descriptors are cheap; the payload is only fetched when the post
//! assembler imports the attachment.

use std::fmt;

/// How a MIME part wants to be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    /// Parse a `Content-Disposition` type. Anything else is not a file.
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "attachment" => Some(Self::Attachment),
            "inline" => Some(Self::Inline),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

/// Section number of a MIME part inside its message (`"2"`, `"1.3"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MimePartId(pub String);

impl fmt::Display for MimePartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file carried by a message.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentDescriptor {
    /// `attachment` or `inline`.
    pub disposition: Disposition,

    /// Primary MIME type (`"image"`, `"application"`).
    pub primary_type: String,

    /// Full MIME type (`"image/jpeg"`).
    pub mime_type: String,

    /// Where the part lives in the message.
    pub part_id: MimePartId,

    /// Filename. Synthesized as `{disposition}-{n}.{ext}` when the part has none.
    pub name: String,
}

impl AttachmentDescriptor {
    /// Whether the post assembler should import this part.
    ///
    /// Real attachments always qualify; inline parts only when they are images.
    pub fn is_importable(&self) -> bool {
        match self.disposition {
            Disposition::Attachment => true,
            Disposition::Inline => self.primary_type.eq_ignore_ascii_case("image"),
        }
    }

    /// Whether the file can become the post's featured image.
    pub fn is_featured_candidate(&self) -> bool {
        matches!(
            self.mime_type.to_ascii_lowercase().as_str(),
            "image/jpeg" | "image/jpg" | "image/png" | "image/gif"
        )
    }
}

/// Guess a file extension for a MIME type.
///
/// Used to name parts that arrive without a filename.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/tiff" => "tif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/x-icon" => "ico",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/3gpp" => "3gp",
        "audio/mpeg" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/amr" => "amr",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "text/plain" => "txt",
        "text/csv" => "csv",
        _ => "bin",
    }
}

/// Build a name for a part without a filename: `inline-1.jpg`.
pub fn synthesize_name(disposition: Disposition, counter: usize, mime_type: &str) -> String {
    format!(
        "{}-{counter}.{}",
        disposition.as_str(),
        extension_for(mime_type)
    )
}
