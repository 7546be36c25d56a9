//! Files attached to a user message.
//!
//! Images travel inline as `data:` URLs in an `image_url` content part. PDFs
//! arrive with their text already extracted and are folded into the message
//! text under a `[PDF: name (N pages)]` header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use muz_types::{ContentPart, ImageUrl, MessageContent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Image {
        file_name: String,
        /// Must be an `image/*` type.
        mime: String,
        bytes: Vec<u8>,
    },
    Pdf {
        file_name: String,
        pages: u32,
        text: String,
    },
}

/// What the conversation remembers about an attachment once it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentInfo {
    Image { file_name: String },
    Pdf { file_name: String, pages: u32 },
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        matches!(self, Attachment::Image { .. })
    }

    pub fn info(&self) -> AttachmentInfo {
        match self {
            Attachment::Image { file_name, .. } => AttachmentInfo::Image {
                file_name: file_name.clone(),
            },
            Attachment::Pdf {
                file_name, pages, ..
            } => AttachmentInfo::Pdf {
                file_name: file_name.clone(),
                pages: *pages,
            },
        }
    }

    /// `data:<mime>;base64,<payload>` for images, `None` for PDFs.
    pub fn data_url(&self) -> Option<String> {
        match self {
            Attachment::Image { mime, bytes, .. } => {
                Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
            }
            Attachment::Pdf { .. } => None,
        }
    }

    /// Rejects images whose declared type is not `image/*`.
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Attachment::Image {
                file_name, mime, ..
            } if !mime.starts_with("image/") => Err(format!(
                "{file_name} is not an image ({mime}); only image files can be attached as images"
            )),
            _ => Ok(()),
        }
    }
}

impl AttachmentInfo {
    pub fn file_name(&self) -> &str {
        match self {
            AttachmentInfo::Image { file_name } | AttachmentInfo::Pdf { file_name, .. } => {
                file_name
            }
        }
    }
}

/// Build the user message content from the typed text and its attachments.
///
/// PDF text is prepended in attachment order; any image turns the content
/// into parts with the text first.
pub(crate) fn compose_content(text: &str, attachments: &[Attachment]) -> MessageContent {
    let mut body = String::new();
    for attachment in attachments {
        if let Attachment::Pdf {
            file_name,
            pages,
            text: pdf_text,
        } = attachment
        {
            body.push_str(&format!("[PDF: {file_name} ({pages} pages)]\n{pdf_text}\n\n"));
        }
    }
    body.push_str(text);

    let images: Vec<ContentPart> = attachments
        .iter()
        .filter_map(Attachment::data_url)
        .map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url },
        })
        .collect();

    if images.is_empty() {
        return MessageContent::Text(body);
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    if !body.is_empty() {
        parts.push(ContentPart::Text { text: body });
    }
    parts.extend(images);
    MessageContent::Parts(parts)
}
