//! Response headers for file delivery, derived from the file name and the
//! caller's intent only.

const CSP_PDF: &str = "frame-ancestors 'self'; object-src 'none'";
const CSP_MEDIA: &str = "media-src 'self'; object-src 'none'";
const CSP_IMAGE: &str = "img-src 'self'; object-src 'none'";
const CSP_LOCKED_INLINE: &str = "default-src 'none'; script-src 'none'";
const CSP_SANDBOX_SAME_ORIGIN: &str = "sandbox allow-same-origin";
const CSP_SANDBOX: &str = "sandbox";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Download,
    Inline,
    Preview,
}

impl Intent {
    /// `download` defaults to true; `preview` only matters when it is off.
    pub fn from_flags(download: Option<&str>, preview: Option<&str>) -> Self {
        let download = download.map(flag).unwrap_or(true);
        let preview = preview.map(flag).unwrap_or(false);

        match (download, preview) {
            (true, _) => Intent::Download,
            (false, true) => Intent::Preview,
            (false, false) => Intent::Inline,
        }
    }
}

fn flag(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaClass {
    Pdf,
    AudioVideo,
    Image,
    Other,
}

fn media_class(mime: &str) -> MediaClass {
    if mime == "application/pdf" {
        MediaClass::Pdf
    } else if mime.starts_with("video/") || mime.starts_with("audio/") {
        MediaClass::AudioVideo
    } else if mime.starts_with("image/") {
        MediaClass::Image
    } else {
        MediaClass::Other
    }
}

pub fn mime_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHeaders {
    pub content_type: String,
    pub content_disposition: String,
    pub content_security_policy: &'static str,
    pub frame_options: Option<&'static str>,
}

/// Headers for a file fetched through its share.
pub fn share_file_headers(name: &str, intent: Intent) -> DeliveryHeaders {
    let content_type = mime_type_for(name);

    let (csp, inline) = match intent {
        Intent::Download => (CSP_SANDBOX, false),
        Intent::Inline => (CSP_SANDBOX_SAME_ORIGIN, true),
        Intent::Preview => match media_class(&content_type) {
            MediaClass::Pdf => (CSP_PDF, true),
            MediaClass::AudioVideo => (CSP_MEDIA, true),
            MediaClass::Image => (CSP_IMAGE, true),
            MediaClass::Other => (CSP_LOCKED_INLINE, true),
        },
    };

    build(name, content_type, csp, inline)
}

/// Headers for a file fetched through a public single-file link.
pub fn public_link_headers(name: &str, download: bool) -> DeliveryHeaders {
    let content_type = mime_type_for(name);

    let csp = if download {
        CSP_SANDBOX
    } else {
        match media_class(&content_type) {
            MediaClass::Pdf => CSP_PDF,
            MediaClass::AudioVideo => CSP_MEDIA,
            MediaClass::Image => CSP_IMAGE,
            MediaClass::Other => CSP_SANDBOX_SAME_ORIGIN,
        }
    };

    build(name, content_type, csp, !download)
}

/// Headers for a share's prebuilt archive.
pub fn archive_headers(share_id: &str) -> DeliveryHeaders {
    DeliveryHeaders {
        content_type: "application/zip".to_string(),
        content_disposition: content_disposition("attachment", &format!("{}.zip", share_id)),
        content_security_policy: CSP_SANDBOX,
        frame_options: None,
    }
}

fn build(name: &str, content_type: String, csp: &'static str, inline: bool) -> DeliveryHeaders {
    let kind = if inline { "inline" } else { "attachment" };

    DeliveryHeaders {
        content_type,
        content_disposition: content_disposition(kind, name),
        content_security_policy: csp,
        frame_options: (csp == CSP_PDF).then_some("SAMEORIGIN"),
    }
}

/// `Content-Disposition` value with an ASCII `filename` and, when the name
/// is not plain ASCII, an RFC 5987 `filename*`.
pub fn content_disposition(kind: &str, name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '?'
            }
        })
        .collect();

    if fallback == name {
        format!("{}; filename=\"{}\"", kind, name)
    } else {
        format!(
            "{}; filename=\"{}\"; filename*=UTF-8''{}",
            kind,
            fallback,
            urlencoding::encode(name)
        )
    }
}
