//! File delivery: header policy, preview classification and byte-range
//! streaming.

pub mod policy;
pub mod preview;

pub use policy::{
    archive_headers, mime_type_for, public_link_headers, share_file_headers, DeliveryHeaders,
    Intent,
};
pub use preview::{preview_type, PreviewType};

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};

/// Stream `file` with the delivery headers, honoring a single-range
/// `Range` request.
pub async fn stream_file(
    mut file: File,
    request_headers: &HeaderMap,
    delivery: &DeliveryHeaders,
) -> AppResult<Response> {
    let file_size = file.metadata().await?.len();

    let range_header = request_headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, delivery.content_type.as_str())
        .header(header::CONTENT_DISPOSITION, delivery.content_disposition.as_str())
        .header(header::CONTENT_SECURITY_POLICY, delivery.content_security_policy)
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")
        .header(header::ACCEPT_RANGES, "bytes");

    if let Some(frame_options) = delivery.frame_options {
        response = response.header(header::X_FRAME_OPTIONS, frame_options);
    }

    match parse_range(range_header, file_size)? {
        Some((start, end)) => {
            file.seek(std::io::SeekFrom::Start(start)).await?;

            let length = end - start + 1;
            let stream = ReaderStream::new(file.take(length));

            response
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, length)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, file_size),
                )
                .body(Body::from_stream(stream))
                .map_err(|e| AppError::Internal(e.to_string()))
        }
        None => {
            let stream = ReaderStream::new(file);

            response
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, file_size)
                .body(Body::from_stream(stream))
                .map_err(|e| AppError::Internal(e.to_string()))
        }
    }
}

/// Resolve a `Range` header against a file of `file_size` bytes.
///
/// `None` means serve the whole file: no header, another unit, several
/// ranges or unparseable bounds. A well-formed range that selects no byte
/// is an error.
pub fn parse_range(range_header: Option<&str>, file_size: u64) -> AppResult<Option<(u64, u64)>> {
    let Some(spec) = range_header.and_then(|s| s.trim().strip_prefix("bytes=")) else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return Ok(None);
    };

    let unsatisfiable = AppError::RangeNotSatisfiable { size: file_size };

    if first.is_empty() {
        // "-500" means the last 500 bytes
        let Ok(suffix_len) = last.parse::<u64>() else {
            return Ok(None);
        };
        if suffix_len == 0 || file_size == 0 {
            return Err(unsatisfiable);
        }
        return Ok(Some((file_size.saturating_sub(suffix_len), file_size - 1)));
    }

    let Ok(start) = first.parse::<u64>() else {
        return Ok(None);
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return Ok(None),
        }
    };

    if start >= file_size || end.is_some_and(|end| end < start) {
        return Err(unsatisfiable);
    }

    let end = end.map_or(file_size - 1, |end| end.min(file_size - 1));
    Ok(Some((start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(value: &str, size: u64) -> Option<(u64, u64)> {
        parse_range(Some(value), size).unwrap()
    }

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(range("bytes=0-1023", 4096), Some((0, 1023)));
        assert_eq!(range("bytes=1024-", 4096), Some((1024, 4095)));
        assert_eq!(range("bytes=-500", 4096), Some((3596, 4095)));
        assert_eq!(range("bytes=-9000", 4096), Some((0, 4095)));
        assert_eq!(range("bytes=100-99999", 4096), Some((100, 4095)));
    }

    #[test]
    fn test_parse_range_ignored_headers() {
        assert_eq!(parse_range(None, 10).unwrap(), None);
        assert_eq!(range("items=0-1", 10), None);
        assert_eq!(range("bytes=0-1,4-5", 10), None);
        assert_eq!(range("bytes=abc-", 10), None);
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        for (value, size) in [("bytes=10-", 10), ("bytes=5-2", 10), ("bytes=-0", 10), ("bytes=0-", 0)] {
            assert!(
                matches!(
                    parse_range(Some(value), size),
                    Err(AppError::RangeNotSatisfiable { .. })
                ),
                "{} over {} bytes should be unsatisfiable",
                value,
                size
            );
        }
    }
}
