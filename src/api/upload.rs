//! `multipart/form-data` upload extraction.
//!
//! The server hands us the whole body, so multer is driven by a one-chunk
//! stream on the current coroutine.

use bytes::Bytes;
use futures::executor::block_on;
use futures::stream;

use crate::error::StockError;

/// Form field carrying the CSV upload.
pub const FILE_FIELD: &str = "file";

pub fn is_multipart(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// Bytes of the `field` part of a multipart body.
pub fn extract_field(content_type: &str, body: Vec<u8>, field: &str) -> Result<Vec<u8>, StockError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| StockError::validation(format!("invalid multipart request: {e}")))?;
    let chunks = stream::once(async move { Ok::<Bytes, std::io::Error>(Bytes::from(body)) });
    let mut multipart = multer::Multipart::new(chunks, boundary);

    block_on(read_field(&mut multipart, field))
}

async fn read_field(
    multipart: &mut multer::Multipart<'_>,
    field: &str,
) -> Result<Vec<u8>, StockError> {
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| StockError::validation(format!("invalid multipart body: {e}")))?
    {
        if part.name() == Some(field) {
            let data = part
                .bytes()
                .await
                .map_err(|e| StockError::validation(format!("unreadable upload: {e}")))?;
            return Ok(data.to_vec());
        }
    }
    Err(StockError::validation(format!("multipart field '{field}' is missing")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(boundary: &str, name: &str, content: &str) -> Vec<u8> {
        format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"{name}\"; filename=\"assets.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {content}\r\n\
             --{boundary}--\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_extracts_file_field() {
        let ct = "multipart/form-data; boundary=XyZ";
        assert!(is_multipart(Some(ct)));
        let data = extract_field(ct, body("XyZ", "file", "code\nSK\n"), FILE_FIELD).unwrap();
        assert_eq!(data, b"code\nSK\n");
    }

    #[test]
    fn test_missing_field_and_bad_boundary() {
        let ct = "multipart/form-data; boundary=XyZ";
        let err = extract_field(ct, body("XyZ", "other", "x"), FILE_FIELD).unwrap_err();
        assert!(matches!(err, StockError::Validation(_)));
        assert!(extract_field("multipart/form-data", Vec::new(), FILE_FIELD).is_err());
        assert!(!is_multipart(Some("application/json")));
        assert!(!is_multipart(None));
    }
}
