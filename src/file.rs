use http::header::HeaderMap;
use mime::Mime;

use crate::length::{ByteLength, TruncateStream};

/// Metadata the wire parser reports alongside a file event.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    pub filename: Option<String>,
    pub content_type: Option<Mime>,
    pub encoding: Option<String>,
}

impl FileInfo {
    /// Builds file metadata from a part's headers.
    pub fn from_part_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok());

        let filename = headers
            .get(http::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);

        let encoding = headers
            .get("content-transfer-encoding")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string());

        FileInfo {
            filename,
            content_type,
            encoding,
        }
    }
}

/// Extracts the filename parameter from a Content-Disposition value.
fn disposition_filename(value: &str) -> Option<String> {
    for param in value.split(';') {
        let mut parts = param.splitn(2, '=');

        let key = match parts.next() {
            Some(k) => k.trim(),
            None => continue,
        };

        if key.eq_ignore_ascii_case("filename") {
            return parts.next().map(|v| v.trim().trim_matches('"').to_string());
        }
    }

    None
}

/// One file yielded by the sequence, in upstream order.
pub struct FileEntry {
    pub field: String,
    pub info: FileInfo,
    pub data: FileData,
}

/// What became of a file's bytes.
pub enum FileData {
    /// The file was admitted; its bytes flow through the truncating stream
    /// and the outcome settles at end of input.
    Processed {
        stream: TruncateStream,
        byte_length: ByteLength,
    },
    /// The file was declined by the per-field count policy; its bytes are
    /// drained off the wire and discarded.
    Skipped,
}

impl FileEntry {
    pub fn is_skipped(&self) -> bool {
        match self.data {
            FileData::Skipped => true,
            FileData::Processed { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};

    #[test]
    fn parses_the_disposition_filename() {
        let tests = [
            (
                "form-data; name=\"photo\"; filename=\"cat.jpg\"",
                Some("cat.jpg"),
            ),
            ("form-data; name=\"photo\"", None),
            ("form-data; filename=unquoted.bin", Some("unquoted.bin")),
        ];

        for (value, expected) in &tests {
            assert_eq!(
                disposition_filename(value),
                expected.map(|s| s.to_string()),
                "disposition: {}",
                value
            );
        }
    }

    #[test]
    fn builds_info_from_part_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("form-data; name=\"photo\"; filename=\"cat.jpg\""),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));

        let info = FileInfo::from_part_headers(&headers);

        assert_eq!(info.filename.as_ref().unwrap(), "cat.jpg");
        assert_eq!(info.content_type.unwrap(), mime::IMAGE_JPEG);
        assert!(info.encoding.is_none());
    }
}
