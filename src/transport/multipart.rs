//! multipart/form-data encoding for the pose upload.
//!
//! Part headers are written Content-Type first, Content-Disposition last, and
//! the boundary is always 40 characters. The pose service slices the JPEG out
//! of the raw body at fixed offsets: it starts 4 bytes after the filename's
//! extension quote and ends 48 bytes before the end of the body
//! (`\r\n--` + boundary + `--\r\n`).

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Boundary length the pose service depends on.
pub const BOUNDARY_LEN: usize = 40;

enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

/// A multipart/form-data body under construction.
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    /// New form with a random boundary.
    pub fn new() -> Self {
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(BOUNDARY_LEN)
            .map(char::from)
            .collect();
        Self {
            boundary,
            parts: Vec::new(),
        }
    }

    /// New form with a caller-chosen boundary.
    ///
    /// The boundary must not occur inside any part and should be
    /// `BOUNDARY_LEN` characters long for the pose service.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: Vec<u8>) -> Self {
        self.parts.push(Part::File {
            name: name.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            data,
        });
        self
    }

    /// Value for the request's Content-Type header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn into_body(self) -> Vec<u8> {
        let mut body = Vec::new();
        for part in self.parts {
            body.extend_from_slice(b"--");
            body.extend_from_slice(self.boundary.as_bytes());
            body.extend_from_slice(b"\r\n");
            match part {
                Part::Text { name, value } => {
                    body.extend_from_slice(b"Content-Type: text/plain; charset=\"utf-8\"\r\n");
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!("Content-Type: {}\r\n", content_type).as_bytes(),
                    );
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                            name, filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--");
        body.extend_from_slice(self.boundary.as_bytes());
        body.extend_from_slice(b"--\r\n");
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn boundary_has_fixed_length() {
        let form = MultipartForm::new();
        assert_eq!(form.boundary().len(), BOUNDARY_LEN);
        assert!(form.content_type().ends_with(form.boundary()));
    }

    #[test]
    fn body_contains_both_fields() {
        let form = MultipartForm::new()
            .text("message", "rotationZ90,")
            .file("file", "upload.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let boundary = form.boundary().to_string();
        let body = form.into_body();

        assert!(body.starts_with(format!("--{}\r\n", boundary).as_bytes()));
        assert!(find(&body, b"name=\"message\"\r\n\r\nrotationZ90,\r\n").is_some());
        assert!(find(&body, b"Content-Type: image/jpeg\r\n").is_some());
        assert!(find(&body, b"filename=\"upload.jpg\"").is_some());
    }

    #[test]
    fn jpeg_sits_at_service_offsets() {
        let jpeg = vec![0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9];
        let body = MultipartForm::with_boundary("b".repeat(BOUNDARY_LEN))
            .text("message", "m,")
            .file("file", "upload.jpg", "image/jpeg", jpeg.clone())
            .into_body();

        let start = find(&body, b"jpg").unwrap() + 4 + 4;
        let end = body.len() - 48;
        assert_eq!(&body[start..end], jpeg.as_slice());
    }
}
