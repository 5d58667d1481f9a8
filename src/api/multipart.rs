use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::stream;
use multer::{Constraints, Multipart, SizeLimit};

/// One `multipart/form-data` part, held in memory.
#[derive(Debug, Clone)]
pub(crate) struct Part {
    pub name: String,
    /// `Some("")` when the client sent a file field without choosing a file.
    pub filename: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub(crate) struct Form {
    parts: Vec<Part>,
}

impl Form {
    /// Parse a fully buffered body. Parts keep their upload order.
    pub fn parse(content_type: &str, body: &[u8], max_bytes: usize) -> Result<Self> {
        let boundary = multer::parse_boundary(content_type)
            .context("expected multipart/form-data with a boundary")?;
        let body = Bytes::copy_from_slice(body);
        let source = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
        let constraints =
            Constraints::new().size_limit(SizeLimit::new().whole_stream(max_bytes as u64));
        let mut multipart = Multipart::with_constraints(source, boundary, constraints);

        // The whole body is already in memory, so the stream never waits.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .context("failed to start multipart reader")?;
        let parts = runtime.block_on(async move {
            let mut parts = Vec::new();
            while let Some(field) = multipart.next_field().await? {
                let Some(name) = field.name().map(str::to_string) else {
                    continue;
                };
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                parts.push(Part {
                    name,
                    filename,
                    data,
                });
            }
            Ok::<_, multer::Error>(parts)
        })?;
        Ok(Self { parts })
    }

    /// File parts submitted under `name`, in upload order.
    pub fn files<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Part> + 'a {
        self.parts
            .iter()
            .filter(move |p| p.name == name && p.filename.is_some())
    }

    pub fn file<'a>(&'a self, name: &'a str) -> Option<&'a Part> {
        self.files(name).next()
    }

    /// Value of a plain (non-file) field, trimmed.
    pub fn text(&self, name: &str) -> Option<String> {
        self.parts
            .iter()
            .find(|p| p.name == name && p.filename.is_none())
            .map(|p| String::from_utf8_lossy(&p.data).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=XBOUNDARY";
    const LIMIT: usize = 1024 * 1024;

    fn body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, data) in parts {
            out.extend_from_slice(b"--XBOUNDARY\r\n");
            let disposition = match filename {
                Some(f) => format!("form-data; name=\"{}\"; filename=\"{}\"", name, f),
                None => format!("form-data; name=\"{}\"", name),
            };
            out.extend_from_slice(format!("Content-Disposition: {}\r\n", disposition).as_bytes());
            if filename.is_some() {
                out.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
            }
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--XBOUNDARY--\r\n");
        out
    }

    #[test]
    fn parses_files_and_text_fields() {
        let raw = body(&[
            ("images", Some("a.png"), b"\x89PNG\r\n\x1a\nrest".as_slice()),
            ("confidence", None, b" 0.4 ".as_slice()),
            ("images", Some("b.jpg"), b"jpegdata".as_slice()),
        ]);
        let form = Form::parse(CT, &raw, LIMIT).unwrap();

        let files: Vec<&Part> = form.files("images").collect();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename.as_deref(), Some("a.png"));
        assert_eq!(&files[0].data[..], b"\x89PNG\r\n\x1a\nrest");
        assert_eq!(&files[1].data[..], b"jpegdata");
        assert_eq!(form.text("confidence").as_deref(), Some("0.4"));
        assert!(form.file("image").is_none());
    }

    #[test]
    fn empty_filename_is_kept() {
        let raw = body(&[("image", Some(""), b"".as_slice())]);
        let form = Form::parse(CT, &raw, LIMIT).unwrap();
        let name = String::from("image");
        let part = form.file(&name).unwrap();
        assert_eq!(part.filename.as_deref(), Some(""));
    }

    #[test]
    fn rejects_non_multipart_and_truncated_bodies() {
        assert!(Form::parse("application/json", b"{}", LIMIT).is_err());
        assert!(Form::parse(
            CT,
            b"--XBOUNDARY\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nno end",
            LIMIT
        )
        .is_err());
    }

    #[test]
    fn body_above_limit_is_rejected() {
        let raw = body(&[("image", Some("a.png"), [0u8; 4096].as_slice())]);
        assert!(Form::parse(CT, &raw, 1024).is_err());
    }
}
