//! `multipart/form-data` body builder.
//!
//! # Design
//! A `MultipartForm` collects string fields and file attachments, then
//! encodes them into one in-memory buffer the first time the content type,
//! size, bytes or a reader is asked for. The encoded buffer and its boundary
//! are cached together, so every accessor agrees with every other one and
//! attachment files are read once. Changing the form afterwards drops the
//! cache; the next access encodes again.
//!
//! Parts are written in a fixed order: fields, then attachments, each sorted
//! by field name.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, RpcError};

/// One file to stream into the body under `field_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub field_name: String,
    /// Name reported to the server in the part's `filename` parameter.
    pub file_name: String,
    pub file_path: PathBuf,
}

#[derive(Debug)]
struct BuiltForm {
    content_type: String,
    buffer: Arc<[u8]>,
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: BTreeMap<String, String>,
    attachments: BTreeMap<String, Attachment>,
    built: Option<BuiltForm>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any field or attachment of that name.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.attachments.remove(&name);
        self.fields.insert(name, value.into());
        self.built = None;
    }

    /// Attach the file at `file_path` as `name`, replacing any field or
    /// attachment of that name. The file is not opened until the form is built.
    pub fn add_attachment(
        &mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl AsRef<Path>,
    ) {
        let name = name.into();
        self.fields.remove(&name);
        let attachment = Attachment {
            field_name: name.clone(),
            file_name: file_name.into(),
            file_path: file_path.as_ref().to_path_buf(),
        };
        self.attachments.insert(name, attachment);
        self.built = None;
    }

    /// Drop whatever is registered under `name`. Removing an unknown name is a no-op.
    pub fn remove_field(&mut self, name: &str) {
        let removed = self.fields.remove(name).is_some() | self.attachments.remove(name).is_some();
        if removed {
            self.built = None;
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.get(name)
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Encode the form. A built form returns immediately without touching
    /// any file. On failure nothing is cached.
    pub fn build(&mut self) -> Result<()> {
        if self.built.is_some() {
            return Ok(());
        }

        let boundary = Uuid::new_v4().simple().to_string();
        let mut writer = PartWriter::new(Vec::new(), &boundary);

        for (name, value) in &self.fields {
            writer.write_field(name, value).map_err(encoding)?;
        }
        for attachment in self.attachments.values() {
            writer
                .begin_file(&attachment.field_name, &attachment.file_name)
                .map_err(encoding)?;
            let copied = copy_attachment(attachment, writer.get_mut())?;
            debug!("attached {} ({} bytes)", attachment.file_path.display(), copied);
        }
        let buffer = writer.finish().map_err(encoding)?;

        self.built = Some(BuiltForm {
            content_type: format!("multipart/form-data; boundary={boundary}"),
            buffer: buffer.into(),
        });
        Ok(())
    }

    /// `multipart/form-data; boundary=...` matching the encoded bytes.
    pub fn content_type(&mut self) -> Result<&str> {
        Ok(self.built()?.content_type.as_str())
    }

    pub fn size(&mut self) -> Result<usize> {
        Ok(self.built()?.buffer.len())
    }

    pub fn bytes(&mut self) -> Result<&[u8]> {
        Ok(&self.built()?.buffer[..])
    }

    /// A fresh reader over the encoded body. Readers share the cached buffer.
    pub fn reader(&mut self) -> Result<Cursor<Arc<[u8]>>> {
        Ok(Cursor::new(Arc::clone(&self.built()?.buffer)))
    }

    fn built(&mut self) -> Result<&BuiltForm> {
        self.build()?;
        self.built
            .as_ref()
            .ok_or_else(|| RpcError::Encoding("multipart form was not built".to_string()))
    }
}

fn encoding(err: io::Error) -> RpcError {
    RpcError::Encoding(format!("multipart writer: {err}"))
}

/// Stream one attachment into `out`. The file is closed when this returns,
/// whether or not the copy succeeded.
fn copy_attachment(attachment: &Attachment, out: &mut impl Write) -> Result<u64> {
    let io_error = |source| RpcError::Io {
        path: attachment.file_path.display().to_string(),
        source,
    };
    let mut file = File::open(&attachment.file_path).map_err(io_error)?;
    io::copy(&mut file, out).map_err(io_error)
}

/// Writes parts in the layout `--B\r\n<part>\r\n--B\r\n<part>\r\n--B--\r\n`.
struct PartWriter<'a, W: Write> {
    out: W,
    boundary: &'a str,
    parts: usize,
}

impl<'a, W: Write> PartWriter<'a, W> {
    fn new(out: W, boundary: &'a str) -> Self {
        Self { out, boundary, parts: 0 }
    }

    fn begin_part(&mut self, headers: &[String]) -> io::Result<()> {
        if self.parts == 0 {
            write!(self.out, "--{}\r\n", self.boundary)?;
        } else {
            write!(self.out, "\r\n--{}\r\n", self.boundary)?;
        }
        for header in headers {
            write!(self.out, "{header}\r\n")?;
        }
        self.out.write_all(b"\r\n")?;
        self.parts += 1;
        Ok(())
    }

    fn write_field(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.begin_part(&[format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(name)
        )])?;
        self.out.write_all(value.as_bytes())
    }

    /// Start a file part; the caller writes the content through `get_mut`.
    fn begin_file(&mut self, name: &str, file_name: &str) -> io::Result<()> {
        self.begin_part(&[
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                escape_quotes(name),
                escape_quotes(file_name)
            ),
            "Content-Type: application/octet-stream".to_string(),
        ])
    }

    fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    fn finish(mut self) -> io::Result<W> {
        if self.parts > 0 {
            self.out.write_all(b"\r\n")?;
        }
        write!(self.out, "--{}--\r\n", self.boundary)?;
        Ok(self.out)
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
