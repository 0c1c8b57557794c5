//! Multipart encoding of upload fields.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use volley_core::{FieldKind, TransferError, UploadField};

/// Build a multipart form from `fields`, reading file fields from disk.
///
/// Returns the form and the number of payload bytes it carries.
pub(crate) async fn build_form(fields: &[UploadField]) -> Result<(Form, u64), TransferError> {
    let mut form = Form::new();
    let mut payload = 0u64;

    for field in fields {
        match field.kind() {
            FieldKind::Text => {
                payload += field.value().len() as u64;
                form = form.text(field.key().to_string(), field.value().to_string());
            }
            FieldKind::File => {
                let bytes = tokio::fs::read(field.value()).await.map_err(|err| {
                    TransferError::UploadFile {
                        path: field.value().to_string(),
                        message: err.to_string(),
                    }
                })?;
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| base_name(field.value()));
                payload += bytes.len() as u64;
                form = form.part(field.key().to_string(), Part::bytes(bytes).file_name(file_name));
            }
        }
    }

    Ok((form, payload))
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
