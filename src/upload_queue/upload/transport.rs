//! Multipart POST transport to the inbox server.
//!
//! A transfer only counts as confirmed when the response body carries the
//! confirmation marker line for the uploaded file; a bare HTTP 200 is not enough.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use crate::error::GeoCamError;
use crate::upload_queue::types::{STATUS_OK, STATUS_TRANSPORT_ERROR, STATUS_UNCONFIRMED};

/// Prefix of the success line the inbox writes for each stored file.
pub const CONFIRMATION_MARKER: &str = "GEOCAM_SHARE_POSTED";

const CONNECT_TIMEOUT_SECS: u64 = 15;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub url: String,
    pub form_fields: BTreeMap<String, String>,
    pub file_field_name: String,
    pub file_name: String,
    pub file_bytes: Vec<u8>,
    pub credentials: Option<Credentials>,
}

/// Performs one transfer and reports an HTTP-equivalent status code:
/// `200` confirmed, `STATUS_UNCONFIRMED`, `STATUS_TRANSPORT_ERROR`, or the
/// raw HTTP status.
pub trait UploadTransport: Send + Sync + 'static {
    fn post(&self, request: UploadRequest) -> impl Future<Output = i32> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, GeoCamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    async fn send(&self, request: UploadRequest) -> Result<i32, GeoCamError> {
        let UploadRequest {
            url,
            form_fields,
            file_field_name,
            file_name,
            file_bytes,
            credentials,
        } = request;

        let mut form = Form::new();
        for (name, value) in form_fields {
            form = form.text(name, value);
        }

        let part = Part::bytes(file_bytes)
            .file_name(file_name.clone())
            .mime_str(guess_mime(&file_name))?;
        form = form.part(file_field_name, part);

        let mut builder = self.client.post(&url).multipart(form);
        if let Some(credentials) = &credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = builder.send().await?;
        let status = i32::from(response.status().as_u16());
        let body = response.text().await?;

        debug!(url = %url, file = %file_name, status, "Inbox responded");
        Ok(interpret_response(status, &body, &file_name))
    }
}

impl UploadTransport for HttpTransport {
    async fn post(&self, request: UploadRequest) -> i32 {
        let file_name = request.file_name.clone();
        match self.send(request).await {
            Ok(status) => status,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Upload transfer failed");
                STATUS_TRANSPORT_ERROR
            }
        }
    }
}

/// Map an HTTP status and body to the transport status code.
pub fn interpret_response(status: i32, body: &str, file_name: &str) -> i32 {
    if status != STATUS_OK {
        return status;
    }
    if is_confirmed(body, file_name) {
        STATUS_OK
    } else {
        STATUS_UNCONFIRMED
    }
}

/// True when `body` has a `GEOCAM_SHARE_POSTED <file_name>` line.
pub fn is_confirmed(body: &str, file_name: &str) -> bool {
    body.lines().any(|line| {
        line.trim()
            .strip_prefix(CONFIRMATION_MARKER)
            .and_then(|rest| rest.strip_prefix(char::is_whitespace))
            .map(str::trim)
            == Some(file_name)
    })
}

fn guess_mime(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
