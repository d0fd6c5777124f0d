// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment uploads to the platform's storage endpoint.
//!
//! Uploads are scheduled fire-and-forget while a query is being answered
//! and tracked in a per-message pending table. The streaming driver drains
//! the table entry before finalising the response, so an entry never
//! outlives the query it belongs to.

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

use botwire_core::BotwireError;

/// Platform endpoint accepting third-party attachment uploads.
pub const ATTACHMENT_UPLOAD_URL: &str =
    "https://www.quora.com/poe_api/file_attachment_3RD_PARTY_POST";

/// Successful upload result.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentUploadResponse {
    pub inline_ref: Option<String>,
    pub attachment_url: Option<String>,
}

type UploadTask = JoinHandle<Result<AttachmentUploadResponse, BotwireError>>;

/// Schedules attachment uploads and tracks them per message until the
/// owning query response drains them.
pub struct AttachmentUploader {
    http: reqwest::Client,
    access_key: String,
    url: String,
    pending: DashMap<String, Vec<UploadTask>>,
}

impl std::fmt::Debug for AttachmentUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentUploader")
            .field("access_key", &"[redacted]")
            .field("url", &self.url)
            .field("pending_messages", &self.pending.len())
            .finish()
    }
}

impl AttachmentUploader {
    pub fn new(access_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_key: access_key.into(),
            url: ATTACHMENT_UPLOAD_URL.to_string(),
            pending: DashMap::new(),
        }
    }

    /// Overrides the upload endpoint, e.g. for tests.
    pub fn with_upload_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Schedules an upload the platform fetches from `download_url`. The
    /// task is drained when the response for `message_id` finishes.
    pub fn post_message_attachment(
        &self,
        message_id: &str,
        download_url: &str,
        is_inline: bool,
    ) {
        let http = self.http.clone();
        let key = self.access_key.clone();
        let url = self.url.clone();
        let body = json!({
            "message_id": message_id,
            "is_inline": is_inline,
            "download_url": download_url,
        });
        self.track(
            message_id,
            tokio::spawn(async move {
                let builder = http.post(&url).header("authorization", &key).json(&body);
                finish_upload(builder).await
            }),
        );
    }

    /// Schedules a multipart upload of in-memory file contents.
    pub fn post_message_attachment_bytes(
        &self,
        message_id: &str,
        file_name: &str,
        contents: Vec<u8>,
        is_inline: bool,
    ) {
        let http = self.http.clone();
        let key = self.access_key.clone();
        let url = self.url.clone();
        let message_id_owned = message_id.to_string();
        let file_name = file_name.to_string();
        self.track(
            message_id,
            tokio::spawn(async move {
                let part = reqwest::multipart::Part::bytes(contents).file_name(file_name);
                let form = reqwest::multipart::Form::new()
                    .part("file", part)
                    .text("message_id", message_id_owned)
                    .text("is_inline", is_inline.to_string());
                let builder = http
                    .post(&url)
                    .header("authorization", &key)
                    .multipart(form);
                finish_upload(builder).await
            }),
        );
    }

    fn track(&self, message_id: &str, task: UploadTask) {
        self.pending
            .entry(message_id.to_string())
            .or_default()
            .push(task);
    }

    /// Awaits every pending upload for `message_id` and removes the table
    /// entry. The first failure is returned after all tasks settle.
    pub async fn drain(&self, message_id: &str) -> Result<(), BotwireError> {
        let Some((_, tasks)) = self.pending.remove(message_id) else {
            return Ok(());
        };
        debug!(message_id, count = tasks.len(), "draining attachment uploads");

        let mut first_error = None;
        for task in tasks {
            let outcome = match task.await {
                Ok(result) => result.map(|_| ()),
                Err(join_error) => Err(BotwireError::AttachmentUpload {
                    message: format!("upload task failed: {join_error}"),
                    source: None,
                }),
            };
            if let Err(error) = outcome {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of in-flight uploads for a message.
    pub fn pending_count(&self, message_id: &str) -> usize {
        self.pending
            .get(message_id)
            .map(|tasks| tasks.len())
            .unwrap_or(0)
    }
}

async fn finish_upload(
    builder: reqwest::RequestBuilder,
) -> Result<AttachmentUploadResponse, BotwireError> {
    let response = builder
        .send()
        .await
        .map_err(|error| BotwireError::AttachmentUpload {
            message: format!("upload request failed: {error}"),
            source: Some(Box::new(error)),
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(BotwireError::AttachmentUpload {
            message: format!("attachment endpoint returned HTTP {status}"),
            source: None,
        });
    }
    response
        .json::<AttachmentUploadResponse>()
        .await
        .map_err(|error| BotwireError::AttachmentUpload {
            message: format!("malformed upload response: {error}"),
            source: Some(Box::new(error)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn upload_sends_bare_access_key_and_drains() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "k-1"))
            .and(body_partial_json(json!({
                "message_id": "m1",
                "is_inline": false,
                "download_url": "https://example.com/file.pdf"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "inline_ref": null,
                "attachment_url": "https://cdn.example.com/file.pdf"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = AttachmentUploader::new("k-1").with_upload_url(server.uri());
        uploader.post_message_attachment("m1", "https://example.com/file.pdf", false);
        assert_eq!(uploader.pending_count("m1"), 1);

        uploader.drain("m1").await.unwrap();
        assert_eq!(uploader.pending_count("m1"), 0);
    }

    #[tokio::test]
    async fn failed_upload_surfaces_on_drain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let uploader = AttachmentUploader::new("k-1").with_upload_url(server.uri());
        uploader.post_message_attachment("m1", "https://example.com/file.pdf", true);

        let error = uploader.drain("m1").await.unwrap_err();
        assert!(matches!(error, BotwireError::AttachmentUpload { .. }));
        // The entry is gone even though the upload failed.
        assert_eq!(uploader.pending_count("m1"), 0);
    }

    #[tokio::test]
    async fn drain_without_entry_is_a_no_op() {
        let uploader = AttachmentUploader::new("k-1");
        uploader.drain("never-seen").await.unwrap();
    }

    #[tokio::test]
    async fn multipart_upload_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "k-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "inline_ref": "ref-1",
                "attachment_url": "https://cdn.example.com/a.txt"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uploader = AttachmentUploader::new("k-2").with_upload_url(server.uri());
        uploader.post_message_attachment_bytes("m2", "a.txt", b"hello".to_vec(), true);
        uploader.drain("m2").await.unwrap();
    }
}
