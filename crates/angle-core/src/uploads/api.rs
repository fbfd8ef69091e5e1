//! Upload endpoint client.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::{Image, ImageId, ImageOwner, ItemId};
use crate::session::{parse_api_error, ApiSession};
use crate::validation::FileSelection;

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Upload progress callback, called with a percentage.
pub type UploadProgress = Arc<dyn Fn(u8) + Send + Sync>;

/// Server operations behind the image manager.
pub trait UploadApi: Send + Sync + 'static {
    fn upload(
        &self,
        owner: ImageOwner,
        file: FileSelection,
        progress: UploadProgress,
    ) -> impl Future<Output = Result<Image>> + Send;

    fn delete(&self, image_id: ImageId) -> impl Future<Output = Result<()>> + Send;

    /// Persist a new order; `image_ids` lists every image of the item.
    fn reorder(
        &self,
        item_id: ItemId,
        image_ids: Vec<ImageId>,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    image: Image,
}

/// [`UploadApi`] over the `/uploads` endpoints.
#[derive(Debug, Clone)]
pub struct HttpUploadApi {
    session: ApiSession,
}

impl HttpUploadApi {
    pub const fn new(session: ApiSession) -> Self {
        Self { session }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api(parse_api_error(status, &body)))
    }
}

impl UploadApi for HttpUploadApi {
    async fn upload(
        &self,
        owner: ImageOwner,
        file: FileSelection,
        progress: UploadProgress,
    ) -> Result<Image> {
        let size = file.size();
        let body = reqwest::Body::wrap_stream(progress_stream(file.bytes, progress));
        let part = Part::stream_with_length(body, size)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new()
            .text("owner_type", owner.owner_type().as_str())
            .text("owner_id", owner.owner_id())
            .part("file", part);

        let request = self
            .session
            .client()
            .post(self.session.endpoint("/uploads"))
            .multipart(form);
        let response = self.session.authorize(request).send().await?;
        let response = Self::check(response).await?;
        let UploadResponse { image } = response.json().await?;
        tracing::info!(%owner, image_id = %image.id, file = %file.name, "Uploaded image");
        Ok(image)
    }

    async fn delete(&self, image_id: ImageId) -> Result<()> {
        let request = self
            .session
            .client()
            .delete(self.session.endpoint(&format!("/uploads/{image_id}")));
        let response = self.session.authorize(request).send().await?;
        Self::check(response).await?;
        tracing::info!(%image_id, "Deleted image");
        Ok(())
    }

    async fn reorder(&self, item_id: ItemId, image_ids: Vec<ImageId>) -> Result<()> {
        let request = self
            .session
            .client()
            .patch(self.session.endpoint("/uploads/reorder"))
            .json(&json!({ "item_id": item_id, "image_ids": image_ids }));
        let response = self.session.authorize(request).send().await?;
        Self::check(response).await?;
        tracing::debug!(%item_id, "Persisted image order");
        Ok(())
    }
}

/// Chunk `bytes` into a body stream that reports how much has been handed to
/// the transport.
fn progress_stream(
    bytes: Bytes,
    progress: UploadProgress,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let total = bytes.len();
    let chunks: Vec<Bytes> = (0..total)
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_BYTES).min(total)))
        .collect();
    let mut sent = 0usize;
    futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len();
        progress(percent(sent, total));
        Ok(chunk)
    })
}

#[allow(clippy::cast_possible_truncation)]
fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (sent.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::models::UserId;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn api_for(server: &mockito::Server) -> HttpUploadApi {
        let config = ClientConfig::new(server.url()).unwrap();
        HttpUploadApi::new(ApiSession::new(config, Some("tok".to_string())).unwrap())
    }

    #[tokio::test]
    async fn progress_stream_reports_increasing_percentages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let progress: UploadProgress = {
            let seen = Arc::clone(&seen);
            Arc::new(move |percent| seen.lock().unwrap().push(percent))
        };
        let bytes = Bytes::from(vec![0u8; UPLOAD_CHUNK_BYTES * 2 + 10]);
        let chunks: Vec<_> = progress_stream(bytes, progress).collect().await;

        assert_eq!(chunks.len(), 3);
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn upload_posts_multipart_with_owner_fields() {
        let mut server = mockito::Server::new_async().await;
        let owner = ImageOwner::UserAvatar(
            "0190f2a4-6c1e-7a3b-9d1e-000000000009".parse::<UserId>().unwrap(),
        );
        let mock = server
            .mock("POST", "/uploads")
            .match_header("x-csrf-token", "tok")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data; boundary=.*".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("name=\"owner_type\"\r\n\r\nuser_avatar".to_string()),
                Matcher::Regex("filename=\"me.png\"".to_string()),
            ]))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"image": {"id": "0190f2a4-6c1e-7a3b-9d1e-000000000001", "position": 0,
                    "variants": {"thumbnail": "https://cdn/t.png"}}}"#,
            )
            .create_async()
            .await;

        let file = FileSelection::new("me.png", None, vec![1u8; 32]);
        let image = api_for(&server)
            .upload(owner, file, Arc::new(|_| {}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(image.variant_url("thumbnail"), Some("https://cdn/t.png"));
    }

    #[tokio::test]
    async fn failed_delete_surfaces_server_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/uploads/0190f2a4-6c1e-7a3b-9d1e-000000000001")
            .with_status(403)
            .with_body(r#"{"error": "not your image"}"#)
            .create_async()
            .await;

        let error = api_for(&server)
            .delete("0190f2a4-6c1e-7a3b-9d1e-000000000001".parse().unwrap())
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "API error: not your image (403)");
    }

    #[tokio::test]
    async fn reorder_patches_ordered_ids() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/uploads/reorder")
            .match_body(Matcher::Json(json!({
                "item_id": "0190f2a4-6c1e-7a3b-9d1e-000000000003",
                "image_ids": [
                    "0190f2a4-6c1e-7a3b-9d1e-000000000002",
                    "0190f2a4-6c1e-7a3b-9d1e-000000000001"
                ]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        api_for(&server)
            .reorder(
                "0190f2a4-6c1e-7a3b-9d1e-000000000003".parse().unwrap(),
                vec![
                    "0190f2a4-6c1e-7a3b-9d1e-000000000002".parse().unwrap(),
                    "0190f2a4-6c1e-7a3b-9d1e-000000000001".parse().unwrap(),
                ],
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
