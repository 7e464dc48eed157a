// =============================================================================
// GOOGLE DRIVE + DOCS CLIENT
// =============================================================================
//
// Implements the pipeline's `DocumentApi` port over the REST endpoints:
//
// - Drive `files.create` (multipart upload) - uploads the .docx template and
//   converts it by declaring the Google Docs MIME type in the metadata
// - Docs `documents.batchUpdate` - text replacement and styling
// - Docs `documents.get` - fetches the structure for link placement
// - Drive `permissions.create` - "anyone with the link can view"
//
// Every call takes the bearer token from the caller; this client holds no
// credentials of its own.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use crate::core::doc_generation::{DocRequest, Document, DocsApiError, DocumentApi, DocumentId};

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const DOCS_API: &str = "https://docs.googleapis.com/v1";

const BOUNDARY: &str = "service_link_docgen_boundary";

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

pub struct GoogleWorkspaceClient {
    client: Client,
    drive_api: String,
    drive_upload_api: String,
    docs_api: String,
}

impl GoogleWorkspaceClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            drive_api: DRIVE_API.to_string(),
            drive_upload_api: DRIVE_UPLOAD_API.to_string(),
            docs_api: DOCS_API.to_string(),
        }
    }

    /// Points every endpoint at `base_url` (for a local fake or a proxy).
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client: Client::new(),
            drive_api: format!("{}/drive/v3", base),
            drive_upload_api: format!("{}/upload/drive/v3", base),
            docs_api: format!("{}/v1", base),
        }
    }

    async fn check(response: Response) -> Result<Response, DocsApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(DocsApiError::Status { status, body })
    }
}

impl Default for GoogleWorkspaceClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `multipart/related` body: JSON metadata part, then the file part.
pub fn multipart_related_body(metadata: &serde_json::Value, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
            b = BOUNDARY,
            meta = metadata,
            mime = mime
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn transport(e: reqwest::Error) -> DocsApiError {
    DocsApiError::Transport(e.to_string())
}

#[async_trait]
impl DocumentApi for GoogleWorkspaceClient {
    async fn upload_and_convert(
        &self,
        token: &str,
        name: &str,
        docx: Vec<u8>,
    ) -> Result<DocumentId, DocsApiError> {
        let metadata = json!({
            "name": name,
            "mimeType": GOOGLE_DOC_MIME,
        });
        let body = multipart_related_body(&metadata, DOCX_MIME, &docx);

        tracing::debug!("Uploading {} byte template as '{}'", docx.len(), name);

        let response = self
            .client
            .post(format!("{}/files", self.drive_upload_api))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .bearer_auth(token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        let created: CreatedFile = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DocsApiError::Decode(e.to_string()))?;

        Ok(DocumentId::new(created.id))
    }

    async fn batch_update(
        &self,
        token: &str,
        document_id: &DocumentId,
        requests: &[DocRequest],
    ) -> Result<(), DocsApiError> {
        tracing::debug!(
            "Sending batchUpdate with {} request(s) to {}",
            requests.len(),
            document_id
        );

        let response = self
            .client
            .post(format!(
                "{}/documents/{}:batchUpdate",
                self.docs_api,
                document_id.as_str()
            ))
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(transport)?;

        Self::check(response).await?;
        Ok(())
    }

    async fn get_document(
        &self,
        token: &str,
        document_id: &DocumentId,
    ) -> Result<Document, DocsApiError> {
        let response = self
            .client
            .get(format!("{}/documents/{}", self.docs_api, document_id.as_str()))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;

        let document: Document = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| DocsApiError::Decode(e.to_string()))?;

        tracing::debug!(
            "Fetched document '{}' ({}) with {} top-level element(s)",
            document.title,
            document.document_id,
            document.body.as_ref().map_or(0, |b| b.content.len())
        );
        Ok(document)
    }

    async fn share_publicly(
        &self,
        token: &str,
        document_id: &DocumentId,
    ) -> Result<(), DocsApiError> {
        let response = self
            .client
            .post(format!(
                "{}/files/{}/permissions",
                self.drive_api,
                document_id.as_str()
            ))
            .bearer_auth(token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(transport)?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{
        bearer_token, body_json, body_string_contains, header, method, path, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn multipart_body_wraps_metadata_and_file() {
        let metadata = json!({"name": "Doc", "mimeType": GOOGLE_DOC_MIME});
        let body = multipart_related_body(&metadata, DOCX_MIME, b"PKDATA");
        let text = String::from_utf8(body).unwrap();

        let expected = format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{m}\r\n\
             --{b}\r\nContent-Type: {d}\r\n\r\nPKDATA\r\n--{b}--\r\n",
            b = BOUNDARY,
            m = metadata,
            d = DOCX_MIME
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn base_url_override_rewrites_every_endpoint() {
        let client = GoogleWorkspaceClient::with_base_url("http://127.0.0.1:9000/");
        assert_eq!(client.drive_api, "http://127.0.0.1:9000/drive/v3");
        assert_eq!(client.drive_upload_api, "http://127.0.0.1:9000/upload/drive/v3");
        assert_eq!(client.docs_api, "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn document_tree_deserializes_from_api_json() {
        let document: Document = serde_json::from_value(json!({
            "documentId": "abc",
            "title": "Converted Google Doc",
            "body": {"content": [
                {"endIndex": 1, "sectionBreak": {"sectionStyle": {}}},
                {"startIndex": 1, "endIndex": 12, "paragraph": {
                    "elements": [{"startIndex": 1, "endIndex": 12, "textRun": {
                        "content": "Click here\n",
                        "textStyle": {}
                    }}],
                    "paragraphStyle": {"namedStyleType": "NORMAL_TEXT"}
                }}
            ]}
        }))
        .unwrap();

        assert_eq!(document.document_id, "abc");
        let content = &document.body.unwrap().content;
        assert_eq!(content.len(), 2);
        assert!(content[0].paragraph.is_none());
        let run = &content[1].paragraph.as_ref().unwrap().elements[0];
        assert_eq!(run.start_index, Some(1));
        assert_eq!(run.text_run.as_ref().unwrap().content.as_deref(), Some("Click here\n"));
    }

    #[tokio::test]
    async fn upload_posts_multipart_to_drive_and_returns_the_new_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(query_param("fields", "id"))
            .and(bearer_token("ya29.token"))
            .and(header(
                "Content-Type",
                format!("multipart/related; boundary={}", BOUNDARY).as_str(),
            ))
            .and(body_string_contains(GOOGLE_DOC_MIME))
            .and(body_string_contains("PKDATA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "doc-42"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = GoogleWorkspaceClient::with_base_url(&mock_server.uri());
        let id = client
            .upload_and_convert("ya29.token", "Service Links", b"PKDATA".to_vec())
            .await
            .unwrap();

        assert_eq!(id.as_str(), "doc-42");
    }

    #[tokio::test]
    async fn batch_update_wraps_requests_for_the_document() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/documents/doc-42:batchUpdate"))
            .and(bearer_token("ya29.token"))
            .and(body_json(json!({"requests": [
                {"replaceAllText": {
                    "containsText": {"text": "{name}", "matchCase": true},
                    "replaceText": "Jane Doe"
                }},
                {"updateTextStyle": {
                    "range": {"startIndex": 1, "endIndex": 12},
                    "textStyle": {"bold": true, "link": {"url": "https://shop.example/a"}},
                    "fields": "bold,link"
                }}
            ]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"replies": [{}, {}]})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = GoogleWorkspaceClient::with_base_url(&mock_server.uri());
        client
            .batch_update(
                "ya29.token",
                &DocumentId::new("doc-42"),
                &[
                    DocRequest::replace_all("{name}", "Jane Doe"),
                    DocRequest::bold_link(1, 12, "https://shop.example/a"),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn get_document_reads_the_structure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/documents/doc-42"))
            .and(bearer_token("ya29.token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documentId": "doc-42",
                "title": "Service Links",
                "body": {"content": []}
            })))
            .mount(&mock_server)
            .await;

        let client = GoogleWorkspaceClient::with_base_url(&mock_server.uri());
        let document = client
            .get_document("ya29.token", &DocumentId::new("doc-42"))
            .await
            .unwrap();

        assert_eq!(document.document_id, "doc-42");
        assert_eq!(document.title, "Service Links");
    }

    #[tokio::test]
    async fn share_grants_anyone_reader() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/drive/v3/files/doc-42/permissions"))
            .and(bearer_token("ya29.token"))
            .and(body_json(json!({"role": "reader", "type": "anyone"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "anyoneWithLink"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = GoogleWorkspaceClient::with_base_url(&mock_server.uri());
        client
            .share_publicly("ya29.token", &DocumentId::new("doc-42"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_status_is_reported_with_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/drive/v3/files/doc-42/permissions"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficientPermissions"))
            .mount(&mock_server)
            .await;

        let client = GoogleWorkspaceClient::with_base_url(&mock_server.uri());
        let err = client
            .share_publicly("ya29.token", &DocumentId::new("doc-42"))
            .await
            .unwrap_err();

        match err {
            DocsApiError::Status { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "insufficientPermissions");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_upload_response_is_a_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&mock_server)
            .await;

        let client = GoogleWorkspaceClient::with_base_url(&mock_server.uri());
        let result = client
            .upload_and_convert("ya29.token", "Service Links", b"PKDATA".to_vec())
            .await;

        assert!(matches!(result, Err(DocsApiError::Decode(_))));
    }
}
