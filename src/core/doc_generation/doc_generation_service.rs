// The document generation pipeline.
//
// authenticate → upload+convert → tag substitution → hyperlink styling →
// detail substitution → publish → URL
//
// Upload and publish failures abort the run. The three editing steps only
// log and record a warning, so a partly edited document can still be
// published unless strict publishing is enabled.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use super::doc_models::{
    DocRequest, Document, DocumentId, GeneratedDocument, IboRecord, InputError, PipelineStep,
    StepWarning, TagMapping, CLICK_HERE, ID_TAG, NAME_TAG,
};
use super::link_placement::{plan_link_styles, STYLE_BATCH_SIZE};
use crate::core::auth::{AuthError, CredentialProvider};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum DocsApiError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Google API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum DocGenerationError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Failed to read template {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] DocsApiError),

    #[error("Refusing to publish {document_id}: {warnings} step(s) failed")]
    PublishBlocked {
        document_id: DocumentId,
        warnings: usize,
    },
}

// ============================================================================
// PORT
// ============================================================================

/// The Drive + Docs operations the pipeline needs. `token` is a bearer access token.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn upload_and_convert(
        &self,
        token: &str,
        name: &str,
        docx: Vec<u8>,
    ) -> Result<DocumentId, DocsApiError>;

    async fn batch_update(
        &self,
        token: &str,
        document_id: &DocumentId,
        requests: &[DocRequest],
    ) -> Result<(), DocsApiError>;

    async fn get_document(
        &self,
        token: &str,
        document_id: &DocumentId,
    ) -> Result<Document, DocsApiError>;

    async fn share_publicly(&self, token: &str, document_id: &DocumentId)
        -> Result<(), DocsApiError>;
}

// ============================================================================
// SERVICE
// ============================================================================

#[derive(Debug, Clone)]
pub struct DocGenerationConfig {
    pub template_path: PathBuf,
    pub document_name: String,
    /// Skip publishing when any editing step failed.
    pub strict_publish: bool,
}

impl Default for DocGenerationConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("ServiceLinkTemplate.docx"),
            document_name: "Converted Google Doc".to_string(),
            strict_publish: false,
        }
    }
}

pub struct DocGenerationService<A: DocumentApi> {
    api: A,
    config: DocGenerationConfig,
}

impl<A: DocumentApi> DocGenerationService<A> {
    pub fn new(api: A, config: DocGenerationConfig) -> Self {
        Self { api, config }
    }

    /// Runs the whole pipeline for one record.
    ///
    /// The credential provider is passed per call so each web session can
    /// bring its own.
    pub async fn generate(
        &self,
        credentials: &dyn CredentialProvider,
        record: &IboRecord,
    ) -> Result<GeneratedDocument, DocGenerationError> {
        // Validate input before sending anyone through a consent screen.
        let mapping = TagMapping::for_record(record)?;
        tracing::debug!("Mapped {} tag(s) for IBO {}", mapping.len(), record.ibo_id);

        let credential = credentials.credential().await?;
        let token = credential.access_token.as_str();

        let document_id = self.upload_template(token).await?;

        let mut warnings = Vec::new();
        if let Err(e) = self.replace_tags_with_marker(token, &document_id, &mapping).await {
            tracing::error!("Error replacing text in document: {}", e);
            warnings.push(StepWarning {
                step: PipelineStep::TagSubstitution,
                message: e.to_string(),
            });
        }

        warnings.extend(self.apply_hyperlinks(token, &document_id, &mapping).await);

        if let Err(e) = self
            .replace_personal_details(token, &document_id, &record.ibo_name, &record.ibo_id)
            .await
        {
            tracing::error!("Error replacing IBO details in document: {}", e);
            warnings.push(StepWarning {
                step: PipelineStep::DetailSubstitution,
                message: e.to_string(),
            });
        }

        if self.config.strict_publish && !warnings.is_empty() {
            return Err(DocGenerationError::PublishBlocked {
                document_id,
                warnings: warnings.len(),
            });
        }

        self.publish(token, &document_id).await?;

        Ok(GeneratedDocument {
            url: document_id.edit_url(),
            document_id,
            warnings,
        })
    }

    /// Uploads the template and lets Drive convert it to a Google Doc.
    pub async fn upload_template(&self, token: &str) -> Result<DocumentId, DocGenerationError> {
        let path = &self.config.template_path;
        tracing::info!("Uploading and converting {} to Google Docs format", path.display());

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DocGenerationError::Template {
                path: path.display().to_string(),
                source,
            })?;

        let document_id = self
            .api
            .upload_and_convert(token, &self.config.document_name, bytes)
            .await?;

        tracing::info!("Uploaded and converted template. Document ID: {}", document_id);
        Ok(document_id)
    }

    /// Replaces every tag with the literal marker text in a single call.
    pub async fn replace_tags_with_marker(
        &self,
        token: &str,
        document_id: &DocumentId,
        mapping: &TagMapping,
    ) -> Result<(), DocsApiError> {
        if mapping.is_empty() {
            return Ok(());
        }

        let requests: Vec<DocRequest> = mapping
            .iter()
            .map(|link| {
                tracing::debug!("Replacing tag {} with '{}'", link.tag, CLICK_HERE);
                DocRequest::replace_all(&link.tag, CLICK_HERE)
            })
            .collect();

        self.api.batch_update(token, document_id, &requests).await?;
        tracing::info!("Replaced tags with '{}' in document ID: {}", CLICK_HERE, document_id);
        Ok(())
    }

    /// Bolds and links marker runs, sending requests in batches.
    ///
    /// Returns one warning per failed fetch or batch; later batches still run.
    pub async fn apply_hyperlinks(
        &self,
        token: &str,
        document_id: &DocumentId,
        mapping: &TagMapping,
    ) -> Vec<StepWarning> {
        let document = match self.api.get_document(token, document_id).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Error fetching document for hyperlink styling: {}", e);
                return vec![StepWarning {
                    step: PipelineStep::HyperlinkStyling,
                    message: e.to_string(),
                }];
            }
        };

        let requests = plan_link_styles(&document, mapping);
        self.send_style_batches(token, document_id, &requests).await
    }

    pub async fn send_style_batches(
        &self,
        token: &str,
        document_id: &DocumentId,
        requests: &[DocRequest],
    ) -> Vec<StepWarning> {
        let mut warnings = Vec::new();

        for (batch_no, chunk) in requests.chunks(STYLE_BATCH_SIZE).enumerate() {
            if let Err(e) = self.api.batch_update(token, document_id, chunk).await {
                tracing::error!(
                    "Error applying hyperlinks and styling (batch {}): {}",
                    batch_no + 1,
                    e
                );
                warnings.push(StepWarning {
                    step: PipelineStep::HyperlinkStyling,
                    message: e.to_string(),
                });
            }
        }

        if warnings.is_empty() {
            tracing::info!(
                "Applied {} hyperlink(s) and bold styling in document ID: {}",
                requests.len(),
                document_id
            );
        }
        warnings
    }

    pub async fn replace_personal_details(
        &self,
        token: &str,
        document_id: &DocumentId,
        ibo_name: &str,
        ibo_id: &str,
    ) -> Result<(), DocsApiError> {
        let requests = [
            DocRequest::replace_all(NAME_TAG, ibo_name),
            DocRequest::replace_all(ID_TAG, ibo_id),
        ];

        self.api.batch_update(token, document_id, &requests).await?;
        tracing::info!("Replaced IBO details in document ID: {}", document_id);
        Ok(())
    }

    /// Grants "anyone with the link" read access.
    pub async fn publish(&self, token: &str, document_id: &DocumentId) -> Result<(), DocsApiError> {
        tracing::info!("Sharing Google Doc {} publicly", document_id);
        self.api.share_publicly(token, document_id).await?;
        tracing::info!("Document shared: {}", document_id.edit_url());
        Ok(())
    }
}
