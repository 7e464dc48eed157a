pub mod doc_generation_service;
pub mod doc_models;
pub mod link_placement;

pub use doc_generation_service::{
    DocGenerationConfig, DocGenerationError, DocGenerationService, DocsApiError, DocumentApi,
};
pub use doc_models::{
    DocRequest, Document, DocumentId, GeneratedDocument, IboRecord, InputError, PipelineStep,
    StepWarning, TagLink, TagMapping,
};
pub use link_placement::{plan_link_styles, STYLE_BATCH_SIZE};
