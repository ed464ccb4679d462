//! The retrieval pipeline.
//!
//! [`Assistant`] owns the collaborators (PDF extractor, embedding provider,
//! chat model) and the two prompt templates, and exposes the two operations
//! both front-ends are built from:
//!
//! - [`Assistant::build_index`]: validate uploads, extract, chunk, embed.
//! - [`Assistant::ask`]: answer one question against a [`Session`] and
//!   append the exchange to its history.
//!
//! Extraction and chunking alone are available as [`prepare_documents`] for
//! `pdfqa ingest`, which never talks to an embedding or LLM service.

use std::sync::Arc;
use tracing::{debug, info};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::{create_provider, embed_query, EmbeddingProvider};
use crate::error::QaError;
use crate::extract::{extract_documents, DefaultPdfExtractor, ExtractionReport, PdfTextExtractor};
use crate::index::{ScoredChunk, VectorIndex};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{Chunk, PdfDocument, SourceChunk};
use crate::prompt::{join_context, PromptTemplate, PromptVars};
use crate::session::Session;

/// Extracted text of a batch, split into chunks.
#[derive(Debug)]
pub struct PreparedDocuments {
    pub report: ExtractionReport,
    pub chunks: Vec<Chunk>,
}

/// Index built from one upload, with the extraction outcome per document.
pub struct IndexedUpload {
    pub index: VectorIndex,
    pub report: ExtractionReport,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    /// The question used for retrieval; differs from the asked one when a
    /// follow-up was condensed against the history.
    pub standalone_question: String,
    pub sources: Vec<SourceChunk>,
}

/// Rejects an empty batch and any file whose name is not `*.pdf`.
pub fn validate_uploads(documents: &[PdfDocument]) -> Result<(), QaError> {
    if documents.is_empty() {
        return Err(QaError::validation("No files provided"));
    }
    if let Some(doc) = documents.iter().find(|d| !PdfDocument::has_pdf_name(&d.name)) {
        return Err(QaError::validation(format!(
            "Only PDF files are supported: {}",
            doc.name
        )));
    }
    Ok(())
}

/// Validates, extracts and chunks a batch of documents.
///
/// Extraction runs on the blocking pool. Fails with a validation error when
/// no document yields any text.
pub async fn prepare_documents(
    extractor: Arc<dyn PdfTextExtractor>,
    documents: Vec<PdfDocument>,
    with_separators: bool,
    chunking: &ChunkingConfig,
) -> Result<PreparedDocuments, QaError> {
    validate_uploads(&documents)?;

    let report = tokio::task::spawn_blocking(move || {
        extract_documents(extractor.as_ref(), &documents, with_separators)
    })
    .await?;

    if report.is_empty() {
        return Err(QaError::validation(
            "No text could be extracted from the uploaded PDFs",
        ));
    }

    let chunks = chunk_text(&report.text, chunking);
    if chunks.is_empty() {
        return Err(QaError::validation("No text chunks were produced"));
    }

    debug!(
        documents = report.processed.len(),
        skipped = report.skipped.len(),
        chunks = chunks.len(),
        "documents prepared"
    );
    Ok(PreparedDocuments { report, chunks })
}

pub struct Assistant {
    extractor: Arc<dyn PdfTextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn ChatModel>,
    qa_prompt: PromptTemplate,
    condense_prompt: PromptTemplate,
    chunking: ChunkingConfig,
    document_separators: bool,
    batch_size: usize,
    top_k: usize,
    condense_question: bool,
}

impl Assistant {
    pub fn new(
        config: &Config,
        extractor: Arc<dyn PdfTextExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn ChatModel>,
    ) -> Self {
        let qa_prompt = match &config.llm.prompt_template {
            Some(template) => PromptTemplate::new(template.clone()),
            None => PromptTemplate::qa_default(),
        };

        Self {
            extractor,
            embedder,
            llm,
            qa_prompt,
            condense_prompt: PromptTemplate::condense_default(),
            chunking: config.chunking.clone(),
            document_separators: config.extraction.document_separators,
            batch_size: config.embedding.batch_size,
            top_k: config.retrieval.top_k,
            condense_question: config.llm.condense_question,
        }
    }

    /// Wires the configured providers and the default PDF extractor.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let llm = create_chat_model(&config.llm)?;
        Ok(Self::new(
            config,
            Arc::new(DefaultPdfExtractor),
            embedder,
            llm,
        ))
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn llm(&self) -> &dyn ChatModel {
        self.llm.as_ref()
    }

    /// Extracts, chunks and embeds `documents` into a fresh index.
    pub async fn build_index(&self, documents: Vec<PdfDocument>) -> Result<IndexedUpload, QaError> {
        let prepared = prepare_documents(
            self.extractor.clone(),
            documents,
            self.document_separators,
            &self.chunking,
        )
        .await?;

        let index =
            VectorIndex::build(prepared.chunks, self.embedder.as_ref(), self.batch_size).await?;

        info!(
            documents = prepared.report.processed.len(),
            chunks = index.len(),
            model = index.model(),
            "index built"
        );
        Ok(IndexedUpload {
            index,
            report: prepared.report,
        })
    }

    /// Answers `question` from the session's index and records the exchange.
    ///
    /// The history is only appended to after the model has answered, so a
    /// failed call leaves the session unchanged.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Result<Answer, QaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::validation("Question cannot be empty"));
        }

        let history = session.history.render();
        let standalone_question = if self.condense_question && !session.history.is_empty() {
            self.condense(&history, question).await?
        } else {
            question.to_string()
        };

        let query = embed_query(self.embedder.as_ref(), &standalone_question).await?;
        let hits = session.index.search(&query, self.top_k);
        let context = join_context(hits.iter().map(|h| h.chunk.text.as_str()));
        let sources: Vec<SourceChunk> = hits.iter().map(ScoredChunk::to_source).collect();

        let prompt = self.qa_prompt.render(&PromptVars {
            context: &context,
            chat_history: if self.qa_prompt.uses_history() {
                &history
            } else {
                ""
            },
            question: &standalone_question,
        });
        debug!(
            session_id = %session.id,
            retrieved = hits.len(),
            prompt_chars = prompt.len(),
            "prompt rendered"
        );

        let answer = self.llm.complete(&prompt).await?;
        session.history.record_exchange(question, &answer);

        info!(
            session_id = %session.id,
            turns = session.history.len(),
            "question answered"
        );
        Ok(Answer {
            answer,
            standalone_question,
            sources,
        })
    }

    async fn condense(&self, history: &str, question: &str) -> Result<String, QaError> {
        let prompt = self.condense_prompt.render(&PromptVars {
            context: "",
            chat_history: history,
            question,
        });
        let condensed = self.llm.complete(&prompt).await?;
        let condensed = condensed.trim();

        debug!(original = question, condensed, "follow-up condensed");
        if condensed.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(condensed.to_string())
        }
    }
}
