//! Instruction templates for the recognition model.
//!
//! Every prompt lives here so a wording change touches exactly one place, and
//! so tests can inspect the templates without a model. There is one fixed
//! template per [`RecognitionPrompt`] kind; they are never mutated at runtime.

use serde::{Deserialize, Serialize};

/// Which instruction template a recognition call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionPrompt {
    /// A page rendered out of a PDF.
    Document,
    /// A standalone raster image (photo, screenshot, scan).
    Image,
}

impl RecognitionPrompt {
    /// The fixed instruction text for this kind.
    pub fn template(self) -> &'static str {
        match self {
            RecognitionPrompt::Document => DOCUMENT_PROMPT,
            RecognitionPrompt::Image => IMAGE_PROMPT,
        }
    }
}

/// Prompt for pages rendered from a PDF.
pub const DOCUMENT_PROMPT: &str = "You are a professional OCR system specialized in document text extraction. \
Extract ALL visible text from this document page exactly as it appears. \
Include headers, body text, tables, lists, timestamps, usernames, messages, and any other readable content. \
If this contains chat messages or conversations, preserve the chronological order and speaker identification. \
If this contains structured data like tables or forms, maintain the structure. \
Preserve original formatting, capitalization, punctuation, and line breaks. \
Do not summarize, interpret, or add commentary. \
Return only the complete extracted text content.";

/// Prompt for standalone images.
pub const IMAGE_PROMPT: &str = "You are an expert OCR system. Extract ALL visible text from this image exactly as it appears. \
Include every word, number, symbol, timestamp, username, and message. \
If this is a chat conversation, preserve the conversation flow with timestamps and usernames. \
If this is a document, maintain original formatting, line breaks, and structure. \
Preserve original capitalization, spacing, and punctuation. \
Do not add explanations, analysis, or interpretations. \
Return only the raw extracted text content.";
