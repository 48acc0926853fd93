//! Chunk and chunk span types, the units of retrieved context.
//!
//! A [`ChunkSpan`] is a contiguous run of chunks from one document. It is
//! presented to the model either as an XML-like `<document>` tag (embedded
//! in a user instruction) or as a JSON object (embedded in a tool result).

use serde::{Deserialize, Serialize};

/// Identifier of a stored chunk.
pub type ChunkId = String;

/// The document a chunk was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Document {
    /// Where the document came from: its URL if known, else its filename.
    pub fn source(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.filename)
    }
}

/// The smallest retrievable unit of stored text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document: Document,
    /// Position of this chunk within its document.
    pub index: i64,
    /// Markdown headings in effect at the start of the chunk.
    #[serde(default)]
    pub headings: String,
    pub body: String,
}

impl Chunk {
    /// Headings followed by body, the text a reranker scores.
    pub fn text(&self) -> String {
        format!("{}{}", self.headings, self.body)
    }
}

/// A contiguous run of chunks from a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub chunks: Vec<Chunk>,
}

#[derive(Serialize)]
struct SpanJson<'a> {
    index: usize,
    id: &'a str,
    source: &'a str,
    span: SpanBody<'a>,
}

#[derive(Serialize)]
struct SpanBody<'a> {
    from_chunk_id: &'a str,
    to_chunk_id: &'a str,
    heading: &'a str,
    content: String,
}

impl ChunkSpan {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The owning document, `None` for an empty span.
    pub fn document(&self) -> Option<&Document> {
        self.chunks.first().map(|c| &c.document)
    }

    /// Concatenated chunk bodies.
    pub fn content(&self) -> String {
        self.chunks.iter().map(|c| c.body.as_str()).collect()
    }

    /// Render as an indexed `<document>` tag. `index` is 1-based.
    pub fn to_xml(&self, index: usize) -> String {
        let (Some(first), Some(last)) = (self.chunks.first(), self.chunks.last()) else {
            return String::new();
        };
        [
            format!(r#"<document index="{index}" id="{}">"#, first.document.id),
            format!("<source>{}</source>", first.document.source()),
            format!(
                r#"<span from_chunk_id="{}" to_chunk_id="{}">"#,
                first.id, last.id
            ),
            format!("<heading>\n{}\n</heading>", escape_xml(first.headings.trim())),
            format!("<content>\n{}\n</content>", escape_xml(self.content().trim())),
            "</span>".to_string(),
            "</document>".to_string(),
        ]
        .join("\n")
    }

    /// Render as an indexed JSON object. `index` is 1-based.
    pub fn to_json(&self, index: usize) -> String {
        let (Some(first), Some(last)) = (self.chunks.first(), self.chunks.last()) else {
            return "{}".to_string();
        };
        let doc = SpanJson {
            index,
            id: &first.document.id,
            source: first.document.source(),
            span: SpanBody {
                from_chunk_id: &first.id,
                to_chunk_id: &last.id,
                heading: first.headings.trim(),
                content: self.content().trim().to_string(),
            },
        };
        // Plain strings and integers only; serialization cannot fail.
        serde_json::to_string(&doc).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Escape the characters that would break the surrounding tags.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
