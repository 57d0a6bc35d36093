//! Recursive character chunking.
//!
//! A window of `max_chars` characters is cut just after the last occurrence of
//! the most preferred separator it contains (paragraph, line, sentence, word),
//! falling back to a hard cut at the window edge. Consecutive chunks share
//! exactly `overlap_chars` characters, so concatenating the first chunk with
//! every later chunk minus its first `overlap_chars` characters reproduces the
//! (flattened) input.

use std::borrow::Cow;

use serde_json::Value;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, ContentType, Document};

pub const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Lazily chunk a document. Fails only when structured content cannot be parsed.
    pub fn chunks<'a>(&self, document: &'a Document) -> Result<Chunks<'a>> {
        let text = flatten_content(&document.name, document.content_type, &document.content)?;
        Ok(Chunks::new(&document.name, document.content_type, text, self.config))
    }

    /// Chunk a document eagerly.
    pub fn split(&self, document: &Document) -> Result<Vec<Chunk>> {
        Ok(self.chunks(document)?.collect())
    }
}

/// Turn structured content into plain text ready for chunking.
///
/// JSON objects are pretty-printed; a top-level array becomes its items
/// pretty-printed and joined by newlines; a top-level string is used as-is.
pub fn flatten_content<'a>(name: &str, content_type: ContentType, raw: &'a str) -> Result<Cow<'a, str>> {
    if content_type != ContentType::Json {
        return Ok(Cow::Borrowed(raw));
    }
    let chunking_error = |e: serde_json::Error| Error::Chunking { document: name.to_string(), reason: e.to_string() };
    let value: Value = serde_json::from_str(raw).map_err(chunking_error)?;
    let text = match value {
        Value::Array(items) => items
            .iter()
            .map(serde_json::to_string_pretty)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(chunking_error)?
            .join("\n"),
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).map_err(chunking_error)?,
    };
    Ok(Cow::Owned(text))
}

/// Iterator over the chunks of one document. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    source: &'a str,
    content_type: ContentType,
    text: Cow<'a, str>,
    // Byte offset of every char, plus the total byte length.
    bounds: Vec<usize>,
    max_chars: usize,
    overlap_chars: usize,
    start: usize,
    ordinal: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn new(source: &'a str, content_type: ContentType, text: Cow<'a, str>, config: ChunkingConfig) -> Self {
        let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        bounds.push(text.len());
        let done = text.trim().is_empty();
        Self {
            source,
            content_type,
            text,
            bounds,
            max_chars: config.max_chars,
            overlap_chars: config.overlap_chars,
            start: 0,
            ordinal: 0,
            done,
        }
    }

    fn char_len(&self) -> usize {
        self.bounds.len() - 1
    }

    fn char_at_byte(&self, byte: usize) -> usize {
        match self.bounds.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        }
    }

    fn split_point(&self, start: usize, window_end: usize) -> usize {
        let window_start_byte = self.bounds[start];
        let window = &self.text[window_start_byte..self.bounds[window_end]];
        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let end = self.char_at_byte(window_start_byte + pos + sep.len());
                if end > start + self.overlap_chars {
                    return end;
                }
            }
        }
        window_end
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }
        let total = self.char_len();
        let start = self.start;
        let window_end = (start + self.max_chars).min(total);
        let end = if window_end == total { total } else { self.split_point(start, window_end) };

        let chunk = Chunk {
            source: self.source.to_string(),
            ordinal: self.ordinal,
            start,
            end,
            text: self.text[self.bounds[start]..self.bounds[end]].to_string(),
            content_type: self.content_type,
        };

        self.ordinal += 1;
        if end == total {
            self.done = true;
        } else {
            self.start = end - self.overlap_chars;
        }
        Some(chunk)
    }
}
