//! Sentence-aligned chunking with overlap.
//!
//! Sentences end at a `.` followed by whitespace (or the end of the text).
//! Chunks are built greedily up to `target_size` characters; each new chunk
//! starts with the shortest tail of the previous one that covers `overlap`
//! characters. Sentences are never split, so one longer than `target_size`
//! produces an oversized chunk.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub target_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { target_size: 512, overlap: 128 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(Error::InvalidArgument("chunk target_size must be at least 1".into()));
        }
        if self.overlap >= self.target_size {
            return Err(Error::InvalidArgument(format!(
                "chunk overlap ({}) must be smaller than target_size ({})",
                self.overlap, self.target_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig { self.config }

    /// Lazily chunk `text`. Each call starts a fresh sequence.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        let trimmed = text.trim();
        let whole = (!trimmed.is_empty() && char_len(trimmed) <= self.config.target_size).then_some(trimmed);
        Chunks {
            sentences: Sentences { rest: trimmed },
            target: self.config.target_size,
            overlap: self.config.overlap,
            seed: Vec::new(),
            pending: None,
            whole,
            done: trimmed.is_empty(),
        }
    }
}

/// Convenience wrapper: chunk `text` with the given parameters.
pub fn chunk(text: &str, target_size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = Chunker::new(ChunkingConfig { target_size, overlap })?;
    Ok(chunker.chunks(text).collect())
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    sentences: Sentences<'a>,
    target: usize,
    overlap: usize,
    seed: Vec<&'a str>,
    pending: Option<&'a str>,
    whole: Option<&'a str>,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if let Some(whole) = self.whole.take() {
            self.done = true;
            return Some(whole.to_string());
        }
        if self.done {
            return None;
        }

        let mut current = std::mem::take(&mut self.seed);
        let mut size = rendered_len(&current);
        let mut fresh = 0usize;
        while let Some(sentence) = self.pending.take().or_else(|| self.sentences.next()) {
            let len = char_len(sentence);
            let grown = if current.is_empty() { len } else { size + 1 + len };
            // A chunk always takes at least one sentence beyond its seed.
            if fresh > 0 && grown > self.target {
                self.pending = Some(sentence);
                break;
            }
            current.push(sentence);
            size = grown;
            fresh += 1;
        }

        if fresh == 0 {
            self.done = true;
            return None;
        }
        if self.pending.is_some() {
            self.seed = overlap_tail(&current, self.overlap);
        } else {
            self.done = true;
        }
        Some(render(&current))
    }
}

#[derive(Debug, Clone)]
struct Sentences<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Sentences<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            let rest = self.rest.trim_start();
            if rest.is_empty() {
                self.rest = rest;
                return None;
            }
            let end = rest
                .match_indices('.')
                .map(|(i, _)| i + 1)
                .find(|&end| rest[end..].chars().next().map_or(true, char::is_whitespace))
                .unwrap_or(rest.len());
            let (sentence, tail) = rest.split_at(end);
            self.rest = tail;
            let sentence = sentence.trim();
            if !sentence.is_empty() {
                return Some(sentence);
            }
        }
    }
}

/// Shortest suffix of `sentences` whose rendered length reaches `overlap`.
fn overlap_tail<'a>(sentences: &[&'a str], overlap: usize) -> Vec<&'a str> {
    if overlap == 0 {
        return Vec::new();
    }
    let mut start = sentences.len();
    let mut size = 0usize;
    while start > 0 && size < overlap {
        start -= 1;
        let len = char_len(sentences[start]);
        size = if size == 0 { len } else { size + 1 + len };
    }
    sentences[start..].to_vec()
}

fn render(sentences: &[&str]) -> String {
    sentences.iter().map(|s| s.replace(['\n', '\r'], " ")).collect::<Vec<_>>().join(" ")
}

fn rendered_len(sentences: &[&str]) -> usize {
    let chars: usize = sentences.iter().map(|s| char_len(s)).sum();
    chars + sentences.len().saturating_sub(1)
}

fn char_len(s: &str) -> usize { s.chars().count() }
