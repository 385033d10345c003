//! Streaming tokeniser producing per-document word-frequency sketches.

use std::io;
use std::str;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Word-frequency sketch of one document.
///
/// `list` keeps tokens in first-seen order; `size` is the raw byte count of
/// everything fed to the indexer, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSketch {
    pub id: String,
    pub list: IndexMap<String, u64>,
    pub size: u64,
}

/// Byte sink that tokenises a document as it streams in.
///
/// Chunk boundaries are invisible: the trailing partial token (and any
/// trailing incomplete UTF-8 sequence) is carried into the next chunk, and
/// the residue is emitted as a final token on [`finish`](Indexer::finish).
#[derive(Debug)]
pub struct Indexer {
    id: String,
    list: IndexMap<String, u64>,
    carry: Vec<u8>,
    size: u64,
}

impl Indexer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            list: IndexMap::new(),
            carry: Vec::new(),
            size: 0,
        }
    }

    /// Raw bytes consumed so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Feed one chunk of document bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.size += chunk.len() as u64;
        self.carry.extend_from_slice(chunk);
        self.drain_complete();
    }

    /// Emit the buffered residue and finalise the sketch.
    pub fn finish(mut self) -> DocumentSketch {
        let residue = String::from_utf8_lossy(&self.carry).into_owned();
        for token in residue.split_whitespace() {
            bump(&mut self.list, token);
        }
        DocumentSketch {
            id: self.id,
            list: self.list,
            size: self.size,
        }
    }

    /// Tokenise everything up to the last whitespace codepoint; keep the
    /// tail buffered.
    fn drain_complete(&mut self) {
        let valid_len = match str::from_utf8(&self.carry) {
            Ok(_) => self.carry.len(),
            Err(e) => e.valid_up_to(),
        };
        let text = str::from_utf8(&self.carry[..valid_len]).unwrap_or_default();
        let Some(cut) = text
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(pos, c)| pos + c.len_utf8())
        else {
            return;
        };
        for token in text[..cut].split_whitespace() {
            bump(&mut self.list, token);
        }
        self.carry.drain(..cut);
    }
}

impl io::Write for Indexer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Lowercase, strip everything outside `[a-z0-9]`, and count the survivor.
fn bump(list: &mut IndexMap<String, u64>, token: &str) {
    let normalised: String = token
        .chars()
        .flat_map(|c| c.to_lowercase())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if !normalised.is_empty() {
        *list.entry(normalised).or_insert(0) += 1;
    }
}
