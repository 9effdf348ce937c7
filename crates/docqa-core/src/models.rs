//! Core data models that flow through the upload and question pipeline.

use serde::{Deserialize, Serialize};

/// A contiguous span of extracted text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the chunk sequence. Also the index insertion order,
    /// which breaks ties between equally distant chunks.
    pub index: usize,
    pub text: String,
    /// Byte offset, in the extracted text, of the first split unit that
    /// this chunk introduces (the part after the overlap prefix).
    pub source_offset: Option<usize>,
    /// Number of characters at the start of `text` copied from the end of
    /// the previous chunk. Zero for the first chunk and for oversized units.
    pub overlap_prev: usize,
    /// Length of the separator between the overlap prefix and the new
    /// content, in bytes. Zero when `overlap_prev` is zero.
    #[serde(skip)]
    pub(crate) overlap_sep_len: usize,
}

impl Chunk {
    /// The content this chunk adds, with the overlap prefix and its
    /// separator removed.
    pub fn fresh_text(&self) -> &str {
        if self.overlap_prev == 0 {
            return &self.text;
        }
        let prefix_end = self
            .text
            .char_indices()
            .nth(self.overlap_prev)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len());
        &self.text[(prefix_end + self.overlap_sep_len).min(self.text.len())..]
    }

    /// Number of characters (not bytes) in the chunk.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Who produced a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when history is rendered into a prompt.
    pub fn prompt_label(&self) -> &'static str {
        match self {
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

/// A single displayable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

/// One confirmed question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    /// The turn as explicit `(role, text)` pairs: the question, then the answer.
    pub fn messages(&self) -> [Message; 2] {
        [
            Message {
                role: Role::User,
                text: self.question.clone(),
            },
            Message {
                role: Role::Assistant,
                text: self.answer.clone(),
            },
        ]
    }
}

/// Ordered, append-only record of confirmed turns.
///
/// There is no in-place push: [`with_turn`](Self::with_turn) returns a new
/// history, so a failed answer can never leave a half-written turn behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Flatten into display messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.turns.iter().flat_map(|t| t.messages()).collect()
    }

    /// A copy of this history with `turn` appended.
    pub fn with_turn(&self, turn: Turn) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        turns.extend_from_slice(&self.turns);
        turns.push(turn);
        Self { turns }
    }
}

impl From<Vec<Turn>> for ConversationHistory {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

/// A retrieved chunk with its cosine distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// `1 - cosine_similarity`; lower is closer.
    pub distance: f32,
}
