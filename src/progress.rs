//! Upload progress reporting.
//!
//! Reports what an upload is doing (extracting, chunking, embedding) so
//! users of `docqa chat` see where time goes on large PDFs. Progress is
//! emitted on **stderr** so stdout stays reserved for answers.

use std::io::Write;

/// A single progress event for an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadProgressEvent {
    /// Reading text out of the uploaded files.
    Extracting { documents: usize },
    /// Splitting the extracted text.
    Chunking { characters: usize },
    /// Embedding chunks with the configured provider.
    Embedding { chunks: usize, model: String },
    /// The new index is live.
    Indexed { chunks: usize, dims: usize },
}

/// Reports upload progress. Implementations write to stderr (human or JSON).
pub trait UploadProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the session's upload pipeline.
    fn report(&self, event: UploadProgressEvent);
}

/// Human-friendly progress on stderr: "upload  embedding  1,234 chunks (all-minilm-l6-v2)".
pub struct StderrProgress;

impl UploadProgressReporter for StderrProgress {
    fn report(&self, event: UploadProgressEvent) {
        let line = match &event {
            UploadProgressEvent::Extracting { documents } => {
                format!("upload  extracting  {} documents\n", format_number(*documents))
            }
            UploadProgressEvent::Chunking { characters } => {
                format!("upload  chunking  {} characters\n", format_number(*characters))
            }
            UploadProgressEvent::Embedding { chunks, model } => {
                format!(
                    "upload  embedding  {} chunks ({})\n",
                    format_number(*chunks),
                    model
                )
            }
            UploadProgressEvent::Indexed { chunks, dims } => {
                format!(
                    "upload  ready  {} chunks, {} dims\n",
                    format_number(*chunks),
                    dims
                )
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &UploadProgressEvent) -> serde_json::Value {
        match event {
            UploadProgressEvent::Extracting { documents } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "documents": documents
            }),
            UploadProgressEvent::Chunking { characters } => serde_json::json!({
                "event": "progress",
                "phase": "chunking",
                "characters": characters
            }),
            UploadProgressEvent::Embedding { chunks, model } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "chunks": chunks,
                "model": model
            }),
            UploadProgressEvent::Indexed { chunks, dims } => serde_json::json!({
                "event": "progress",
                "phase": "indexed",
                "chunks": chunks,
                "dims": dims
            }),
        }
    }
}

impl UploadProgressReporter for JsonProgress {
    fn report(&self, event: UploadProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl UploadProgressReporter for NoProgress {
    fn report(&self, _event: UploadProgressEvent) {}
}

pub(crate) fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn UploadProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_carry_phase() {
        let v = JsonProgress::to_json(&UploadProgressEvent::Embedding {
            chunks: 12,
            model: "m".to_string(),
        });
        assert_eq!(v["phase"], "embedding");
        assert_eq!(v["chunks"], 12);

        let v = JsonProgress::to_json(&UploadProgressEvent::Indexed { chunks: 3, dims: 384 });
        assert_eq!(v["phase"], "indexed");
        assert_eq!(v["dims"], 384);
    }
}
