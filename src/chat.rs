//! Implementations of the `chat`, `ask`, and `chunks` commands.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use docqa_core::chunk::chunk_text;
use docqa_core::conversation::Answer;
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::generation::GenerationProvider;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::extract::{extract_documents, Document};
use crate::generation::create_generator;
use crate::progress::{format_number, ProgressMode};
use crate::session::{Session, SessionConfig};

/// Read every path as a [`Document`], failing on the first unreadable one.
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>> {
    paths.iter().map(|p| Document::from_file(p)).collect()
}

/// Build a session with the configured providers.
pub fn open_session(config: &Config) -> Result<Session> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(
        create_provider(&config.embedding).context("Failed to create embedding provider")?,
    );
    let generator: Arc<dyn GenerationProvider> = Arc::from(
        create_generator(&config.generation).context("Failed to create generation provider")?,
    );
    Ok(Session::new(SessionConfig::from(config), embedder, generator))
}

async fn open_with_documents(
    config: &Config,
    files: &[PathBuf],
    progress: ProgressMode,
) -> Result<Session> {
    let docs = load_documents(files)?;
    let mut session = open_session(config)?;
    let reporter = progress.reporter();
    let summary = session
        .upload_documents(docs, reporter.as_ref())
        .await
        .context("Failed to index documents")?;
    eprintln!(
        "Indexed {} documents: {} characters in {} chunks.",
        summary.documents,
        format_number(summary.characters),
        format_number(summary.chunks)
    );
    Ok(session)
}

/// `docqa ask`: upload, answer one question, print it.
pub async fn run_ask(
    config: &Config,
    files: &[PathBuf],
    question: &str,
    show_sources: bool,
    progress: ProgressMode,
) -> Result<()> {
    let mut session = open_with_documents(config, files, progress).await?;
    let answer = session.ask(question).await?;
    let mut out = std::io::stdout().lock();
    print_answer(&mut out, &answer, show_sources)?;
    Ok(())
}

/// `docqa chat`: upload, then answer questions read from stdin until EOF
/// or `/quit`.
pub async fn run_chat(
    config: &Config,
    files: &[PathBuf],
    show_sources: bool,
    progress: ProgressMode,
) -> Result<()> {
    let mut session = open_with_documents(config, files, progress).await?;
    eprintln!("Ask a question. Commands: /history, /reset, /quit");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl(&mut session, stdin, &mut std::io::stdout(), show_sources).await
}

/// Drive a session from line-oriented input.
///
/// Failed questions are reported on `out` and the loop continues; the
/// session's history is unchanged by them.
pub async fn repl<R, W>(
    session: &mut Session,
    input: R,
    out: &mut W,
    show_sources: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                writeln!(out, "(conversation cleared)")?;
            }
            "/history" => {
                for message in session.history().messages() {
                    writeln!(out, "{}: {}", message.role.prompt_label(), message.text)?;
                }
            }
            question => match session.ask(question).await {
                Ok(answer) => print_answer(out, &answer, show_sources)?,
                Err(e) => writeln!(out, "error: {}", e)?,
            },
        }
    }
    Ok(())
}

fn print_answer<W: Write>(out: &mut W, answer: &Answer, show_sources: bool) -> Result<()> {
    writeln!(out, "{}", answer.text)?;
    if show_sources {
        for source in &answer.sources {
            writeln!(
                out,
                "  [chunk {} | distance {:.4}] {}",
                source.chunk.index,
                source.distance,
                preview(&source.chunk.text, 80)
            )?;
        }
    }
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// `docqa chunks`: extract and chunk only, without embedding.
pub fn run_chunks(config: &Config, files: &[PathBuf], show: bool) -> Result<()> {
    let docs = load_documents(files)?;
    let text = extract_documents(&docs)?;
    let chunks = chunk_text(&text, &config.chunking_params())?;

    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "{} documents, {} characters, {} chunks (chunk_size {}, overlap {})",
        docs.len(),
        format_number(text.chars().count()),
        format_number(chunks.len()),
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    )?;
    if show {
        for chunk in &chunks {
            writeln!(
                out,
                "--- chunk {} ({} chars, {} overlap) ---",
                chunk.index,
                chunk.char_len(),
                chunk.overlap_prev
            )?;
            writeln!(out, "{}", chunk.text)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_core::generation::GenerationParams;

    use crate::extract::DocumentFormat;
    use crate::progress::NoProgress;

    struct Ones;

    #[async_trait]
    impl EmbeddingProvider for Ones {
        fn model_name(&self) -> &str {
            "ones"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
        }
    }

    struct Count;

    #[async_trait]
    impl GenerationProvider for Count {
        fn model_name(&self) -> &str {
            "count"
        }
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
        ) -> anyhow::Result<String> {
            Ok(format!("seen {} turns", prompt.matches("Human:").count()))
        }
    }

    async fn indexed_session() -> Session {
        let mut session = Session::new(SessionConfig::default(), Arc::new(Ones), Arc::new(Count));
        session
            .upload_documents(
                vec![Document::new(
                    "a.txt",
                    DocumentFormat::Text,
                    b"alpha\nbeta".to_vec(),
                )],
                &NoProgress,
            )
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn repl_answers_and_tracks_history() {
        let mut session = indexed_session().await;
        let input: &[u8] = b"first?\nsecond?\n/history\n/quit\nnever asked\n";
        let mut out = Vec::new();
        repl(&mut session, input, &mut out, false).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("seen 0 turns"));
        assert!(out.contains("seen 1 turns"));
        assert!(out.contains("Human: first?"));
        assert!(out.contains("Assistant: seen 1 turns"));
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn repl_reset_and_eof() {
        let mut session = indexed_session().await;
        let input: &[u8] = b"q\n/reset\nq again\n";
        let mut out = Vec::new();
        repl(&mut session, input, &mut out, true).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("(conversation cleared)"));
        assert!(out.contains("[chunk 0 | distance"));
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("a\nb", 10), "a b");
        assert_eq!(preview("ééééé", 3), "ééé...");
    }

    #[test]
    fn load_documents_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"png").unwrap();
        assert!(load_documents(&[path]).is_err());
    }
}
