use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use arbor_core::ExtractedText;

use crate::cli::OutputFormat;

/// One JSON line: the extracted text plus the context keywords found in it.
#[derive(Serialize)]
struct Record<'a> {
    #[serde(flatten)]
    text: &'a ExtractedText,
    keywords: Vec<&'static str>,
}

/// Write `texts` in `format`; returns the number of records written.
pub fn write_texts<W: Write>(out: &mut W, texts: &[ExtractedText], format: OutputFormat) -> Result<usize> {
    for (i, text) in texts.iter().enumerate() {
        match format {
            OutputFormat::Text => {
                if i > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "{}", text.annotated())?;
            }
            OutputFormat::Jsonl => {
                let record = Record {
                    text,
                    keywords: text.keywords(),
                };
                serde_json::to_writer(&mut *out, &record)?;
                writeln!(out)?;
            }
        }
    }
    out.flush()?;
    Ok(texts.len())
}

/// Write to `path`, or stdout when none is given.
pub fn emit(path: Option<&Path>, texts: &[ExtractedText], format: OutputFormat) -> Result<usize> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
            write_texts(&mut BufWriter::new(file), texts, format)
        }
        None => write_texts(&mut io::stdout().lock(), texts, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Category, DocumentKind, Provenance};

    fn sample() -> Vec<ExtractedText> {
        let provenance = Provenance {
            depth: 1,
            folder_path: vec!["Comunicados".into()],
            category: Category::Announcement,
            source_name: "aviso.txt".into(),
            kind: DocumentKind::Text,
        };
        vec![
            ExtractedText::new("Novo prazo", provenance),
            ExtractedText::new("solto", Provenance::default()),
        ]
    }

    #[test]
    fn text_blocks_are_separated_by_a_blank_line() {
        let mut buf = Vec::new();
        assert_eq!(write_texts(&mut buf, &sample(), OutputFormat::Text).unwrap(), 2);
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(
            out,
            "[Level 1] [Path: Comunicados] [Type: text] [Category: Comunicado] [Source: aviso.txt]\n\n\
             Novo prazo\n\nsolto\n"
        );
    }

    #[test]
    fn jsonl_lines_parse_back() {
        let mut buf = Vec::new();
        write_texts(&mut buf, &sample(), OutputFormat::Jsonl).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let parsed: Vec<ExtractedText> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn jsonl_lines_carry_keywords() {
        let texts = vec![ExtractedText::new(
            "Comunicado: novo telefone do atendimento",
            Provenance::default(),
        )];
        let mut buf = Vec::new();
        write_texts(&mut buf, &texts, OutputFormat::Jsonl).unwrap();
        let line: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(line["keywords"], serde_json::json!(["comunicado", "atendimento", "telefone"]));
        assert_eq!(line["text"], "Comunicado: novo telefone do atendimento");

        let mut buf = Vec::new();
        write_texts(&mut buf, &sample()[1..], OutputFormat::Jsonl).unwrap();
        let line: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(line["keywords"], serde_json::json!([]));
    }

    #[test]
    fn emit_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        emit(Some(&path), &sample()[1..], OutputFormat::Text).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "solto\n");
    }
}
