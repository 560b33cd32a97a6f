//! JSONL corpus of financial Q&A records with document evidence.

use crate::qa::chunk;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusRecord {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub doc_name: Option<String>,
}

/// Evidence entries appear either as objects carrying `evidence_text` or as
/// bare strings, depending on the corpus vintage.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EvidenceItem {
    Structured {
        evidence_text: String,
    },
    Text(String),
}

impl EvidenceItem {
    fn text(&self) -> &str {
        match self {
            EvidenceItem::Structured { evidence_text } => evidence_text,
            EvidenceItem::Text(s) => s,
        }
    }
}

impl CorpusRecord {
    /// The retrievable text of a record: joined evidence, falling back to
    /// question + answer when no evidence is present.
    pub fn document_text(&self) -> String {
        let evidence: Vec<&str> = self
            .evidence
            .iter()
            .map(|e| e.text())
            .filter(|t| !t.trim().is_empty())
            .collect();
        if !evidence.is_empty() {
            return evidence.join(" ");
        }

        match (self.question.as_deref(), self.answer.as_deref()) {
            (Some(q), Some(a)) => format!("{q} {a}"),
            (Some(q), None) => q.to_string(),
            (None, Some(a)) => a.to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedCorpus {
    /// Fingerprint of the raw corpus bytes; the retrieval cache key.
    pub version: String,
    pub records: Vec<CorpusRecord>,
}

impl LoadedCorpus {
    /// All retrieval chunks across the corpus, in record order.
    pub fn chunks(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for record in &self.records {
            let text = record.document_text();
            if text.trim().is_empty() {
                continue;
            }
            out.extend(chunk::chunk_text(
                &text,
                chunk::DEFAULT_CHUNK_SIZE,
                chunk::DEFAULT_CHUNK_OVERLAP,
            )?);
        }
        Ok(out)
    }
}

pub fn load_jsonl(path: &Path) -> Result<LoadedCorpus> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;
    parse_jsonl(&raw)
}

pub fn parse_jsonl(raw: &str) -> Result<LoadedCorpus> {
    let mut records = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str::<CorpusRecord>(line)
            .with_context(|| format!("corpus line {} is not a valid record", idx + 1))?;
        records.push(record);
    }
    anyhow::ensure!(!records.is_empty(), "corpus contains no records");

    Ok(LoadedCorpus {
        version: fingerprint(raw),
        records,
    })
}

fn fingerprint(raw: &str) -> String {
    let mut hasher = DefaultHasher::new();
    raw.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "{\"question\": \"What was revenue in 2022?\", \"answer\": \"$394.3B\", ",
        "\"evidence\": [{\"evidence_text\": \"Total net sales were $394.3 billion.\"}], ",
        "\"doc_name\": \"10-K\"}\n",
        "{\"question\": \"What was gross margin?\", \"answer\": \"43.3%\", \"evidence\": []}\n",
    );

    #[test]
    fn parses_records_and_versions_content() {
        let corpus = parse_jsonl(SAMPLE).unwrap();
        assert_eq!(corpus.records.len(), 2);
        assert_eq!(corpus.version.len(), 16);

        let again = parse_jsonl(SAMPLE).unwrap();
        assert_eq!(corpus.version, again.version);

        let edited = parse_jsonl(&SAMPLE.replace("43.3%", "43.4%")).unwrap();
        assert_ne!(corpus.version, edited.version);
    }

    #[test]
    fn evidence_takes_priority_over_question_answer() {
        let corpus = parse_jsonl(SAMPLE).unwrap();
        assert_eq!(
            corpus.records[0].document_text(),
            "Total net sales were $394.3 billion."
        );
        assert_eq!(
            corpus.records[1].document_text(),
            "What was gross margin? 43.3%"
        );
    }

    #[test]
    fn accepts_bare_string_evidence() {
        let raw = "{\"evidence\": [\"Net income rose.\", \"Margins expanded.\"]}\n";
        let corpus = parse_jsonl(raw).unwrap();
        assert_eq!(
            corpus.records[0].document_text(),
            "Net income rose. Margins expanded."
        );
    }

    #[test]
    fn rejects_malformed_lines_and_empty_corpora() {
        assert!(parse_jsonl("not json\n").is_err());
        assert!(parse_jsonl("\n\n").is_err());
    }

    #[test]
    fn chunks_skip_empty_records() {
        let raw = "{\"evidence\": [\"  \"]}\n{\"evidence\": [\"real text\"]}\n";
        let corpus = parse_jsonl(raw).unwrap();
        let chunks = corpus.chunks().unwrap();
        assert_eq!(chunks, vec!["real text".to_string()]);
    }
}
