/// In-memory knowledge base of normative entries.
///
/// Loads one or more JSON array files (concurrently, concatenated in path order), cleans
/// text fields, and enforces id uniqueness. Field names from the original Portuguese export
/// (`titulo`, `texto`, `palavrasChave`) are accepted alongside the English ones. Keyword
/// phrases may be given as an array or as one `,`/`;`-delimited string.
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::KnowledgeBaseError;
use crate::model::NormativeEntry;

/// Immutable, cheaply clonable ordered collection of entries.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Arc<[NormativeEntry]>,
    index: Arc<HashMap<String, usize>>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
            index: Arc::new(HashMap::new()),
        }
    }
}

impl KnowledgeBase {
    pub fn from_entries(entries: Vec<NormativeEntry>) -> Result<Self, KnowledgeBaseError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.id.clone(), i).is_some() {
                return Err(KnowledgeBaseError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self {
            entries: entries.into(),
            index: Arc::new(index),
        })
    }

    pub fn entries(&self) -> &[NormativeEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&NormativeEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }
}

impl Deref for KnowledgeBase {
    type Target = [NormativeEntry];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

/// Load and merge knowledge base files. Files are read concurrently; the result keeps the
/// order of `paths`, then array order within each file.
pub async fn load_knowledge_base<P: AsRef<Path>>(paths: &[P]) -> Result<KnowledgeBase, KnowledgeBaseError> {
    let contents = futures::future::try_join_all(paths.iter().map(|p| read_file(p.as_ref()))).await?;

    let cleaner = TextCleaner::new();
    let mut entries = Vec::new();
    for (path, raw) in contents {
        let parsed = parse_entries(&path, &raw, &cleaner)?;
        info!(path = %path.display(), entries = parsed.len(), "knowledge base file loaded");
        entries.extend(parsed);
    }

    let kb = KnowledgeBase::from_entries(entries)?;
    info!(files = paths.len(), entries = kb.len(), "knowledge base ready");
    Ok(kb)
}

/// Split a comma-separated list of knowledge base paths, ignoring blanks.
pub fn split_path_list(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

async fn read_file(path: &Path) -> Result<(PathBuf, String), KnowledgeBaseError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| KnowledgeBaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok((path.to_path_buf(), raw))
}

/// Parse one JSON array of raw entries. Entries whose cleaned body is empty are skipped.
pub fn parse_entries(
    path: &Path,
    raw: &str,
    cleaner: &TextCleaner,
) -> Result<Vec<NormativeEntry>, KnowledgeBaseError> {
    let records: Vec<RawEntry> =
        serde_json::from_str(raw).map_err(|source| KnowledgeBaseError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let mut entries = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let id = match record.id {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(KnowledgeBaseError::InvalidEntry {
                    path: path.to_path_buf(),
                    index,
                    reason: format!("id must be a non-empty string or number, found {other}"),
                });
            }
        };

        let body = cleaner.clean(record.body.as_deref().unwrap_or_default());
        if body.is_empty() {
            warn!(path = %path.display(), id = %id, "skipping entry with empty body");
            continue;
        }

        let phrases = match record.keyword_phrases {
            Some(RawPhrases::List(list)) => list,
            Some(RawPhrases::Delimited(text)) => cleaner.split_phrases(&text),
            None => Vec::new(),
        };

        entries.push(NormativeEntry {
            id,
            title: cleaner.clean(record.title.as_deref().unwrap_or_default()),
            body,
            keyword_phrases: cleaner.normalize_phrases(phrases),
        });
    }
    Ok(entries)
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Value,
    #[serde(default, alias = "titulo")]
    title: Option<String>,
    #[serde(default, alias = "texto")]
    body: Option<String>,
    #[serde(
        default,
        rename = "keywordPhrases",
        alias = "palavrasChave",
        alias = "keyword_phrases"
    )]
    keyword_phrases: Option<RawPhrases>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPhrases {
    List(Vec<String>),
    Delimited(String),
}

/// HTML stripping, whitespace collapsing and keyword splitting.
pub struct TextCleaner {
    html_tag: Regex,
    phrase_delimiter: Regex,
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCleaner {
    pub fn new() -> Self {
        Self {
            html_tag: Regex::new(r"<[^>]*>").expect("valid regex"),
            phrase_delimiter: Regex::new(r"\s*[,;\[\]]\s*").expect("valid regex"),
        }
    }

    /// Strip HTML tags and collapse runs of whitespace.
    pub fn clean(&self, text: &str) -> String {
        let stripped = self.html_tag.replace_all(text, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn split_phrases(&self, text: &str) -> Vec<String> {
        self.phrase_delimiter
            .split(text)
            .map(str::to_string)
            .collect()
    }

    /// Clean and lowercase phrases, dropping empties and duplicates while keeping order.
    pub fn normalize_phrases(&self, phrases: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        phrases
            .into_iter()
            .map(|p| self.clean(&p).to_lowercase())
            .filter(|p| !p.is_empty())
            .filter(|p| seen.insert(p.clone()))
            .collect()
    }
}
