use crate::config::LabelConfig;
use crate::error::{PipelineError, PipelineResult};
use std::collections::BTreeMap;

pub const STANDING: &str = "standing";
pub const UPRIGHT_SITTING: &str = "upright-sitting";
pub const SUPINE_LYING: &str = "supine-lying";

const BUILTIN: [(&str, &str); 6] = [
    (STANDING, STANDING),
    (UPRIGHT_SITTING, UPRIGHT_SITTING),
    (SUPINE_LYING, SUPINE_LYING),
    ("서기 자세", STANDING),
    ("앉기 자세 중립", UPRIGHT_SITTING),
    ("눕혀진 누운 자세", SUPINE_LYING),
];

/// Synonym table from free-form recording labels to canonical class names.
#[derive(Debug, Clone)]
pub struct LabelMap {
    entries: BTreeMap<String, String>,
}

impl Default for LabelMap {
    fn default() -> Self {
        let mut map = Self {
            entries: BTreeMap::new(),
        };
        for (synonym, canonical) in BUILTIN {
            map.insert(synonym, canonical);
        }
        map
    }
}

impl LabelMap {
    /// Built-in synonyms with the configured ones layered on top.
    pub fn from_config(cfg: &LabelConfig) -> Self {
        let mut map = Self::default();
        for (synonym, canonical) in &cfg.synonyms {
            map.insert(synonym, canonical);
        }
        map
    }

    pub fn insert(&mut self, synonym: &str, canonical: &str) {
        self.entries.insert(lookup_key(synonym), canonical.to_string());
    }

    /// Canonical label for `raw`. The whole string is tried first, then every
    /// `/`-separated part, so bilingual labels like `서기 자세/standing` resolve.
    pub fn normalize(&self, raw: &str) -> PipelineResult<String> {
        let cleaned = clean(raw);
        std::iter::once(cleaned.as_str())
            .chain(cleaned.split('/'))
            .find_map(|candidate| self.entries.get(&lookup_key(candidate)))
            .cloned()
            .ok_or_else(|| PipelineError::UnmappedLabel(raw.to_string()))
    }

    pub fn canonical_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.entries.values().map(String::as_str).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

/// Fold width variants and dash look-alikes onto plain ASCII, then lowercase.
fn clean(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FE63}' => '-',
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_lowercase()
}

fn lookup_key(s: &str) -> String {
    clean(s).split_whitespace().collect::<Vec<_>>().join("-")
}
