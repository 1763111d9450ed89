use crate::{
    config::{ClassifierRule, Config},
    error::FailureCategory,
};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: FailureCategory,
    pub excerpt: String,
}

pub trait Classifier: Send + Sync {
    fn classify(&self, output: &str) -> Classification;
}

#[derive(Debug, Clone)]
pub struct SubstringClassifier {
    rules: Vec<ClassifierRule>,
    excerpt_chars: usize,
    strip_ansi: bool,
}

impl SubstringClassifier {
    pub fn new(rules: Vec<ClassifierRule>, excerpt_chars: usize, strip_ansi: bool) -> Self {
        Self {
            rules,
            excerpt_chars,
            strip_ansi,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.classifier.rules.clone(),
            cfg.classifier.excerpt_chars,
            cfg.classifier.strip_ansi,
        )
    }

    pub fn excerpt(&self, output: &str) -> String {
        if self.strip_ansi {
            excerpt(&strip_ansi(output), self.excerpt_chars)
        } else {
            excerpt(output, self.excerpt_chars)
        }
    }
}

impl Default for SubstringClassifier {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Classifier for SubstringClassifier {
    fn classify(&self, output: &str) -> Classification {
        let category = self
            .rules
            .iter()
            .find(|rule| !rule.marker.is_empty() && output.contains(&rule.marker))
            .map(|rule| rule.category)
            .unwrap_or(FailureCategory::Unclassified);

        Classification {
            category,
            excerpt: self.excerpt(output),
        }
    }
}

pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub fn strip_ansi(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let re = ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("ANSI escape pattern is valid")
    });
    re.replace_all(text, "").into_owned()
}
