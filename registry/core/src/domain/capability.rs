// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capability queries and keyword matching.
//!
//! Components and workflows are matched by keyword overlap: a query's text is
//! reduced to a keyword set and an entry's relevance is the fraction of those
//! keywords found in the entry's name, description and tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "with",
];

/// Lowercased alphanumeric words of `text`, without stopwords.
pub fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Lowercase, hyphen-separated form of `text`, suitable as a registry name.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.len() > 64 {
        let mut cut = 64;
        while !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        slug.truncate(cut);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityQuery {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Matches below this relevance are dropped
    #[serde(default)]
    pub min_relevance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl CapabilityQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            min_relevance: 0.0,
            limit: None,
        }
    }

    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = language
            .map(normalize_language)
            .filter(|language| !language.is_empty());
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f64) -> Self {
        self.min_relevance = min_relevance.clamp(0.0, 1.0);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn keywords(&self) -> BTreeSet<String> {
        keywords(&self.text)
    }

    /// Fraction of query keywords present in `candidate`. Zero for a query
    /// without keywords.
    pub fn relevance(&self, candidate: &BTreeSet<String>) -> f64 {
        let wanted = self.keywords();
        if wanted.is_empty() {
            return 0.0;
        }
        let hits = wanted.iter().filter(|word| candidate.contains(*word)).count();
        hits as f64 / wanted.len() as f64
    }

    pub fn accepts_language(&self, language: &str) -> bool {
        match &self.language {
            Some(wanted) => wanted == &normalize_language(language),
            None => true,
        }
    }

    /// Relevance if the candidate is a match at all (positive and at least
    /// `min_relevance`).
    pub fn score(&self, candidate: &BTreeSet<String>) -> Option<f64> {
        let relevance = self.relevance(candidate);
        (relevance > 0.0 && relevance >= self.min_relevance).then_some(relevance)
    }
}

/// One unit of functionality a request needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            language: language
                .map(normalize_language)
                .filter(|language| !language.is_empty()),
        }
    }

    pub fn to_query(&self) -> CapabilityQuery {
        CapabilityQuery::new(self.name.clone()).with_language(self.language.as_deref())
    }

    pub fn keywords(&self) -> BTreeSet<String> {
        keywords(&self.name)
    }
}
