use anyhow::{Result, bail};
use regex::Regex;

use crate::config::KeywordConfig;

/// Decides whether a posting's description is worth keeping.
///
/// Matching is case-insensitive substring containment, so `"react"` also
/// matches `"reactive"`. Keywords are stored lower-cased.
pub struct Classifier {
    include: Vec<String>,
    exclude: Vec<String>,
    experience_re: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub accepted: bool,
    /// Inclusion keywords found, in configured order.
    pub matched: Vec<String>,
    /// Exclusion keywords found, in configured order.
    pub excluded: Vec<String>,
    pub experience_years: Option<u32>,
}

impl Classifier {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = normalize(include)?;
        let exclude = normalize(exclude)?;
        if include.is_empty() {
            bail!("At least one inclusion keyword is required");
        }

        Ok(Self {
            include,
            exclude,
            experience_re: experience_regex(),
        })
    }

    pub fn from_config(config: &KeywordConfig) -> Result<Self> {
        Self::new(&config.include, &config.exclude)
    }

    pub fn classify(&self, description: &str) -> Classification {
        let lower = description.to_lowercase();

        let matched: Vec<String> = self
            .include
            .iter()
            .filter(|keyword| lower.contains(keyword.as_str()))
            .cloned()
            .collect();
        let excluded: Vec<String> = self
            .exclude
            .iter()
            .filter(|keyword| lower.contains(keyword.as_str()))
            .cloned()
            .collect();

        Classification {
            accepted: !matched.is_empty() && excluded.is_empty(),
            matched,
            excluded,
            experience_years: self.extract_experience(description),
        }
    }

    /// First "<n> year(s) (of) experience" figure in the text.
    pub fn extract_experience(&self, text: &str) -> Option<u32> {
        let captures = self.experience_re.captures(text)?;
        // Too many digits for u32 counts as no figure at all
        captures.get(1)?.as_str().parse().ok()
    }
}

fn experience_regex() -> Regex {
    // Constant pattern; a failure here is a programming error. ASCII digits
    // only, so a match never hides behind a figure that cannot parse.
    Regex::new(r"(?i)([0-9]+)\s*years?\s*(?:of)?\s*experience").expect("experience pattern is valid")
}

fn normalize(keywords: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            bail!("Keywords must not be empty");
        }
        // The Stack column is comma-joined
        if keyword.contains(',') {
            bail!("Keyword '{}' must not contain a comma", keyword);
        }
        if !out.contains(&keyword) {
            out.push(keyword);
        }
    }
    Ok(out)
}
