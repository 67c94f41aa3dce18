//! Classification of applications into productive, unproductive and neutral, and the threshold
//! rules that turn unproductive usage into blocks.

pub mod threshold;

use std::fmt::Display;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Productive,
    Unproductive,
    Neutral,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Productive => write!(f, "productive"),
            Category::Unproductive => write!(f, "unproductive"),
            Category::Neutral => write!(f, "neutral"),
        }
    }
}

/// Keyword lists used for classification. Keywords are matched as substrings of lowercased
/// application names. The set is always replaced as a whole, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub productive: Vec<String>,
    pub unproductive: Vec<String>,
}

impl RuleSet {
    pub fn new(
        productive: impl IntoIterator<Item = impl AsRef<str>>,
        unproductive: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            productive: normalize_keywords(productive),
            unproductive: normalize_keywords(unproductive),
        }
    }

    /// Applies keyword normalization to a set that came from disk.
    pub fn normalized(self) -> Self {
        Self::new(self.productive, self.unproductive)
    }

    /// First unproductive keyword contained in an already lowercased name.
    pub fn unproductive_match(&self, lowercase_name: &str) -> Option<&str> {
        self.unproductive
            .iter()
            .find(|keyword| lowercase_name.contains(keyword.as_str()))
            .map(String::as_str)
    }

    fn productive_match(&self, lowercase_name: &str) -> Option<&str> {
        self.productive
            .iter()
            .find(|keyword| lowercase_name.contains(keyword.as_str()))
            .map(String::as_str)
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(
            ["code", "vim", "terminal", "word", "excel", "notion"],
            [
                "youtube",
                "netflix",
                "reddit",
                "twitter",
                "facebook",
                "instagram",
                "tiktok",
                "steam",
                "game",
            ],
        )
    }
}

// Empty keywords would match every name.
fn normalize_keywords(keywords: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    keywords
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Productive keywords take priority over unproductive ones.
pub fn classify(name: &str, rules: &RuleSet) -> Category {
    let name = name.to_lowercase();
    if rules.productive_match(&name).is_some() {
        Category::Productive
    } else if rules.unproductive_match(&name).is_some() {
        Category::Unproductive
    } else {
        Category::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, Category, RuleSet};

    fn rules() -> RuleSet {
        RuleSet::new(["code", "docs"], ["youtube", "game"])
    }

    #[test]
    fn test_classify_basic() {
        let rules = rules();
        assert_eq!(classify("Visual Studio Code", &rules), Category::Productive);
        assert_eq!(classify("YouTube - Firefox", &rules), Category::Unproductive);
        assert_eq!(classify("notepad.exe", &rules), Category::Neutral);
    }

    #[test]
    fn test_classify_productive_takes_priority() {
        let rules = rules();
        assert_eq!(
            classify("game engine docs", &rules),
            Category::Productive
        );
    }

    #[test]
    fn test_classify_empty_rules() {
        let rules = RuleSet::new(Vec::<String>::new(), Vec::<String>::new());
        assert_eq!(classify("anything", &rules), Category::Neutral);
        assert_eq!(classify("", &rules), Category::Neutral);
    }

    #[test]
    fn test_keywords_normalized() {
        let rules = RuleSet::new(["  Code ", ""], ["YouTube"]);
        assert_eq!(rules.productive, vec!["code".to_string()]);
        assert_eq!(rules.unproductive, vec!["youtube".to_string()]);
        // Without normalization the empty keyword would make everything productive.
        assert_eq!(classify("reddit", &rules), Category::Neutral);
    }
}
