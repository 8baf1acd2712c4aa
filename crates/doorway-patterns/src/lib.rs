use regex::{Regex, RegexBuilder};
use std::fmt;
use thiserror::Error;

mod config;

pub use config::{PatternConfig, PatternSet};

/// Errors raised while building or loading patterns
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regex for pattern '{name}': {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to access pattern file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse pattern file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize pattern file: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A named regular expression recognisable in transport output.
///
/// Matching is unanchored; `^`/`$` match at line boundaries, so a pattern
/// only requires full-line anchoring when it says so.
#[derive(Clone)]
pub struct Pattern {
    name: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(name: impl Into<String>, regex: &str) -> Result<Self, PatternError> {
        let name = name.into();
        let regex = RegexBuilder::new(regex)
            .multi_line(true)
            .build()
            .map_err(|source| PatternError::InvalidRegex {
                name: name.clone(),
                source,
            })?;
        Ok(Self { name, regex })
    }

    /// Pattern matching `text` verbatim
    pub fn literal(name: impl Into<String>, text: &str) -> Self {
        let name = name.into();
        // An escaped literal is always a valid regex.
        let regex = Regex::new(&regex::escape(text)).unwrap_or_else(|_| unreachable!());
        Self { name, regex }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.is_match(haystack)
    }

    /// Leftmost match of this pattern, as (start, end)
    pub fn find(&self, haystack: &str) -> Option<(usize, usize)> {
        self.regex.find(haystack).map(|m| (m.start(), m.end()))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.regex.as_str() == other.regex.as_str()
    }
}

/// Result of classifying a chunk of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Position of the matching pattern in the matcher's list
    pub index: usize,
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Classifies text against an ordered list of patterns.
///
/// The first pattern in declaration order that matches anywhere in the
/// text wins, regardless of where in the text the match sits.
#[derive(Debug, Default)]
pub struct PatternMatcher<'a> {
    patterns: Vec<&'a Pattern>,
}

impl<'a> PatternMatcher<'a> {
    pub fn new(patterns: Vec<&'a Pattern>) -> Self {
        Self { patterns }
    }

    pub fn push(&mut self, pattern: &'a Pattern) {
        self.patterns.push(pattern);
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// One-shot classification over a borrowed pattern list
    pub fn first_match(patterns: &[&'a Pattern], haystack: &str) -> Option<PatternMatch> {
        Self::new(patterns.to_vec()).classify(haystack)
    }

    /// Classify `haystack`; `None` means "not yet", never an error
    pub fn classify(&self, haystack: &str) -> Option<PatternMatch> {
        self.patterns
            .iter()
            .enumerate()
            .find_map(|(index, pattern)| {
                pattern.find(haystack).map(|(start, end)| PatternMatch {
                    index,
                    name: pattern.name().to_string(),
                    start,
                    end,
                    text: haystack[start..end].to_string(),
                })
            })
    }
}

/// Build a prompt pattern from prompt text captured on a live session.
///
/// `router#` also accepts mode suffixes such as `router(config)#`; text
/// that does not end in a prompt character is matched verbatim at a line
/// end.
pub fn make_dynamic_prompt(prompt: &str) -> Pattern {
    let prompt = prompt.trim();
    let regex = match prompt.chars().last() {
        Some(c @ ('#' | '>' | '$' | '%')) => {
            let body = &prompt[..prompt.len() - c.len_utf8()];
            let hostname = body.split('(').next().unwrap_or(body);
            format!(r"{}(\([^)]*\))?[#>$%]\s?$", regex::escape(hostname))
        }
        _ => format!(r"{}\s?$", regex::escape(prompt)),
    };
    Pattern::new("prompt", &regex).unwrap_or_else(|_| Pattern::literal("prompt", prompt))
}

/// Privileged (`#`) form of a detected prompt, e.g. `router#` for `router>`
pub fn make_privileged_prompt(prompt: &str) -> Pattern {
    let prompt = prompt.trim();
    let body = prompt.trim_end_matches(['#', '>', '$', '%']);
    let hostname = body.split('(').next().unwrap_or(body);
    let regex = format!(r"{}(\([^)]*\))?#\s?$", regex::escape(hostname));
    Pattern::new("privileged_prompt", &regex)
        .unwrap_or_else(|_| Pattern::literal("privileged_prompt", &format!("{}#", hostname)))
}
