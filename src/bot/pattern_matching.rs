// src/bot/pattern_matching.rs - Compiled term and regex matchers for rule categories

use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use std::fmt;

use crate::bot::normalizer::normalize_text;
use crate::types::{CategoryDocument, MatchEvaluationError, RuleCompileError, ThreadRole};

/// Upper bound on the compiled program size of a single rule
const MAX_COMPILED_SIZE: usize = 1 << 20;

/// A compiled rule that can be scanned against normalized message text
pub trait RuleMatcher: Send + Sync + fmt::Debug {
    /// Configured source of the rule, used in diagnostics
    fn source(&self) -> &str;

    /// Topic-specific elaboration attached to the rule
    fn detail(&self) -> Option<&str>;

    /// Returns the label to report for a match, or `None` when the rule does not fire
    fn find(&self, text: &str) -> Result<Option<String>, MatchEvaluationError>;
}

/// Literal phrase matched case-insensitively at token boundaries
#[derive(Debug)]
pub struct TermMatcher {
    term: String,
    detail: Option<String>,
    regex: Regex,
}

impl TermMatcher {
    pub fn compile(term: &str, detail: Option<&str>) -> Result<Self, regex::Error> {
        let term = normalize_text(term);
        let regex = RegexBuilder::new(&whole_word_expression(&term))
            .case_insensitive(true)
            .size_limit(MAX_COMPILED_SIZE)
            .build()?;

        Ok(Self {
            term,
            detail: detail.map(str::to_string),
            regex,
        })
    }
}

impl RuleMatcher for TermMatcher {
    fn source(&self) -> &str {
        &self.term
    }

    fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    fn find(&self, text: &str) -> Result<Option<String>, MatchEvaluationError> {
        Ok(self.regex.is_match(text).then(|| self.term.clone()))
    }
}

/// Free-form regular expression matched case-insensitively against the whole message
#[derive(Debug)]
pub struct PatternMatcher {
    pattern: String,
    detail: Option<String>,
    regex: Regex,
}

impl PatternMatcher {
    pub fn compile(pattern: &str, detail: Option<&str>) -> Result<Self, regex::Error> {
        let pattern = normalize_text(pattern);
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .size_limit(MAX_COMPILED_SIZE)
            .build()?;

        Ok(Self {
            pattern,
            detail: detail.map(str::to_string),
            regex,
        })
    }
}

impl RuleMatcher for PatternMatcher {
    fn source(&self) -> &str {
        &self.pattern
    }

    fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    fn find(&self, text: &str) -> Result<Option<String>, MatchEvaluationError> {
        Ok(self.regex.find(text).map(|m| m.as_str().to_string()))
    }
}

/// Build a regex that matches `term` literally, anchored at word boundaries
/// on each side whose edge character is itself a word character.
fn whole_word_expression(term: &str) -> String {
    let escaped = regex::escape(term);
    let leading = if term.chars().next().is_some_and(is_word_char) { r"\b" } else { "" };
    let trailing = if term.chars().last().is_some_and(is_word_char) { r"\b" } else { "" };
    format!("{}{}{}", leading, escaped, trailing)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// One rule category with its matchers compiled once per configuration load
#[derive(Debug)]
pub struct CompiledCategory {
    pub name: String,
    pub header: String,
    pub threads: Vec<ThreadRole>,
    pub silent: bool,
    rules: Vec<Box<dyn RuleMatcher>>,
}

/// The first rule of a category that fired on a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMatch<'a> {
    pub category: &'a str,
    pub header: &'a str,
    pub silent: bool,
    pub label: String,
    pub detail: Option<&'a str>,
}

impl CompiledCategory {
    /// Compile a category document. Rules that fail to compile are reported
    /// and left out; the rest of the category stays usable.
    pub fn compile(name: &str, document: &CategoryDocument) -> (Self, Vec<RuleCompileError>) {
        let mut rules: Vec<Box<dyn RuleMatcher>> = Vec::new();
        let mut errors = Vec::new();

        for entry in &document.terms {
            match TermMatcher::compile(entry.term(), entry.detail()) {
                Ok(matcher) => rules.push(Box::new(matcher)),
                Err(e) => errors.push(RuleCompileError {
                    category: name.to_string(),
                    rule: entry.term().to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        for entry in &document.patterns {
            match PatternMatcher::compile(entry.pattern(), entry.detail()) {
                Ok(matcher) => rules.push(Box::new(matcher)),
                Err(e) => errors.push(RuleCompileError {
                    category: name.to_string(),
                    rule: entry.pattern().to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        for error in &errors {
            warn!("Skipping rule: {}", error);
        }

        debug!("Compiled category '{}' with {} rule(s)", name, rules.len());

        let category = Self {
            name: name.to_string(),
            header: document.header.clone(),
            threads: document.threads.clone(),
            silent: document.silent,
            rules,
        };
        (category, errors)
    }

    /// Assemble a category from already-built matchers
    pub fn from_rules(name: &str, header: &str, rules: Vec<Box<dyn RuleMatcher>>) -> Self {
        Self {
            name: name.to_string(),
            header: header.to_string(),
            threads: Vec::new(),
            silent: false,
            rules,
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Whether the category is active in a thread with the given role
    pub fn applies_to(&self, role: Option<ThreadRole>) -> bool {
        self.threads.is_empty() || role.is_some_and(|r| self.threads.contains(&r))
    }

    /// Scan rules in declared order. A rule that errors is logged and skipped.
    pub fn first_match(&self, text: &str) -> Option<CategoryMatch<'_>> {
        for rule in &self.rules {
            match rule.find(text) {
                Ok(Some(label)) => {
                    debug!("Category '{}' matched rule '{}'", self.name, rule.source());
                    return Some(CategoryMatch {
                        category: &self.name,
                        header: &self.header,
                        silent: self.silent,
                        label,
                        detail: rule.detail(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping rule in category '{}': {}", self.name, e);
                }
            }
        }
        None
    }
}

/// First match across an ordered list of categories active for `role`
pub fn first_match_in<'a>(
    categories: &'a [CompiledCategory],
    text: &str,
    role: Option<ThreadRole>,
) -> Option<CategoryMatch<'a>> {
    categories
        .iter()
        .filter(|category| category.applies_to(role))
        .find_map(|category| category.first_match(text))
}
