//! Validation rules and the error set they populate.
//!
//! Each model declares an ordered slice of [`Rule`]s. [`run_rules`] evaluates
//! every rule (a failing rule never stops the ones after it) and collects the
//! messages into a fresh [`Errors`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::identifiers::humanize;
use crate::model::Model;
use crate::value::Value;

/// Key used for whole-record errors.
pub const BASE: &str = "base";

/// Ordered mapping from attribute name to messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Errors {
    entries: Vec<(String, Vec<String>)>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message for `attribute`.
    pub fn add(&mut self, attribute: &str, message: impl Into<String>) {
        let message = message.into();
        match self.entries.iter_mut().find(|(name, _)| name == attribute) {
            Some((_, messages)) => messages.push(message),
            None => self.entries.push((attribute.to_string(), vec![message])),
        }
    }

    /// Append a whole-record message.
    pub fn add_base(&mut self, message: impl Into<String>) {
        self.add(BASE, message);
    }

    /// Messages for `attribute`; empty when there are none.
    pub fn get(&self, attribute: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(name, _)| name == attribute)
            .map_or(&[], |(_, messages)| messages.as_slice())
    }

    pub fn base(&self) -> &[String] {
        self.get(BASE)
    }

    /// Attributes with at least one message, in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, messages)| {
            messages.iter().map(move |m| (name.as_str(), m.as_str()))
        })
    }

    /// Messages prefixed with the humanized attribute name (`"Name can't be blank"`).
    /// Base messages are returned as-is.
    pub fn full_messages(&self) -> Vec<String> {
        self.iter()
            .map(|(name, message)| {
                if name == BASE {
                    message.to_string()
                } else {
                    format!("{} {message}", humanize(name))
                }
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, messages)| messages.len()).sum()
    }

    /// Move every message from `other` into `self`.
    pub fn extend(&mut self, other: Errors) {
        for (name, messages) in other.entries {
            for message in messages {
                self.add(&name, message);
            }
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

/// What a rule reports against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    Attribute(&'static str),
    Base,
}

impl RuleTarget {
    pub const fn key(self) -> &'static str {
        match self {
            RuleTarget::Attribute(name) => name,
            RuleTarget::Base => BASE,
        }
    }
}

/// The check a rule performs.
pub enum RuleCheck<M> {
    /// Not NULL and not blank text.
    Presence,
    /// Character count bounds. NULL counts as zero characters.
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Text matches the regex.
    Format(&'static str),
    /// Value is one of the listed strings.
    Inclusion(&'static [&'static str]),
    /// Numeric (or numeric text) within optional bounds.
    Numericality { min: Option<f64>, max: Option<f64> },
    /// Arbitrary check that writes into the error set directly.
    Custom(fn(&M, &mut Errors)),
}

impl<M> Clone for RuleCheck<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for RuleCheck<M> {}

impl<M> fmt::Debug for RuleCheck<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCheck::Presence => f.write_str("Presence"),
            RuleCheck::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            RuleCheck::Format(pattern) => f.debug_tuple("Format").field(pattern).finish(),
            RuleCheck::Inclusion(set) => f.debug_tuple("Inclusion").field(set).finish(),
            RuleCheck::Numericality { min, max } => f
                .debug_struct("Numericality")
                .field("min", min)
                .field("max", max)
                .finish(),
            RuleCheck::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One declared validation rule.
pub struct Rule<M> {
    pub target: RuleTarget,
    pub check: RuleCheck<M>,
    /// Replaces the default message.
    pub message: Option<&'static str>,
}

impl<M> Clone for Rule<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Rule<M> {}

impl<M> fmt::Debug for Rule<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("target", &self.target)
            .field("check", &self.check)
            .field("message", &self.message)
            .finish()
    }
}

impl<M> Rule<M> {
    const fn on(attribute: &'static str, check: RuleCheck<M>) -> Self {
        Self {
            target: RuleTarget::Attribute(attribute),
            check,
            message: None,
        }
    }

    pub const fn presence(attribute: &'static str) -> Self {
        Self::on(attribute, RuleCheck::Presence)
    }

    pub const fn length(attribute: &'static str, min: Option<usize>, max: Option<usize>) -> Self {
        Self::on(attribute, RuleCheck::Length { min, max })
    }

    pub const fn format(attribute: &'static str, pattern: &'static str) -> Self {
        Self::on(attribute, RuleCheck::Format(pattern))
    }

    pub const fn inclusion(attribute: &'static str, allowed: &'static [&'static str]) -> Self {
        Self::on(attribute, RuleCheck::Inclusion(allowed))
    }

    pub const fn numericality(attribute: &'static str, min: Option<f64>, max: Option<f64>) -> Self {
        Self::on(attribute, RuleCheck::Numericality { min, max })
    }

    /// A record-level check. It may add errors under any key.
    pub const fn custom(check: fn(&M, &mut Errors)) -> Self {
        Self {
            target: RuleTarget::Base,
            check: RuleCheck::Custom(check),
            message: None,
        }
    }

    #[must_use]
    pub const fn message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    /// Re-target the rule (mostly useful for `custom`).
    #[must_use]
    pub const fn target(mut self, target: RuleTarget) -> Self {
        self.target = target;
        self
    }
}

impl<M: Model> Rule<M> {
    /// Evaluate this rule against `record`, appending any failure to `errors`.
    pub fn apply(&self, record: &M, errors: &mut Errors) {
        let key = self.target.key();
        let value = match self.target {
            RuleTarget::Attribute(name) => record.read_attribute(name).unwrap_or_default(),
            RuleTarget::Base => Value::Null,
        };

        let failure = match self.check {
            RuleCheck::Presence => is_blank(&value).then(|| "can't be blank".to_string()),
            RuleCheck::Length { min, max } => check_length(&value, min, max),
            RuleCheck::Format(pattern) => {
                let matched = !value.is_null() && matches_pattern(&value.to_string(), pattern);
                (!matched).then(|| "is invalid".to_string())
            }
            RuleCheck::Inclusion(allowed) => {
                let included = value
                    .as_str()
                    .is_some_and(|s| allowed.iter().any(|candidate| *candidate == s));
                (!included).then(|| "is not included in the list".to_string())
            }
            RuleCheck::Numericality { min, max } => check_number(&value, min, max),
            RuleCheck::Custom(check) => {
                check(record, errors);
                None
            }
        };

        if let Some(default) = failure {
            errors.add(key, self.message.map_or(default, str::to_string));
        }
    }
}

/// Run every rule in order and return the collected errors.
pub fn run_rules<M: Model>(record: &M, rules: &[Rule<M>]) -> Errors {
    let mut errors = Errors::new();
    for rule in rules {
        rule.apply(record, &mut errors);
    }
    errors
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "character" } else { "characters" }
}

fn check_length(value: &Value, min: Option<usize>, max: Option<usize>) -> Option<String> {
    let len = match value {
        Value::Null => 0,
        Value::Text(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    };
    if let Some(min) = min.filter(|min| len < *min) {
        return Some(format!("is too short (minimum is {min} {})", plural(min)));
    }
    if let Some(max) = max.filter(|max| len > *max) {
        return Some(format!("is too long (maximum is {max} {})", plural(max)));
    }
    None
}

fn check_number(value: &Value, min: Option<f64>, max: Option<f64>) -> Option<String> {
    let number = match value {
        Value::BigInt(n) => Some(*n as f64),
        Value::Double(n) => Some(*n),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        Value::Null | Value::Bool(_) => None,
    };
    let Some(number) = number else {
        return Some("is not a number".to_string());
    };
    if let Some(min) = min.filter(|min| number < *min) {
        return Some(format!("must be greater than or equal to {min}"));
    }
    if let Some(max) = max.filter(|max| number > *max) {
        return Some(format!("must be less than or equal to {max}"));
    }
    None
}

/// Thread-safe cache of compiled patterns.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Patterns are compiled on first use and cached for the lifetime of the
/// program. An invalid pattern never matches and is logged at warn level.
///
/// ```
/// use rowmodel_core::matches_pattern;
///
/// assert!(matches_pattern("user 12", r"^user \d+$"));
/// assert!(!matches_pattern("post 12", r"^user \d+$"));
/// ```
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}
