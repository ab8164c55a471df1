//! Field extraction from raw event text
//!
//! An ordered list of regex rules. For a single event the first rule to
//! produce a field name owns it; later rules never overwrite it.
//!
//! Rules come in two shapes:
//! - named groups: the first match contributes one field per participating
//!   group, `(?P<status>\d{3})` gives `status -> 200`
//! - exactly two unnamed groups: every match is a key/value pair,
//!   `(\w+)=(\w+)` on `level=error code=500` gives `level -> error` and
//!   `code -> 500`
//!
//! Any other rule matches nothing.

use regex::Regex;
use tracing::warn;

use crate::config::ConfigError;
use crate::types::Fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Named,
    KeyValue,
    Inert,
}

#[derive(Debug, Clone)]
struct Rule {
    regex: Regex,
    kind: RuleKind,
}

impl Rule {
    fn new(regex: Regex) -> Self {
        let named = regex.capture_names().flatten().count();
        let kind = if named > 0 {
            RuleKind::Named
        } else if regex.captures_len() == 3 {
            RuleKind::KeyValue
        } else {
            warn!(pattern = regex.as_str(), "Field extractor has no named groups and will produce nothing");
            RuleKind::Inert
        };
        Self { regex, kind }
    }

    fn apply(&self, raw: &str, fields: &mut Fields) {
        match self.kind {
            RuleKind::Named => {
                let Some(caps) = self.regex.captures(raw) else {
                    return;
                };
                for name in self.regex.capture_names().flatten() {
                    if let Some(m) = caps.name(name) {
                        fields
                            .entry(name.to_string())
                            .or_insert_with(|| m.as_str().to_string());
                    }
                }
            }
            RuleKind::KeyValue => {
                for caps in self.regex.captures_iter(raw) {
                    if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
                        fields
                            .entry(key.as_str().to_string())
                            .or_insert_with(|| value.as_str().to_string());
                    }
                }
            }
            RuleKind::Inert => {}
        }
    }
}

/// Stateless rule set turning raw text into fields
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    rules: Vec<Rule>,
}

impl FieldExtractor {
    /// Compile rules from pattern text, in order
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let regexes = patterns
            .iter()
            .enumerate()
            .map(|(index, pattern)| {
                Regex::new(pattern.as_ref())
                    .map_err(|source| ConfigError::InvalidPattern { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_regexes(regexes))
    }

    /// Build from already compiled regexes
    pub fn from_regexes(regexes: Vec<Regex>) -> Self {
        Self {
            rules: regexes.into_iter().map(Rule::new).collect(),
        }
    }

    /// Extract fields from one event's raw text
    pub fn extract(&self, raw: &str) -> Fields {
        let mut fields = Fields::new();
        for rule in &self.rules {
            rule.apply(raw, &mut fields);
        }
        fields
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Pattern text of every rule, in order
    pub fn patterns(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.regex.as_str()).collect()
    }
}
