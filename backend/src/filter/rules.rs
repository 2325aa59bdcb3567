use super::{Direction, FilterContext};
use regex::bytes::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Declarative predicate body. Closed set so it can be stored and shipped as
/// plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterRule {
    /// Blocks when the message contains `pattern`.
    Contains {
        pattern: String,
        reason: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Blocks when the regex matches anywhere in the message (bytes mode).
    Regex { pattern: String, reason: String },
    /// Applies `rule` only to messages travelling in `direction`.
    Direction {
        direction: Direction,
        rule: Box<FilterRule>,
    },
    /// Blocks with the reason of the first matching child.
    Any { rules: Vec<FilterRule> },
    /// Blocks when every child matches.
    All { rules: Vec<FilterRule>, reason: String },
    /// Blocks when the child does not match.
    Not { rule: Box<FilterRule>, reason: String },
}

impl FilterRule {
    pub(crate) fn compile(&self) -> Result<CompiledRule, String> {
        Ok(match self {
            FilterRule::Contains {
                pattern,
                reason,
                case_insensitive,
            } => {
                let needle = if *case_insensitive {
                    pattern.to_ascii_lowercase().into_bytes()
                } else {
                    pattern.clone().into_bytes()
                };
                CompiledRule::Contains {
                    needle,
                    case_insensitive: *case_insensitive,
                    reason: reason.clone(),
                }
            }
            FilterRule::Regex { pattern, reason } => {
                let regex = RegexBuilder::new(pattern)
                    .size_limit(1 << 20)
                    .build()
                    .map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;
                CompiledRule::Regex {
                    regex,
                    reason: reason.clone(),
                }
            }
            FilterRule::Direction { direction, rule } => CompiledRule::Direction {
                direction: *direction,
                rule: Box::new(rule.compile()?),
            },
            FilterRule::Any { rules } => CompiledRule::Any {
                rules: compile_all(rules)?,
            },
            FilterRule::All { rules, reason } => {
                if rules.is_empty() {
                    return Err("'all' needs at least one rule".to_string());
                }
                CompiledRule::All {
                    rules: compile_all(rules)?,
                    reason: reason.clone(),
                }
            }
            FilterRule::Not { rule, reason } => CompiledRule::Not {
                rule: Box::new(rule.compile()?),
                reason: reason.clone(),
            },
        })
    }
}

fn compile_all(rules: &[FilterRule]) -> Result<Vec<CompiledRule>, String> {
    rules.iter().map(FilterRule::compile).collect()
}

#[derive(Debug, Clone)]
pub enum CompiledRule {
    Contains {
        needle: Vec<u8>,
        case_insensitive: bool,
        reason: String,
    },
    Regex {
        regex: Regex,
        reason: String,
    },
    Direction {
        direction: Direction,
        rule: Box<CompiledRule>,
    },
    Any {
        rules: Vec<CompiledRule>,
    },
    All {
        rules: Vec<CompiledRule>,
        reason: String,
    },
    Not {
        rule: Box<CompiledRule>,
        reason: String,
    },
}

impl CompiledRule {
    /// Returns the block reason when the rule fires.
    pub fn matches(&self, message: &[u8], ctx: &FilterContext<'_>) -> Option<String> {
        match self {
            CompiledRule::Contains {
                needle,
                case_insensitive,
                reason,
            } => {
                let hit = if *case_insensitive {
                    contains(&message.to_ascii_lowercase(), needle)
                } else {
                    contains(message, needle)
                };
                hit.then(|| reason.clone())
            }
            CompiledRule::Regex { regex, reason } => {
                regex.is_match(message).then(|| reason.clone())
            }
            CompiledRule::Direction { direction, rule } => {
                if ctx.direction == *direction {
                    rule.matches(message, ctx)
                } else {
                    None
                }
            }
            CompiledRule::Any { rules } => rules.iter().find_map(|r| r.matches(message, ctx)),
            CompiledRule::All { rules, reason } => rules
                .iter()
                .all(|r| r.matches(message, ctx).is_some())
                .then(|| reason.clone()),
            CompiledRule::Not { rule, reason } => match rule.matches(message, ctx) {
                Some(_) => None,
                None => Some(reason.clone()),
            },
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
