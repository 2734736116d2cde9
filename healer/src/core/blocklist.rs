//! Pre-execution text-pattern blocklist.
//!
//! The blocklist is an ordered, enumerable list of named regex rules checked
//! against program text before any process is launched. It is separate from
//! process-level isolation (fresh process + timeout) and is not a sandbox.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Limitation statement surfaced verbatim to callers (CLI help, blocked stderr).
pub const BLOCKLIST_LIMITATION: &str = "The blocklist is a text-pattern risk-reduction list, \
not an isolation boundary: it stops common accidental footguns (module imports, direct file \
opens, dynamic evaluation) and does not stop deliberate evasion.";

/// Serializable rule as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRuleConfig {
    /// Human-readable rule name reported when the rule matches.
    pub name: String,
    /// Regular expression matched against the whole program text.
    pub pattern: String,
}

impl BlockRuleConfig {
    fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Default rules: imports, filesystem opens, dynamic evaluation.
pub fn default_rules() -> Vec<BlockRuleConfig> {
    vec![
        BlockRuleConfig::new("import statement", r"(?m)^[ \t]*(import\s+\w|from\s+\S+\s+import\b)"),
        BlockRuleConfig::new("dynamic import", r"\b__import__\s*\("),
        BlockRuleConfig::new("file open", r"\bopen\s*\("),
        BlockRuleConfig::new("eval call", r"\beval\s*\("),
        BlockRuleConfig::new("exec call", r"\bexec\s*\("),
        BlockRuleConfig::new("compile call", r"\bcompile\s*\("),
    ]
}

#[derive(Debug, Clone)]
struct BlockRule {
    name: String,
    pattern: Regex,
}

/// First rule that matched a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedMatch {
    pub rule: String,
    pub pattern: String,
    pub line: usize,
    pub excerpt: String,
}

impl BlockedMatch {
    /// Synthesized stderr for a blocked execution. Fed back to the generator
    /// as repair context, so it names the rule and the offending line.
    pub fn describe(&self) -> String {
        format!(
            "blocked: program matched disallowed pattern `{}` ({}) on line {}: {}\n\
             rewrite the program without this construct.\n{}\n",
            self.rule, self.pattern, self.line, self.excerpt, BLOCKLIST_LIMITATION
        )
    }
}

/// Compiled, ordered rule set.
#[derive(Debug, Clone)]
pub struct Blocklist {
    rules: Vec<BlockRule>,
}

impl Blocklist {
    /// Compile rules in order. Fails on the first invalid pattern.
    pub fn new(rules: &[BlockRuleConfig]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let pattern = Regex::new(&rule.pattern)
                    .with_context(|| format!("compile blocklist rule `{}`", rule.name))?;
                Ok(BlockRule {
                    name: rule.name.clone(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.rules.len()
    }

    /// Return the first rule (in configured order) matching `program`.
    pub fn check(&self, program: &str) -> Option<BlockedMatch> {
        self.rules.iter().find_map(|rule| {
            let found = rule.pattern.find(program)?;
            let line = program[..found.start()].matches('\n').count() + 1;
            let excerpt = program.lines().nth(line - 1).unwrap_or_default().trim();
            Some(BlockedMatch {
                rule: rule.name.clone(),
                pattern: rule.pattern.as_str().to_string(),
                line,
                excerpt: excerpt.to_string(),
            })
        })
    }
}
