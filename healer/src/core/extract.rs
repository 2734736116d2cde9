//! Extraction of a single runnable snippet from free-form model output.
//!
//! Extraction takes the first fenced block, falling back to the whole text
//! when no fence exists. Normalization then wraps a lone bare expression in
//! `print(...)` so trivial tasks always produce observable stdout.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

const FENCE: &str = "```";

/// Words that start a statement rather than an expression.
const STATEMENT_KEYWORDS: &[&str] = &[
    "assert", "async", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "nonlocal", "pass", "print", "raise",
    "return", "try", "while", "with", "yield",
];

static PRINT_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bprint\s*\(").expect("print call regex should be valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no code found in generated text")]
    NoCodeFound,
}

/// A model response paired with the program extracted from it.
///
/// The only constructor is [`Generation::parse`], so a program can never be
/// detached from the text it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    text: String,
    program: String,
}

impl Generation {
    /// Extract and normalize the program contained in `text`.
    pub fn parse(text: String) -> Result<Self, ExtractError> {
        let snippet = extract_program(&text)?;
        let program = normalize_program(&snippet);
        Ok(Self { text, program })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn into_parts(self) -> (String, String) {
        (self.text, self.program)
    }
}

/// Pull one runnable snippet out of generated text.
///
/// Uses the first fenced block (language tag optional). Without any fence the
/// whole text is the candidate. The result is whitespace-normalized: CRLF
/// line endings become LF, common indentation and leading blank lines are
/// removed, and trailing whitespace is trimmed.
pub fn extract_program(text: &str) -> Result<String, ExtractError> {
    let text = text.replace("\r\n", "\n");
    let candidate = first_fenced_block(&text).unwrap_or_else(|| text.clone());
    let program = tidy(&candidate);
    if !has_plausible_statement(&program) {
        return Err(ExtractError::NoCodeFound);
    }
    Ok(program)
}

/// Wrap a single bare expression in `print(...)`.
///
/// Purely syntactic and applied once. Multi-statement snippets, statements,
/// assignments, annotations and anything already calling `print` pass through
/// unchanged. A trailing comment stays outside the call.
pub fn normalize_program(snippet: &str) -> String {
    match bare_expression(snippet.trim()) {
        Some((expr, trailer)) => format!("print({expr}){trailer}"),
        None => snippet.to_string(),
    }
}

fn first_fenced_block(text: &str) -> Option<String> {
    let mut lines = text.lines();
    loop {
        let line = lines.next()?;
        let Some(rest) = line.trim_start().strip_prefix(FENCE) else {
            continue;
        };
        // Single-line form: ```print(1)```
        if let Some(inline) = rest.trim_end().strip_suffix(FENCE) {
            return Some(inline.to_string());
        }
        break;
    }

    let mut body = Vec::new();
    for line in lines {
        if line.trim_start().starts_with(FENCE) {
            break;
        }
        body.push(line);
    }
    Some(body.join("\n"))
}

fn tidy(candidate: &str) -> String {
    let lines: Vec<&str> = candidate
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .collect();
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let dedented: Vec<&str> = lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect();
    dedented.join("\n").trim_end().to_string()
}

fn has_plausible_statement(program: &str) -> bool {
    program.lines().map(str::trim).any(|line| {
        !line.is_empty()
            && !line.starts_with('#')
            && line.chars().any(|c| c.is_ascii_alphanumeric())
    })
}

/// Split a one-line snippet into its expression and whatever follows it
/// (spacing plus a trailing comment), or `None` when it is not a bare
/// expression.
fn bare_expression(snippet: &str) -> Option<(&str, &str)> {
    if snippet.is_empty() || snippet.contains('\n') {
        return None;
    }
    let scan = scan_top_level(snippet);
    if scan.statement {
        return None;
    }
    let expr = snippet[..scan.code_end].trim_end();
    if expr.is_empty() || expr.starts_with('@') || expr.ends_with(':') {
        return None;
    }
    if PRINT_CALL_RE.is_match(expr) {
        return None;
    }
    let first_word: String = expr
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if STATEMENT_KEYWORDS.contains(&first_word.as_str()) {
        return None;
    }
    Some((expr, &snippet[expr.len()..]))
}

struct TopLevelScan {
    /// `;`, an assignment `=` or an annotation/walrus `:` outside brackets.
    statement: bool,
    /// Byte offset of a trailing comment, or the snippet length.
    code_end: usize,
}

/// Scan one line outside brackets and string literals.
///
/// A top-level `:` is a statement marker unless it closes a `lambda`
/// parameter list; `=` between `lambda` and its `:` is a default value.
fn scan_top_level(snippet: &str) -> TopLevelScan {
    let chars: Vec<(usize, char)> = snippet.char_indices().collect();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut open_lambdas = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if let Some(q) = quote {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        let prev = i.checked_sub(1).map(|j| chars[j].1);
        let next = chars.get(i + 1).map(|&(_, c)| c);
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => {
                return TopLevelScan {
                    statement: false,
                    code_end: offset,
                };
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            ';' => return statement(snippet),
            ':' if open_lambdas > 0 && next != Some('=') => open_lambdas -= 1,
            ':' => return statement(snippet),
            '=' if open_lambdas > 0 => {}
            '=' => {
                let comparison = matches!(prev, Some('=' | '!' | '<' | '>')) || next == Some('=');
                if !comparison {
                    return statement(snippet);
                }
            }
            c if is_word_start(c, prev) => {
                let word: String = chars[i..]
                    .iter()
                    .map(|&(_, c)| c)
                    .take_while(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                if word == "lambda" {
                    open_lambdas += 1;
                }
                i += word.chars().count();
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    TopLevelScan {
        statement: false,
        code_end: snippet.len(),
    }
}

fn statement(snippet: &str) -> TopLevelScan {
    TopLevelScan {
        statement: true,
        code_end: snippet.len(),
    }
}

fn is_word_start(c: char, prev: Option<char>) -> bool {
    (c.is_alphabetic() || c == '_') && !prev.is_some_and(|p| p.is_alphanumeric() || p == '_')
}
