//! Output comparison
//!
//! Expected and actual output go through the same normalisation, driven by
//! the flags on the [`TestCase`], and are then compared structurally.

use std::cmp::Ordering;

use super::Execution;
use crate::models::TestCase;

/// Verdict for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgement {
    pub passed: bool,
    pub partial: bool,
}

/// A single comparable token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Token {
    fn rank(&self) -> u8 {
        match self {
            Token::Int(_) | Token::Float(_) => 0,
            Token::Text(_) => 1,
        }
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Token::Int(a), Token::Int(b)) => a.cmp(b),
            (Token::Float(a), Token::Float(b)) => a.total_cmp(b),
            (Token::Int(a), Token::Float(b)) => (*a as f64).total_cmp(b),
            (Token::Float(a), Token::Int(b)) => a.total_cmp(&(*b as f64)),
            (Token::Text(a), Token::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Output after normalisation
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Whole(Token),
    Flat(Vec<Token>),
    Grid(Vec<Vec<Token>>),
}

impl Shape {
    /// Whether the normalised output is empty
    fn is_empty(&self) -> bool {
        match self {
            Shape::Whole(Token::Text(text)) => text.is_empty(),
            Shape::Whole(_) => false,
            Shape::Flat(tokens) => tokens.is_empty(),
            Shape::Grid(rows) => rows.iter().all(Vec::is_empty),
        }
    }

    /// Whether `prefix` is a leading part of `self`
    fn starts_with(&self, prefix: &Shape) -> bool {
        match (self, prefix) {
            (Shape::Whole(Token::Text(full)), Shape::Whole(Token::Text(part))) => {
                full.starts_with(part.as_str())
            }
            (Shape::Whole(a), Shape::Whole(b)) => a == b,
            (Shape::Flat(full), Shape::Flat(part)) => full.starts_with(part),
            (Shape::Grid(full), Shape::Grid(part)) => full.starts_with(part),
            _ => false,
        }
    }
}

/// Judge an execution against a test's expected output
pub fn judge(test: &TestCase, execution: &Execution) -> Judgement {
    let expected = normalize(test, &test.output_data);
    let actual = normalize(test, &execution.output);

    let returncode_ok = test.ignore_returncode || execution.returncode == Some(0);
    let passed = !execution.timed_out && returncode_ok && expected == actual;

    let partial = !passed
        && test.show_partial_match
        && !execution.timed_out
        && !actual.is_empty()
        && expected.starts_with(&actual);

    Judgement { passed, partial }
}

/// Apply comment stripping, case folding, splitting, parsing and sorting
pub fn normalize(test: &TestCase, raw: &str) -> Shape {
    let mut text: String = match test.comment_prefix.as_deref().filter(|p| !p.is_empty()) {
        Some(prefix) => raw
            .lines()
            .filter(|line| !line.trim_start().starts_with(prefix))
            .collect::<Vec<_>>()
            .join("\n"),
        None => raw.replace("\r\n", "\n"),
    };

    if test.ignore_case {
        text = text.to_lowercase();
    }

    let text = text.trim_end();
    let separator = test.separator.as_deref().filter(|s| !s.is_empty());
    let token = |raw: &str| parse_token(test, raw);

    let mut shape = match (test.splitlines, test.split) {
        (true, true) => Shape::Grid(
            text.lines()
                .map(|line| split_tokens(line, separator).map(token).collect())
                .collect(),
        ),
        (true, false) => Shape::Flat(text.lines().map(|line| token(line.trim_end())).collect()),
        (false, true) => Shape::Flat(split_tokens(text, separator).map(token).collect()),
        (false, false) => Shape::Whole(token(text.trim())),
    };

    if test.sort {
        match &mut shape {
            Shape::Flat(tokens) => tokens.sort_by(Token::total_cmp),
            Shape::Grid(rows) => rows.iter_mut().for_each(|row| row.sort_by(Token::total_cmp)),
            Shape::Whole(_) => {}
        }
    }

    shape
}

fn split_tokens<'a>(
    text: &'a str,
    separator: Option<&'a str>,
) -> Box<dyn Iterator<Item = &'a str> + 'a> {
    match separator {
        Some(sep) => Box::new(text.split(sep).map(str::trim)),
        None => Box::new(text.split_whitespace()),
    }
}

fn parse_token(test: &TestCase, raw: &str) -> Token {
    if test.parse_int {
        if let Ok(value) = raw.trim().parse::<i64>() {
            return Token::Int(value);
        }
    }
    if test.parse_float {
        // nan and inf stay text so identical spellings still compare equal
        if let Ok(value) = raw.trim().parse::<f64>() {
            if value.is_finite() {
                return Token::Float(round(value, test.float_precision));
            }
        }
    }
    Token::Text(raw.to_string())
}

fn round(value: f64, precision: Option<i32>) -> f64 {
    match precision {
        Some(digits) if digits >= 0 => {
            let factor = 10f64.powi(digits);
            (value * factor).round() / factor
        }
        _ => value,
    }
}
