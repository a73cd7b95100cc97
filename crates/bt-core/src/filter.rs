//! Advanced boolean filter over selector interval sets.
//!
//! Grammar (`&` binds tighter than `|`):
//!
//! ```text
//! expr   := term ( "|" term )*
//! term   := factor ( "&" factor )*
//! factor := '"' subject "|" behavior '"' | "(" expr ")"
//! ```
//!
//! Each quoted selector stands for the interval set of that subject's
//! behavior within one observation. `&` is intersection, `|` is union.
//! The expression is interpreted by this module only.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::aggregate::AggregatedTable;
use crate::interval::IntervalSet;
use crate::stat::{Stat, mean, sample_stdev};
use crate::types::{BehaviorCode, ObservationId, Subject, ValidationError};

/// Nesting limit for parenthesized groups.
const MAX_DEPTH: usize = 64;

/// A `subject|behavior` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Selector {
    pub subject: Subject,
    pub behavior: BehaviorCode,
}

impl Selector {
    pub const fn new(subject: Subject, behavior: BehaviorCode) -> Self {
        Self { subject, behavior }
    }
}

impl FromStr for Selector {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (subject, behavior) = s.split_once('|').ok_or_else(|| malformed(format!(
            "selector {s:?} must have the form \"subject|behavior\""
        )))?;
        let behavior = BehaviorCode::new(behavior)
            .map_err(|_| malformed(format!("selector {s:?} has no behavior")))?;
        Ok(Self::new(Subject::new(subject), behavior))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}|{}\"", self.subject.as_str(), self.behavior)
    }
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Selector(Selector),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    /// Every selector the expression references.
    pub fn selectors(&self) -> BTreeSet<&Selector> {
        let mut out = BTreeSet::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut BTreeSet<&'a Selector>) {
        match self {
            Self::Selector(s) => {
                out.insert(s);
            }
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_selectors(out);
                r.collect_selectors(out);
            }
        }
    }

    /// Evaluate against an environment of selector sets.
    pub fn evaluate(&self, env: &impl Fn(&Selector) -> IntervalSet) -> IntervalSet {
        match self {
            Self::Selector(s) => env(s),
            Self::And(l, r) => {
                let left = l.evaluate(env);
                if left.is_empty() {
                    return left;
                }
                left.intersection(&r.evaluate(env))
            }
            Self::Or(l, r) => l.evaluate(env).union(&r.evaluate(env)),
        }
    }
}

impl FromStr for FilterExpr {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_filter(s)
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(s) => write!(f, "{s}"),
            Self::And(l, r) => write!(f, "({l} & {r})"),
            Self::Or(l, r) => write!(f, "({l} | {r})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Selector(String),
    And,
    Or,
    Open,
    Close,
}

fn malformed(reason: impl Into<String>) -> ValidationError {
    ValidationError::MalformedFilter {
        reason: reason.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ValidationError> {
    if input.matches('"').count() % 2 != 0 {
        return Err(malformed("unbalanced quotes"));
    }

    let mut tokens = Vec::new();
    let mut chars = input.char_indices();
    while let Some((pos, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '&' => tokens.push(Token::And),
            '|' => tokens.push(Token::Or),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '"' => {
                let literal: String = chars
                    .by_ref()
                    .map(|(_, c)| c)
                    .take_while(|c| *c != '"')
                    .collect();
                tokens.push(Token::Selector(literal));
            }
            other => {
                return Err(malformed(format!(
                    "unexpected character {other:?} at position {pos}"
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self, depth: usize) -> Result<FilterExpr, ValidationError> {
        let mut left = self.term(depth)?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.term(depth)?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self, depth: usize) -> Result<FilterExpr, ValidationError> {
        let mut left = self.factor(depth)?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.factor(depth)?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self, depth: usize) -> Result<FilterExpr, ValidationError> {
        match self.next() {
            Some(Token::Selector(text)) => Ok(FilterExpr::Selector(text.parse()?)),
            Some(Token::Open) => {
                if depth >= MAX_DEPTH {
                    return Err(malformed("parentheses nested too deeply"));
                }
                let inner = self.expr(depth + 1)?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(malformed("missing closing parenthesis")),
                }
            }
            Some(token) => Err(malformed(format!("unexpected {}", describe(&token)))),
            None => Err(malformed("unexpected end of expression")),
        }
    }
}

const fn describe(token: &Token) -> &'static str {
    match token {
        Token::Selector(_) => "selector",
        Token::And => "'&'",
        Token::Or => "'|'",
        Token::Open => "'('",
        Token::Close => "')'",
    }
}

/// Parse a filter expression such as `"|rest" & ("A|feed" | "B|feed")`.
pub fn parse_filter(input: &str) -> Result<FilterExpr, ValidationError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(malformed("empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(malformed(format!("unexpected {} after expression", describe(token))));
    }
    Ok(expr)
}

/// Interval sets of the given selectors within one observation.
///
/// Selectors with no rows map to the empty set.
pub fn selector_sets<'a>(
    table: &AggregatedTable,
    observation: &ObservationId,
    selectors: impl IntoIterator<Item = &'a Selector>,
) -> HashMap<Selector, IntervalSet> {
    selectors
        .into_iter()
        .map(|s| {
            let set: IntervalSet = table
                .for_behavior(observation, &s.subject, &s.behavior)
                .map(|e| e.interval())
                .collect();
            (s.clone(), set)
        })
        .collect()
}

/// One filter result line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterRow {
    Interval {
        observation: ObservationId,
        start: Decimal,
        stop: Decimal,
        duration: Decimal,
    },
    Error {
        observation: ObservationId,
        message: String,
    },
}

impl FilterRow {
    pub const fn observation(&self) -> &ObservationId {
        match self {
            Self::Interval { observation, .. } | Self::Error { observation, .. } => observation,
        }
    }
}

/// Evaluate the expression per observation and emit one row per piece.
///
/// Observations where a referenced selector is flagged unpaired get an error
/// row instead of intervals.
pub fn apply_filter(
    table: &AggregatedTable,
    observations: &[ObservationId],
    expr: &FilterExpr,
) -> Vec<FilterRow> {
    let selectors = expr.selectors();
    let mut rows = Vec::new();

    for observation in observations {
        let unpaired: Vec<String> = selectors
            .iter()
            .filter(|s| table.has_unpaired(Some(observation), &s.subject, &s.behavior))
            .map(ToString::to_string)
            .collect();
        if !unpaired.is_empty() {
            rows.push(FilterRow::Error {
                observation: observation.clone(),
                message: format!("unpaired events for {}", unpaired.join(", ")),
            });
            continue;
        }

        let env = selector_sets(table, observation, selectors.iter().copied());
        let result = expr.evaluate(&|s: &Selector| env.get(s).cloned().unwrap_or_default());
        tracing::debug!(
            observation = %observation,
            pieces = result.pieces().len(),
            "filter evaluated"
        );

        rows.extend(result.iter().map(|piece| FilterRow::Interval {
            observation: observation.clone(),
            start: piece.lower,
            stop: piece.upper,
            duration: piece.length(),
        }));
    }

    rows
}

/// Per-observation totals of filter results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub observation: ObservationId,
    pub count: Stat,
    pub total: Stat,
    pub mean: Stat,
    pub stdev: Stat,
}

/// Summary view: one line per observation, in the given order.
pub fn summarize_filter(observations: &[ObservationId], rows: &[FilterRow]) -> Vec<FilterSummary> {
    observations
        .iter()
        .map(|observation| {
            let mine: Vec<&FilterRow> = rows
                .iter()
                .filter(|r| r.observation() == observation)
                .collect();
            if mine.iter().any(|r| matches!(r, FilterRow::Error { .. })) {
                return FilterSummary {
                    observation: observation.clone(),
                    count: Stat::Unpaired,
                    total: Stat::Unpaired,
                    mean: Stat::Unpaired,
                    stdev: Stat::Unpaired,
                };
            }
            let durations: Vec<Decimal> = mine
                .iter()
                .filter_map(|r| match r {
                    FilterRow::Interval { duration, .. } => Some(*duration),
                    FilterRow::Error { .. } => None,
                })
                .collect();
            FilterSummary {
                observation: observation.clone(),
                count: Stat::Value(Decimal::from(durations.len())),
                total: Stat::Value(durations.iter().copied().sum()),
                mean: mean(&durations).into(),
                stdev: sample_stdev(&durations).into(),
            }
        })
        .collect()
}
