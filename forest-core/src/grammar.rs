//! Stochastic L-system expansion.
//!
//! A grammar is an axiom plus, per symbol, an ordered list of weighted
//! [`Production`]s. Every rewrite pass replaces each symbol that has
//! productions with one randomly chosen replacement; symbols without
//! productions are terminals and are copied unchanged.

use crate::error::{ConfigError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One weighted alternative for a symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Production {
    #[serde(rename = "p")]
    pub probability: f32,
    #[serde(rename = "out")]
    pub replacement: String,
}

impl Production {
    pub fn new(probability: f32, replacement: impl Into<String>) -> Self {
        Self {
            probability,
            replacement: replacement.into(),
        }
    }
}

/// Production table keyed by symbol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rules(BTreeMap<char, Vec<Production>>);

impl Rules {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style helper that appends an alternative for `symbol`.
    pub fn with(mut self, symbol: char, probability: f32, replacement: &str) -> Self {
        self.push(symbol, Production::new(probability, replacement));
        self
    }

    pub fn push(&mut self, symbol: char, production: Production) {
        self.0.entry(symbol).or_default().push(production);
    }

    /// Alternatives for `symbol`, or `None` if it is a terminal.
    ///
    /// An empty alternative list is treated as a terminal as well.
    pub fn get(&self, symbol: char) -> Option<&[Production]> {
        self.0
            .get(&symbol)
            .map(Vec::as_slice)
            .filter(|alts| !alts.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &[Production])> {
        self.0.iter().map(|(&c, alts)| (c, alts.as_slice()))
    }

    /// Parses rules written one per line as
    /// `F -> 0.6:F[+F]F | 0.4:F[-F]F`.
    ///
    /// An alternative without a `p:` prefix has probability 1. Blank lines
    /// and lines starting with `#` are skipped. Repeated symbols append
    /// to the same alternative list. A backslash makes the next character
    /// literal, so `\|` and `\#` stand for the symbols themselves.
    pub fn parse(text: &str) -> Result<Self> {
        let mut rules = Rules::new();
        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let err = |reason: &str| ConfigError::Rule {
                line: line_no,
                reason: reason.to_string(),
            };

            let (lhs, rhs) = line.split_once("->").ok_or_else(|| err("missing `->`"))?;
            let lhs = unescape(lhs.trim()).map_err(err)?;
            let mut chars = lhs.chars();
            let symbol = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(err("left-hand side must be a single symbol")),
            };

            for alt in split_alternatives(rhs) {
                let alt = alt.trim();
                let production = match alt.split_once(':') {
                    Some((p, out)) => {
                        let probability: f32 = p
                            .trim()
                            .parse()
                            .map_err(|_| err(&format!("bad probability `{}`", p.trim())))?;
                        if !probability.is_finite() || probability < 0.0 {
                            return Err(err("probability must be a finite non-negative number"));
                        }
                        Production::new(probability, unescape(out.trim()).map_err(err)?)
                    }
                    None => Production::new(1.0, unescape(alt).map_err(err)?),
                };
                rules.push(symbol, production);
            }
        }
        Ok(rules)
    }

    /// Renders the table back into the line format accepted by [`Rules::parse`].
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (symbol, alts) in self.iter() {
            let rhs: Vec<String> = alts
                .iter()
                .map(|a| format!("{}:{}", a.probability, escape(&a.replacement)))
                .collect();
            out.push_str(&format!(
                "{} -> {}\n",
                escape(&symbol.to_string()),
                rhs.join(" | ")
            ));
        }
        out
    }
}

/// Characters with a meaning of their own in the rule text format.
const SPECIAL: [char; 3] = ['\\', '|', '#'];

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(s: &str) -> std::result::Result<String, &'static str> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next().ok_or("dangling `\\`")?);
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Splits on every `|` not preceded by an escaping backslash.
fn split_alternatives(rhs: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in rhs.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '|' => {
                parts.push(&rhs[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&rhs[start..]);
    parts
}

/// Chooses one alternative by cumulative probability.
///
/// Draws `r` in `[0, 1)` and returns the first alternative whose running
/// sum reaches `r`. When the weights sum below `r` the last alternative
/// is returned; an empty list yields `None`.
pub fn pick_production<'a>(alts: &'a [Production], rng: &mut impl Rng) -> Option<&'a Production> {
    let r: f32 = rng.random();
    pick_with_draw(alts, r)
}

fn pick_with_draw(alts: &[Production], r: f32) -> Option<&Production> {
    let mut acc = 0.0;
    for a in alts {
        acc += a.probability;
        if r <= acc {
            return Some(a);
        }
    }
    alts.last()
}

/// Rewrites `axiom` `iterations` times using `rules`.
///
/// ### Parameters
/// - `axiom` - Start string.
/// - `rules` - Production table; symbols without an entry pass through.
/// - `iterations` - Number of rewrite passes. Zero returns the axiom.
/// - `rng` - Random source used for weighted choices.
///
/// ### Returns
/// The expanded symbol string.
pub fn expand(axiom: &str, rules: &Rules, iterations: u32, rng: &mut impl Rng) -> String {
    let mut s = axiom.to_string();
    if rules.is_empty() {
        return s;
    }

    for _ in 0..iterations {
        let mut next = String::with_capacity(s.len() * 2);
        for ch in s.chars() {
            match rules.get(ch).and_then(|alts| pick_production(alts, rng)) {
                Some(production) => next.push_str(&production.replacement),
                None => next.push(ch),
            }
        }
        s = next;
    }

    log::debug!(
        "expanded axiom {:?} over {} iterations into {} symbols",
        axiom,
        iterations,
        s.len()
    );
    s
}
