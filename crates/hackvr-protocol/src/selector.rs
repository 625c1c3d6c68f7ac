//! Selector expansion and matching over dash-grouped identifiers.
//!
//! A selector token is an identifier pattern whose parts may be `*` (zero or
//! more whole parts), `?` (exactly one part), a `{a,b,c}` variant group, or a
//! `{N..M}` inclusive integer range. Groups expand eagerly; wildcards match
//! against a live population. Reserved `$`-parts are only allowed in the
//! leading position, mirroring the identifier grammar.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Ident;

static PART_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());
static RESERVED_PART_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$[A-Za-z0-9_]+$").unwrap());
static RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9]+)\.\.([0-9]+)$").unwrap());

/// A selector validation or expansion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorError {
    /// The token is not a valid selector pattern.
    Invalid,
    /// `*` or `?` used where only `{…}` expansion is allowed (create family).
    WildcardForbidden,
    /// Expansion would exceed the caller-provided cap.
    OverCap,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Invalid => write!(f, "invalid selector"),
            SelectorError::WildcardForbidden => {
                write!(f, "wildcards are not allowed in create commands")
            }
            SelectorError::OverCap => write!(f, "selector expansion exceeds cap"),
        }
    }
}

impl std::error::Error for SelectorError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Star,
    Question,
    Group(Vec<String>),
}

/// A parsed selector token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    parts: Vec<Part>,
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self, SelectorError> {
        let pieces = split_pattern(raw)?;
        let mut parts = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.iter().enumerate() {
            let allow_reserved = index == 0;
            let part = match piece.as_str() {
                "*" => Part::Star,
                "?" => Part::Question,
                piece if piece.starts_with('{') && piece.ends_with('}') => {
                    Part::Group(expand_group(&piece[1..piece.len() - 1], allow_reserved)?)
                }
                piece => {
                    if !is_valid_literal(piece, allow_reserved) {
                        return Err(SelectorError::Invalid);
                    }
                    Part::Literal(piece.to_string())
                }
            };
            parts.push(part);
        }
        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the selector is a single concrete identifier (no expansion).
    pub fn is_concrete(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, Part::Literal(_)))
    }

    /// Whether the selector is the bare `*` fast path, which enumerates the
    /// whole population and bypasses the expansion cap.
    pub fn is_match_all(&self) -> bool {
        self.parts == [Part::Star]
    }

    /// Whether any part is `*` or `?`. These are forbidden in create-family
    /// positions.
    pub fn has_wildcards(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, Part::Star | Part::Question))
    }

    /// Upper bound on how many concrete applications this selector can
    /// produce against a population of the given size. Group products
    /// multiply; any wildcard multiplies by the population.
    pub fn upper_expansion_limit(&self, population: usize) -> usize {
        let mut count: usize = 1;
        for part in &self.parts {
            if let Part::Group(items) = part {
                count = count.saturating_mul(items.len());
            }
        }
        if self.has_wildcards() {
            count = count.saturating_mul(population);
        }
        count
    }

    /// Expand a wildcard-free selector into concrete identifiers, as used by
    /// the create command family. `cap` bounds the output size; exceeding it
    /// drops the whole command with no partial application.
    pub fn expand(&self, cap: usize) -> Result<Vec<Ident>, SelectorError> {
        if self.has_wildcards() {
            return Err(SelectorError::WildcardForbidden);
        }
        if self.upper_expansion_limit(0) > cap {
            return Err(SelectorError::OverCap);
        }

        let mut combos: Vec<String> = vec![String::new()];
        for part in &self.parts {
            let variants: Vec<&str> = match part {
                Part::Literal(lit) => vec![lit.as_str()],
                Part::Group(items) => items.iter().map(String::as_str).collect(),
                Part::Star | Part::Question => unreachable!("checked above"),
            };
            let mut next = Vec::with_capacity(combos.len() * variants.len());
            for prefix in &combos {
                for variant in &variants {
                    if prefix.is_empty() {
                        next.push((*variant).to_string());
                    } else {
                        next.push(format!("{prefix}-{variant}"));
                    }
                }
            }
            combos = next;
        }

        combos
            .into_iter()
            .map(|token| Ident::new(&token).map_err(|_| SelectorError::Invalid))
            .collect()
    }

    /// Match the selector against a single token.
    pub fn matches(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let token_parts: Vec<&str> = token.split('-').collect();
        self.concrete_patterns()
            .iter()
            .any(|pattern| match_parts(pattern, &token_parts))
    }

    /// Select the members of a population that the selector matches.
    /// Duplicate tokens are reported once; `*` short-circuits to the whole
    /// scope.
    pub fn select<'a, T>(
        &self,
        scope: impl IntoIterator<Item = &'a T>,
        key: impl Fn(&T) -> &str,
    ) -> Vec<&'a T> {
        if self.is_match_all() {
            return scope.into_iter().collect();
        }
        let patterns = self.concrete_patterns();
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for item in scope {
            let token = key(item);
            if token.is_empty() || seen.contains(token) {
                continue;
            }
            let token_parts: Vec<&str> = token.split('-').collect();
            if patterns
                .iter()
                .any(|pattern| match_parts(pattern, &token_parts))
            {
                seen.insert(token.to_string());
                out.push(item);
            }
        }
        out
    }

    /// Expand groups into a list of wildcard-only patterns for matching.
    fn concrete_patterns(&self) -> Vec<Vec<MatchPart>> {
        let mut patterns: Vec<Vec<MatchPart>> = vec![Vec::new()];
        for part in &self.parts {
            match part {
                Part::Star => {
                    for pattern in &mut patterns {
                        pattern.push(MatchPart::Star);
                    }
                }
                Part::Question => {
                    for pattern in &mut patterns {
                        pattern.push(MatchPart::Question);
                    }
                }
                Part::Literal(lit) => {
                    for pattern in &mut patterns {
                        pattern.push(MatchPart::Literal(lit.clone()));
                    }
                }
                Part::Group(items) => {
                    let mut next = Vec::with_capacity(patterns.len() * items.len());
                    for pattern in &patterns {
                        for item in items {
                            let mut extended = pattern.clone();
                            extended.push(MatchPart::Literal(item.clone()));
                            next.push(extended);
                        }
                    }
                    patterns = next;
                }
            }
        }
        patterns
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MatchPart {
    Literal(String),
    Star,
    Question,
}

/// Greedy star-loop matcher over whole parts. `*` matches zero or more
/// parts, so `foo-*` matches `foo` itself.
fn match_parts(pattern: &[MatchPart], token: &[&str]) -> bool {
    let mut pi = 0;
    let mut ti = 0;
    let mut star: Option<(usize, usize)> = None;

    while ti < token.len() {
        match pattern.get(pi) {
            Some(MatchPart::Star) => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(MatchPart::Question) => {
                pi += 1;
                ti += 1;
            }
            Some(MatchPart::Literal(lit)) if lit == token[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    star = Some((star_pi, star_ti + 1));
                    ti = star_ti + 1;
                }
                None => return false,
            },
        }
    }

    while matches!(pattern.get(pi), Some(MatchPart::Star)) {
        pi += 1;
    }
    pi == pattern.len()
}

/// Split a pattern on `-` at brace depth zero. Empty parts and nested or
/// unbalanced braces are invalid.
fn split_pattern(pattern: &str) -> Result<Vec<String>, SelectorError> {
    if pattern.is_empty() {
        return Err(SelectorError::Invalid);
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0u8;
    for ch in pattern.chars() {
        match ch {
            '{' if depth == 0 => {
                depth = 1;
                current.push(ch);
            }
            '{' => return Err(SelectorError::Invalid),
            '}' if depth == 1 => {
                depth = 0;
                current.push(ch);
            }
            '}' => return Err(SelectorError::Invalid),
            '-' if depth == 0 => {
                if current.is_empty() {
                    return Err(SelectorError::Invalid);
                }
                parts.push(std::mem::take(&mut current));
            }
            ch => current.push(ch),
        }
    }
    if depth != 0 || current.is_empty() {
        return Err(SelectorError::Invalid);
    }
    parts.push(current);
    Ok(parts)
}

fn is_valid_literal(part: &str, allow_reserved: bool) -> bool {
    if allow_reserved && part.starts_with('$') {
        return RESERVED_PART_RE.is_match(part);
    }
    PART_RE.is_match(part)
}

/// Expand a group body: either `{N..M}` or `{a,b,c}`.
fn expand_group(body: &str, allow_reserved: bool) -> Result<Vec<String>, SelectorError> {
    if let Some(caps) = RANGE_RE.captures(body) {
        return expand_range(&caps[1], &caps[2]);
    }
    let items: Vec<&str> = body.split(',').collect();
    if items.iter().any(|item| item.is_empty()) {
        return Err(SelectorError::Invalid);
    }
    for item in &items {
        if !is_valid_literal(item, allow_reserved) {
            return Err(SelectorError::Invalid);
        }
    }
    Ok(items.into_iter().map(str::to_string).collect())
}

/// `{N..M}` is inclusive. Outputs are zero-padded to the wider endpoint
/// width when either endpoint carries a leading zero.
fn expand_range(start_str: &str, end_str: &str) -> Result<Vec<String>, SelectorError> {
    let start: u64 = start_str.parse().map_err(|_| SelectorError::Invalid)?;
    let end: u64 = end_str.parse().map_err(|_| SelectorError::Invalid)?;
    if start > end {
        return Err(SelectorError::Invalid);
    }
    let has_leading_zero =
        |value: &str| value.len() > 1 && value.starts_with('0');
    let width = if (has_leading_zero(start_str) || has_leading_zero(end_str))
        && start_str.len().max(end_str.len()) > 1
    {
        start_str.len().max(end_str.len())
    } else {
        0
    };
    Ok((start..=end)
        .map(|number| {
            if width > 0 {
                format!("{number:0width$}")
            } else {
                number.to_string()
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
