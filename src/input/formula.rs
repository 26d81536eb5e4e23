//! Model formulas of the form `lhs ~ x1 + x2 + (1 + x1 | site)`.
//!
//! The fixed part always carries an intercept. At most one random-effects block
//! `(terms | group)` is allowed; inside it `1` requests a random intercept, `0`
//! suppresses it, and other terms are random slopes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormulaError {
    #[error("formula `{0}` must contain exactly one `~`")]
    MissingTilde(String),
    #[error("formula `{0}` has an empty response")]
    EmptyResponse(String),
    #[error("formula response `{found}` does not match expected `{expected}`")]
    UnexpectedResponse { expected: String, found: String },
    #[error("removing the intercept from the fixed part is not supported (`{0}`)")]
    InterceptRemoval(String),
    #[error("malformed random-effects block `{0}`")]
    MalformedRandomTerm(String),
    #[error("at most one random-effects block is allowed per formula")]
    MultipleRandomTerms,
    #[error("random-effects block `{0}` requests neither an intercept nor slopes")]
    EmptyRandomTerm(String),
    #[error("unbalanced parentheses in `{0}`")]
    UnbalancedParentheses(String),
    #[error("invalid term `{0}`")]
    InvalidTerm(String),
}

/// Random-effects block `(terms | group)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomTerm {
    pub group: String,
    pub intercept: bool,
    pub slopes: Vec<String>,
}

/// A parsed model formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub response: String,
    /// Fixed covariate terms as written, excluding the intercept.
    pub terms: Vec<String>,
    pub random: Option<RandomTerm>,
}

impl Formula {
    /// Parse `source`.
    ///
    /// # Errors
    ///
    /// Returns `FormulaError` for malformed formulas, intercept removal in the fixed
    /// part, or more than one random-effects block.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let mut sides = source.split('~');
        let (Some(lhs), Some(rhs), None) = (sides.next(), sides.next(), sides.next()) else {
            return Err(FormulaError::MissingTilde(source.to_string()));
        };

        let response = lhs.trim();
        if response.is_empty() {
            return Err(FormulaError::EmptyResponse(source.to_string()));
        }
        validate_identifier(response)?;

        let mut terms = Vec::new();
        let mut random = None;
        for piece in split_top_level(rhs, source)? {
            if let Some(inner) = piece.strip_prefix('(').and_then(|p| p.strip_suffix(')')) {
                if random.is_some() {
                    return Err(FormulaError::MultipleRandomTerms);
                }
                random = Some(parse_random(inner, &piece)?);
                continue;
            }
            match piece.as_str() {
                "1" => {}
                "0" | "-1" => return Err(FormulaError::InterceptRemoval(source.to_string())),
                term if term.ends_with("-1") => {
                    return Err(FormulaError::InterceptRemoval(source.to_string()));
                }
                term => {
                    validate_identifier(term)?;
                    if !terms.iter().any(|existing| existing == term) {
                        terms.push(term.to_string());
                    }
                }
            }
        }

        Ok(Self {
            response: response.to_string(),
            terms,
            random,
        })
    }

    /// Intercept-only formula `response ~ 1`.
    #[must_use]
    pub fn intercept_only(response: &str) -> Self {
        Self {
            response: response.to_string(),
            terms: Vec::new(),
            random: None,
        }
    }

    /// # Errors
    ///
    /// Returns `FormulaError::UnexpectedResponse` unless the response is `expected`.
    pub fn expect_response(&self, expected: &str) -> Result<(), FormulaError> {
        if self.response == expected {
            Ok(())
        } else {
            Err(FormulaError::UnexpectedResponse {
                expected: expected.to_string(),
                found: self.response.clone(),
            })
        }
    }

    /// Fixed terms after removing those that are also random slopes.
    #[must_use]
    pub fn fixed_terms(&self) -> Vec<&str> {
        self.terms
            .iter()
            .filter(|term| {
                self.random
                    .as_ref()
                    .is_none_or(|random| !random.slopes.contains(term))
            })
            .map(String::as_str)
            .collect()
    }

    /// Whether the fixed part keeps its own intercept.
    ///
    /// A random intercept replaces it, with the group-level mean in its place.
    #[must_use]
    pub fn has_fixed_intercept(&self) -> bool {
        self.random.as_ref().is_none_or(|random| !random.intercept)
    }
}

impl FromStr for Formula {
    type Err = FormulaError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = if self.terms.is_empty() {
            vec!["1".to_string()]
        } else {
            self.terms.clone()
        };
        if let Some(random) = &self.random {
            let mut inner = vec![if random.intercept { "1" } else { "0" }.to_string()];
            inner.extend(random.slopes.iter().cloned());
            parts.push(format!("({} | {})", inner.join(" + "), random.group));
        }
        write!(f, "{} ~ {}", self.response, parts.join(" + "))
    }
}

fn split_top_level(rhs: &str, source: &str) -> Result<Vec<String>, FormulaError> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in rhs.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| FormulaError::UnbalancedParentheses(source.to_string()))?;
                current.push(ch);
            }
            '+' if depth == 0 => pieces.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(FormulaError::UnbalancedParentheses(source.to_string()));
    }
    pieces.push(current);

    pieces
        .into_iter()
        .map(|piece| piece.split_whitespace().collect::<Vec<_>>().join(""))
        .map(|piece| {
            if piece.is_empty() {
                Err(FormulaError::InvalidTerm(source.to_string()))
            } else {
                Ok(piece)
            }
        })
        .collect()
}

fn parse_random(inner: &str, block: &str) -> Result<RandomTerm, FormulaError> {
    let mut sides = inner.split('|');
    let (Some(lhs), Some(group), None) = (sides.next(), sides.next(), sides.next()) else {
        return Err(FormulaError::MalformedRandomTerm(block.to_string()));
    };
    let group = group.trim();
    if group.is_empty() {
        return Err(FormulaError::MalformedRandomTerm(block.to_string()));
    }
    validate_identifier(group)?;

    let mut intercept = true;
    let mut slopes = Vec::new();
    for term in lhs.split('+').map(str::trim) {
        match term {
            "" => return Err(FormulaError::MalformedRandomTerm(block.to_string())),
            "1" => {}
            "0" | "-1" => intercept = false,
            slope => {
                validate_identifier(slope)?;
                if !slopes.iter().any(|existing| existing == slope) {
                    slopes.push(slope.to_string());
                }
            }
        }
    }

    if !intercept && slopes.is_empty() {
        return Err(FormulaError::EmptyRandomTerm(block.to_string()));
    }

    Ok(RandomTerm {
        group: group.to_string(),
        intercept,
        slopes,
    })
}

fn validate_identifier(term: &str) -> Result<(), FormulaError> {
    let valid = term
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '.' || first == '_')
        && term
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(FormulaError::InvalidTerm(term.to_string()))
    }
}
