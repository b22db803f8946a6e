//! Unit string parser with normalization.
//!
//! Opacity files spell the same unit in many ways, so the parser accepts:
//!
//! - Exponents: `cm^2`, `cm**2`, `cm2`, `cm-1`
//! - Multiplication: `cm^5 molecule^-2`, `cm^5*molecule^-2`
//! - Division: `cm^2/molecule`, `cm^2 per molecule`
//! - Parentheses: `cm^5/(molecule^2)`
//!
//! # Grammar
//!
//! ```text
//! unit_expr  = term (('/' | 'per') term)*
//! term       = factor (('*' | '·' | ' ') factor)*
//! factor     = ( '(' unit_expr ')' | base_unit ) (('^' | '**')? exponent)?
//! base_unit  = [a-zA-Z_0-9]+
//! exponent   = '-'? [0-9]+
//! ```

use super::dimension::Dimension;
use super::registry::UNIT_REGISTRY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Error type for unit parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    EmptyUnit,
    UnknownUnit(String),
    InvalidExponent(String),
    ParseFailed(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyUnit => write!(f, "empty unit string"),
            Self::UnknownUnit(u) => write!(f, "unknown unit: '{u}'"),
            Self::InvalidExponent(e) => write!(f, "invalid exponent: '{e}'"),
            Self::ParseFailed(msg) => write!(f, "parse failed: {msg}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A parsed unit expression.
///
/// Represents a unit as a product of base symbols with integer exponents.
/// `cm^5/molecule^2` is `{cm: 5, molecule: -2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedUnit {
    components: BTreeMap<String, i32>,
}

impl ParsedUnit {
    #[must_use]
    pub fn dimensionless() -> Self {
        Self {
            components: BTreeMap::new(),
        }
    }

    fn from_components(components: BTreeMap<String, i32>) -> Self {
        Self {
            components: components
                .into_iter()
                .filter(|(symbol, exp)| *exp != 0 && symbol != "1")
                .collect(),
        }
    }

    /// Parses a unit string into a `ParsedUnit`.
    ///
    /// ```
    /// use exok_core::units::parser::ParsedUnit;
    ///
    /// let a = ParsedUnit::parse("cm^2/molecule").unwrap();
    /// let b = ParsedUnit::parse("cm2 molecule^-1").unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseError::EmptyUnit);
        }
        if input == "1" || input.eq_ignore_ascii_case("dimensionless") {
            return Ok(Self::dimensionless());
        }
        let mut parser = UnitParser { input, pos: 0 };
        let unit = parser.parse_expression()?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(ParseError::ParseFailed(format!("unexpected character '{c}'")));
        }
        Ok(unit)
    }

    #[must_use]
    pub fn components(&self) -> &BTreeMap<String, i32> {
        &self.components
    }

    /// Computes the overall dimension of this unit.
    pub fn dimension(&self) -> Result<Dimension, ParseError> {
        self.components
            .iter()
            .try_fold(Dimension::dimensionless(), |acc, (symbol, &exp)| {
                let info = UNIT_REGISTRY
                    .lookup(symbol)
                    .ok_or_else(|| ParseError::UnknownUnit(symbol.clone()))?;
                Ok(acc * info.dimension.pow(exp as i8))
            })
    }

    /// Multiplier converting a value in this unit to SI base units.
    pub fn to_si_factor(&self) -> Result<f64, ParseError> {
        self.components.iter().try_fold(1.0, |acc, (symbol, &exp)| {
            let info = UNIT_REGISTRY
                .lookup(symbol)
                .ok_or_else(|| ParseError::UnknownUnit(symbol.clone()))?;
            Ok(acc * info.to_si_factor.powi(exp))
        })
    }

    fn combine(&self, other: &Self, sign: i32) -> Self {
        let mut components = self.components.clone();
        for (symbol, exp) in &other.components {
            *components.entry(symbol.clone()).or_insert(0) += sign * exp;
        }
        Self::from_components(components)
    }

    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        self.combine(other, 1)
    }

    #[must_use]
    pub fn divide(&self, other: &Self) -> Self {
        self.combine(other, -1)
    }

    #[must_use]
    pub fn pow(&self, exp: i32) -> Self {
        Self::from_components(
            self.components
                .iter()
                .map(|(k, v)| (k.clone(), v * exp))
                .collect(),
        )
    }

    /// Canonical representation: positive exponents, then `/`, then the rest.
    #[must_use]
    pub fn normalized(&self) -> String {
        let format_part = |positive: bool| -> String {
            self.components
                .iter()
                .filter(|(_, &e)| (e > 0) == positive)
                .map(|(s, &e)| match e.abs() {
                    1 => s.clone(),
                    n => format!("{s}^{n}"),
                })
                .collect::<Vec<_>>()
                .join(" ")
        };
        let num = format_part(true);
        let den = format_part(false);
        match (num.is_empty(), den.is_empty()) {
            (true, true) => "1".to_string(),
            (false, true) => num,
            (true, false) => format!("1 / {den}"),
            (false, false) => format!("{num} / {den}"),
        }
    }
}

impl fmt::Display for ParsedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

struct UnitParser<'a> {
    input: &'a str,
    pos: usize,
}

impl UnitParser<'_> {
    fn parse_expression(&mut self) -> Result<ParsedUnit, ParseError> {
        self.skip_whitespace();
        let mut result = self.parse_term()?;
        loop {
            self.skip_whitespace();
            if self.peek() == Some('/') {
                self.advance();
            } else if self.check_keyword("per") {
                self.pos += 3;
            } else {
                break;
            }
            self.skip_whitespace();
            let divisor = self.parse_term()?;
            result = result.divide(&divisor);
        }
        Ok(result)
    }

    fn parse_term(&mut self) -> Result<ParsedUnit, ParseError> {
        let mut result = self.parse_factor()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') | Some('\u{00B7}') => {
                    self.advance();
                    let factor = self.parse_factor()?;
                    result = result.multiply(&factor);
                }
                Some(c) if (c.is_ascii_alphanumeric() || c == '(') && !self.check_keyword("per") => {
                    let factor = self.parse_factor()?;
                    result = result.multiply(&factor);
                }
                _ => break,
            }
        }
        Ok(result)
    }

    fn parse_factor(&mut self) -> Result<ParsedUnit, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('(') {
            self.advance();
            let inner = self.parse_expression()?;
            self.skip_whitespace();
            if self.peek() != Some(')') {
                return Err(ParseError::ParseFailed("missing closing parenthesis".into()));
            }
            self.advance();
            let exp = self.parse_optional_exponent()?;
            return Ok(inner.pow(exp));
        }
        let symbol = self.parse_symbol()?;
        let exp = self.parse_optional_exponent()?;
        Ok(ParsedUnit::from_components(BTreeMap::from([(symbol, exp)])))
    }

    fn parse_symbol(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        if self.pos == start {
            return Err(ParseError::ParseFailed("expected unit symbol".into()));
        }
        let full = &self.input[start..self.pos];
        // Trailing digits are an exponent unless the whole token is a known unit.
        if let Some(last_letter) = full.rfind(|c: char| c.is_ascii_alphabetic()) {
            if last_letter + 1 < full.len() && UNIT_REGISTRY.lookup(full).is_none() {
                self.pos = start + last_letter + 1;
                return Ok(full[..=last_letter].to_string());
            }
        }
        Ok(full.to_string())
    }

    fn parse_optional_exponent(&mut self) -> Result<i32, ParseError> {
        let rest = &self.input[self.pos..];
        let has_marker = if rest.starts_with("**") {
            self.pos += 2;
            true
        } else if rest.starts_with('^') {
            self.pos += 1;
            true
        } else {
            false
        };
        if has_marker {
            self.skip_whitespace();
        }
        match self.peek() {
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_exponent(),
            _ if has_marker => Err(ParseError::ParseFailed("expected exponent after ^".into())),
            _ => Ok(1),
        }
    }

    fn parse_exponent(&mut self) -> Result<i32, ParseError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let exp_str = &self.input[start..self.pos];
        exp_str
            .parse()
            .map_err(|_| ParseError::InvalidExponent(exp_str.to_string()))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        let rest = &self.input[self.pos..];
        rest.starts_with(keyword)
            && rest[keyword.len()..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_ascii_alphanumeric())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cross_section_units() {
        let unit = ParsedUnit::parse("cm^2/molecule").unwrap();
        assert_eq!(unit.components().get("cm"), Some(&2));
        assert_eq!(unit.components().get("molecule"), Some(&-1));
        assert_eq!(unit.dimension().unwrap(), Dimension::AREA);
    }

    #[test]
    fn test_exponent_spellings() {
        let a = ParsedUnit::parse("cm^5").unwrap();
        let b = ParsedUnit::parse("cm**5").unwrap();
        let c = ParsedUnit::parse("cm5").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_negative_implicit_exponent() {
        let unit = ParsedUnit::parse("cm-1").unwrap();
        assert_eq!(unit.components().get("cm"), Some(&-1));
    }

    #[test]
    fn test_cia_units() {
        let unit = ParsedUnit::parse("cm^5/molecule^2").unwrap();
        assert_eq!(unit.dimension().unwrap(), Dimension::LENGTH.pow(5));

        let amagat = ParsedUnit::parse("cm^-1 amagat^-2").unwrap();
        assert_eq!(amagat.dimension().unwrap(), Dimension::LENGTH.pow(5));
    }

    #[test]
    fn test_parentheses_and_per() {
        let a = ParsedUnit::parse("cm^5/(molecule^2)").unwrap();
        let b = ParsedUnit::parse("cm^5 per molecule^2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalized() {
        let unit = ParsedUnit::parse("molecule^-1 cm^2").unwrap();
        assert_eq!(unit.normalized(), "cm^2 / molecule");
    }

    #[test]
    fn test_si_factor() {
        let unit = ParsedUnit::parse("cm^2").unwrap();
        assert!((unit.to_si_factor().unwrap() - 1e-4).abs() < 1e-18);
    }

    #[test]
    fn test_errors() {
        assert_eq!(ParsedUnit::parse("  "), Err(ParseError::EmptyUnit));
        assert!(ParsedUnit::parse("cm^").is_err());
        assert!(matches!(
            ParsedUnit::parse("furlong").unwrap().dimension(),
            Err(ParseError::UnknownUnit(_))
        ));
    }
}
