// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! ClassAd long format (`Name = value`, one attribute per line).
//!
//! This is the representation the scheduler hands to hooks on stdin and prints
//! from `condor_q -long` / `condor_history -long`. Multiple ads are separated by
//! blank lines. Attribute names compare case-insensitively.

use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClassAdError {
    #[error("line {line}: expected `Name = value`")]
    MissingEquals { line: usize },
    #[error("line {line}: empty attribute name")]
    EmptyName { line: usize },
    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },
}

/// Attribute value. Anything that is not a literal is kept as raw expression text.
#[derive(Debug, Clone, PartialEq)]
pub enum AdValue {
    String(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Undefined,
    Expr(String),
}

impl AdValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn expr(value: impl Into<String>) -> Self {
        Self::Expr(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Integer view; reals are truncated and numeric strings are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Real(value) if value.is_finite() => Some(*value as i64),
            Self::String(value) => {
                let trimmed = value.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(|v| v as i64))
            }
            _ => None,
        }
    }

    fn parse(raw: &str, line: usize) -> Result<Self, ClassAdError> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix('"') {
            return parse_string_literal(rest, raw, line);
        }
        if raw.eq_ignore_ascii_case("true") {
            return Ok(Self::Bool(true));
        }
        if raw.eq_ignore_ascii_case("false") {
            return Ok(Self::Bool(false));
        }
        if raw.eq_ignore_ascii_case("undefined") {
            return Ok(Self::Undefined);
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(Self::Integer(value));
        }
        if looks_like_real(raw) {
            if let Ok(value) = raw.parse::<f64>() {
                return Ok(Self::Real(value));
            }
        }
        Ok(Self::Expr(raw.to_string()))
    }
}

impl fmt::Display for AdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => {
                f.write_str("\"")?;
                for ch in value.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => {
                if value.fract() == 0.0 && value.is_finite() {
                    write!(f, "{value:.1}")
                } else {
                    write!(f, "{value}")
                }
            }
            Self::Bool(value) => write!(f, "{value}"),
            Self::Undefined => f.write_str("undefined"),
            Self::Expr(value) => f.write_str(value),
        }
    }
}

fn looks_like_real(raw: &str) -> bool {
    let mut chars = raw.chars().peekable();
    if matches!(chars.peek(), Some('-') | Some('+')) {
        chars.next();
    }
    let rest: String = chars.collect();
    !rest.is_empty()
        && rest.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '.')
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

fn parse_string_literal(rest: &str, raw: &str, line: usize) -> Result<AdValue, ClassAdError> {
    let mut out = String::with_capacity(rest.len());
    let mut chars = rest.char_indices();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            // Only quotes and backslashes are escaped; any other backslash is literal.
            '\\' => match chars.next() {
                Some((_, escaped @ ('"' | '\\'))) => out.push(escaped),
                Some((_, other)) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err(ClassAdError::UnterminatedString { line }),
            },
            '"' => {
                let tail = rest[idx + 1..].trim();
                if tail.is_empty() {
                    return Ok(AdValue::String(out));
                }
                // `"a" + "b"` and friends are expressions, not literals.
                return Ok(AdValue::Expr(raw.to_string()));
            }
            other => out.push(other),
        }
    }
    Err(ClassAdError::UnterminatedString { line })
}

/// One ad. Attribute order is preserved so printed ads diff cleanly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassAd {
    attrs: Vec<(String, AdValue)>,
}

impl ClassAd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, ClassAdError> {
        let mut ad = Self::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("-- ") {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                return Err(ClassAdError::MissingEquals { line: line_no });
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(ClassAdError::EmptyName { line: line_no });
            }
            ad.set(name, AdValue::parse(value, line_no)?);
        }
        Ok(ad)
    }

    /// Parse blank-line separated ads, dropping empty ones.
    pub fn parse_many(text: &str) -> Result<Vec<Self>, ClassAdError> {
        let mut ads = Vec::new();
        let mut block = String::new();
        let mut offset = 0usize;
        let mut block_start = 0usize;
        for line in text.lines() {
            offset += 1;
            if line.trim().is_empty() {
                if !block.is_empty() {
                    ads.push(Self::parse(&block).map_err(|err| shift_line(err, block_start))?);
                    block.clear();
                }
                continue;
            }
            if block.is_empty() {
                block_start = offset - 1;
            }
            block.push_str(line);
            block.push('\n');
        }
        if !block.is_empty() {
            ads.push(Self::parse(&block).map_err(|err| shift_line(err, block_start))?);
        }
        Ok(ads.into_iter().filter(|ad| !ad.is_empty()).collect())
    }

    pub fn get(&self, name: &str) -> Option<&AdValue> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
            .filter(|value| !matches!(value, AdValue::Undefined))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AdValue::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(AdValue::as_i64)
    }

    pub fn set(&mut self, name: &str, value: AdValue) {
        match self
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl fmt::Display for ClassAd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.attrs {
            writeln!(f, "{name} = {value}")?;
        }
        Ok(())
    }
}

fn shift_line(err: ClassAdError, by: usize) -> ClassAdError {
    match err {
        ClassAdError::MissingEquals { line } => ClassAdError::MissingEquals { line: line + by },
        ClassAdError::EmptyName { line } => ClassAdError::EmptyName { line: line + by },
        ClassAdError::UnterminatedString { line } => {
            ClassAdError::UnterminatedString { line: line + by }
        }
    }
}
