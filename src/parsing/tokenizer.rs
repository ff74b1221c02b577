
use super::error::ParseError;
use super::source::{SourceOffset, Span};
use crate::value::Number;

use num::{BigInt, BigRational, Num};
use regex::{Regex, Captures};
use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct TokenizerState<'a> {
  input: &'a str,
  position: SourceOffset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
  Number(Number),
  Str(String),
  Char(char),
  Ident(String),
  Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
}

/// Multi-character operators come first so that the longest match
/// wins. `>>` is deliberately absent: the parser joins two adjacent
/// `>` tokens so that nested generic arguments still close.
const PUNCTUATION: &[&str] = &[
  "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "<<", "+=", "-=", "*=", "/=", "%=", "..",
  "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&", "|", "^", "?", ":", ".", ",", ";",
  "(", ")", "[", "]", "{", "}",
];

impl<'a> TokenizerState<'a> {
  pub fn new(input: &'a str) -> Self {
    Self { input, position: SourceOffset(0) }
  }

  pub fn is_eof(&self) -> bool {
    self.input.is_empty()
  }

  pub fn current_pos(&self) -> SourceOffset {
    self.position
  }

  /// Advances past `amount` bytes, never beyond the end of input, and
  /// returns the skipped text with its span.
  pub fn advance(&mut self, amount: usize) -> (&'a str, Span) {
    let amount = amount.min(self.input.len());
    let start = self.position;
    let (prefix, suffix) = self.input.split_at(amount);
    self.position = start + amount;
    self.input = suffix;
    (prefix, Span::new(start, self.position))
  }

  pub fn read_literal(&mut self, literal: &str) -> Option<Span> {
    self.input.starts_with(literal).then(|| self.advance(literal.len()).1)
  }

  /// If the current position of the string matches the given regex,
  /// returns the matched string and advances the tokenizer state.
  ///
  /// The regex MUST be anchored at the start of the input. This
  /// function may panic if that precondition is not satisfied.
  pub fn read_regex(&mut self, regex: &Regex) -> Option<(&'a str, Span)> {
    let m = regex.find(self.input)?;
    assert_eq!(m.start(), 0, "Regex must be anchored at the start of the input");
    Some(self.advance(m.len()))
  }

  pub fn read_regex_with_captures(&mut self, regex: &Regex) -> Option<(Captures<'a>, Span)> {
    let input = self.input;
    let captures = regex.captures(input)?;
    let len = captures.get(0).map_or(0, |m| m.len());
    let (_, span) = self.advance(len);
    Some((captures, span))
  }

  /// Skips whitespace and comments.
  pub fn consume_spaces(&mut self) {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?s:\s+|//[^\n]*|/\*.*?\*/)*").unwrap());
    self.read_regex(&RE);
  }

  pub fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
    static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@?[A-Za-z_][A-Za-z0-9_]*").unwrap());
    static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
      Regex::new(r"^(0[xX][0-9a-fA-F_]+|[0-9][0-9_]*(?:\.[0-9][0-9_]*)?(?:[eE][+-]?[0-9]+)?|\.[0-9][0-9_]*(?:[eE][+-]?[0-9]+)?)((?i:ul|lu|u|l|f|d|m))?").unwrap()
    });
    static STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^"((?:[^"\\\n]|\\.)*)""#).unwrap());
    static CHAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^'((?:[^'\\\n]|\\.)+)'").unwrap());

    self.consume_spaces();
    if self.is_eof() {
      return Ok(None);
    }
    if let Some((captures, span)) = self.read_regex_with_captures(&NUMBER_RE) {
      let body = captures.get(1).map_or("", |m| m.as_str());
      let suffix = captures.get(2).map(|m| m.as_str());
      let number = parse_number(body, suffix).ok_or_else(|| ParseError::new(format!("Invalid numeric literal {}", &captures[0]), span))?;
      return Ok(Some(Token { kind: TokenKind::Number(number), span }));
    }
    if let Some((text, span)) = self.read_regex(&IDENT_RE) {
      let name = text.trim_start_matches('@').to_owned();
      return Ok(Some(Token { kind: TokenKind::Ident(name), span }));
    }
    if let Some((captures, span)) = self.read_regex_with_captures(&STRING_RE) {
      let text = unescape(captures.get(1).map_or("", |m| m.as_str()), span)?;
      return Ok(Some(Token { kind: TokenKind::Str(text), span }));
    }
    if let Some((captures, span)) = self.read_regex_with_captures(&CHAR_RE) {
      let text = unescape(captures.get(1).map_or("", |m| m.as_str()), span)?;
      let mut chars = text.chars();
      return match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(Token { kind: TokenKind::Char(c), span })),
        _ => Err(ParseError::new("Character literal must contain exactly one character", span)),
      };
    }
    for punct in PUNCTUATION {
      if let Some(span) = self.read_literal(punct) {
        return Ok(Some(Token { kind: TokenKind::Punct(punct), span }));
      }
    }
    let start = self.current_pos();
    Err(ParseError::new("Unexpected character", Span::new(start, start + 1)))
  }
}

/// Splits `input` into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
  let mut state = TokenizerState::new(input);
  let mut tokens = Vec::new();
  while let Some(token) = state.next_token()? {
    tokens.push(token);
  }
  Ok(tokens)
}

fn unescape(text: &str, span: Span) -> Result<String, ParseError> {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    let escaped = match chars.next() {
      Some('n') => '\n',
      Some('r') => '\r',
      Some('t') => '\t',
      Some('0') => '\0',
      Some('\\') => '\\',
      Some('"') => '"',
      Some('\'') => '\'',
      _ => return Err(ParseError::new("Unknown escape sequence", span)),
    };
    out.push(escaped);
  }
  Ok(out)
}

fn parse_number(body: &str, suffix: Option<&str>) -> Option<Number> {
  let body = body.replace('_', "");
  let suffix = suffix.map(|s| s.to_ascii_lowercase());
  let is_real = !body.starts_with("0x") && !body.starts_with("0X") && body.contains(['.', 'e', 'E']);
  match suffix.as_deref() {
    Some("f") => return body.parse::<f32>().ok().map(Number::Single),
    Some("d") => return body.parse::<f64>().ok().map(Number::Double),
    Some("m") => return parse_decimal(&body).map(Number::Decimal),
    _ if is_real => return body.parse::<f64>().ok().map(Number::Double),
    _ => {}
  }
  let value = match body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
    Some(hex) => u64::from_str_radix(hex, 16).ok()?,
    None => body.parse::<u64>().ok()?,
  };
  // The first type in each list that can hold the value wins.
  let number = match suffix.as_deref() {
    None if value <= i32::MAX as u64 => Number::Int32(value as i32),
    None | Some("u") if value <= u32::MAX as u64 => Number::UInt32(value as u32),
    None | Some("l") if value <= i64::MAX as u64 => Number::Int64(value as i64),
    Some("u") | Some("l") | Some("ul") | Some("lu") | None => Number::UInt64(value),
    _ => return None,
  };
  Some(number)
}

fn parse_decimal(body: &str) -> Option<BigRational> {
  let (mantissa, exponent) = match body.find(['e', 'E']) {
    Some(i) => (&body[..i], body[i + 1..].parse::<i32>().ok()?),
    None => (body, 0),
  };
  let (whole, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
  let digits = format!("{whole}{frac}");
  let numer = BigInt::from_str_radix(if digits.is_empty() { "0" } else { &digits }, 10).ok()?;
  let scale = exponent - frac.len() as i32;
  let ten = BigInt::from(10);
  let value = if scale >= 0 {
    BigRational::from_integer(numer * num::pow(ten, scale as usize))
  } else {
    BigRational::new(numer, num::pow(ten, (-scale) as usize))
  };
  Some(value)
}
