use regex::Regex;
/// Simple recursive-descent parsing of weighted grammar files
use std::str::FromStr;

use crate::grammar::{validate_rules, Grammar, Validation};
use crate::rules::{Rule, Symbol};
use crate::Err;

impl FromStr for Grammar {
  type Err = Err;

  /// Parses a grammar from a string. The first rule's lhs becomes the
  /// grammar's declared start symbol. Weights must already be probabilities;
  /// read pseudo-counts with [`parse_weighted`] and [`Grammar::from_weights`].
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let rules = parse_weighted(s)?;

    if rules.is_empty() {
      Err("empty ruleset".into())
    } else {
      Ok(Self::new(rules)?)
    }
  }
}

/// Reads every rule in `s`, accepting any finite non-negative weight, so that
/// count grammars can be normalized or smoothed before they become a
/// [`Grammar`].
pub fn parse_weighted(s: &str) -> Result<Vec<Rule>, Err> {
  let (rules, rest) = parse_rules(s)?;
  assert!(rest.is_empty());
  validate_rules(&rules, Validation::Weights)?;
  Ok(rules)
}

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex at the start of `s`, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  match re.find(s) {
    Some(m) if m.start() == 0 => (Some(m.as_str()), &s[m.end()..]),
    _ => (None, s),
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", re, excerpt(s)).into())
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  match s.strip_prefix(c) {
    Some(rest) => (Some(c), rest),
    None => (None, s),
  }
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {}", c, excerpt(s)).into())
  }
}

/// First line of the remaining input, for error messages
fn excerpt(s: &str) -> &str {
  s.lines().next().unwrap_or("end of input")
}

/// Skips whitespace and // comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"^(?:\s+|//[^\n]*)*");
  optional_re(&*WHITESPACE_OR_COMMENT, s).1
}

/// Tries to parse a name made of letters, numbers, -, _ and |
fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"^[a-zA-Z0-9\-_|]+");
  needed_re(&*NAME, s).map_err(|err| format!("name: {}", err).into())
}

/// Drops the delimiters around `raw` and resolves backslash escapes
fn unescape(raw: &str) -> String {
  let mut word = String::with_capacity(raw.len());
  let mut chars = raw[1..raw.len() - 1].chars();
  while let Some(c) = chars.next() {
    if c == '\\' {
      if let Some(escaped) = chars.next() {
        word.push(escaped);
      }
    } else {
      word.push(c);
    }
  }
  word
}

/// Parses a double-quoted word, with \" and \\ escapes
fn parse_quoted(s: &str) -> ParseResult<'_, String> {
  regex_static!(QUOTED, r#"^"(?:[^"\\]|\\.)*""#);
  let (raw, s) = needed_re(&*QUOTED, s).map_err(|e| -> Err { format!("quoted word: {}", e).into() })?;
  Ok((unescape(raw), s))
}

/// Parses a `<label>` for non-terminals that aren't plain names, with \> and
/// \\ escapes
fn parse_wrapped_label(s: &str) -> ParseResult<'_, String> {
  regex_static!(WRAPPED, r"^<(?:[^>\\]|\\.)*>");
  let (raw, s) = needed_re(&*WRAPPED, s).map_err(|e| -> Err { format!("label: {}", e).into() })?;
  Ok((unescape(raw), s))
}

/// Parses an optional `[probability]`
fn parse_probability(s: &str) -> ParseResult<'_, Option<f64>> {
  regex_static!(NUMBER, r"^[0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?");
  let (open, s) = optional_char('[', s);
  if open.is_none() {
    return Ok((None, s));
  }
  let s = skip_whitespace(s);
  let (number, s) = needed_re(&*NUMBER, s).map_err(|e| -> Err { format!("probability: {}", e).into() })?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(']', s)?;
  Ok((Some(number.parse()?), s))
}

/// Parses an optional `@language` tag
fn parse_language(s: &str) -> ParseResult<'_, Option<String>> {
  let (at, s) = optional_char('@', s);
  if at.is_none() {
    return Ok((None, s));
  }
  let (name, s) = parse_name(s).map_err(|e| -> Err { format!("language: {}", e).into() })?;
  Ok((Some(name.to_string()), s))
}

/// Lower-case names and quoted strings are terminals, `<...>` and every other
/// name is a non-terminal label.
fn parse_symbol(s: &str) -> ParseResult<'_, Symbol> {
  if s.starts_with('"') {
    let (word, s) = parse_quoted(s)?;
    return Ok((Symbol::Terminal(word), s));
  }
  if s.starts_with('<') {
    let (label, s) = parse_wrapped_label(s)?;
    return Ok((Symbol::NonTerminal(label), s));
  }

  let (name, s) = parse_name(s).map_err(|e| -> Err { format!("symbol: {}", e).into() })?;
  if name.chars().next().is_some_and(char::is_lowercase) {
    Ok((Symbol::terminal(name), s))
  } else {
    Ok((Symbol::nonterminal(name), s))
  }
}

/// lhs -> symbols [probability] @language;
fn parse_rule(s: &str) -> ParseResult<'_, Rule> {
  #![allow(clippy::trivial_regex)]
  regex_static!(ARROW, "^->");

  let (lhs, s) = parse_symbol(s).map_err(|e| -> Err { format!("rule lhs: {}", e).into() })?;
  let lhs = match lhs {
    Symbol::NonTerminal(label) => label,
    Symbol::Terminal(w) => {
      return Err(format!("expected non-terminal, got terminal {}: {}", w, excerpt(s)).into());
    }
  };

  let s = skip_whitespace(s);
  let (_, s) = needed_re(&*ARROW, s).map_err(|e| -> Err { format!("rule arrow: {}", e).into() })?;

  let mut rhs = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.starts_with('[') || rem.starts_with('@') || rem.starts_with(';') {
      break;
    }
    let (symbol, s) =
      parse_symbol(rem).map_err(|e| -> Err { format!("rule {}: {}", lhs, e).into() })?;
    rhs.push(symbol);
    rem = s;
  }

  let (probability, rem) = parse_probability(rem)?;
  let rem = skip_whitespace(rem);
  let (language, rem) = parse_language(rem)?;
  let rem = skip_whitespace(rem);
  let (_, rem) = needed_char(';', rem).map_err(|e| -> Err { format!("rule {}: {}", lhs, e).into() })?;

  let mut rule = Rule::new(lhs, rhs, probability.unwrap_or(1.0));
  rule.language = language;
  Ok((rule, rem))
}

/// Parses every rule in `s`
pub fn parse_rules(s: &str) -> ParseResult<'_, Vec<Rule>> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok((rules, rem));
    }
    let (rule, s) = parse_rule(rem)?;
    rules.push(rule);
    rem = s;
  }
}
