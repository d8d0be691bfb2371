use std::fmt;

/// A grammar symbol: either a literal word or a syntactic category label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
  Terminal(String),
  NonTerminal(String),
}

impl Symbol {
  pub fn terminal(word: impl Into<String>) -> Self {
    Self::Terminal(word.into())
  }

  pub fn nonterminal(label: impl Into<String>) -> Self {
    Self::NonTerminal(label.into())
  }

  pub fn as_str(&self) -> &str {
    match self {
      Self::Terminal(s) => s,
      Self::NonTerminal(s) => s,
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Terminal(_))
  }

  pub fn is_nonterminal(&self) -> bool {
    matches!(self, Self::NonTerminal(_))
  }
}

/// True when `label` reads back as a non-terminal without `<...>` around it:
/// a name that doesn't start with a lower-case letter.
pub fn is_plain_label(label: &str) -> bool {
  !label.is_empty()
    && !label.starts_with(|c: char| c.is_lowercase())
    && label
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '|')
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str, open: char, close: char) -> fmt::Result {
  write!(f, "{}", open)?;
  for c in s.chars() {
    if c == close || c == '\\' {
      write!(f, "\\")?;
    }
    write!(f, "{}", c)?;
  }
  write!(f, "{}", close)
}

/// Writes a non-terminal label, bare when it can be read back that way
fn write_label(f: &mut fmt::Formatter<'_>, label: &str) -> fmt::Result {
  if is_plain_label(label) {
    write!(f, "{}", label)
  } else {
    write_escaped(f, label, '<', '>')
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Terminal(s) => write_escaped(f, s, '"', '"'),
      Self::NonTerminal(s) => write_label(f, s),
    }
  }
}

/// A weighted production `lhs -> rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
  pub lhs: String,
  pub rhs: Vec<Symbol>,
  pub probability: f64,
  pub language: Option<String>,
}

impl Rule {
  pub fn new(lhs: impl Into<String>, rhs: Vec<Symbol>, probability: f64) -> Self {
    Self {
      lhs: lhs.into(),
      rhs,
      probability,
      language: None,
    }
  }

  /// Shorthand for `lhs -> "word"`
  pub fn lexical(lhs: impl Into<String>, word: impl Into<String>, probability: f64) -> Self {
    Self::new(lhs, vec![Symbol::terminal(word)], probability)
  }

  /// Shorthand for `lhs -> child`
  pub fn unary(lhs: impl Into<String>, child: impl Into<String>, probability: f64) -> Self {
    Self::new(lhs, vec![Symbol::nonterminal(child)], probability)
  }

  /// Shorthand for `lhs -> left right`
  pub fn binary(
    lhs: impl Into<String>,
    left: impl Into<String>,
    right: impl Into<String>,
    probability: f64,
  ) -> Self {
    Self::new(
      lhs,
      vec![Symbol::nonterminal(left), Symbol::nonterminal(right)],
      probability,
    )
  }

  pub fn with_language(mut self, language: impl Into<String>) -> Self {
    self.language = Some(language.into());
    self
  }

  /// Same rule shape, different weight. Keeps the language tag.
  pub fn derive(&self, lhs: impl Into<String>, rhs: Vec<Symbol>, probability: f64) -> Self {
    Self {
      lhs: lhs.into(),
      rhs,
      probability,
      language: self.language.clone(),
    }
  }

  pub fn len(&self) -> usize {
    self.rhs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rhs.is_empty()
  }

  pub fn is_lexical(&self) -> bool {
    self.word().is_some()
  }

  pub fn is_unary(&self) -> bool {
    self.unary_child().is_some()
  }

  pub fn is_binary(&self) -> bool {
    self.binary_children().is_some()
  }

  /// The terminal of a lexical rule
  pub fn word(&self) -> Option<&str> {
    match self.rhs.as_slice() {
      [Symbol::Terminal(w)] => Some(w),
      _ => None,
    }
  }

  /// The child label of a unary rule
  pub fn unary_child(&self) -> Option<&str> {
    match self.rhs.as_slice() {
      [Symbol::NonTerminal(c)] => Some(c),
      _ => None,
    }
  }

  /// The (left, right) labels of a binary rule
  pub fn binary_children(&self) -> Option<(&str, &str)> {
    match self.rhs.as_slice() {
      [Symbol::NonTerminal(l), Symbol::NonTerminal(r)] => Some((l, r)),
      _ => None,
    }
  }

  /// True when the rhs has more than one symbol and at least one is a terminal.
  pub fn is_mixed(&self) -> bool {
    self.len() > 1 && self.rhs.iter().any(Symbol::is_terminal)
  }
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_label(f, &self.lhs)?;
    write!(f, " ->")?;
    for s in self.rhs.iter() {
      write!(f, " {}", s)?;
    }
    write!(f, " [{}]", self.probability)?;
    if let Some(lang) = &self.language {
      write!(f, " @{}", lang)?;
    }
    write!(f, ";")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_shapes_partition() {
    let lexical = Rule::lexical("Det", "the", 1.0);
    let unary = Rule::unary("VP", "Verb", 1.0);
    let binary = Rule::binary("S", "NP", "VP", 1.0);
    let mixed = Rule::new(
      "PP",
      vec![Symbol::terminal("of"), Symbol::nonterminal("NP")],
      1.0,
    );

    assert!(lexical.is_lexical() && !lexical.is_unary() && !lexical.is_binary());
    assert!(unary.is_unary() && !unary.is_lexical() && !unary.is_binary());
    assert!(binary.is_binary() && !binary.is_lexical() && !binary.is_unary());
    assert!(mixed.is_mixed());
    assert!(!mixed.is_lexical() && !mixed.is_unary() && !mixed.is_binary());

    assert_eq!(lexical.word(), Some("the"));
    assert_eq!(unary.unary_child(), Some("Verb"));
    assert_eq!(binary.binary_children(), Some(("NP", "VP")));
  }

  #[test]
  fn test_display() {
    let rule = Rule::new(
      "NP",
      vec![Symbol::nonterminal("Det"), Symbol::terminal("cat")],
      0.5,
    )
    .with_language("en");
    assert_eq!(rule.to_string(), r#"NP -> Det "cat" [0.5] @en;"#);
  }

  #[test]
  fn test_display_wraps_odd_labels() {
    let rule = Rule::new(
      "np",
      vec![
        Symbol::nonterminal("S|VP_."),
        Symbol::nonterminal("_,"),
        Symbol::nonterminal("a>b"),
        Symbol::terminal(r#"say "hi""#),
      ],
      1.0,
    );
    assert_eq!(
      rule.to_string(),
      r#"<np> -> <S|VP_.> <_,> <a\>b> "say \"hi\"" [1];"#
    );
    assert!(is_plain_label("S|NP_VP"));
    assert!(is_plain_label("_the"));
    assert!(!is_plain_label("the"));
  }
}
