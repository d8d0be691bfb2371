//! Errors returned by grammar transforms and the chart parser.

/// Everything that can go wrong between a rule set and a parse tree.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
  /// The token sequence was empty.
  #[error("cannot parse an empty token sequence")]
  EmptyInput,

  /// No derivation of the start symbol covers the whole input.
  #[error("no parse rooted at {start} covers all {len} tokens")]
  NoParse { start: String, len: usize },

  /// A rule has a degenerate shape or an out-of-range probability.
  #[error("malformed grammar: {0}")]
  MalformedGrammar(String),

  /// A configuration value is out of range.
  #[error("invalid option: {0}")]
  InvalidOption(String),

  /// The parse explored more combinations than its step budget allows.
  #[error("step budget of {0} exhausted before the chart was complete")]
  BudgetExceeded(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
