use std::fmt;
use std::sync::Arc;

use crate::rules::Rule;

#[derive(Debug, PartialEq, Clone)]
pub enum Children {
  /// A lexical node's token
  Word(String),
  Unary(Arc<ParseTree>),
  Binary(Arc<ParseTree>, Arc<ParseTree>),
}

/// A constituent in the flattened bracket view of a tree.
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct Bracket {
  pub label: String,
  pub start: usize,
  pub end: usize,
}

impl fmt::Display for Bracket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}: {}", self.start, self.end, self.label)
  }
}

/// A weighted derivation. Spans are inclusive token indices.
///
/// The score is kept as a log probability so that long derivations stay
/// comparable after the plain product would have underflowed.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseTree {
  pub label: String,
  pub log_probability: f64,
  pub children: Children,
  pub span: (usize, usize),
  pub rule: Arc<Rule>,
}

impl ParseTree {
  pub fn lexical(rule: &Arc<Rule>, token: impl Into<String>, position: usize) -> Self {
    Self {
      label: rule.lhs.clone(),
      log_probability: rule.probability.ln(),
      children: Children::Word(token.into()),
      span: (position, position),
      rule: rule.clone(),
    }
  }

  pub fn unary(rule: &Arc<Rule>, child: Arc<ParseTree>) -> Self {
    Self {
      label: rule.lhs.clone(),
      log_probability: rule.probability.ln() + child.log_probability,
      span: child.span,
      children: Children::Unary(child),
      rule: rule.clone(),
    }
  }

  pub fn binary(rule: &Arc<Rule>, left: Arc<ParseTree>, right: Arc<ParseTree>) -> Self {
    Self {
      label: rule.lhs.clone(),
      log_probability: rule.probability.ln() + left.log_probability + right.log_probability,
      span: (left.span.0, right.span.1),
      children: Children::Binary(left, right),
      rule: rule.clone(),
    }
  }

  /// Product of the rule probabilities in this derivation. May be 0 for very
  /// long derivations even though [`ParseTree::log_probability`] is finite.
  pub fn probability(&self) -> f64 {
    self.log_probability.exp()
  }

  pub fn log_probability(&self) -> f64 {
    self.log_probability
  }

  pub fn is_lexical(&self) -> bool {
    matches!(self.children, Children::Word(_))
  }

  pub fn word(&self) -> Option<&str> {
    match &self.children {
      Children::Word(w) => Some(w),
      _ => None,
    }
  }

  pub fn children(&self) -> Vec<&Arc<ParseTree>> {
    match &self.children {
      Children::Word(_) => Vec::new(),
      Children::Unary(c) => vec![c],
      Children::Binary(l, r) => vec![l, r],
    }
  }

  /// The tokens under this node, left to right
  pub fn leaves(&self) -> Vec<&str> {
    match &self.children {
      Children::Word(w) => vec![w.as_str()],
      Children::Unary(c) => c.leaves(),
      Children::Binary(l, r) => {
        let mut leaves = l.leaves();
        leaves.extend(r.leaves());
        leaves
      }
    }
  }

  /// Bracket notation, `(LABEL child...)`, with lexical nodes as `(LABEL word)`.
  /// Labels are upper-cased, and `(` and `)` leaves are written as `-LRB-` and
  /// `-RRB-` as in the Penn Treebank.
  pub fn to_brackets(&self) -> String {
    let mut out = String::new();
    self.write_brackets(&mut out);
    out
  }

  fn write_brackets(&self, out: &mut String) {
    out.push('(');
    out.push_str(&self.label.to_uppercase());
    match &self.children {
      Children::Word(w) => {
        out.push(' ');
        out.push_str(escape_leaf(w));
      }
      _ => {
        for child in self.children() {
          out.push(' ');
          child.write_brackets(out);
        }
      }
    }
    out.push(')');
  }

  /// Every constituent of the tree in pre-order, for PARSEVAL-style scoring.
  ///
  /// Labels keep the grammar's case, unlike [`ParseTree::to_brackets`], which
  /// upper-cases them. Compare against a bracket string case-insensitively.
  pub fn extract_brackets(&self) -> Vec<Bracket> {
    let mut brackets = Vec::new();
    self.collect_brackets(&mut brackets);
    brackets
  }

  fn collect_brackets(&self, brackets: &mut Vec<Bracket>) {
    brackets.push(Bracket {
      label: self.label.clone(),
      start: self.span.0,
      end: self.span.1,
    });
    for child in self.children() {
      child.collect_brackets(brackets);
    }
  }
}

fn escape_leaf(word: &str) -> &str {
  match word {
    "(" => "-LRB-",
    ")" => "-RRB-",
    _ => word,
  }
}

impl fmt::Display for ParseTree {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.children {
      Children::Word(w) => write!(f, "({}..{}: {} {})", self.span.0, self.span.1, self.label, w),
      _ => {
        write!(f, "({}..{}: {}", self.span.0, self.span.1, self.label)?;
        for child in self.children() {
          let fmt = child.to_string();
          for line in fmt.lines() {
            write!(f, "\n  {}", line)?;
          }
        }
        write!(f, ")")
      }
    }
  }
}
