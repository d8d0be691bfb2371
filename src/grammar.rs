use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cnf;
use crate::error::{Error, Result};
use crate::rules::{Rule, Symbol};
use crate::utils::{approx_eq, Err, PROBABILITY_EPSILON};

/// Smoothing constant used when the caller doesn't pick one.
pub const DEFAULT_SMOOTHING: f64 = 0.001;

/// How strictly rule probabilities are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
  /// Any finite non-negative weight, for raw pseudo-counts
  Weights,
  /// A probability in [0, 1]
  Probability,
  /// A probability in (0, 1]
  PositiveProbability,
}

/// Rejects rules that would otherwise flow silently into wrong chart entries.
pub fn validate_rules(rules: &[Rule], validation: Validation) -> Result<()> {
  for rule in rules {
    if rule.lhs.is_empty() {
      return Err(Error::MalformedGrammar(format!("rule with empty left-hand side: {}", rule)));
    }
    if rule.is_empty() {
      return Err(Error::MalformedGrammar(format!(
        "{} has an empty right-hand side",
        rule.lhs
      )));
    }

    let p = rule.probability;
    let in_range = match validation {
      Validation::Weights => p.is_finite() && p >= 0.0,
      Validation::Probability => p >= 0.0 && p <= 1.0 + PROBABILITY_EPSILON,
      Validation::PositiveProbability => p > 0.0 && p <= 1.0 + PROBABILITY_EPSILON,
    };
    if !in_range {
      return Err(Error::MalformedGrammar(format!(
        "probability {} out of range in {}",
        p, rule
      )));
    }
  }
  Ok(())
}

/// Groups rules by their left-hand side.
pub fn index_by_lhs(rules: &[Rule]) -> BTreeMap<&str, Vec<&Rule>> {
  rules.iter().fold(BTreeMap::new(), |mut map, rule| {
    map.entry(rule.lhs.as_str()).or_insert_with(Vec::new).push(rule);
    map
  })
}

fn lhs_totals(rules: &[Rule]) -> HashMap<&str, f64> {
  rules.iter().fold(HashMap::new(), |mut totals, rule| {
    *totals.entry(rule.lhs.as_str()).or_insert(0.0) += rule.probability;
    totals
  })
}

/// Rescales every lhs group so its probabilities sum to one.
///
/// Groups with a total of exactly zero are left as they are and reported with
/// a warning, since there is nothing to distribute.
pub fn normalize_probabilities(mut rules: Vec<Rule>) -> Result<Vec<Rule>> {
  validate_rules(&rules, Validation::Weights)?;

  let totals: HashMap<String, f64> = lhs_totals(&rules)
    .into_iter()
    .map(|(lhs, total)| (lhs.to_string(), total))
    .collect();

  for (lhs, total) in totals.iter() {
    if *total == 0.0 {
      warn!(lhs = %lhs, "rule group has zero probability mass, left unnormalized");
    }
  }

  for rule in rules.iter_mut() {
    let total = totals[&rule.lhs];
    if total > 0.0 {
      rule.probability /= total;
    }
  }

  Ok(rules)
}

/// Add-k smoothing: every weight gets `k` added as a pseudo-count before
/// re-normalizing, so no rule ends up with zero probability.
pub fn apply_smoothing(mut rules: Vec<Rule>, k: f64) -> Result<Vec<Rule>> {
  if !(k.is_finite() && k > 0.0) {
    return Err(Error::InvalidOption(format!(
      "smoothing constant must be positive, got {}",
      k
    )));
  }
  validate_rules(&rules, Validation::Weights)?;

  for rule in rules.iter_mut() {
    rule.probability += k;
  }
  normalize_probabilities(rules)
}

/// Every label that appears as a lhs or as a non-terminal in some rhs.
pub fn non_terminals(rules: &[Rule]) -> BTreeSet<String> {
  let mut labels = BTreeSet::new();
  for rule in rules {
    labels.insert(rule.lhs.clone());
    for s in rule.rhs.iter() {
      if let Symbol::NonTerminal(label) = s {
        labels.insert(label.clone());
      }
    }
  }
  labels
}

/// Every word produced by a lexical rule.
pub fn terminals(rules: &[Rule]) -> BTreeSet<String> {
  rules
    .iter()
    .filter_map(Rule::word)
    .map(str::to_string)
    .collect()
}

/// An immutable, indexed rule set.
///
/// Besides the lhs index, rules are indexed the way the chart parser looks
/// them up: lexical rules by lowercased word, unary rules by child, binary rules by
/// (left, right). Rules of any other shape are kept but never used by the
/// parser; run [`Grammar::to_cnf`] first to make them usable.
#[derive(Debug, Clone)]
pub struct Grammar {
  /// lhs of the first rule, used as a default root by tooling
  pub start: String,
  rules: Vec<Arc<Rule>>,
  by_lhs: BTreeMap<String, Vec<Arc<Rule>>>,
  lexical: HashMap<String, Vec<Arc<Rule>>>,
  unary: HashMap<String, Vec<Arc<Rule>>>,
  binary: HashMap<String, HashMap<String, Vec<Arc<Rule>>>>,
  nonterminals: BTreeSet<String>,
  terminals: BTreeSet<String>,
  unusable: usize,
}

impl fmt::Display for Grammar {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "//** start: {}", self.start)?;
    write!(f, "//** nonterminals:")?;
    for nt in self.nonterminals.iter() {
      write!(f, " {}", nt)?;
    }
    writeln!(f)?;

    for rule in self.by_lhs.values().flatten() {
      writeln!(f, "{}", rule)?;
    }

    Ok(())
  }
}

impl Grammar {
  /// Builds the lookup indexes. Fails on empty rule sets, empty right-hand
  /// sides and probabilities outside [0, 1].
  pub fn new(rules: Vec<Rule>) -> Result<Self> {
    if rules.is_empty() {
      return Err(Error::MalformedGrammar("empty ruleset".into()));
    }
    validate_rules(&rules, Validation::Probability)?;

    let start = rules[0].lhs.clone();
    let nonterminals = non_terminals(&rules);
    let terminals = terminals(&rules);

    let mut by_lhs: BTreeMap<String, Vec<Arc<Rule>>> = BTreeMap::new();
    let mut lexical: HashMap<String, Vec<Arc<Rule>>> = HashMap::new();
    let mut unary: HashMap<String, Vec<Arc<Rule>>> = HashMap::new();
    let mut binary: HashMap<String, HashMap<String, Vec<Arc<Rule>>>> = HashMap::new();
    let mut unusable = 0;

    let rules: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
    for rule in rules.iter() {
      by_lhs.entry(rule.lhs.clone()).or_default().push(rule.clone());

      if let Some(word) = rule.word() {
        lexical.entry(word.to_lowercase()).or_default().push(rule.clone());
      } else if let Some(child) = rule.unary_child() {
        unary.entry(child.to_string()).or_default().push(rule.clone());
      } else if let Some((left, right)) = rule.binary_children() {
        binary
          .entry(left.to_string())
          .or_default()
          .entry(right.to_string())
          .or_default()
          .push(rule.clone());
      } else {
        unusable += 1;
      }
    }

    debug!(
      rules = rules.len(),
      nonterminals = nonterminals.len(),
      terminals = terminals.len(),
      unusable,
      "indexed grammar"
    );

    Ok(Self {
      start,
      rules,
      by_lhs,
      lexical,
      unary,
      binary,
      nonterminals,
      terminals,
      unusable,
    })
  }

  /// Builds a grammar from raw weights such as treebank counts, normalizing
  /// each lhs group first.
  pub fn from_weights(rules: Vec<Rule>) -> Result<Self> {
    Self::new(normalize_probabilities(rules)?)
  }

  pub fn with_start(mut self, start: impl Into<String>) -> Self {
    self.start = start.into();
    self
  }

  pub fn read_from_file(path: impl AsRef<Path>) -> std::result::Result<Self, Err> {
    std::fs::read_to_string(path)?.parse()
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  pub fn rules(&self) -> &[Arc<Rule>] {
    &self.rules
  }

  /// Owned copies of every rule, in insertion order
  pub fn to_rules(&self) -> Vec<Rule> {
    self.rules.iter().map(|r| Rule::clone(r)).collect()
  }

  pub fn rules_for(&self, lhs: &str) -> &[Arc<Rule>] {
    self.by_lhs.get(lhs).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Lexical rules are keyed by their lowercased word, the way the parser
  /// lowercases tokens before lookup.
  pub fn lexical_rules(&self, word: &str) -> &[Arc<Rule>] {
    self.lexical.get(word).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn unary_rules(&self, child: &str) -> &[Arc<Rule>] {
    self.unary.get(child).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn binary_rules(&self, left: &str, right: &str) -> &[Arc<Rule>] {
    self
      .binary
      .get(left)
      .and_then(|by_right| by_right.get(right))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn non_terminals(&self) -> &BTreeSet<String> {
    &self.nonterminals
  }

  pub fn terminals(&self) -> &BTreeSet<String> {
    &self.terminals
  }

  /// Number of rules the chart parser can't use (n-ary or mixed)
  pub fn unusable_rules(&self) -> usize {
    self.unusable
  }

  /// True when every rule is lexical or binary.
  pub fn is_cnf(&self) -> bool {
    self.rules.iter().all(|r| r.is_lexical() || r.is_binary())
  }

  /// True when every lhs group sums to one.
  pub fn is_normalized(&self) -> bool {
    self
      .by_lhs
      .values()
      .all(|group| approx_eq(group.iter().map(|r| r.probability).sum(), 1.0))
  }

  fn rebuild(&self, rules: Vec<Rule>) -> Result<Self> {
    Ok(Self::new(rules)?.with_start(self.start.clone()))
  }

  pub fn normalized(&self) -> Result<Self> {
    self.rebuild(normalize_probabilities(self.to_rules())?)
  }

  pub fn smoothed(&self, k: f64) -> Result<Self> {
    self.rebuild(apply_smoothing(self.to_rules(), k)?)
  }

  pub fn to_cnf(&self) -> Result<Self> {
    self.rebuild(cnf::to_cnf(self.to_rules())?)
  }
}
