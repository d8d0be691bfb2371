//! Conversion of weighted rule sets into Chomsky Normal Form.
//!
//! The pipeline is unary elimination, then binarization, then extraction of
//! terminals out of multi-symbol right-hand sides. Each stage preserves the
//! probability of every derivation that survives it.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::Result;
use crate::grammar::{index_by_lhs, validate_rules, Validation};
use crate::rules::{Rule, Symbol};

/// Converts `rules` so that every rule is lexical or binary.
pub fn to_cnf(rules: Vec<Rule>) -> Result<Vec<Rule>> {
  validate_rules(&rules, Validation::PositiveProbability)?;
  let input = rules.len();

  let rules = eliminate_unary(rules);
  let after_unary = rules.len();
  let rules = binarize(rules);
  let after_binarize = rules.len();
  let rules = extract_terminals(rules);

  debug!(
    input,
    after_unary,
    after_binarize,
    output = rules.len(),
    "converted grammar to cnf"
  );
  Ok(rules)
}

type RuleKey = (String, Vec<Symbol>, Option<String>);

fn key(rule: &Rule) -> RuleKey {
  (rule.lhs.clone(), rule.rhs.clone(), rule.language.clone())
}

/// Collapses rules with identical lhs, rhs and language into one, summing
/// their probabilities. Keeps first-seen order.
fn merge_duplicates(rules: Vec<Rule>) -> Vec<Rule> {
  let mut merged: Vec<Rule> = Vec::with_capacity(rules.len());
  let mut positions: HashMap<RuleKey, usize> = HashMap::new();

  for rule in rules {
    match positions.get(&key(&rule)) {
      Some(&idx) => merged[idx].probability += rule.probability,
      None => {
        positions.insert(key(&rule), merged.len());
        merged.push(rule);
      }
    }
  }

  merged
}

/// Replaces every unary chain `A -> B -> ... -> alpha` by `A -> alpha`,
/// weighted by the product of the chain.
///
/// Chains are followed depth-first from each unary rule, and a chain stops
/// as soon as it would revisit a label already on it, so only real cycles
/// are cut. Every acyclic route from `A` to the same `alpha` is summed, which
/// keeps each lhs's total mass when the unary graph has no cycles.
pub fn eliminate_unary(rules: Vec<Rule>) -> Vec<Rule> {
  let (loops, rules): (Vec<Rule>, Vec<Rule>) = rules
    .into_iter()
    .partition(|r| r.unary_child() == Some(r.lhs.as_str()));
  for rule in loops {
    warn!(rule = %rule, "dropping unary self-loop");
  }

  let index = index_by_lhs(&rules);
  let mut out = Vec::with_capacity(rules.len());
  let mut path = Vec::new();

  for rule in rules.iter() {
    match rule.unary_child() {
      Some(child) => follow_unary(rule, child, rule.probability, &index, &mut path, &mut out),
      None => out.push(rule.clone()),
    }
  }

  let out = merge_duplicates(out);
  debug!(rules = out.len(), "eliminated unary rules");
  out
}

/// Emits `head.lhs -> alpha` for every non-unary rule reachable from `child`
/// through unary rules. `path` holds the labels of the chain so far.
fn follow_unary<'a>(
  head: &Rule,
  child: &'a str,
  weight: f64,
  index: &BTreeMap<&'a str, Vec<&'a Rule>>,
  path: &mut Vec<&'a str>,
  out: &mut Vec<Rule>,
) {
  if child == head.lhs || path.contains(&child) {
    return;
  }

  path.push(child);
  for sub in index.get(child).into_iter().flatten().copied() {
    let weight = weight * sub.probability;
    match sub.unary_child() {
      Some(grandchild) => follow_unary(head, grandchild, weight, index, path, out),
      None => out.push(head.derive(head.lhs.clone(), sub.rhs.clone(), weight)),
    }
  }
  path.pop();
}

/// Name of the synthetic symbol standing for the tail of `lhs -> first second ...`
pub fn synthetic_label(lhs: &str, first: &Symbol, second: &Symbol) -> String {
  format!("{}|{}_{}", lhs, first.as_str(), second.as_str())
}

fn binarize_into(
  rule: &Rule,
  lhs: String,
  rhs: &[Symbol],
  weight: f64,
  out: &mut Vec<Rule>,
  synthetic: &mut HashSet<String>,
) {
  if rhs.len() <= 2 {
    out.push(rule.derive(lhs, rhs.to_vec(), weight));
    return;
  }

  let tail = synthetic_label(&lhs, &rhs[0], &rhs[1]);
  synthetic.insert(tail.clone());
  out.push(rule.derive(
    lhs,
    vec![rhs[0].clone(), Symbol::NonTerminal(tail.clone())],
    weight,
  ));
  binarize_into(rule, tail, &rhs[1..], weight, out, synthetic);
}

/// Splits every rule with more than two rhs symbols into a right-branching
/// chain of binary rules.
///
/// Every link of a chain is first weighted with the mass of the original
/// rule. Rules sharing a prefix land on the same synthetic symbols, so links
/// are merged and each synthetic symbol's rules are then divided by its total
/// mass. The product along any chain is the original rule's probability, and
/// a rule with no shared prefix gets probability 1 on every synthetic link.
/// Only labels created here are renormalized, whatever the user's labels
/// look like.
pub fn binarize(rules: Vec<Rule>) -> Vec<Rule> {
  let mut out = Vec::with_capacity(rules.len());
  let mut chains = Vec::new();
  let mut synthetic = HashSet::new();

  for rule in rules {
    if rule.len() <= 2 {
      out.push(rule);
    } else {
      binarize_into(
        &rule,
        rule.lhs.clone(),
        &rule.rhs,
        rule.probability,
        &mut chains,
        &mut synthetic,
      );
    }
  }

  let mut chains = merge_duplicates(chains);
  let mut mass: HashMap<String, f64> = HashMap::new();
  for rule in chains.iter().filter(|r| synthetic.contains(&r.lhs)) {
    *mass.entry(rule.lhs.clone()).or_insert(0.0) += rule.probability;
  }
  for rule in chains.iter_mut() {
    if let Some(total) = mass.get(&rule.lhs) {
      rule.probability /= total;
    }
  }

  out.extend(chains);
  out
}

/// Name of the unit symbol wrapping `word`
pub fn unit_label(word: &str) -> String {
  format!("_{}", word)
}

/// Replaces terminals inside multi-symbol rules with unit non-terminals that
/// each have a single probability-1 lexical rule.
pub fn extract_terminals(rules: Vec<Rule>) -> Vec<Rule> {
  let mut out = Vec::with_capacity(rules.len());
  let mut units = Vec::new();
  let mut seen_units = HashSet::new();

  for mut rule in rules {
    if !rule.is_mixed() {
      out.push(rule);
      continue;
    }

    for symbol in rule.rhs.iter_mut() {
      if let Symbol::Terminal(word) = symbol {
        let label = unit_label(word);
        if seen_units.insert(label.clone()) {
          units.push(rule_unit(&label, word, rule.language.clone()));
        }
        *symbol = Symbol::NonTerminal(label);
      }
    }
    out.push(rule);
  }

  out.extend(units);
  out
}

fn rule_unit(label: &str, word: &str, language: Option<String>) -> Rule {
  Rule {
    language,
    ..Rule::lexical(label, word, 1.0)
  }
}
