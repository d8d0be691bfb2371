use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, debug_span, trace, warn};

use crate::error::{Error, Result};
use crate::grammar::Grammar;
use crate::syntree::ParseTree;

/// Knobs for a single parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
  /// Label the full-span tree must have
  pub start_symbol: String,
  /// Most labels kept per cell, 0 for no limit
  pub beam_width: usize,
  /// Most rule applications a parse may try, None for no limit
  pub max_steps: Option<usize>,
}

impl Default for ParseOptions {
  fn default() -> Self {
    Self {
      start_symbol: "S".to_string(),
      beam_width: 10,
      max_steps: None,
    }
  }
}

impl ParseOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn start_symbol(mut self, start: impl Into<String>) -> Self {
    self.start_symbol = start.into();
    self
  }

  pub fn beam_width(mut self, width: usize) -> Self {
    self.beam_width = width;
    self
  }

  pub fn max_steps(mut self, steps: usize) -> Self {
    self.max_steps = Some(steps);
    self
  }
}

/// Best tree per label for one span
pub type Cell = BTreeMap<String, Arc<ParseTree>>;

/// Counts rule applications against an optional limit.
struct Budget {
  limit: Option<usize>,
  used: usize,
}

impl Budget {
  fn new(limit: Option<usize>) -> Self {
    Self { limit, used: 0 }
  }

  fn tick(&mut self) -> Result<()> {
    self.used += 1;
    match self.limit {
      Some(limit) if self.used > limit => Err(Error::BudgetExceeded(limit)),
      _ => Ok(()),
    }
  }
}

/// Triangular table of cells, one per inclusive span `(i, j)` with `i <= j`.
#[derive(Debug)]
pub struct Chart {
  len: usize,
  cells: Vec<Cell>,
}

impl Chart {
  pub fn new(length: usize) -> Self {
    Self {
      len: length,
      cells: vec![Cell::new(); length * (length + 1) / 2],
    }
  }

  /// Number of tokens the chart covers
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  fn index(&self, i: usize, j: usize) -> Option<usize> {
    if i <= j && j < self.len {
      // rows before i hold len, len - 1, ..., len - i + 1 cells
      Some(i * (2 * self.len - i + 1) / 2 + (j - i))
    } else {
      None
    }
  }

  pub fn cell(&self, i: usize, j: usize) -> Option<&Cell> {
    self.index(i, j).map(|idx| &self.cells[idx])
  }

  /// The stored tree for `label` over `(i, j)`, if any
  pub fn best_parse(&self, label: &str, i: usize, j: usize) -> Option<&Arc<ParseTree>> {
    self.cell(i, j).and_then(|cell| cell.get(label))
  }

  /// At most `n` trees for `label` over `(i, j)`, best first.
  ///
  /// Cells keep a single tree per label, so this never returns more than one.
  pub fn n_best_parses(&self, label: &str, i: usize, j: usize, n: usize) -> Vec<Arc<ParseTree>> {
    self
      .best_parse(label, i, j)
      .into_iter()
      .take(n)
      .cloned()
      .collect()
  }

  /// All trees over `(i, j)` across labels, best first.
  pub fn ranked(&self, i: usize, j: usize) -> Vec<&Arc<ParseTree>> {
    let mut trees: Vec<_> = self.cell(i, j).into_iter().flat_map(|c| c.values()).collect();
    trees.sort_by(|a, b| b.log_probability.total_cmp(&a.log_probability));
    trees
  }

  /// The tree for `label` over the whole input
  pub fn root(&self, label: &str) -> Option<&Arc<ParseTree>> {
    if self.is_empty() {
      None
    } else {
      self.best_parse(label, 0, self.len - 1)
    }
  }

  /// Total number of stored trees
  pub fn entries(&self) -> usize {
    self.cells.iter().map(Cell::len).sum()
  }

  fn store(&mut self, i: usize, j: usize, mut cell: Cell, beam_width: usize) {
    if beam_width > 0 && cell.len() > beam_width {
      let mut ranked: Vec<_> = cell.into_iter().collect();
      // stable sort keeps label order among ties
      ranked.sort_by(|(_, a), (_, b)| b.log_probability.total_cmp(&a.log_probability));
      trace!(i, j, pruned = ranked.len() - beam_width, "beam pruning");
      ranked.truncate(beam_width);
      cell = ranked.into_iter().collect();
    }

    if let Some(idx) = self.index(i, j) {
      self.cells[idx] = cell;
    }
  }
}

impl fmt::Display for Chart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for width in 1..=self.len {
      writeln!(f, "Span length {}:", width)?;
      for i in 0..=(self.len - width) {
        let j = i + width - 1;
        for tree in self.ranked(i, j) {
          writeln!(f, "  {}..{}: {} ({:.4})", i, j, tree.label, tree.log_probability)?;
        }
      }
    }
    Ok(())
  }
}

/// Keeps `tree` if it beats the stored tree for its label. Returns whether it did.
fn offer(cell: &mut Cell, tree: ParseTree) -> bool {
  match cell.get(&tree.label) {
    Some(existing) if existing.log_probability >= tree.log_probability => false,
    _ => {
      cell.insert(tree.label.clone(), Arc::new(tree));
      true
    }
  }
}

/// Applies unary rules to the cell until no label improves.
///
/// A label is expanded again only when its tree got strictly better, so
/// unary cycles such as `A -> B`, `B -> A` stop once probabilities settle.
fn unary_closure(g: &Grammar, cell: &mut Cell, budget: &mut Budget) -> Result<()> {
  let mut frontier: Vec<Arc<ParseTree>> = cell.values().cloned().collect();

  while let Some(child) = frontier.pop() {
    if cell.get(&child.label).is_some_and(|c| !Arc::ptr_eq(c, &child)) {
      // superseded since it was queued
      continue;
    }
    for rule in g.unary_rules(&child.label) {
      budget.tick()?;
      let label = rule.lhs.clone();
      if offer(cell, ParseTree::unary(rule, child.clone())) {
        if let Some(tree) = cell.get(&label) {
          frontier.push(tree.clone());
        }
      }
    }
  }

  Ok(())
}

/// Fills the chart bottom-up by increasing span length.
pub fn build_chart<S: AsRef<str>>(g: &Grammar, tokens: &[S], options: &ParseOptions) -> Result<Chart> {
  if tokens.is_empty() {
    return Err(Error::EmptyInput);
  }

  let n = tokens.len();
  let span = debug_span!("build_chart", tokens = n, beam_width = options.beam_width);
  let _entered = span.enter();

  if g.unusable_rules() > 0 {
    warn!(
      count = g.unusable_rules(),
      "grammar has rules that are neither lexical, unary nor binary; they are ignored"
    );
  }

  let mut chart = Chart::new(n);
  let mut budget = Budget::new(options.max_steps);

  for (i, token) in tokens.iter().enumerate() {
    let token: &str = token.as_ref();
    let mut cell = Cell::new();
    for rule in g.lexical_rules(&token.to_lowercase()) {
      budget.tick()?;
      offer(&mut cell, ParseTree::lexical(rule, token, i));
    }
    unary_closure(g, &mut cell, &mut budget)?;
    chart.store(i, i, cell, options.beam_width);
  }

  for width in 2..=n {
    for i in 0..=(n - width) {
      let j = i + width - 1;
      let mut cell = Cell::new();

      for k in i..j {
        let (Some(lefts), Some(rights)) = (chart.cell(i, k), chart.cell(k + 1, j)) else {
          continue;
        };
        for left in lefts.values() {
          for right in rights.values() {
            budget.tick()?;
            for rule in g.binary_rules(&left.label, &right.label) {
              offer(&mut cell, ParseTree::binary(rule, left.clone(), right.clone()));
            }
          }
        }
      }

      unary_closure(g, &mut cell, &mut budget)?;
      chart.store(i, j, cell, options.beam_width);
    }
  }

  debug!(entries = chart.entries(), steps = budget.used, "chart complete");
  Ok(chart)
}

/// Most probable tree rooted at `options.start_symbol` covering all of `tokens`.
pub fn parse<S: AsRef<str>>(g: &Grammar, tokens: &[S], options: &ParseOptions) -> Result<ParseTree> {
  let chart = build_chart(g, tokens, options)?;
  let root = chart
    .root(&options.start_symbol)
    .cloned()
    .ok_or_else(|| Error::NoParse {
      start: options.start_symbol.clone(),
      len: tokens.len(),
    })?;
  drop(chart);
  Ok(Arc::unwrap_or_clone(root))
}
