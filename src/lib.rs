#[macro_use]
extern crate lazy_static;

pub mod cnf;
pub mod cyk;
pub mod error;
pub mod grammar;
pub mod parse_grammar;
pub mod rules;
pub mod syntree;
pub mod utils;

pub use crate::cyk::{Chart, ParseOptions};
pub use crate::error::{Error, Result};
pub use crate::grammar::{
  apply_smoothing, index_by_lhs, non_terminals, normalize_probabilities, terminals, Grammar,
  DEFAULT_SMOOTHING,
};
pub use crate::parse_grammar::parse_weighted;
pub use crate::rules::{Rule, Symbol};
pub use crate::syntree::{Bracket, Children, ParseTree};
pub use crate::utils::Err;

impl Grammar {
  pub fn parse_chart<S: AsRef<str>>(&self, input: &[S], options: &ParseOptions) -> Result<Chart> {
    cyk::build_chart(self, input, options)
  }

  /// Best parse rooted at `S`, with the default beam.
  pub fn parse<S: AsRef<str>>(&self, input: &[S]) -> Result<ParseTree> {
    self.parse_with(input, &ParseOptions::default())
  }

  pub fn parse_with<S: AsRef<str>>(&self, input: &[S], options: &ParseOptions) -> Result<ParseTree> {
    cyk::parse(self, input, options)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::utils::approx_eq;

  const TOY: &str = r#"
    Det -> the;
    Noun -> cat;
    Verb -> sat;
    NP -> Det Noun;
    VP -> Verb;
    S -> NP VP;
  "#;

  /// Reads `(LABEL child...)` back into (label, start, end) triples.
  fn read_brackets(s: &str) -> Vec<(String, usize, usize)> {
    fn node(tokens: &[&str], pos: &mut usize, word: &mut usize, out: &mut Vec<(String, usize, usize)>) {
      assert_eq!(tokens[*pos], "(");
      let label = tokens[*pos + 1].to_string();
      *pos += 2;
      let slot = out.len();
      out.push((label.clone(), *word, *word));
      let start = *word;
      while tokens[*pos] != ")" {
        if tokens[*pos] == "(" {
          node(tokens, pos, word, out);
        } else {
          *word += 1;
          *pos += 1;
        }
      }
      *pos += 1;
      out[slot] = (label, start, *word - 1);
    }

    let spaced = s.replace('(', " ( ").replace(')', " ) ");
    let tokens: Vec<&str> = spaced.split_whitespace().collect();
    let mut out = Vec::new();
    node(&tokens, &mut 0, &mut 0, &mut out);
    out
  }

  #[test]
  fn test_the_cat_sat() {
    let g: Grammar = TOY.parse().unwrap();
    let tree = g.parse(&["the", "cat", "sat"]).unwrap();
    assert_eq!(tree.label, "S");
    assert!(approx_eq(tree.probability(), 1.0));
    assert_eq!(tree.to_brackets(), "(S (NP (DET the) (NOUN cat)) (VP (VERB sat)))");
  }

  #[test]
  fn test_unknown_words_do_not_parse() {
    let g: Grammar = TOY.parse().unwrap();
    assert!(matches!(
      g.parse(&["dog", "barks"]),
      Err(Error::NoParse { .. })
    ));
    assert_eq!(g.parse::<&str>(&[]), Err(Error::EmptyInput));
  }

  #[test]
  fn test_capitalised_terminals_match_any_case() {
    let g: Grammar = r#"S -> Pron VP; Pron -> "I"; VP -> sleep;"#.parse().unwrap();
    let tree = g.parse(&["I", "sleep"]).unwrap();
    assert_eq!(tree.leaves(), vec!["I", "sleep"]);
    assert!(g.parse(&["i", "Sleep"]).is_ok());
    assert_eq!(g.lexical_rules("i").len(), 1);
  }

  #[test]
  fn test_bracket_consistency() {
    let g: Grammar = TOY.parse().unwrap();
    let tree = g.parse(&["the", "cat", "sat"]).unwrap();
    let from_tree: Vec<_> = tree
      .extract_brackets()
      .into_iter()
      // to_brackets upper-cases labels
      .map(|b| (b.label.to_uppercase(), b.start, b.end))
      .collect();
    assert_eq!(from_tree, read_brackets(&tree.to_brackets()));
  }

  const AMBIGUOUS: &str = r#"
    S -> NP VP [1.0];
    VP -> V NP [0.6];
    VP -> VP PP [0.4];
    NP -> NP PP [0.2];
    NP -> Det N [0.5];
    NP -> she [0.3];
    PP -> P NP [1.0];
    V -> saw;
    P -> with;
    Det -> the;
    Det -> a;
    N -> man;
    N -> telescope;
  "#;

  fn sentence() -> Vec<&'static str> {
    "she saw the man with a telescope".split(' ').collect()
  }

  #[test]
  fn test_pp_attachment_prefers_vp() {
    let g: Grammar = AMBIGUOUS.parse().unwrap();
    let tree = g.parse_with(&sentence(), &ParseOptions::default().beam_width(0)).unwrap();

    // VP attachment: 0.3 * 0.4 * 0.6 * 0.5 * 0.5 = 0.018
    // NP attachment: 0.3 * 0.6 * 0.2 * 0.5 * 0.5 = 0.009
    assert!(approx_eq(tree.probability(), 0.018));
    assert_eq!(
      tree.to_brackets(),
      "(S (NP she) (VP (VP (V saw) (NP (DET the) (N man))) (PP (P with) (NP (DET a) (N telescope)))))"
    );
    assert_eq!(tree.leaves(), sentence());
  }

  #[test]
  fn test_beam_monotonicity() {
    let g: Grammar = AMBIGUOUS.parse().unwrap();
    let exact = g.parse_with(&sentence(), &ParseOptions::default().beam_width(0)).unwrap();

    for width in 1..6 {
      let options = ParseOptions::default().beam_width(width);
      match g.parse_with(&sentence(), &options) {
        Ok(tree) => assert!(tree.log_probability() <= exact.log_probability() + 1e-12),
        Err(e) => assert!(matches!(e, Error::NoParse { .. }), "{}", e),
      }
    }
  }

  #[test]
  fn test_cnf_grammar_parses_same_sentence() {
    let g: Grammar = r#"
      S -> NP VP [1.0];
      NP -> Det Adj Noun [0.4];
      NP -> Det Noun [0.6];
      VP -> Verb [0.5];
      VP -> Verb "over" NP [0.5];
      Det -> the;
      Adj -> lazy;
      Noun -> dog [0.5];
      Noun -> fox [0.5];
      Verb -> jumps;
    "#
    .parse()
    .unwrap();

    let cnf = g.to_cnf().unwrap();
    assert!(cnf.is_cnf());
    assert!(cnf.is_normalized());

    let tokens = "the fox jumps over the lazy dog".split(' ').collect::<Vec<_>>();
    let raw = g.parse_with(&tokens, &ParseOptions::default().beam_width(0));
    assert!(matches!(raw, Err(Error::NoParse { .. })));

    let tree = cnf.parse_with(&tokens, &ParseOptions::default().beam_width(0)).unwrap();
    assert!(approx_eq(tree.probability(), 0.6 * 0.5 * 0.5 * 0.4 * 0.5));
    assert_eq!(tree.leaves(), tokens);
  }

  #[test]
  fn test_log_space_survives_underflow() {
    // S -> S S over a long input multiplies many small factors together
    let g = Grammar::new(vec![
      Rule::binary("S", "S", "S", 0.01),
      Rule::lexical("S", "x", 0.01),
    ])
    .unwrap();
    let tokens = vec!["x"; 200];
    let tree = g.parse(&tokens).unwrap();
    assert_eq!(tree.probability(), 0.0);
    assert!(tree.log_probability().is_finite());
    let expected = 199.0 * 0.01f64.ln() + 200.0 * 0.01f64.ln();
    assert!((tree.log_probability() - expected).abs() < 1e-6);
  }

  #[test]
  fn test_grammar_shared_across_threads() {
    let g: Grammar = AMBIGUOUS.parse().unwrap();
    let sentences = [
      "she saw the man",
      "she saw a telescope",
      "she saw the man with a telescope",
    ];

    let probabilities = std::thread::scope(|scope| {
      let handles = sentences
        .iter()
        .map(|s| {
          let g = &g;
          scope.spawn(move || {
            let tokens = s.split(' ').collect::<Vec<_>>();
            g.parse(&tokens).map(|t| t.probability())
          })
        })
        .collect::<Vec<_>>();
      handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect::<Vec<_>>()
    });

    assert!(approx_eq(probabilities[0].clone().unwrap(), 0.3 * 0.6 * 0.5));
    assert!(approx_eq(probabilities[1].clone().unwrap(), 0.3 * 0.6 * 0.5));
    assert!(approx_eq(probabilities[2].clone().unwrap(), 0.018));
  }
}
