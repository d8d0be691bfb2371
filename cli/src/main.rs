use std::env;
use std::fs;
use std::io;
use std::io::Write;
use std::process;

use cykbender::{
  apply_smoothing, normalize_probabilities, parse_weighted, Err, Error, Grammar, ParseOptions,
  DEFAULT_SMOOTHING,
};
use tracing_subscriber::EnvFilter;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} FILE [options]

Options:
  -h, --help          Print this message
  -c, --chart         Print the parse chart (defaults to not printing)
  -b, --beam N        Keep at most N labels per chart cell, 0 for no limit (default 10)
  -s, --start SYMBOL  Root label (defaults to the first rule's left-hand side)
      --max-steps N   Give up after N rule applications
      --cnf           Convert the grammar to Chomsky Normal Form before parsing
      --normalize     Read weights as counts and normalize them per left-hand side
      --smooth [K]    Read weights as counts and apply add-K smoothing (default K {})

Set RUST_LOG=debug to trace chart construction.",
    prog_name, DEFAULT_SMOOTHING
  )
}

fn parse(g: &Grammar, sentence: &str, options: &ParseOptions, print_chart: bool) -> Result<(), Err> {
  let sentence = sentence.split_whitespace().collect::<Vec<_>>();

  if print_chart {
    match g.parse_chart(&sentence, options) {
      Ok(chart) => println!("chart:\n{}", chart),
      Err(e) => println!("chart: {}", e),
    }
  }

  match g.parse_with(&sentence, options) {
    Ok(tree) => {
      println!("{}", tree);
      println!("{}", tree.to_brackets());
      println!("log probability: {:.6}", tree.log_probability());
    }
    Err(e @ (Error::NoParse { .. } | Error::EmptyInput | Error::BudgetExceeded(_))) => {
      println!("{}", e);
    }
    Err(e) => return Err(e.into()),
  }
  println!();

  Ok(())
}

struct Args {
  filename: String,
  print_chart: bool,
  cnf: bool,
  normalize: bool,
  smoothing: Option<f64>,
  start: Option<String>,
  beam_width: usize,
  max_steps: Option<usize>,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "cykbender"));
    }

    let args_len = v.len();
    let mut iter = v.into_iter().peekable();
    let prog_name = iter.next().unwrap_or_else(|| "cykbender".to_string());

    if args_len < 2 {
      return Err(Self::make_error_message("not enough arguments", prog_name));
    }

    let mut args = Self {
      filename: String::new(),
      print_chart: false,
      cnf: false,
      normalize: false,
      smoothing: None,
      start: None,
      beam_width: ParseOptions::default().beam_width,
      max_steps: None,
    };
    let mut filename: Option<String> = None;

    while let Some(o) = iter.next() {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-c" || o == "--chart" {
        args.print_chart = true;
      } else if o == "--cnf" {
        args.cnf = true;
      } else if o == "--normalize" {
        args.normalize = true;
      } else if o == "--smooth" {
        // the constant is optional
        args.smoothing = match iter.peek().and_then(|k| k.parse::<f64>().ok()) {
          Some(k) => {
            iter.next();
            Some(k)
          }
          None => Some(DEFAULT_SMOOTHING),
        };
      } else if o == "-b" || o == "--beam" {
        args.beam_width = iter
          .next()
          .and_then(|n| n.parse().ok())
          .ok_or_else(|| Self::make_error_message("--beam needs a number", &prog_name))?;
      } else if o == "--max-steps" {
        args.max_steps = Some(
          iter
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Self::make_error_message("--max-steps needs a number", &prog_name))?,
        );
      } else if o == "-s" || o == "--start" {
        args.start = Some(
          iter
            .next()
            .ok_or_else(|| Self::make_error_message("--start needs a symbol", &prog_name))?,
        );
      } else if filename.is_none() {
        filename = Some(o);
      } else {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      }
    }

    match filename {
      Some(filename) => {
        args.filename = filename;
        Ok(args)
      }
      None => Err(Self::make_error_message("missing filename", prog_name)),
    }
  }

  fn options(&self, g: &Grammar) -> ParseOptions {
    let mut options = ParseOptions::new()
      .start_symbol(self.start.clone().unwrap_or_else(|| g.start.clone()))
      .beam_width(self.beam_width);
    options.max_steps = self.max_steps;
    options
  }
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let rules = parse_weighted(&fs::read_to_string(&opts.filename)?)?;
  let rules = match opts.smoothing {
    Some(k) => apply_smoothing(rules, k)?,
    None if opts.normalize => normalize_probabilities(rules)?,
    None => rules,
  };
  let mut g = Grammar::new(rules)?;
  if opts.cnf {
    g = g.to_cnf()?;
  }
  let options = opts.options(&g);

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        parse(&g, input.trim(), &options, opts.print_chart)?;
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
