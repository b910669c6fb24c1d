use eyre::{Report, WrapErr};
use std::path::{Path, PathBuf};
use std::process::Command;
use virannot::model::{Model, ModelLibrary};
use virannot::search::{SearchEngine, SearchHit};
use virannot::sequence::{write_fasta, Sequence, Strand};

/// Shells out to the configured search executable and parses its tabular output.
///
/// Invoked once per batch: a temp fasta of the batch's sequences plus a path to the model(s)
/// to search against, producing whitespace-delimited hit rows (header lines start with `#`):
/// `target-name model-from model-to seq-from seq-to strand bias score e-value`.
pub struct ProcessSearchEngine {
  pub executable: PathBuf,
  pub combined_cm_path: PathBuf,
}

impl ProcessSearchEngine {
  pub fn new(executable: PathBuf, combined_cm_path: PathBuf) -> Self {
    Self { executable, combined_cm_path }
  }

  fn run(&self, sequences: &[Sequence], cm_path: &Path) -> Result<Vec<SearchHit>, Report> {
    let workdir = tempfile::tempdir().wrap_err("When creating a temp directory for a search batch")?;
    let fasta_path = workdir.path().join("batch.fasta");
    std::fs::write(&fasta_path, write_fasta(sequences)).wrap_err("When writing a temp batch fasta")?;

    let output = Command::new(&self.executable)
      .arg(cm_path)
      .arg(&fasta_path)
      .output()
      .wrap_err_with(|| format!("When invoking search executable '{}'", self.executable.display()))?;
    if !output.status.success() {
      return Err(eyre::eyre!(
        "Search executable '{}' exited with {}: {}",
        self.executable.display(),
        output.status,
        String::from_utf8_lossy(&output.stderr)
      ));
    }
    parse_search_table(&String::from_utf8_lossy(&output.stdout))
  }
}

impl SearchEngine for ProcessSearchEngine {
  fn search_pass1(&self, sequences: &[Sequence], _library: &ModelLibrary) -> Result<Vec<SearchHit>, Report> {
    self.run(sequences, &self.combined_cm_path)
  }

  fn search_pass2(&self, sequences: &[Sequence], model: &Model) -> Result<Vec<SearchHit>, Report> {
    let cm_path = model
      .cm_file
      .as_ref()
      .ok_or_else(|| eyre::eyre!("Model '{}' has no covariance-model file for pass-2 search", model.name))?;
    self.run(sequences, cm_path)
  }
}

fn parse_search_table(text: &str) -> Result<Vec<SearchHit>, Report> {
  let mut hits = Vec::new();
  for line in text.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [target_name, model_name, model_from, model_to, seq_from, seq_to, strand, bias, score, rest @ ..] = fields.as_slice() else {
      return Err(eyre::eyre!("Malformed search-table row (too few columns): '{line}'"));
    };
    let e_value = rest.first().and_then(|s| s.parse::<f64>().ok());
    hits.push(SearchHit {
      seq_name: (*target_name).to_owned(),
      model_name: (*model_name).to_owned(),
      model_from: model_from.parse().wrap_err_with(|| format!("When parsing model-from in row '{line}'"))?,
      model_to: model_to.parse().wrap_err_with(|| format!("When parsing model-to in row '{line}'"))?,
      seq_from: seq_from.parse().wrap_err_with(|| format!("When parsing seq-from in row '{line}'"))?,
      seq_to: seq_to.parse().wrap_err_with(|| format!("When parsing seq-to in row '{line}'"))?,
      strand: Strand::from_char(strand.chars().next().unwrap_or('+')).ok_or_else(|| eyre::eyre!("Invalid strand in row '{line}'"))?,
      bias: bias.parse().wrap_err_with(|| format!("When parsing bias in row '{line}'"))?,
      score: score.parse().wrap_err_with(|| format!("When parsing score in row '{line}'"))?,
      e_value,
    });
  }
  Ok(hits)
}

#[cfg(test)]
mod process_search_engine_tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn parses_table_skipping_header_and_blank_lines() {
    let text = "\
# target-name model-name model-from model-to seq-from seq-to strand bias score e-value
s1 M1 1 900 1 900 + 0.0 950.5 1e-200

s2 M1 1 900 5 904 - 1.2 10.0 1e-3
";
    let hits = parse_search_table(text).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].seq_name, "s1");
    assert_eq!(hits[0].model_from, 1);
    assert_eq!(hits[0].model_to, 900);
    assert_eq!(hits[0].strand, Strand::Plus);
    assert_eq!(hits[1].strand, Strand::Minus);
    assert_eq!(hits[1].e_value, Some(1e-3));
  }

  #[rstest]
  fn rejects_row_with_too_few_columns() {
    let err = parse_search_table("s1 M1 1 900 1\n").unwrap_err();
    assert!(format!("{err:#}").contains("too few columns"));
  }
}
