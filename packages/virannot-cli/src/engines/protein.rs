use eyre::{Report, WrapErr};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use virannot::protein::{ProteinAligner, ProteinQuery};
use virannot::results::ProteinQueryRecord;
use virannot::sequence::Strand;

/// Shells out to the configured protein aligner executable and parses a summary of
/// labeled records, one per hit, each terminated by `END_MATCH`:
///
/// ```text
/// QACC s1:0
/// HACC polyprotein
/// HSP 1
/// QRANGE 1-900
/// MAXIN 0
/// MAXDE 0
/// FRAME +1
/// STOP no
/// SCORE 312.5
/// END_MATCH
/// ```
///
/// `QACC` carries the query name built as `seq-name:feature-index`, using the colon
/// reserved for feature-query naming.
pub struct ProcessProteinAligner {
  pub executable: PathBuf,
}

impl ProcessProteinAligner {
  pub fn new(executable: PathBuf) -> Self {
    Self { executable }
  }
}

impl ProteinAligner for ProcessProteinAligner {
  fn align(&self, queries: &[ProteinQuery], protein_db_path: &Path) -> Result<Vec<ProteinQueryRecord>, Report> {
    let workdir = tempfile::tempdir().wrap_err("When creating a temp directory for a protein-query batch")?;
    let fasta_path = workdir.path().join("queries.fasta");
    let mut fasta = String::new();
    for query in queries {
      fasta.push('>');
      fasta.push_str(&query.seq_name);
      fasta.push(':');
      fasta.push_str(&query.feature_idx.to_string());
      fasta.push('\n');
      for chunk in query.bases.chunks(70) {
        fasta.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        fasta.push('\n');
      }
    }
    std::fs::write(&fasta_path, fasta).wrap_err("When writing a temp protein-query fasta")?;

    let output = Command::new(&self.executable)
      .arg(protein_db_path)
      .arg(&fasta_path)
      .output()
      .wrap_err_with(|| format!("When invoking protein aligner executable '{}'", self.executable.display()))?;
    if !output.status.success() {
      return Err(eyre::eyre!(
        "Protein aligner executable '{}' exited with {}: {}",
        self.executable.display(),
        output.status,
        String::from_utf8_lossy(&output.stderr)
      ));
    }

    let is_full_sequence_query: BTreeMap<(&str, usize), bool> =
      queries.iter().map(|q| ((q.seq_name.as_str(), q.feature_idx), q.is_full_sequence_query)).collect();
    parse_protein_summary(&String::from_utf8_lossy(&output.stdout), &is_full_sequence_query)
  }
}

fn parse_protein_summary(text: &str, is_full_sequence_query: &BTreeMap<(&str, usize), bool>) -> Result<Vec<ProteinQueryRecord>, Report> {
  let mut records = Vec::new();
  let mut fields: BTreeMap<&str, &str> = BTreeMap::new();

  for line in text.lines() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    if line == "END_MATCH" {
      records.push(record_from_fields(&fields, is_full_sequence_query)?);
      fields.clear();
      continue;
    }
    let Some((key, value)) = line.split_once(char::is_whitespace) else {
      return Err(eyre::eyre!("Malformed protein-summary line (no key/value split): '{line}'"));
    };
    fields.insert(key, value.trim());
  }
  if !fields.is_empty() {
    return Err(eyre::eyre!("Protein summary ended mid-record, missing a terminating END_MATCH"));
  }
  Ok(records)
}

fn record_from_fields(fields: &BTreeMap<&str, &str>, is_full_sequence_query: &BTreeMap<(&str, usize), bool>) -> Result<ProteinQueryRecord, Report> {
  let get = |key: &str| fields.get(key).copied().ok_or_else(|| eyre::eyre!("Protein-summary record missing field '{key}'"));

  let qacc = get("QACC")?;
  let (seq_name, feature_idx_str) = qacc
    .split_once(':')
    .ok_or_else(|| eyre::eyre!("QACC '{qacc}' is not in 'seq-name:feature-index' form"))?;
  let feature_idx: usize = feature_idx_str.parse().wrap_err_with(|| format!("When parsing feature index out of QACC '{qacc}'"))?;

  let qrange = get("QRANGE")?;
  let (start_str, stop_str) = qrange.split_once('-').ok_or_else(|| eyre::eyre!("QRANGE '{qrange}' is not in 'start-stop' form"))?;

  let frame = get("FRAME")?;
  let strand = if frame.starts_with('-') { Strand::Minus } else { Strand::Plus };

  Ok(ProteinQueryRecord {
    seq_name: seq_name.to_owned(),
    feature_idx,
    score: get("SCORE")?.parse().wrap_err("When parsing SCORE")?,
    start: start_str.parse().wrap_err("When parsing QRANGE start")?,
    stop: stop_str.parse().wrap_err("When parsing QRANGE stop")?,
    strand,
    max_insert: get("MAXIN")?.parse().wrap_err("When parsing MAXIN")?,
    max_delete: get("MAXDE")?.parse().wrap_err("When parsing MAXDE")?,
    has_internal_stop: get("STOP")?.eq_ignore_ascii_case("yes"),
    is_full_sequence_query: is_full_sequence_query.get(&(seq_name, feature_idx)).copied().unwrap_or(false),
  })
}
