use eyre::{Report, WrapErr};
use std::path::PathBuf;
use std::process::Command;
use virannot::align::{AlignEngine, AlignOutcome, AlignmentResult, InsertRecord};
use virannot::model::Model;
use virannot::sequence::{write_fasta, Sequence};

/// Shells out to the configured aligner executable: a Stockholm-style alignment on
/// stdout, with a shared `#=GC RF` reference
/// annotation row marking match columns, one sequence row and one `#=GR <name> PP` posterior
/// probability row per input sequence, and a side-channel insert file with one line per
/// sequence of the form `seq-name length span-start span-end (rf-pos seq-pos len)*`.
///
/// If the required DP matrix would exceed `--max-matrix-mb`, the executable prints a single
/// `OVERFLOW <seq-name>` line instead of that sequence's alignment rows.
pub struct ProcessAlignEngine {
  pub executable: PathBuf,
  /// When set, a copy of each invocation's alignment and insert file is kept here (named by
  /// model), so a later run can pass `--skip-alignment` and read them back via
  /// `CachedAlignEngine` instead of re-invoking the external aligner.
  pub intermediates_dir: Option<PathBuf>,
}

impl ProcessAlignEngine {
  pub fn new(executable: PathBuf, intermediates_dir: Option<PathBuf>) -> Self {
    Self { executable, intermediates_dir }
  }

  fn invoke(&self, sequences: &[Sequence], model: &Model, max_matrix_mb: f64) -> Result<(String, Vec<String>), Report> {
    let workdir = tempfile::tempdir().wrap_err("When creating a temp directory for an alignment batch")?;
    let fasta_path = workdir.path().join("batch.fasta");
    let insert_path = workdir.path().join("batch.inserts");
    std::fs::write(&fasta_path, write_fasta(sequences)).wrap_err("When writing a temp batch fasta")?;

    let cm_path = model
      .cm_file
      .as_ref()
      .ok_or_else(|| eyre::eyre!("Model '{}' has no covariance-model file for alignment", model.name))?;

    let output = Command::new(&self.executable)
      .arg(cm_path)
      .arg(&fasta_path)
      .arg("--mxsize")
      .arg(max_matrix_mb.to_string())
      .arg("--oinsert")
      .arg(&insert_path)
      .output()
      .wrap_err_with(|| format!("When invoking aligner executable '{}'", self.executable.display()))?;
    if !output.status.success() {
      return Err(eyre::eyre!(
        "Aligner executable '{}' exited with {}: {}",
        self.executable.display(),
        output.status,
        String::from_utf8_lossy(&output.stderr)
      ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let insert_text = std::fs::read_to_string(&insert_path).wrap_err("When reading the aligner's insert file")?;

    if let Some(dir) = &self.intermediates_dir {
      std::fs::create_dir_all(dir).wrap_err_with(|| format!("When creating intermediates directory '{}'", dir.display()))?;
      std::fs::write(dir.join(format!("{}.sto", model.name)), &stdout).wrap_err("When persisting an intermediate alignment")?;
      std::fs::write(dir.join(format!("{}.ins", model.name)), &insert_text).wrap_err("When persisting an intermediate insert file")?;
    }

    Ok((stdout, insert_text.lines().map(str::to_owned).collect()))
  }
}

/// Reads back alignments a previous `ProcessAlignEngine` run persisted to `intermediates_dir`,
/// backing the `--skip-alignment` flag.
pub struct CachedAlignEngine {
  pub intermediates_dir: PathBuf,
}

impl CachedAlignEngine {
  pub fn new(intermediates_dir: PathBuf) -> Self {
    Self { intermediates_dir }
  }

  fn load(&self, model: &Model) -> Result<Vec<AlignmentResult>, Report> {
    let sto_path = self.intermediates_dir.join(format!("{}.sto", model.name));
    let ins_path = self.intermediates_dir.join(format!("{}.ins", model.name));
    let stdout = std::fs::read_to_string(&sto_path)
      .wrap_err_with(|| format!("When reading cached alignment '{}' for --skip-alignment", sto_path.display()))?;
    let insert_lines: Vec<String> = std::fs::read_to_string(&ins_path)
      .wrap_err_with(|| format!("When reading cached insert file '{}' for --skip-alignment", ins_path.display()))?
      .lines()
      .map(str::to_owned)
      .collect();
    parse_stockholm_alignment(&stdout, &insert_lines)
  }
}

impl AlignEngine for CachedAlignEngine {
  fn align_batch(&self, sequences: &[Sequence], model: &Model, _max_matrix_mb: f64) -> Result<Vec<AlignmentResult>, Report> {
    let cached = self.load(model)?;
    let wanted: std::collections::BTreeSet<&str> = sequences.iter().map(|s| s.name.as_str()).collect();
    Ok(cached.into_iter().filter(|a| wanted.contains(a.seq_name.as_str())).collect())
  }

  fn align_one(&self, sequence: &Sequence, model: &Model, _max_matrix_mb: f64) -> Result<AlignOutcome, Report> {
    let cached = self.load(model)?;
    cached
      .into_iter()
      .find(|a| a.seq_name == sequence.name)
      .map(AlignOutcome::Success)
      .ok_or_else(|| eyre::eyre!("No cached alignment for sequence '{}' in model '{}'", sequence.name, model.name))
  }
}

impl AlignEngine for ProcessAlignEngine {
  fn align_batch(&self, sequences: &[Sequence], model: &Model, max_matrix_mb: f64) -> Result<Vec<AlignmentResult>, Report> {
    let (stdout, insert_lines) = self.invoke(sequences, model, max_matrix_mb)?;
    let overflowed: std::collections::BTreeSet<&str> = stdout
      .lines()
      .filter_map(|line| line.strip_prefix("OVERFLOW "))
      .collect();
    if let Some(seq_name) = overflowed.into_iter().next() {
      return Err(eyre::eyre!("Sequence '{seq_name}' overflowed the alignment matrix in a batch call"));
    }
    parse_stockholm_alignment(&stdout, &insert_lines)
  }

  fn align_one(&self, sequence: &Sequence, model: &Model, max_matrix_mb: f64) -> Result<AlignOutcome, Report> {
    let sequences = std::slice::from_ref(sequence);
    let (stdout, insert_lines) = self.invoke(sequences, model, max_matrix_mb)?;
    if stdout.lines().any(|line| line.starts_with("OVERFLOW ")) {
      return Ok(AlignOutcome::Overflow);
    }
    let mut alignments = parse_stockholm_alignment(&stdout, &insert_lines)?;
    let alignment = alignments
      .pop()
      .ok_or_else(|| eyre::eyre!("Aligner produced no alignment rows for sequence '{}'", sequence.name))?;
    Ok(AlignOutcome::Success(alignment))
  }
}

fn parse_stockholm_alignment(text: &str, insert_lines: &[String]) -> Result<Vec<AlignmentResult>, Report> {
  let mut reference_columns: Option<Vec<bool>> = None;
  let mut bases_by_seq: std::collections::BTreeMap<String, Vec<Option<u8>>> = std::collections::BTreeMap::new();
  let mut pp_by_seq: std::collections::BTreeMap<String, Vec<Option<char>>> = std::collections::BTreeMap::new();
  let mut seq_order: Vec<String> = Vec::new();

  for line in text.lines() {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with("# STOCKHOLM") || line == "//" || line.starts_with("OVERFLOW ") {
      continue;
    }
    if let Some(rest) = line.strip_prefix("#=GC RF") {
      reference_columns = Some(rest.trim().chars().map(|c| c != '.').collect());
      continue;
    }
    if let Some(rest) = line.strip_prefix("#=GR ") {
      let mut parts = rest.splitn(2, char::is_whitespace);
      let seq_name = parts.next().unwrap_or_default();
      let Some(pp_tag_and_values) = parts.next() else { continue };
      let Some(values) = pp_tag_and_values.trim_start().strip_prefix("PP") else { continue };
      let pp = values
        .trim()
        .chars()
        .map(|c| if c == '.' || c == '-' { None } else { Some(c) })
        .collect();
      pp_by_seq.insert(seq_name.to_owned(), pp);
      continue;
    }
    if line.starts_with('#') {
      continue;
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let Some(seq_name) = parts.next() else { continue };
    let Some(bases) = parts.next() else { continue };
    let entry = bases_by_seq.entry(seq_name.to_owned()).or_insert_with(|| {
      seq_order.push(seq_name.to_owned());
      Vec::new()
    });
    entry.extend(bases.trim().bytes().map(|b| if b == b'-' || b == b'.' { None } else { Some(b) }));
  }

  let reference_columns = reference_columns.ok_or_else(|| eyre::eyre!("Alignment output has no '#=GC RF' reference row"))?;
  let inserts_by_seq = parse_insert_file(insert_lines)?;

  seq_order
    .into_iter()
    .map(|seq_name| {
      let aligned_bases = bases_by_seq.remove(&seq_name).unwrap_or_default();
      let posterior_probs = pp_by_seq.remove(&seq_name).unwrap_or_else(|| vec![None; aligned_bases.len()]);
      let inserts = inserts_by_seq.get(&seq_name).cloned().unwrap_or_default();
      Ok(AlignmentResult {
        seq_name,
        reference_columns: reference_columns.clone(),
        aligned_bases,
        posterior_probs,
        inserts,
      })
    })
    .collect()
}

fn parse_insert_file(lines: &[String]) -> Result<std::collections::BTreeMap<String, Vec<InsertRecord>>, Report> {
  let mut by_seq = std::collections::BTreeMap::new();
  for line in lines {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [seq_name, _length, _span_start, _span_end, rest @ ..] = fields.as_slice() else {
      return Err(eyre::eyre!("Malformed insert-file row (too few columns): '{line}'"));
    };
    let mut records = Vec::new();
    for triple in rest.chunks(3) {
      let [rf_pos, seq_pos, len] = triple else {
        return Err(eyre::eyre!("Malformed insert-file row (incomplete triple): '{line}'"));
      };
      records.push(InsertRecord {
        model_pos_before: rf_pos.parse().wrap_err_with(|| format!("When parsing rf-pos in row '{line}'"))?,
        seq_start: seq_pos.parse().wrap_err_with(|| format!("When parsing seq-pos in row '{line}'"))?,
        len: len.parse().wrap_err_with(|| format!("When parsing insert len in row '{line}'"))?,
      });
    }
    by_seq.insert((*seq_name).to_owned(), records);
  }
  Ok(by_seq)
}

#[cfg(test)]
mod process_align_engine_tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn parses_stockholm_block_with_reference_row_and_posterior_probs() {
    let text = "\
# STOCKHOLM 1.0
#=GC RF                 xxxx..xx
s1                      ATGC--AT
#=GR s1 PP               9999..99
//
";
    let alignments = parse_stockholm_alignment(text, &[]).unwrap();
    assert_eq!(alignments.len(), 1);
    let alignment = &alignments[0];
    assert_eq!(alignment.seq_name, "s1");
    assert_eq!(alignment.reference_columns, vec![true, true, true, true, false, false, true, true]);
    assert_eq!(
      alignment.aligned_bases,
      vec![Some(b'A'), Some(b'T'), Some(b'G'), Some(b'C'), None, None, Some(b'A'), Some(b'T')]
    );
    assert_eq!(
      alignment.posterior_probs,
      vec![Some('9'), Some('9'), Some('9'), Some('9'), None, None, Some('9'), Some('9')]
    );
  }

  #[rstest]
  fn attaches_insert_records_from_the_side_channel_file() {
    let text = "\
#=GC RF xxxx
s1       ATGC
#=GR s1 PP   9999
";
    let inserts = vec!["s1 4 1 4 2 3 5".to_owned()];
    let alignments = parse_stockholm_alignment(text, &inserts).unwrap();
    assert_eq!(alignments[0].inserts, vec![InsertRecord { model_pos_before: 2, seq_start: 3, len: 5 }]);
  }

  #[rstest]
  fn rejects_alignment_without_reference_row() {
    let err = parse_stockholm_alignment("s1 ATGC\n", &[]).unwrap_err();
    assert!(format!("{err:#}").contains("reference row"));
  }
}
