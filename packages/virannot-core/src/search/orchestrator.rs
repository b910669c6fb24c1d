use crate::error::PipelineError;
use crate::model::ModelLibrary;
use crate::results::{ClassificationRecord, ClassificationResult, HitInterval};
use crate::search::engine::{SearchEngine, SearchHit};
use crate::sequence::Sequence;
use eyre::Report;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Governs when the Orchestrator splits a search into independent chunked jobs instead
/// of a single call, and how long it waits for all chunks to report completion.
#[derive(Debug, Clone, Copy)]
pub struct ParallelismPolicy {
  pub nucleotide_budget: usize,
  pub chunk_kb: usize,
  pub max_wait: Duration,
}

impl Default for ParallelismPolicy {
  fn default() -> Self {
    Self {
      nucleotide_budget: 1_000_000,
      chunk_kb: 300,
      max_wait: Duration::from_secs(500 * 60),
    }
  }
}

fn chunk_sequences(sequences: &[Sequence], chunk_kb: usize) -> Vec<Vec<Sequence>> {
  let chunk_bases = chunk_kb.saturating_mul(1000).max(1);
  let mut chunks = Vec::new();
  let mut current = Vec::new();
  let mut current_len = 0usize;
  for sequence in sequences {
    if !current.is_empty() && current_len + sequence.len() > chunk_bases {
      chunks.push(std::mem::take(&mut current));
      current_len = 0;
    }
    current_len += sequence.len();
    current.push(sequence.clone());
  }
  if !current.is_empty() {
    chunks.push(current);
  }
  chunks
}

/// Drives the two search passes, dispatching chunked jobs in parallel when the input
/// exceeds the configured nucleotide budget, and folding ranked hit tables into
/// classification records.
pub struct SearchOrchestrator<'a> {
  engine: &'a dyn SearchEngine,
  policy: ParallelismPolicy,
}

impl<'a> SearchOrchestrator<'a> {
  pub fn new(engine: &'a dyn SearchEngine, policy: ParallelismPolicy) -> Self {
    Self { engine, policy }
  }

  pub fn run_pass1(&self, sequences: &[Sequence], library: &ModelLibrary) -> Result<Vec<SearchHit>, Report> {
    self.dispatch(sequences, |chunk| self.engine.search_pass1(chunk, library))
  }

  pub fn run_pass2(
    &self,
    sequences: &[Sequence],
    model: &crate::model::Model,
  ) -> Result<Vec<SearchHit>, Report> {
    self.dispatch(sequences, |chunk| self.engine.search_pass2(chunk, model))
  }

  fn dispatch(
    &self,
    sequences: &[Sequence],
    job: impl Fn(&[Sequence]) -> Result<Vec<SearchHit>, Report> + Sync,
  ) -> Result<Vec<SearchHit>, Report> {
    let total_nt: usize = sequences.iter().map(Sequence::len).sum();
    if total_nt <= self.policy.nucleotide_budget {
      return job(sequences);
    }

    let chunks = chunk_sequences(sequences, self.policy.chunk_kb);
    let (tx, rx) = crossbeam_channel::bounded::<(usize, Result<Vec<SearchHit>, Report>)>(chunks.len());

    std::thread::scope(|scope| {
      for (idx, chunk) in chunks.iter().enumerate() {
        let tx = tx.clone();
        let job = &job;
        scope.spawn(move || {
          let result = job(chunk);
          let _ = tx.send((idx, result));
        });
      }
      drop(tx);

      let mut collected: Vec<Option<Vec<SearchHit>>> = vec![None; chunks.len()];
      let deadline = Instant::now() + self.policy.max_wait;
      while collected.iter().any(Option::is_none) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
          break;
        }
        match rx.recv_timeout(remaining) {
          Ok((idx, Ok(hits))) => collected[idx] = Some(hits),
          Ok((idx, Err(report))) => return Err(report.wrap_err(format!("chunk {idx} submission failed"))),
          Err(_) => break,
        }
      }

      let unfinished: Vec<String> = collected
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_none())
        .map(|(i, _)| format!("chunk-{i}"))
        .collect();
      if !unfinished.is_empty() {
        return Err(
          PipelineError::WallClockExceeded {
            budget_minutes: self.policy.max_wait.as_secs() / 60,
            unfinished,
          }
          .into(),
        );
      }

      Ok(collected.into_iter().flatten().flatten().collect())
    })
  }
}

fn cmp_score_desc_bias_asc(a: &SearchHit, b: &SearchHit) -> std::cmp::Ordering {
  b.score
    .total_cmp(&a.score)
    .then_with(|| a.bias.total_cmp(&b.bias))
}

fn to_interval(hit: &SearchHit) -> HitInterval {
  HitInterval {
    model_from: hit.model_from,
    model_to: hit.model_to,
    seq_from: hit.seq_from,
    seq_to: hit.seq_to,
    strand: hit.strand,
    bias: hit.bias,
    score: hit.score,
    e_value: hit.e_value,
  }
}

/// Scans hits for one sequence (already sorted score-descending) and accumulates every
/// hit against the first-seen model into a record, skipping any hit whose model is
/// `exclude_model` or fails `eligible`.
fn accumulate_record<'h>(
  hits: impl Iterator<Item = &'h SearchHit>,
  exclude_model: Option<&str>,
  eligible: impl Fn(&SearchHit) -> bool,
) -> Option<ClassificationRecord> {
  let mut top_model: Option<&str> = None;
  let mut record: Option<ClassificationRecord> = None;
  for hit in hits {
    if Some(hit.model_name.as_str()) == exclude_model || !eligible(hit) {
      continue;
    }
    match top_model {
      None => {
        top_model = Some(hit.model_name.as_str());
        record = Some(ClassificationRecord::new(hit.model_name.clone()));
      }
      Some(m) if m != hit.model_name => continue,
      _ => {}
    }
    if let Some(rec) = record.as_mut() {
      rec.bias += hit.bias;
      rec.summed_score += hit.score;
      rec.hits.push(to_interval(hit));
    }
  }
  record
}

fn finalize_coverage(record: &mut ClassificationRecord, seq_len: usize) {
  if seq_len == 0 {
    return;
  }
  let covered: usize = record.hits.iter().map(hit_interval_len).sum();
  record.coverage = covered as f64 / seq_len as f64;
}

fn hit_interval_len(interval: &HitInterval) -> usize {
  interval.seq_to.abs_diff(interval.seq_from) + 1
}

/// Pass-1 classification: sorts hits by (sequence ascending, score descending, bias
/// ascending) and folds each sequence's stream into the five classification keys.
pub fn classify_pass1(
  mut hits: Vec<SearchHit>,
  sequence_lengths: &BTreeMap<String, usize>,
  library: &ModelLibrary,
  expected_group: Option<&str>,
  expected_subgroup: Option<&str>,
) -> BTreeMap<String, ClassificationResult> {
  hits.sort_by(|a, b| a.seq_name.cmp(&b.seq_name).then_with(|| cmp_score_desc_bias_asc(a, b)));

  let mut results = BTreeMap::new();
  let mut start = 0;
  while start < hits.len() {
    let seq_name = hits[start].seq_name.clone();
    let mut end = start;
    while end < hits.len() && hits[end].seq_name == seq_name {
      end += 1;
    }
    let group = &hits[start..end];
    let seq_len = sequence_lengths.get(&seq_name).copied().unwrap_or(0);

    let mut result = ClassificationResult::default();
    if let Some(mut best) = accumulate_record(group.iter(), None, |_| true) {
      finalize_coverage(&mut best, seq_len);
      let best_model = best.model.clone();
      result.best_overall_pass1 = Some(best);

      if let Some(mut second) = accumulate_record(group.iter(), Some(&best_model), |_| true) {
        finalize_coverage(&mut second, seq_len);
        result.second_best_different_model_pass1 = Some(second);
      }
    }

    if let Some(group_name) = expected_group {
      if let Some(mut rec) = accumulate_record(group.iter(), None, |hit| {
        library.get(&hit.model_name).and_then(|m| m.group.as_deref()) == Some(group_name)
      }) {
        finalize_coverage(&mut rec, seq_len);
        result.best_in_expected_group_pass1 = Some(rec);
      }
    }
    if let Some(subgroup_name) = expected_subgroup {
      if let Some(mut rec) = accumulate_record(group.iter(), None, |hit| {
        library.get(&hit.model_name).and_then(|m| m.subgroup.as_deref()) == Some(subgroup_name)
      }) {
        finalize_coverage(&mut rec, seq_len);
        result.best_in_expected_subgroup_pass1 = Some(rec);
      }
    }

    results.insert(seq_name, result);
    start = end;
  }
  results
}

fn cmp_score_desc_evalue_asc(a: &SearchHit, b: &SearchHit) -> std::cmp::Ordering {
  b.score.total_cmp(&a.score).then_with(|| {
    let ea = a.e_value.unwrap_or(f64::INFINITY);
    let eb = b.e_value.unwrap_or(f64::INFINITY);
    ea.total_cmp(&eb)
  })
}

/// Pass-2 refinement: sorts hits by (sequence ascending, score descending, E-value
/// ascending) and folds each sequence's single-model record. A sequence with hits to
/// more than one model in pass 2 is a fatal error.
pub fn classify_pass2(
  mut hits: Vec<SearchHit>,
  sequence_lengths: &BTreeMap<String, usize>,
) -> Result<BTreeMap<String, ClassificationRecord>, Report> {
  hits.sort_by(|a, b| a.seq_name.cmp(&b.seq_name).then_with(|| cmp_score_desc_evalue_asc(a, b)));

  let mut results = BTreeMap::new();
  let mut start = 0;
  while start < hits.len() {
    let seq_name = hits[start].seq_name.clone();
    let mut end = start;
    while end < hits.len() && hits[end].seq_name == seq_name {
      end += 1;
    }
    let group = &hits[start..end];
    let distinct_models = group.iter().map(|h| h.model_name.as_str()).collect::<std::collections::BTreeSet<_>>();
    if distinct_models.len() > 1 {
      return Err(PipelineError::MultipleModelsInPass2(seq_name).into());
    }

    let seq_len = sequence_lengths.get(&seq_name).copied().unwrap_or(0);
    if let Some(mut record) = accumulate_record(group.iter(), None, |_| true) {
      finalize_coverage(&mut record, seq_len);
      results.insert(seq_name.clone(), record);
    }
    start = end;
  }
  Ok(results)
}

#[cfg(test)]
mod orchestrator_tests {
  use super::*;
  use crate::sequence::Strand;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn hit(seq: &str, model: &str, score: f64, bias: f64) -> SearchHit {
    SearchHit {
      seq_name: seq.to_owned(),
      model_name: model.to_owned(),
      model_from: 1,
      model_to: 100,
      seq_from: 1,
      seq_to: 100,
      strand: Strand::Plus,
      bias,
      score,
      e_value: None,
    }
  }

  #[rstest]
  fn pass1_accumulates_only_the_top_models_hits() {
    let hits = vec![
      hit("s1", "M1", 100.0, 0.0),
      hit("s1", "M1", 50.0, 0.0),
      hit("s1", "M2", 90.0, 0.0),
    ];
    let lengths = BTreeMap::from([("s1".to_owned(), 200)]);
    let library = ModelLibrary::default();
    let results = classify_pass1(hits, &lengths, &library, None, None);
    let record = results.get("s1").unwrap();
    let best = record.best_overall_pass1.as_ref().unwrap();
    assert_eq!(best.model, "M1");
    assert_eq!(best.hits.len(), 2);
    let second = record.second_best_different_model_pass1.as_ref().unwrap();
    assert_eq!(second.model, "M2");
  }

  #[rstest]
  fn pass2_rejects_multiple_models_for_one_sequence() {
    let hits = vec![hit("s1", "M1", 100.0, 0.0), hit("s1", "M2", 90.0, 0.0)];
    let lengths = BTreeMap::from([("s1".to_owned(), 200)]);
    let err = classify_pass2(hits, &lengths).unwrap_err();
    assert!(format!("{err:#}").contains("more than one model"));
  }

  #[rstest]
  fn pass2_sorts_by_score_then_evalue() {
    let mut a = hit("s1", "M1", 100.0, 0.0);
    a.e_value = Some(0.01);
    let mut b = hit("s1", "M1", 100.0, 0.0);
    b.e_value = Some(0.001);
    let lengths = BTreeMap::from([("s1".to_owned(), 200)]);
    let results = classify_pass2(vec![a, b], &lengths).unwrap();
    let record = results.get("s1").unwrap();
    assert_eq!(record.hits.len(), 2);
    assert_eq!(record.hits[0].e_value, Some(0.001));
  }

  struct FakeEngine;
  impl SearchEngine for FakeEngine {
    fn search_pass1(&self, sequences: &[Sequence], _library: &ModelLibrary) -> Result<Vec<SearchHit>, Report> {
      Ok(sequences.iter().map(|s| hit(&s.name, "M1", 10.0, 0.0)).collect())
    }
    fn search_pass2(&self, sequences: &[Sequence], model: &crate::model::Model) -> Result<Vec<SearchHit>, Report> {
      Ok(sequences.iter().map(|s| hit(&s.name, &model.name, 10.0, 0.0)).collect())
    }
  }

  #[rstest]
  fn dispatch_runs_single_job_under_budget() -> Result<(), Report> {
    let engine = FakeEngine;
    let orchestrator = SearchOrchestrator::new(&engine, ParallelismPolicy::default());
    let sequences = vec![Sequence::new("s1", b"ACGT".to_vec())];
    let library = ModelLibrary::default();
    let hits = orchestrator.run_pass1(&sequences, &library)?;
    assert_eq!(hits.len(), 1);
    Ok(())
  }
}
