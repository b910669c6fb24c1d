use crate::results::ProteinQueryRecord;
use eyre::Report;
use std::path::Path;

/// One protein-search query: either the whole input sequence (`is_full_sequence_query`),
/// or an already-extracted feature nucleotide string translated and searched on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProteinQuery {
  pub seq_name: String,
  pub feature_idx: usize,
  pub bases: Vec<u8>,
  pub is_full_sequence_query: bool,
}

/// External protein aligner. Real implementations shell out to a blastx-like tool and
/// parse its `QACC`/`HACC`/`HSP`/... records into `ProteinQueryRecord`s; tests supply a
/// fake that returns canned hits.
pub trait ProteinAligner: Send + Sync {
  fn align(&self, queries: &[ProteinQuery], protein_db_path: &Path) -> Result<Vec<ProteinQueryRecord>, Report>;
}
