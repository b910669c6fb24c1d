use crate::error::ConfigError;
use eyre::Report;
use serde::{Deserialize, Serialize};

/// An input nucleotide sequence, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
  pub name: String,
  pub bases: Vec<u8>,
}

impl Sequence {
  pub fn new(name: impl Into<String>, bases: impl Into<Vec<u8>>) -> Self {
    Self {
      name: name.into(),
      bases: bases.into(),
    }
  }

  pub fn len(&self) -> usize {
    self.bases.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bases.is_empty()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strand {
  Plus,
  Minus,
}

impl Strand {
  pub const fn as_char(self) -> char {
    match self {
      Self::Plus => '+',
      Self::Minus => '-',
    }
  }

  pub fn from_char(c: char) -> Option<Self> {
    match c {
      '+' => Some(Self::Plus),
      '-' => Some(Self::Minus),
      _ => None,
    }
  }
}

impl std::fmt::Display for Strand {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_char())
  }
}

/// Reverse-complement a nucleotide byte string. Non-ACGT/acgt bytes (e.g. `N`) map to
/// themselves reversed but not complemented, matching common pairwise-alignment tool
/// conventions for ambiguity codes: any base not recognized is passed through unchanged.
pub fn reverse_complement(bases: &[u8]) -> Vec<u8> {
  bases.iter().rev().map(|&b| complement_base(b)).collect()
}

/// Parses a fasta file's content into `Sequence`s, validating each name against the
/// reserved-character rule (':' and '/' are used in feature-query naming).
pub fn parse_fasta(content: &str) -> Result<Vec<Sequence>, Report> {
  let mut sequences = Vec::new();
  let mut current_name: Option<String> = None;
  let mut current_bases = Vec::new();

  for line in content.lines() {
    let line = line.trim_end_matches('\r');
    if let Some(header) = line.strip_prefix('>') {
      if let Some(name) = current_name.take() {
        sequences.push(Sequence::new(name, std::mem::take(&mut current_bases)));
      }
      let name = header.split_whitespace().next().unwrap_or_default().to_owned();
      validate_sequence_name(&name)?;
      current_name = Some(name);
    } else if !line.is_empty() {
      if current_name.is_none() {
        return Err(ConfigError::Fasta("sequence data found before any '>' header".to_owned()).into());
      }
      current_bases.extend(line.bytes().filter(|b| !b.is_ascii_whitespace()));
    }
  }
  if let Some(name) = current_name {
    sequences.push(Sequence::new(name, current_bases));
  }
  Ok(sequences)
}

/// Renders sequences back to fasta text, wrapping at 70 columns as most fasta writers do.
pub fn write_fasta(sequences: &[Sequence]) -> String {
  let mut out = String::new();
  for sequence in sequences {
    out.push('>');
    out.push_str(&sequence.name);
    out.push('\n');
    for chunk in sequence.bases.chunks(70) {
      out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
      out.push('\n');
    }
  }
  out
}

/// Rejects sequence names containing characters reserved for feature-query naming:
/// ':' and '/'.
pub fn validate_sequence_name(name: &str) -> Result<(), Report> {
  if name.contains(':') || name.contains('/') {
    return Err(ConfigError::ReservedNameCharacter(name.to_owned()).into());
  }
  Ok(())
}

fn complement_base(b: u8) -> u8 {
  match b {
    b'A' => b'T',
    b'C' => b'G',
    b'G' => b'C',
    b'T' => b'A',
    b'a' => b't',
    b'c' => b'g',
    b'g' => b'c',
    b't' => b'a',
    other => other,
  }
}
