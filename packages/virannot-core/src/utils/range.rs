use serde::{Deserialize, Serialize};
use std::ops::Range as StdRange;

/// A half-open, 0-based coordinate range: `[begin, end)`.
///
/// Every coordinate that enters the pipeline from the outside world (model-info files, fasta
/// headers, search/align tool output) is expressed 1-based inclusive-inclusive. Conversion to
/// this representation happens once at the parse boundary; all internal arithmetic uses
/// half-open ranges exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
  pub begin: usize,
  pub end: usize,
}

impl Range {
  pub const fn new(begin: usize, end: usize) -> Self {
    Self { begin, end }
  }

  /// Construct from 1-based inclusive-inclusive coordinates as used in model-info files and
  /// feature tables.
  pub fn from_one_based_inclusive(start: usize, stop: usize) -> Self {
    Self::new(start - 1, stop)
  }

  pub fn to_one_based_inclusive(self) -> (usize, usize) {
    (self.begin + 1, self.end)
  }

  pub const fn len(&self) -> usize {
    self.end - self.begin
  }

  pub const fn is_empty(&self) -> bool {
    self.begin >= self.end
  }

  pub const fn contains_pos(&self, pos: usize) -> bool {
    pos >= self.begin && pos < self.end
  }
}

impl From<Range> for StdRange<usize> {
  fn from(range: Range) -> Self {
    range.begin..range.end
  }
}
