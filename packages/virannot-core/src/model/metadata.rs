use crate::error::ConfigError;
use crate::sequence::Strand;
use crate::utils::range::Range;
use eyre::{Report, WrapErr};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureType {
  CodingRegion,
  MaturePeptide,
  Gene,
  Other,
}

impl FeatureType {
  fn from_raw(raw: &str) -> Self {
    match raw.to_ascii_uppercase().as_str() {
      "CDS" | "CODING-REGION" | "CODING_REGION" => Self::CodingRegion,
      "MAT_PEPTIDE" | "MATURE-PEPTIDE" | "MATURE_PEPTIDE" => Self::MaturePeptide,
      "GENE" => Self::Gene,
      _ => Self::Other,
    }
  }
}

/// A contiguous model-coordinate interval belonging to one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
  /// Model-coordinate range, always stored low-to-high (0-based, half-open) regardless of
  /// strand; `strand` records which direction the feature reads.
  pub model_range: Range,
  pub strand: Strand,
  pub map_to_feature_index: usize,
}

impl Segment {
  pub fn len(&self) -> usize {
    self.model_range.len()
  }

  /// Parses one `start..stop:strand` coordinate expression, with positions 1-based inclusive
  /// on the model. `start > stop` implies minus strand.
  fn parse(expr: &str, map_to_feature_index: usize) -> Result<Self, Report> {
    let (coords, strand_str) = expr
      .split_once(':')
      .ok_or_else(|| ConfigError::ModelInfo(format!("segment '{expr}' is missing a ':strand' suffix")))?;
    let (start_str, stop_str) = coords
      .split_once("..")
      .ok_or_else(|| ConfigError::ModelInfo(format!("segment '{expr}' is missing a '..' range")))?;
    let start: usize = start_str
      .trim()
      .parse()
      .wrap_err_with(|| ConfigError::ModelInfo(format!("invalid start position in '{expr}'")))?;
    let stop: usize = stop_str
      .trim()
      .parse()
      .wrap_err_with(|| ConfigError::ModelInfo(format!("invalid stop position in '{expr}'")))?;
    let strand = Strand::from_char(strand_str.trim().chars().next().unwrap_or('?'))
      .ok_or_else(|| ConfigError::ModelInfo(format!("invalid strand in '{expr}'")))?;

    let (lo, hi) = if start <= stop { (start, stop) } else { (stop, start) };
    Ok(Self {
      model_range: Range::from_one_based_inclusive(lo, hi),
      strand,
      map_to_feature_index,
    })
  }
}

/// A named annotated region on a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
  pub index: usize,
  pub feature_type: FeatureType,
  /// 1-based index among features of the same `feature_type` on this model.
  pub type_index: usize,
  pub product: Option<String>,
  pub gene: Option<String>,
  pub segments: Vec<Segment>,
  pub parent_feature_idx: Option<usize>,
  pub source_feature_idx: Option<usize>,
  pub child_feature_indices: Vec<usize>,
}

impl Feature {
  pub fn is_duplicate(&self) -> bool {
    self.source_feature_idx.is_some()
  }

  pub fn total_len(&self) -> usize {
    self.segments.iter().map(Segment::len).sum()
  }

  pub fn strand(&self) -> Option<Strand> {
    self.segments.first().map(|s| s.strand)
  }

  pub fn five_prime_most_segment_idx(&self) -> Option<usize> {
    match self.strand() {
      Some(Strand::Plus) | None => self
        .segments
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.model_range.begin)
        .map(|(i, _)| i),
      Some(Strand::Minus) => self
        .segments
        .iter()
        .enumerate()
        .max_by_key(|(_, s)| s.model_range.end)
        .map(|(i, _)| i),
    }
  }

  pub fn three_prime_most_segment_idx(&self) -> Option<usize> {
    match self.strand() {
      Some(Strand::Plus) | None => self
        .segments
        .iter()
        .enumerate()
        .max_by_key(|(_, s)| s.model_range.end)
        .map(|(i, _)| i),
      Some(Strand::Minus) => self
        .segments
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.model_range.begin)
        .map(|(i, _)| i),
    }
  }
}

/// The parsed description of one reference model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
  pub name: String,
  pub length: usize,
  pub group: Option<String>,
  pub subgroup: Option<String>,
  pub protein_db_path: Option<PathBuf>,
  pub cm_file: Option<PathBuf>,
  pub features: Vec<Feature>,
}

impl Model {
  pub fn feature(&self, idx: usize) -> Option<&Feature> {
    self.features.get(idx)
  }

  pub fn children_of(&self, idx: usize) -> impl Iterator<Item = &Feature> {
    self.features.iter().filter(move |f| f.parent_feature_idx == Some(idx))
  }
}

/// The full library of models, keyed by name, plus their groups/subgroups and feature trees.
/// Parsed once at startup; a validation failure here is a fatal configuration error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelLibrary {
  pub models: BTreeMap<String, Model>,
}

impl ModelLibrary {
  pub fn get(&self, name: &str) -> Option<&Model> {
    self.models.get(name)
  }

  pub fn models_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Model> {
    self.models.values().filter(move |m| m.group.as_deref() == Some(group))
  }

  pub fn models_in_subgroup<'a>(&'a self, subgroup: &'a str) -> impl Iterator<Item = &'a Model> {
    self
      .models
      .values()
      .filter(move |m| m.subgroup.as_deref() == Some(subgroup))
  }

  /// Parses a model-info file: per-line `key=value` assignments scoped to a leading
  /// `MODEL name` or `FEATURE` token.
  pub fn parse(content: &str) -> Result<Self, Report> {
    let mut models = BTreeMap::<String, RawModel>::new();
    let mut current_model: Option<String> = None;

    for (line_no, line) in content.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      let (token, rest) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| ConfigError::ModelInfo(format!("line {}: missing a MODEL/FEATURE token", line_no + 1)))?;
      let kv = parse_key_values(rest)
        .wrap_err_with(|| ConfigError::ModelInfo(format!("line {}: malformed key=value list", line_no + 1)))?;

      match token {
        "MODEL" => {
          let name = kv
            .get("name")
            .cloned()
            .ok_or_else(|| ConfigError::ModelInfo(format!("line {}: MODEL is missing 'name'", line_no + 1)))?;
          let raw = RawModel::from_kv(name.clone(), &kv, line_no)?;
          current_model = Some(name.clone());
          models.insert(name, raw);
        }
        "FEATURE" => {
          let model_name = current_model.clone().ok_or_else(|| {
            ConfigError::ModelInfo(format!("line {}: FEATURE appears before any MODEL", line_no + 1))
          })?;
          let raw_model = models
            .get_mut(&model_name)
            .ok_or_else(|| ConfigError::ModelInfo(format!("line {}: unknown model '{model_name}'", line_no + 1)))?;
          raw_model.raw_features.push(RawFeature::from_kv(&kv, line_no)?);
        }
        other => {
          return Err(
            ConfigError::ModelInfo(format!("line {}: unknown token '{other}'", line_no + 1)).into(),
          )
        }
      }
    }

    let models = models
      .into_iter()
      .map(|(name, raw)| raw.finish().map(|m| (name, m)))
      .collect::<Result<BTreeMap<_, _>, Report>>()?;

    let library = Self { models };
    library.validate()?;
    Ok(library)
  }

  fn validate(&self) -> Result<(), Report> {
    for model in self.models.values() {
      for feature in &model.features {
        if let Some(parent_idx) = feature.parent_feature_idx {
          let parent = model.feature(parent_idx).ok_or_else(|| ConfigError::FeatureInvariant {
            model: model.name.clone(),
            detail: format!("feature {} has unknown parent index {parent_idx}", feature.index),
          })?;
          if feature.feature_type == FeatureType::MaturePeptide && parent.feature_type != FeatureType::CodingRegion {
            return Err(
              ConfigError::FeatureInvariant {
                model: model.name.clone(),
                detail: format!(
                  "mature peptide {}'s parent (feature {parent_idx}) is not a coding region",
                  feature.index
                ),
              }
              .into(),
            );
          }
        }
        if feature.source_feature_idx == Some(feature.index) {
          return Err(
            ConfigError::FeatureInvariant {
              model: model.name.clone(),
              detail: format!("feature {} is marked as its own duplicate source", feature.index),
            }
            .into(),
          );
        }
        let strands: Vec<Strand> = feature.segments.iter().map(|s| s.strand).unique().collect();
        if matches!(feature.feature_type, FeatureType::CodingRegion | FeatureType::MaturePeptide) && strands.len() > 1
        {
          return Err(
            ConfigError::MultiStrandFeature(format!("{} (feature {})", model.name, feature.index)).into(),
          );
        }
      }
      validate_type_index_contiguity(model)?;
    }
    Ok(())
  }
}

fn validate_type_index_contiguity(model: &Model) -> Result<(), Report> {
  let mut by_type: BTreeMap<&'static str, Vec<usize>> = BTreeMap::new();
  for feature in &model.features {
    let key = match feature.feature_type {
      FeatureType::CodingRegion => "coding-region",
      FeatureType::MaturePeptide => "mature-peptide",
      FeatureType::Gene => "gene",
      FeatureType::Other => "other",
    };
    by_type.entry(key).or_default().push(feature.type_index);
  }
  for (feature_type, mut indices) in by_type {
    indices.sort_unstable();
    let expected: Vec<usize> = (1..=indices.len()).collect();
    if indices != expected {
      return Err(
        ConfigError::FeatureInvariant {
          model: model.name.clone(),
          detail: format!("type-index for '{feature_type}' features is not contiguous from 1: {indices:?}"),
        }
        .into(),
      );
    }
  }
  Ok(())
}

fn parse_key_values(rest: &str) -> Result<BTreeMap<String, String>, Report> {
  let mut map = BTreeMap::new();
  let mut chars = rest.chars().peekable();
  while chars.peek().is_some() {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
      chars.next();
    }
    if chars.peek().is_none() {
      break;
    }
    let key: String = std::iter::from_fn(|| chars.next_if(|&c| c != '=')).collect();
    if chars.next() != Some('=') {
      return Err(eyre::eyre!("expected '=' after key '{key}'"));
    }
    if chars.peek() != Some(&'"') {
      return Err(eyre::eyre!("expected opening quote for value of key '{key}'"));
    }
    chars.next();
    let value: String = std::iter::from_fn(|| chars.next_if(|&c| c != '"')).collect();
    if chars.next() != Some('"') {
      return Err(eyre::eyre!("unterminated quoted value for key '{key}'"));
    }
    map.insert(key, value);
  }
  Ok(map)
}

struct RawModel {
  name: String,
  length: usize,
  group: Option<String>,
  subgroup: Option<String>,
  protein_db_path: Option<PathBuf>,
  cm_file: Option<PathBuf>,
  raw_features: Vec<RawFeature>,
}

impl RawModel {
  fn from_kv(name: String, kv: &BTreeMap<String, String>, line_no: usize) -> Result<Self, Report> {
    let length: usize = kv
      .get("length")
      .ok_or_else(|| ConfigError::ModelInfo(format!("line {}: MODEL is missing 'length'", line_no + 1)))?
      .parse()
      .wrap_err_with(|| ConfigError::ModelInfo(format!("line {}: invalid 'length'", line_no + 1)))?;
    Ok(Self {
      name,
      length,
      group: kv.get("group").filter(|s| !s.is_empty()).cloned(),
      subgroup: kv.get("subgroup").filter(|s| !s.is_empty()).cloned(),
      protein_db_path: kv.get("blastdb").filter(|s| !s.is_empty()).map(PathBuf::from),
      cm_file: kv.get("cmfile").filter(|s| !s.is_empty()).map(PathBuf::from),
      raw_features: Vec::new(),
    })
  }

  fn finish(self) -> Result<Model, Report> {
    let mut type_counters: BTreeMap<FeatureType, usize> = BTreeMap::new();
    let mut features = Vec::with_capacity(self.raw_features.len());

    for (index, raw) in self.raw_features.iter().enumerate() {
      let counter = type_counters.entry(raw.feature_type).or_insert(0);
      *counter += 1;
      let segments = parse_coords(&raw.coords, index)?;
      features.push(Feature {
        index,
        feature_type: raw.feature_type,
        type_index: *counter,
        product: raw.product.clone(),
        gene: raw.gene.clone(),
        segments,
        parent_feature_idx: raw.parent_feature_idx,
        source_feature_idx: raw.source_feature_idx,
        child_feature_indices: Vec::new(),
      });
    }

    let parent_links: Vec<(usize, usize)> = features
      .iter()
      .filter_map(|f| f.parent_feature_idx.map(|p| (p, f.index)))
      .collect();
    for (parent_idx, child_idx) in parent_links {
      if let Some(parent) = features.get_mut(parent_idx) {
        parent.child_feature_indices.push(child_idx);
      }
    }

    Ok(Model {
      name: self.name,
      length: self.length,
      group: self.group,
      subgroup: self.subgroup,
      protein_db_path: self.protein_db_path,
      cm_file: self.cm_file,
      features,
    })
  }
}

struct RawFeature {
  feature_type: FeatureType,
  coords: String,
  product: Option<String>,
  gene: Option<String>,
  parent_feature_idx: Option<usize>,
  source_feature_idx: Option<usize>,
}

impl RawFeature {
  fn from_kv(kv: &BTreeMap<String, String>, line_no: usize) -> Result<Self, Report> {
    let feature_type = FeatureType::from_raw(
      kv.get("type")
        .ok_or_else(|| ConfigError::ModelInfo(format!("line {}: FEATURE is missing 'type'", line_no + 1)))?,
    );
    let coords = kv
      .get("coords")
      .ok_or_else(|| ConfigError::ModelInfo(format!("line {}: FEATURE is missing 'coords'", line_no + 1)))?
      .clone();
    let parent_feature_idx = kv
      .get("parent_idx_str")
      .filter(|s| !s.is_empty())
      .map(|s| s.parse())
      .transpose()
      .wrap_err_with(|| ConfigError::ModelInfo(format!("line {}: invalid 'parent_idx_str'", line_no + 1)))?;
    let source_feature_idx = kv
      .get("is_duplicate")
      .filter(|s| !s.is_empty() && s.as_str() != "0")
      .map(|s| s.parse())
      .transpose()
      .wrap_err_with(|| ConfigError::ModelInfo(format!("line {}: invalid 'is_duplicate'", line_no + 1)))?;
    Ok(Self {
      feature_type,
      coords,
      product: kv.get("product").filter(|s| !s.is_empty()).cloned(),
      gene: kv.get("gene").filter(|s| !s.is_empty()).cloned(),
      parent_feature_idx,
      source_feature_idx,
    })
  }
}

fn parse_coords(coords: &str, feature_index: usize) -> Result<Vec<Segment>, Report> {
  coords
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|expr| Segment::parse(expr, feature_index))
    .collect()
}
