use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;
use virannot::{AlignmentConfig, ClassificationThresholds, ProteinConfig};

/// Classify and annotate viral genome sequences against a curated reference model library.
#[derive(Parser, Debug)]
#[command(name = "virannot", author, version, about)]
pub struct Args {
  #[command(subcommand)]
  pub command: Option<Command>,

  #[command(flatten)]
  pub verbose: Verbosity<WarnLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Run the classification and annotation pipeline.
  Run(Box<RunArgs>),

  /// Generate shell completions.
  Completions {
    #[arg(value_enum)]
    shell: Shell,
  },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Shell {
  Bash,
  Zsh,
  Fish,
  Powershell,
}

impl From<Shell> for clap_complete::Shell {
  fn from(shell: Shell) -> Self {
    match shell {
      Shell::Bash => Self::Bash,
      Shell::Zsh => Self::Zsh,
      Shell::Fish => Self::Fish,
      Shell::Powershell => Self::PowerShell,
    }
  }
}

#[derive(Parser, Debug)]
pub struct RunArgs {
  /// Path to the input fasta file of sequences to classify and annotate.
  pub input_fasta: PathBuf,

  /// Output directory. Created if it does not exist.
  pub output_dir: PathBuf,

  /// Remove the output directory first if it already exists.
  #[arg(long)]
  pub force_overwrite: bool,

  /// Path to the combined covariance-model file, overriding the library default.
  #[arg(long)]
  pub model_file: Option<PathBuf>,

  /// Path to the model-info file, overriding the library default.
  #[arg(long)]
  pub model_info: Option<PathBuf>,

  /// Path to the directory of per-model protein BLAST databases, overriding the library default.
  #[arg(long)]
  pub protein_db: Option<PathBuf>,

  /// Require classification into this model group; sequences classified elsewhere are flagged.
  #[arg(long)]
  pub expected_group: Option<String>,

  /// Require classification into this model subgroup (requires `--expected-group`).
  #[arg(long)]
  pub expected_subgroup: Option<String>,

  #[command(flatten)]
  pub classification: ClassificationArgs,

  #[command(flatten)]
  pub alignment: AlignmentArgs,

  #[command(flatten)]
  pub protein: ProteinArgs,

  #[command(flatten)]
  pub parallelism: ParallelismArgs,

  /// Keep intermediate files (batch fastas, raw search/alignment output) in the output directory.
  #[arg(long)]
  pub keep_intermediates: bool,

  /// Skip alignment and reuse a previous run's intermediate outputs from this output directory.
  #[arg(long)]
  pub skip_alignment: bool,
}

#[derive(Parser, Debug)]
pub struct ClassificationArgs {
  /// Minimum fraction of sequence length covered by pass-2 hits before `LowCoverage` fires.
  #[arg(long, default_value_t = ClassificationThresholds::default().low_coverage)]
  pub low_cov: f64,

  /// Minimum bits-per-nucleotide score before `LowScore` fires.
  #[arg(long, default_value_t = ClassificationThresholds::default().low_score)]
  pub low_sc: f64,

  /// Minimum bits-per-nucleotide score before `VeryLowScore` fires.
  #[arg(long, default_value_t = ClassificationThresholds::default().very_low_score)]
  pub very_low_sc: f64,

  /// Minimum fractional score difference between best and second-best model before `LowScoreDifference` fires.
  #[arg(long, default_value_t = ClassificationThresholds::default().low_diff)]
  pub low_diff: f64,

  /// Minimum fractional score difference before `VeryLowScoreDifference` fires.
  #[arg(long, default_value_t = ClassificationThresholds::default().very_low_diff)]
  pub very_low_diff: f64,

  /// Fraction of score attributable to bias before `HighBias` fires.
  #[arg(long, default_value_t = ClassificationThresholds::default().bias_fraction)]
  pub bias_fract: f64,

  /// Fractional score margin required between groups before a group assignment is considered decisive.
  #[arg(long, default_value_t = ClassificationThresholds::default().group_threshold)]
  pub group_threshold: f64,

  /// When set, `--expected-group`/`--expected-subgroup` are only compared against the top-scoring model.
  #[arg(long)]
  pub group_top_only: bool,
}

impl From<&ClassificationArgs> for ClassificationThresholds {
  fn from(args: &ClassificationArgs) -> Self {
    Self {
      low_coverage: args.low_cov,
      low_score: args.low_sc,
      very_low_score: args.very_low_sc,
      low_diff: args.low_diff,
      very_low_diff: args.very_low_diff,
      bias_fraction: args.bias_fract,
      group_threshold: args.group_threshold,
      ..Self::default()
    }
  }
}

#[derive(Parser, Debug)]
pub struct AlignmentArgs {
  /// Minimum posterior probability before a residue is considered low-confidence.
  #[arg(long, default_value_t = AlignmentConfig::default().min_pp)]
  pub min_pp: f64,

  /// Maximum alignment DP matrix size, in megabytes, before the aligner overflows a sequence.
  #[arg(long, default_value_t = AlignmentConfig::default().max_matrix_mb)]
  pub max_matrix_mb: f64,

  /// Initial tail-probability mass trimmed from the alignment band.
  #[arg(long, default_value_t = AlignmentConfig::default().initial_tau)]
  pub initial_tau: f64,

  /// Disable adaptive widening of the alignment band; use `--initial-tau` unmodified.
  #[arg(long)]
  pub fixed_tau: bool,

  /// Restrict the alignment to a sub-region of the model.
  #[arg(long)]
  pub sub_alignment: bool,

  /// Use local (rather than global) alignment mode.
  #[arg(long)]
  pub local_alignment: bool,
}

impl From<&AlignmentArgs> for AlignmentConfig {
  fn from(args: &AlignmentArgs) -> Self {
    Self {
      min_pp: args.min_pp,
      max_matrix_mb: args.max_matrix_mb,
      initial_tau: args.initial_tau,
      fixed_tau: args.fixed_tau,
      sub_alignment: args.sub_alignment,
      local_alignment: args.local_alignment,
    }
  }
}

#[derive(Parser, Debug)]
pub struct ProteinArgs {
  /// Nucleotide tolerance for 5'/3' boundary agreement between nucleotide and protein predictions.
  #[arg(long, default_value_t = ProteinConfig::default().alignment_tolerance_nt)]
  pub alignment_tolerance_nt: usize,

  /// Nucleotide tolerance for indel-driven boundary disagreement.
  #[arg(long, default_value_t = ProteinConfig::default().indel_tolerance_nt)]
  pub indel_tolerance_nt: usize,

  /// Minimum protein score to flag a lone (nucleotide-unconfirmed) protein hit.
  #[arg(long, default_value_t = ProteinConfig::default().lone_hit_min_score)]
  pub lone_hit_min_score: f64,
}

impl From<&ProteinArgs> for ProteinConfig {
  fn from(args: &ProteinArgs) -> Self {
    Self {
      alignment_tolerance_nt: args.alignment_tolerance_nt,
      indel_tolerance_nt: args.indel_tolerance_nt,
      lone_hit_min_score: args.lone_hit_min_score,
    }
  }
}

#[derive(Parser, Debug)]
pub struct ParallelismArgs {
  /// Dispatch search/alignment jobs across multiple chunks concurrently.
  #[arg(long)]
  pub parallelize: bool,

  /// Size, in kilobytes, of each dispatched sequence chunk.
  #[arg(long, default_value_t = 300)]
  pub chunk_kb: usize,

  /// Maximum minutes to wait for a batch of dispatched jobs before failing the run.
  #[arg(long, default_value_t = 500)]
  pub max_wait_minutes: u64,

  /// Maximum number of jobs to have in flight at once.
  #[arg(long, default_value_t = num_cpus::get())]
  pub max_jobs: usize,

  /// Path to a scheduler-info file describing how to submit jobs to a cluster.
  #[arg(long)]
  pub scheduler_info: Option<PathBuf>,

  /// Treat any stderr output from a dispatched job as a job failure.
  #[arg(long)]
  pub treat_stderr_as_failure: bool,
}
