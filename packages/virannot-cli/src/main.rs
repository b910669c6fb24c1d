mod cli;
mod engines;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Args, Command, RunArgs};
use engines::{CachedAlignEngine, ProcessAlignEngine, ProcessProteinAligner, ProcessSearchEngine};
use eyre::{Report, WrapErr};
use log::info;
use std::path::PathBuf;
use virannot::align::AlignEngine;
use virannot::model::ModelLibrary;
use virannot::{parse_fasta, ParallelismPolicy, Pipeline, PipelineConfig};

fn main() -> Result<(), Report> {
  color_eyre::install()?;
  let args = Args::parse();
  env_logger::Builder::new().filter_level(args.verbose.log_level_filter()).init();

  match args.command {
    Some(Command::Run(run_args)) => run(*run_args),
    Some(Command::Completions { shell }) => {
      generate_completions(shell.into());
      Ok(())
    }
    None => {
      Args::command().print_help()?;
      Ok(())
    }
  }
}

fn generate_completions(shell: clap_complete::Shell) {
  let mut command = Args::command();
  let bin_name = command.get_name().to_owned();
  clap_complete::generate(shell, &mut command, bin_name, &mut std::io::stdout());
}

fn run(run_args: RunArgs) -> Result<(), Report> {
  // `--skip-alignment` reads a previous run's intermediate alignment files back out of this
  // same directory, so it is incompatible with wiping the directory first.
  if run_args.output_dir.exists() && !run_args.skip_alignment {
    if run_args.force_overwrite {
      std::fs::remove_dir_all(&run_args.output_dir).wrap_err("When removing a pre-existing output directory")?;
    } else {
      return Err(eyre::eyre!(
        "Output directory '{}' already exists; pass --force-overwrite to replace it",
        run_args.output_dir.display()
      ));
    }
  }
  std::fs::create_dir_all(&run_args.output_dir).wrap_err("When creating the output directory")?;

  let model_info_path = run_args
    .model_info
    .clone()
    .ok_or_else(|| eyre::eyre!("--model-info is required (no bundled model library is shipped)"))?;
  let model_info = std::fs::read_to_string(&model_info_path)
    .wrap_err_with(|| format!("When reading model-info file '{}'", model_info_path.display()))?;
  let mut library = ModelLibrary::parse(&model_info)?;
  if let Some(protein_db_dir) = &run_args.protein_db {
    for model in library.models.values_mut() {
      model.protein_db_path = Some(protein_db_dir.join(&model.name));
    }
  }

  let fasta_content = std::fs::read_to_string(&run_args.input_fasta)
    .wrap_err_with(|| format!("When reading input fasta '{}'", run_args.input_fasta.display()))?;
  let sequences = parse_fasta(&fasta_content)?;
  info!("loaded {} sequences from '{}'", sequences.len(), run_args.input_fasta.display());

  let config = PipelineConfig {
    classification: (&run_args.classification).into(),
    alignment: (&run_args.alignment).into(),
    protein: (&run_args.protein).into(),
    parallelism: ParallelismPolicy {
      chunk_kb: run_args.parallelism.chunk_kb,
      max_wait: std::time::Duration::from_secs(run_args.parallelism.max_wait_minutes * 60),
      ..ParallelismPolicy::default()
    },
    expected_group: run_args.expected_group.clone(),
    expected_subgroup: run_args.expected_subgroup.clone(),
    low_pp_threshold: run_args.alignment.min_pp,
  };

  let search_executable = which_executable("virannot-search")?;
  let align_executable = which_executable("virannot-align")?;
  let protein_executable = which_executable("virannot-protein-align")?;
  let combined_cm_path = run_args
    .model_file
    .clone()
    .ok_or_else(|| eyre::eyre!("--model-file is required (no bundled combined covariance model is shipped)"))?;

  let search_engine = ProcessSearchEngine::new(search_executable, combined_cm_path);
  let intermediates_dir = run_args.output_dir.join("intermediates");
  let align_engine: Box<dyn AlignEngine> = if run_args.skip_alignment {
    Box::new(CachedAlignEngine::new(intermediates_dir))
  } else {
    let keep_dir = run_args.keep_intermediates.then_some(intermediates_dir);
    Box::new(ProcessAlignEngine::new(align_executable, keep_dir))
  };
  let protein_aligner = ProcessProteinAligner::new(protein_executable);

  let pipeline = Pipeline::new(&search_engine, align_engine.as_ref(), &protein_aligner, config, Default::default())?;
  let (_store, alert_log, report) = pipeline.run(&sequences, &library)?;

  info!("{} alerts recorded across {} sequences", alert_log.all().count(), sequences.len());

  let basename = run_args
    .input_fasta
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("virannot")
    .to_owned();
  let command_line = std::env::args().collect::<Vec<_>>().join(" ");
  output::write_artifacts(&run_args.output_dir, &basename, &report, &command_line)?;

  Ok(())
}

/// Resolves an external collaborator's executable: an explicit `VIRANNOT_<NAME>_EXE`
/// environment variable override, or the bare name resolved against `$PATH`.
fn which_executable(name: &str) -> Result<PathBuf, Report> {
  let env_var = format!("VIRANNOT_{}_EXE", name.replace('-', "_").to_uppercase());
  if let Ok(path) = std::env::var(&env_var) {
    return Ok(PathBuf::from(path));
  }
  Ok(PathBuf::from(name))
}
