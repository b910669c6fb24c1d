use eyre::{Report, WrapErr};
use std::collections::BTreeMap;
use std::path::Path;
use virannot::report::PipelineReport;

/// Writes every run output artifact under `output_dir`, prefixed with `basename`.
pub fn write_artifacts(output_dir: &Path, basename: &str, report: &PipelineReport, command_line: &str) -> Result<(), Report> {
  std::fs::create_dir_all(output_dir).wrap_err_with(|| format!("When creating output directory '{}'", output_dir.display()))?;

  write_file(output_dir, basename, "seq.tab", &render_seq_tab(report)?)?;
  write_file(output_dir, basename, "ftr.tab", &render_ftr_tab(report)?)?;
  write_file(output_dir, basename, "mdl.tab", &render_mdl_tab(report)?)?;
  write_file(output_dir, basename, "ap.sqtable", &report.ap_sqtable)?;
  write_file(output_dir, basename, "af.sqtable", &report.af_sqtable)?;
  write_file(output_dir, basename, "long.sqtable", &report.long_sqtable)?;
  write_file(output_dir, basename, "altlist", &report.altlist)?;
  write_file(output_dir, basename, "ap.seqlist", &report.passing_seqlist.join("\n"))?;
  write_file(output_dir, basename, "af.seqlist", &report.failing_seqlist.join("\n"))?;
  write_file(output_dir, basename, "cmd", command_line)?;
  write_file(
    output_dir,
    basename,
    "log",
    &format!(
      "{} sequences processed; {} passed, {} failed\n",
      report.seq_rows.len(),
      report.passing_seqlist.len(),
      report.failing_seqlist.len()
    ),
  )?;
  Ok(())
}

fn write_file(output_dir: &Path, basename: &str, extension: &str, content: &str) -> Result<(), Report> {
  let path = output_dir.join(format!("{basename}.{extension}"));
  std::fs::write(&path, content).wrap_err_with(|| format!("When writing output artifact '{}'", path.display()))
}

fn render_seq_tab(report: &PipelineReport) -> Result<String, Report> {
  let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
  writer.write_record(["seq-name", "model", "annotated", "truncated", "alerts", "pass-fail"])?;
  for row in &report.seq_rows {
    writer.write_record([
      row.seq_name.as_str(),
      row.model.as_deref().unwrap_or("-"),
      &row.annotated_features.to_string(),
      &row.truncated_features.to_string(),
      &join_alert_codes(&row.alert_codes),
      if row.passed { "PASS" } else { "FAIL" },
    ])?;
  }
  let bytes = writer.into_inner().map_err(|e| eyre::eyre!("{e}"))?;
  String::from_utf8(bytes).wrap_err("When rendering seq.tab as UTF-8")
}

fn render_ftr_tab(report: &PipelineReport) -> Result<String, Report> {
  let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
  writer.write_record(["seq-name", "feature-idx", "type", "product", "coords", "5'-trunc", "3'-trunc", "alerts"])?;
  for row in &report.feature_rows {
    writer.write_record([
      row.seq_name.as_str(),
      &row.feature_idx.to_string(),
      row.reported_type(),
      row.product.as_deref().unwrap_or("-"),
      &row.coords,
      if row.five_truncated { "yes" } else { "no" },
      if row.three_truncated { "yes" } else { "no" },
      &join_alert_codes(&row.alert_codes),
    ])?;
  }
  let bytes = writer.into_inner().map_err(|e| eyre::eyre!("{e}"))?;
  String::from_utf8(bytes).wrap_err("When rendering ftr.tab as UTF-8")
}

fn render_mdl_tab(report: &PipelineReport) -> Result<String, Report> {
  let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
  for row in &report.seq_rows {
    let model = row.model.as_deref().unwrap_or("-");
    let entry = counts.entry(model).or_default();
    entry.0 += 1;
    if row.passed {
      entry.1 += 1;
    }
  }
  let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
  writer.write_record(["model", "num-seqs", "num-pass"])?;
  for (model, (total, passed)) in counts {
    writer.write_record([model, &total.to_string(), &passed.to_string()])?;
  }
  let bytes = writer.into_inner().map_err(|e| eyre::eyre!("{e}"))?;
  String::from_utf8(bytes).wrap_err("When rendering mdl.tab as UTF-8")
}

fn join_alert_codes(codes: &[virannot::alert::AlertCode]) -> String {
  if codes.is_empty() {
    return "-".to_owned();
  }
  codes.iter().map(|c| format!("{c:?}")).collect::<Vec<_>>().join(",")
}
