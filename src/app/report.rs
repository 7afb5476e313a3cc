use crate::models::{PairOutcome, PairResult, SyncReport};
use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Serialize)]
struct PairReport {
    pair: String,
    status: &'static str,
    rows_added: usize,
    error: Option<String>,
}

#[derive(Serialize)]
struct SummaryReport {
    pairs: usize,
    rows_added: usize,
    failures: usize,
}

#[derive(Serialize)]
struct RunReport {
    summary: SummaryReport,
    pairs: Vec<PairReport>,
}

pub fn write_output(path: &str, format: &str, report: &SyncReport) -> Result<()> {
    match format {
        "json" => write_json(path, report),
        "csv" => write_csv(path, report),
        "none" => Ok(()),
        _ => Err(Error::new("output.format must be none, json, or csv")),
    }
}

fn write_json(path: &str, report: &SyncReport) -> Result<()> {
    ensure_parent_dir(path)?;
    let payload = serde_json::to_string_pretty(&build_report(report))
        .map_err(|err| Error::new(format!("json serialization failed: {err}")))?;
    fs::write(path, payload).map_err(|err| Error::new(format!("write failed: {err}")))?;
    Ok(())
}

fn write_csv(path: &str, report: &SyncReport) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path)
        .map_err(|err| Error::new(format!("csv open failed: {err}")))?;
    for result in &report.pairs {
        writer
            .serialize(to_pair_report(result))
            .map_err(|err| Error::new(format!("csv write failed: {err}")))?;
    }
    writer
        .flush()
        .map_err(|err| Error::new(format!("csv flush failed: {err}")))?;
    Ok(())
}

fn build_report(report: &SyncReport) -> RunReport {
    RunReport {
        summary: SummaryReport {
            pairs: report.pairs.len(),
            rows_added: report.rows_added(),
            failures: report.failures().len(),
        },
        pairs: report.pairs.iter().map(to_pair_report).collect(),
    }
}

fn to_pair_report(result: &PairResult) -> PairReport {
    let (status, rows_added, error) = match &result.outcome {
        PairOutcome::Added(rows) => ("added", *rows, None),
        PairOutcome::UpToDate => ("up_to_date", 0, None),
        PairOutcome::Failed(message) => ("failed", 0, Some(message.clone())),
    };
    PairReport {
        pair: result.pair.clone(),
        status,
        rows_added,
        error,
    }
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let parent = Path::new(path).parent();
    if let Some(parent) = parent {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::new(format!("create dir failed: {err}")))?;
        }
    }
    Ok(())
}
