//! Result tables out: CSV, JSON, Parquet and a plain-text table for the
//! terminal.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use crate::branching::{LevelResult, ObservedLine};

/// One branching-fraction row flattened with its level, as written to CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow<'a> {
    pub level: &'a str,
    pub level_energy: f64,
    pub spectrum: &'a str,
    pub line: i64,
    pub wavenumber: f64,
    pub wavelength: f64,
    pub lower_energy: f64,
    pub lower_j: f64,
    pub lower_config: &'a str,
    pub intensity: f64,
    pub err_signal: f64,
    pub err_calibration: f64,
    pub err_transfer: f64,
    pub err_total: f64,
    pub br_frac_theory: f64,
    pub br_frac: f64,
    pub err_br_frac: f64,
    pub a: Option<f64>,
    pub err_a: Option<f64>,
    pub log_gf: Option<f64>,
    pub err_log_gf: Option<f64>,
    pub linked: bool,
}

pub fn export_rows(results: &[LevelResult]) -> Vec<ExportRow<'_>> {
    results
        .iter()
        .flat_map(|level| {
            level.rows.iter().map(move |r| ExportRow {
                level: &level.name,
                level_energy: level.energy,
                spectrum: &r.spectrum_label,
                line: r.line,
                wavenumber: r.wavenumber,
                wavelength: r.wavelength,
                lower_energy: r.lower_energy,
                lower_j: r.lower_j,
                lower_config: &r.lower_config,
                intensity: r.intensity,
                err_signal: r.signal_error,
                err_calibration: r.calibration_error,
                err_transfer: r.transfer_error,
                err_total: r.total_error,
                br_frac_theory: r.br_frac_theory,
                br_frac: r.br_frac,
                err_br_frac: r.br_frac_error,
                a: r.tr_prob,
                err_a: r.tr_prob_error,
                log_gf: r.log_gf,
                err_log_gf: r.log_gf_error,
                linked: r.linked_to_reference,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Text formats
// ---------------------------------------------------------------------------

pub fn write_csv<W: Write>(results: &[LevelResult], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in export_rows(results) {
        writer.serialize(row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// The "all observations" table of one level.
pub fn write_observed_csv<W: Write>(observed: &[ObservedLine], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for line in observed {
        writer.serialize(line).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

/// Full level results, including summaries and observed lines.
pub fn write_json<W: Write>(results: &[LevelResult], out: W) -> Result<()> {
    serde_json::to_writer_pretty(out, results).context("writing JSON")
}

// ---------------------------------------------------------------------------
// Arrow formats
// ---------------------------------------------------------------------------

fn floats<'a>(rows: &[ExportRow<'a>], f: impl Fn(&ExportRow<'a>) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn optional_floats<'a>(
    rows: &[ExportRow<'a>],
    f: impl Fn(&ExportRow<'a>) -> Option<f64>,
) -> ArrayRef {
    Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn strings<'a>(rows: &[ExportRow<'a>], f: impl Fn(&ExportRow<'a>) -> &'a str) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
}

/// The main columns of every row as one Arrow batch.
pub fn to_record_batch(results: &[LevelResult]) -> Result<RecordBatch> {
    let rows = export_rows(results);

    let schema = Arc::new(Schema::new(vec![
        Field::new("level", DataType::Utf8, false),
        Field::new("spectrum", DataType::Utf8, false),
        Field::new("line", DataType::Int64, false),
        Field::new("wavenumber", DataType::Float64, false),
        Field::new("lower", DataType::Utf8, false),
        Field::new("intensity", DataType::Float64, false),
        Field::new("err_total", DataType::Float64, false),
        Field::new("br_frac", DataType::Float64, false),
        Field::new("err_br_frac", DataType::Float64, false),
        Field::new("a", DataType::Float64, true),
        Field::new("err_a", DataType::Float64, true),
        Field::new("log_gf", DataType::Float64, true),
        Field::new("err_log_gf", DataType::Float64, true),
        Field::new("linked", DataType::Boolean, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        strings(&rows, |r| r.level),
        strings(&rows, |r| r.spectrum),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.line).collect::<Vec<_>>())),
        floats(&rows, |r| r.wavenumber),
        strings(&rows, |r| r.lower_config),
        floats(&rows, |r| r.intensity),
        floats(&rows, |r| r.err_total),
        floats(&rows, |r| r.br_frac),
        floats(&rows, |r| r.err_br_frac),
        optional_floats(&rows, |r| r.a),
        optional_floats(&rows, |r| r.err_a),
        optional_floats(&rows, |r| r.log_gf),
        optional_floats(&rows, |r| r.err_log_gf),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.linked).collect::<Vec<_>>())),
    ];

    RecordBatch::try_new(schema, columns).context("building result batch")
}

/// Render the results as a boxed text table.
pub fn format_table(results: &[LevelResult]) -> Result<String> {
    let batch = to_record_batch(results)?;
    let table = arrow::util::pretty::pretty_format_batches(&[batch]).context("formatting table")?;
    Ok(table.to_string())
}

pub fn write_parquet<W: Write + Send>(results: &[LevelResult], out: W) -> Result<()> {
    let batch = to_record_batch(results)?;
    let mut writer =
        ArrowWriter::try_new(out, batch.schema(), None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use crate::branching::{BranchingFractionRow, LevelSummary};
    use crate::data::model::SpectrumId;

    fn result() -> LevelResult {
        let row = |transition: usize, br_frac: f64, tr_prob: Option<f64>| BranchingFractionRow {
            transition,
            spectrum: SpectrumId(0),
            spectrum_label: "A".into(),
            line: transition as i64 + 1,
            wavenumber: 30000.0 - 1000.0 * transition as f64,
            wavelength: 333.3,
            lower_energy: 10000.0,
            lower_j: 1.5,
            lower_config: "3d7 a4F".into(),
            intensity: 100.0 * br_frac,
            signal_error: 1.0,
            calibration_error: 0.0,
            transfer_error: 0.0,
            total_error: 1.0,
            intensity_error: br_frac,
            br_frac_theory: 0.5,
            br_frac,
            br_frac_error: 1.0,
            tr_prob,
            tr_prob_error: tr_prob.map(|_| 2.0),
            log_gf: tr_prob.map(|_| -1.2),
            log_gf_error: tr_prob.map(|_| 0.01),
            calibrated: false,
            linked_to_reference: true,
        };
        LevelResult {
            level: 0,
            name: "3d6 4p J=2.5 (40000.000)".into(),
            energy: 40000.0,
            rows: vec![row(0, 0.7, Some(7.0e7)), row(1, 0.3, None)],
            summary: LevelSummary::default(),
            observed: Vec::new(),
        }
    }

    #[test]
    fn csv_has_one_record_per_row() {
        let mut out = Vec::new();
        write_csv(&[result()], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("level,level_energy,spectrum,line,"));
        assert_eq!(lines.count(), 2);
        // Missing A values are written as empty fields.
        assert!(text.lines().nth(2).unwrap().contains(",,,,"));
    }

    #[test]
    fn json_keeps_the_level_structure() {
        let mut out = Vec::new();
        write_json(&[result()], &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["rows"].as_array().unwrap().len(), 2);
        assert_eq!(value[0]["rows"][1]["tr_prob"], serde_json::Value::Null);
    }

    #[test]
    fn table_and_parquet_carry_every_row() {
        let batch = to_record_batch(&[result()]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column(9).null_count(), 1);
        let table = format_table(&[result()]).unwrap();
        assert!(table.contains("3d7 a4F"));

        let file = tempfile::tempfile().unwrap();
        write_parquet(&[result()], file.try_clone().unwrap()).unwrap();
        let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }
}
