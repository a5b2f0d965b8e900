use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, AsArray, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::filter::TransitionFilter;
use super::model::{FittedLine, Lifetime, LineRef, PairFlags, Samples, Spectrum, TargetTransition};
use super::response::{Calibration, ErrorRange};
use crate::config::AnalysisConfig;
use crate::state::Project;

/// One spectrum read from a sample file. Multi-record files name their
/// records through a `name` column.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub name: Option<String>,
    pub samples: Samples,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load spectrum samples from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – Parquet file with `x` and `y` list columns
/// * `.json`    – `[{ "x": [...], "y": [...], "name": ... }, ...]`
/// * `.csv`     – columns `x` and `y` containing semicolon-separated floats
/// * `.asc` / `.txt` – two whitespace separated columns, `#` comments
pub fn load_samples(path: &Path) -> Result<Vec<SampleRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let records = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        "asc" | "txt" | "dat" => load_ascii(path).map(|samples| {
            vec![SampleRecord {
                name: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
                samples,
            }]
        }),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading samples from {}", path.display()))?;

    Ok(records.into_iter().map(ascending).collect())
}

/// Load a single curve (response, lamp spectrum, radiance): the record named
/// `record`, or the first one.
pub fn load_curve(path: &Path, record: Option<&str>) -> Result<Samples> {
    let records = load_samples(path)?;
    let found = match record {
        Some(name) => records.into_iter().find(|r| r.name.as_deref() == Some(name)),
        None => records.into_iter().next(),
    };
    match found {
        Some(r) => Ok(r.samples),
        None => bail!(
            "{}: no record {}",
            path.display(),
            record.map_or_else(|| "at all".to_string(), |n| format!("named '{n}'"))
        ),
    }
}

/// Fitted-line CSV with a header row naming the [`FittedLine`] fields.
/// Lines that fail validation are skipped with a warning.
pub fn load_line_list(path: &Path) -> Result<Vec<FittedLine>> {
    let mut reader = csv_reader(path)?;
    let mut lines = Vec::new();
    for (row_no, result) in reader.deserialize::<FittedLine>().enumerate() {
        let line = result.with_context(|| format!("{}: line row {row_no}", path.display()))?;
        match line.validate() {
            Ok(line) => lines.push(line),
            Err(e) => log::warn!("{}: skipping {e}", path.display()),
        }
    }
    log::info!("Loaded {} fitted lines from {}", lines.len(), path.display());
    Ok(lines)
}

/// Reference transitions CSV (`wavenumber, wavelength, log_gf, e_lower,
/// j_lower, config_lower, e_upper, j_upper, config_upper`).
pub fn load_targets(path: &Path) -> Result<Vec<TargetTransition>> {
    let mut reader = csv_reader(path)?;
    reader
        .deserialize::<TargetTransition>()
        .enumerate()
        .map(|(row_no, r)| {
            r.with_context(|| format!("{}: transition row {row_no}", path.display()))
        })
        .collect()
}

/// Radiance uncertainty table (`min, max, err`: nm, nm, percent).
pub fn load_radiance_errors(path: &Path) -> Result<Vec<ErrorRange>> {
    let mut reader = csv_reader(path)?;
    reader
        .deserialize::<ErrorRange>()
        .enumerate()
        .map(|(row_no, r)| r.with_context(|| format!("{}: error row {row_no}", path.display())))
        .collect()
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))
}

/// Interpolation needs an ascending axis; wavenumber files are often stored
/// high to low.
fn ascending(mut record: SampleRecord) -> SampleRecord {
    let s = &mut record.samples;
    if s.x.len() > 1 && s.x[0] > s.x[s.x.len() - 1] {
        s.x.reverse();
        s.y.reverse();
    }
    record
}

// ---------------------------------------------------------------------------
// Project manifest
// ---------------------------------------------------------------------------

/// JSON description of a whole analysis. Relative paths are resolved
/// against the manifest's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub config: AnalysisConfig,
    pub targets: PathBuf,
    #[serde(default)]
    pub min_log_gf: Option<f64>,
    #[serde(default)]
    pub min_br_frac: Option<f64>,
    pub spectra: Vec<SpectrumEntry>,
    /// Label of the reference spectrum; the first spectrum otherwise.
    #[serde(default)]
    pub reference: Option<String>,
    /// Pairs of spectrum labels recorded simultaneously.
    #[serde(default)]
    pub links: Vec<(String, String)>,
    #[serde(default)]
    pub lifetimes: Vec<LifetimeEntry>,
    #[serde(default)]
    pub overrides: Vec<PairOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpectrumEntry {
    pub label: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub samples: Option<PathBuf>,
    /// Record to take from a multi-record sample file.
    #[serde(default)]
    pub record: Option<String>,
    #[serde(default)]
    pub line_lists: Vec<PathBuf>,
    #[serde(default)]
    pub calibration: Option<CalibrationEntry>,
}

/// Either a precomputed `response` curve, or a `standard_lamp` spectrum with
/// the lamp `radiance` and optional `radiance_errors`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalibrationEntry {
    #[serde(default)]
    pub response: Option<PathBuf>,
    #[serde(default)]
    pub standard_lamp: Option<PathBuf>,
    #[serde(default)]
    pub radiance: Option<PathBuf>,
    #[serde(default)]
    pub radiance_errors: Option<PathBuf>,
}

/// Lifetime of the level at `energy` (cm⁻¹), in ns.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LifetimeEntry {
    pub energy: f64,
    pub value: f64,
    #[serde(default)]
    pub error: f64,
}

/// Saved selection state of one fitted line (by running number) within the
/// level at `energy`.
#[derive(Debug, Clone, Deserialize)]
pub struct PairOverride {
    pub energy: f64,
    pub spectrum: String,
    pub line: i64,
    #[serde(default = "default_true")]
    pub selected: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub hidden: bool,
}

fn default_true() -> bool {
    true
}

pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing manifest {}", path.display()))
}

/// Build a [`Project`] from a manifest file.
pub fn load_project(path: &Path) -> Result<Project> {
    let manifest = load_manifest(path)?;
    let base = path.parent().unwrap_or(Path::new("."));
    project_from_manifest(&manifest, base)
}

pub fn project_from_manifest(manifest: &Manifest, base: &Path) -> Result<Project> {
    let resolve = |p: &Path| base.join(p);
    let mut project = Project::new(AnalysisConfig::default());
    project
        .set_config(manifest.config)
        .context("invalid analysis settings")?;

    for entry in &manifest.spectra {
        let spectrum = load_spectrum(entry, &resolve)
            .with_context(|| format!("loading spectrum {}", entry.label))?;
        project.add_spectrum(spectrum);
    }

    let lookup = |project: &Project, label: &str| -> Result<_> {
        project
            .spectrum_by_label(label)
            .map(|s| s.id)
            .with_context(|| format!("no spectrum labelled '{label}'"))
    };
    if let Some(label) = &manifest.reference {
        let id = lookup(&project, label)?;
        project.set_reference(id)?;
    }
    for (a, b) in &manifest.links {
        let (a, b) = (lookup(&project, a)?, lookup(&project, b)?);
        project.link(a, b)?;
    }

    let filter = match (manifest.min_log_gf, manifest.min_br_frac) {
        (Some(_), Some(_)) => bail!("set only one of min_log_gf and min_br_frac"),
        (Some(v), None) => Some(TransitionFilter::MinLogGf(v)),
        (None, Some(v)) => Some(TransitionFilter::MinBranchingFraction(v)),
        (None, None) => None,
    };
    let targets = load_targets(&resolve(&manifest.targets))?;
    project.load_targets(targets, filter);

    for entry in &manifest.lifetimes {
        let level = project
            .find_level(entry.energy)
            .with_context(|| format!("no upper level at {} cm-1", entry.energy))?;
        project.set_lifetime(level, Some(Lifetime::from_ns(entry.value, entry.error)?))?;
    }

    for o in &manifest.overrides {
        let Some(level) = project.find_level(o.energy) else {
            log::warn!("Ignoring selection for missing level {}", o.energy);
            continue;
        };
        let id = lookup(&project, &o.spectrum)?;
        let Some(line) = find_line(project.spectrum(id)?, o.line) else {
            log::warn!("Ignoring selection for missing line {} in spectrum {}", o.line, o.spectrum);
            continue;
        };
        let flags = PairFlags {
            selected: o.selected,
            disabled: o.disabled,
            hidden: o.hidden,
        };
        project.set_line_flags(level, id, line, flags)?;
    }

    log::info!(
        "Loaded project: {} spectra, {} upper levels",
        project.spectra().len(),
        project.levels().len()
    );
    Ok(project)
}

fn find_line(spectrum: &Spectrum, number: i64) -> Option<LineRef> {
    spectrum
        .lines()
        .find(|(_, l)| l.line == number)
        .map(|(r, _)| r)
}

fn load_spectrum(entry: &SpectrumEntry, resolve: &impl Fn(&Path) -> PathBuf) -> Result<Spectrum> {
    let samples = match &entry.samples {
        Some(p) => load_curve(&resolve(p), entry.record.as_deref())?,
        None => Samples::default(),
    };
    let name = entry.name.clone().unwrap_or_else(|| entry.label.clone());
    let mut spectrum = Spectrum::new(entry.label.clone(), name, samples);

    for list in &entry.line_lists {
        let path = resolve(list);
        let lines = load_line_list(&path)?;
        let name = list.file_name().map_or_else(
            || list.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        spectrum.attach_lines(name, lines);
    }

    if let Some(cal) = &entry.calibration {
        spectrum.calibration = Some(load_calibration(cal, resolve)?);
    }
    Ok(spectrum)
}

fn load_calibration(
    entry: &CalibrationEntry,
    resolve: &impl Fn(&Path) -> PathBuf,
) -> Result<Calibration> {
    let radiance_errors = match &entry.radiance_errors {
        Some(p) => load_radiance_errors(&resolve(p))?,
        None => Vec::new(),
    };
    match (&entry.response, &entry.standard_lamp, &entry.radiance) {
        (Some(response), None, None) => {
            let mut cal = Calibration::from_response(load_curve(&resolve(response), None)?);
            cal.radiance_errors = radiance_errors;
            Ok(cal)
        }
        (None, Some(lamp), Some(radiance)) => Ok(Calibration::from_standard_lamp(
            load_curve(&resolve(lamp), None)?,
            load_curve(&resolve(radiance), None)?,
            radiance_errors,
        )),
        _ => bail!("calibration needs either 'response' or both 'standard_lamp' and 'radiance'"),
    }
}

// ---------------------------------------------------------------------------
// ASCII loader
// ---------------------------------------------------------------------------

fn load_ascii(path: &Path) -> Result<Samples> {
    let text = std::fs::read_to_string(path).context("reading ASCII file")?;
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cols = line.split_whitespace();
        let (Some(a), Some(b)) = (cols.next(), cols.next()) else {
            bail!("line {}: expected two columns", line_no + 1);
        };
        let number = |token: &str| {
            token
                .parse::<f64>()
                .with_context(|| format!("line {}: '{token}' is not a number", line_no + 1))
        };
        x.push(number(a)?);
        y.push(number(b)?);
    }
    Ok(Samples::new(x, y)?)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "x": [25000.0, 25000.5, ...], "y": [0.12, 0.14, ...], "name": "Fe-Ne 1" },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<SampleRecord>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut out = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_array_to_f64(obj.get("x"), i, "x")?;
        let y = json_array_to_f64(obj.get("y"), i, "y")?;

        if x.len() != y.len() {
            bail!("Row {i}: x has {} values but y has {}", x.len(), y.len());
        }

        let name = obj.get("name").and_then(|v| v.as_str()).map(str::to_string);
        out.push(SampleRecord {
            name,
            samples: Samples::new(x, y)?,
        });
    }

    Ok(out)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// `x` and `y` columns contain semicolon-separated floats:
///   `"25000.0;25000.5;25001.0"`, `"0.12;0.14;0.11"`
/// An optional `name` column names each record.
fn load_csv(path: &Path) -> Result<Vec<SampleRecord>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let x_idx = headers
        .iter()
        .position(|h| h == "x")
        .context("CSV missing 'x' column")?;
    let y_idx = headers
        .iter()
        .position(|h| h == "y")
        .context("CSV missing 'y' column")?;
    let name_idx = headers.iter().position(|h| h == "name");

    let mut out = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let x = parse_semicolon_floats(record.get(x_idx).unwrap_or(""), row_no, "x")?;
        let y = parse_semicolon_floats(record.get(y_idx).unwrap_or(""), row_no, "y")?;

        if x.len() != y.len() {
            bail!(
                "CSV row {row_no}: x has {} values but y has {}",
                x.len(),
                y.len()
            );
        }

        let name = name_idx
            .and_then(|i| record.get(i))
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        out.push(SampleRecord {
            name,
            samples: Samples::new(x, y)?,
        });
    }

    Ok(out)
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of spectra.
///
/// Expected schema:
/// - `x`: List<Float64> or LargeList<Float64> – wavenumber arrays
/// - `y`: List<Float64> or LargeList<Float64> – intensity arrays
/// - `name`: optional Utf8 record name
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<Vec<SampleRecord>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut out = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'y' column"))?;
        let name_col = schema.index_of("name").ok().map(|i| batch.column(i));

        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        for row in 0..batch.num_rows() {
            let x = extract_f64_list(x_col, row)
                .with_context(|| format!("Row {row}: failed to read 'x'"))?;
            let y = extract_f64_list(y_col, row)
                .with_context(|| format!("Row {row}: failed to read 'y'"))?;

            if x.len() != y.len() {
                bail!("Row {row}: x has {} values but y has {}", x.len(), y.len());
            }

            out.push(SampleRecord {
                name: name_col.and_then(|c| extract_string(c, row)),
                samples: Samples::new(x, y)?,
            });
        }
    }

    Ok(out)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

fn extract_string(col: &Arc<dyn Array>, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    match col.data_type() {
        DataType::Utf8 => Some(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Some(col.as_string::<i64>().value(row).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn ascii_curves_are_made_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lamp.asc");
        fs::write(&path, "# lamp\n30000 3.0\n20000 2.0\n\n10000 1.0\n").unwrap();
        let curve = load_curve(&path, None).unwrap();
        assert_eq!(curve.x, vec![10000.0, 20000.0, 30000.0]);
        assert_eq!(curve.y, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn json_and_csv_records_are_named() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("s.json");
        fs::write(
            &json,
            r#"[{"x": [1, 2], "y": [3, 4], "name": "first"}, {"x": [5], "y": [6]}]"#,
        )
        .unwrap();
        let records = load_samples(&json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name.as_deref(), Some("first"));
        assert_eq!(records[1].name, None);

        let csv = dir.path().join("s.csv");
        fs::write(&csv, "name,x,y\nb,1;2;3,4;5;6\n").unwrap();
        let curve = load_curve(&csv, Some("b")).unwrap();
        assert_eq!(curve.y, vec![4.0, 5.0, 6.0]);
        assert!(load_curve(&csv, Some("missing")).is_err());
    }

    #[test]
    fn mismatched_axes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("bad.json");
        fs::write(&json, r#"[{"x": [1, 2], "y": [3]}]"#).unwrap();
        assert!(load_samples(&json).is_err());
        assert!(load_samples(&dir.path().join("s.xyz")).is_err());
    }

    #[test]
    fn invalid_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.csv");
        fs::write(
            &path,
            "line,wavenumber,peak,width,damping,eq_width,eps_tot,eps_evn,eps_odd,eps_ran,snr,noise,wavelength,tag\n\
             1,30000.0,10.0,120.0,0.1,5.0,0.01,0.0,0.0,0.0,50.0,1.2,333.3,Fe II\n\
             2,-5.0,10.0,120.0,0.1,5.0,0.01,0.0,0.0,0.0,50.0,1.0,,\n\
             3,31000.0,10.0,120.0,0.1,5.0,0.01,0.0,0.0,0.0,50.0,1.0,,*Fake Line*\n\
             4,32000.0,10.0,120.0,0.1,5.0,0.01,0.0,0.0,0.0,0.0,1.0,,\n\
             5,33000.0,10.0,120.0,0.1,NaN,0.01,0.0,0.0,0.0,50.0,1.0,,\n",
        )
        .unwrap();
        let lines = load_line_list(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].wavelength, Some(333.3));
        assert_eq!(lines[0].noise, 1.2);
        assert!(lines[1].is_fake());
        assert_eq!(lines[1].wavelength, None);
    }

    #[test]
    fn targets_and_radiance_errors_parse() {
        let dir = tempfile::tempdir().unwrap();
        let targets = dir.path().join("targets.csv");
        fs::write(
            &targets,
            "wavenumber,wavelength,log_gf,e_lower,j_lower,config_lower,e_upper,j_upper,config_upper\n\
             30000.0,333.3,-1.0,10000.0,1.5,3d7 a4F,40000.0,2.5,3d6 4p z4D\n",
        )
        .unwrap();
        let t = load_targets(&targets).unwrap();
        assert_eq!(t[0].config_upper, "3d6 4p z4D");
        assert_eq!(t[0].br_frac, 0.0);

        let errors = dir.path().join("errors.csv");
        fs::write(&errors, "min,max,err\n250,400,1.5\n400,800,1.0\n").unwrap();
        let e = load_radiance_errors(&errors).unwrap();
        assert_eq!(e.len(), 2);
        assert_eq!(e[1].err, 1.0);
    }
}
