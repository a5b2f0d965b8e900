//! Write a small synthetic project: three spectra of a few Fe II-like upper
//! levels, their fitted line lists, a response curve and a manifest.
//!
//! `cargo run --bin generate_sample -- sample_project`
//! `cargo run -- sample_project/manifest.json`

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use serde_json::json;

use rusty_branching::data::model::{FittedLine, TargetTransition, FAKE_LINE_TAG};

#[derive(Parser)]
#[command(about = "Generate a synthetic branching-fraction project")]
struct Args {
    /// Output directory
    #[arg(default_value = "sample_project")]
    dir: PathBuf,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Synthetic atom
// ---------------------------------------------------------------------------

struct Level {
    energy: f64,
    j: f64,
    config: &'static str,
    lifetime_ns: f64,
    /// (lower energy, lower J, lower config, log(gf))
    branches: &'static [(f64, f64, &'static str, f64)],
}

const LEVELS: &[Level] = &[
    Level {
        energy: 38458.98,
        j: 4.5,
        config: "3d6(5D)4p z6D",
        lifetime_ns: 3.7,
        branches: &[
            (0.0, 4.5, "3d6(5D)4s a6D", -1.0),
            (384.79, 3.5, "3d6(5D)4s a6D", -1.6),
            (1872.60, 4.5, "3d7 a4F", -2.8),
        ],
    },
    Level {
        energy: 41968.05,
        j: 3.5,
        config: "3d6(5D)4p z6F",
        lifetime_ns: 3.2,
        branches: &[
            (0.0, 4.5, "3d6(5D)4s a6D", -1.3),
            (667.68, 2.5, "3d6(5D)4s a6D", -0.9),
            (7955.30, 3.5, "3d7 a4D", -2.1),
        ],
    },
    Level {
        energy: 44232.51,
        j: 2.5,
        config: "3d6(5D)4p z4D",
        lifetime_ns: 3.0,
        branches: &[
            (1872.60, 4.5, "3d7 a4F", -0.5),
            (2430.14, 2.5, "3d7 a4F", -1.4),
            (13673.20, 1.5, "3d7 a2P", -3.2),
        ],
    },
];

fn targets() -> Vec<TargetTransition> {
    LEVELS
        .iter()
        .flat_map(|level| {
            level.branches.iter().map(move |&(e_lower, j_lower, config_lower, log_gf)| {
                let wavenumber = level.energy - e_lower;
                TargetTransition {
                    wavenumber,
                    wavelength: 1.0e7 / wavenumber,
                    log_gf,
                    e_lower,
                    j_lower,
                    config_lower: config_lower.to_string(),
                    e_upper: level.energy,
                    j_upper: level.j,
                    config_upper: level.config.to_string(),
                    tr_prob: 0.0,
                    br_frac: 0.0,
                }
            })
        })
        .collect()
}

/// Relative emission of every branch of the target's level.
fn true_fractions(targets: &[TargetTransition]) -> Vec<f64> {
    let a: Vec<f64> = targets
        .iter()
        .map(|t| 10f64.powf(t.log_gf) * t.wavenumber.powi(2) / (2.0 * t.j_upper + 1.0))
        .collect();
    targets
        .iter()
        .zip(&a)
        .map(|(t, &a_t)| {
            let total: f64 = targets
                .iter()
                .zip(&a)
                .filter(|(o, _)| o.e_upper == t.e_upper)
                .map(|(_, &v)| v)
                .sum();
            a_t / total
        })
        .collect()
}

fn response(sigma: f64) -> f64 {
    0.4 + 0.6 * (-((sigma - 36000.0) / 9000.0).powi(2)).exp()
}

// ---------------------------------------------------------------------------
// Spectra
// ---------------------------------------------------------------------------

struct SyntheticSpectrum {
    label: &'static str,
    range: (f64, f64),
    scale: f64,
    calibrated: bool,
}

const SPECTRA: &[SyntheticSpectrum] = &[
    SyntheticSpectrum { label: "A", range: (30000.0, 46000.0), scale: 1.0, calibrated: false },
    SyntheticSpectrum { label: "B", range: (20000.0, 40000.0), scale: 0.6, calibrated: true },
    SyntheticSpectrum { label: "C", range: (30000.0, 46000.0), scale: 2.0, calibrated: false },
];

fn fitted_lines(
    spectrum: &SyntheticSpectrum,
    targets: &[TargetTransition],
    fractions: &[f64],
    rng: &mut SimpleRng,
) -> Vec<FittedLine> {
    let mut lines = Vec::new();
    let mut number = 0;
    let mut push = |wavenumber: f64,
                    eq_width: f64,
                    snr: f64,
                    tag: String,
                    lines: &mut Vec<FittedLine>| {
        number += 1;
        lines.push(FittedLine {
            line: number,
            wavenumber,
            peak: eq_width / 0.15,
            width: 150.0,
            damping: 0.05,
            eq_width,
            eps_tot: 0.01,
            eps_evn: 0.005,
            eps_odd: 0.005,
            eps_ran: 0.008,
            snr,
            noise: 1.1,
            wavelength: Some(1.0e7 / wavenumber),
            tag,
        });
    };

    for (t, &bf) in targets.iter().zip(fractions) {
        if t.wavenumber < spectrum.range.0 || t.wavenumber > spectrum.range.1 {
            continue;
        }
        let snr = 20.0 + 400.0 * bf;
        let gain = if spectrum.calibrated { response(t.wavenumber) } else { 1.0 };
        let eq_width = 1000.0 * bf * spectrum.scale * gain * rng.gauss(1.0, 1.0 / snr);
        let wavenumber = t.wavenumber + rng.gauss(0.0, 0.004);
        push(wavenumber, eq_width, snr, "Fe II".to_string(), &mut lines);
    }
    // An unidentified line and a blend component that must never pair.
    let mid = 0.5 * (spectrum.range.0 + spectrum.range.1);
    push(mid + 0.37, 12.0, 15.0, String::new(), &mut lines);
    push(mid + 1.91, 3.0, 5.0, FAKE_LINE_TAG.to_string(), &mut lines);
    lines.sort_by(|a, b| a.wavenumber.total_cmp(&b.wavenumber));
    lines
}

fn sample_axis(
    lines: &[FittedLine],
    range: (f64, f64),
    rng: &mut SimpleRng,
) -> (Vec<f64>, Vec<f64>) {
    let step = 0.25;
    let n = ((range.1 - range.0) / step) as usize + 1;
    let x: Vec<f64> = (0..n).map(|i| range.0 + i as f64 * step).collect();
    let y = x
        .iter()
        .map(|&wn| {
            let signal: f64 = lines
                .iter()
                .filter(|l| (l.wavenumber - wn).abs() < 2.0)
                .map(|l| gaussian(wn, l.wavenumber, 0.15, l.peak))
                .sum();
            signal + rng.gauss(0.0, 0.5)
        })
        .collect();
    (x, y)
}

fn write_samples(path: &Path, records: &[(&str, Vec<f64>, Vec<f64>)]) -> Result<()> {
    let mut x_builder = ListBuilder::new(Float64Builder::new());
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for (_, x, y) in records {
        x_builder.values().append_slice(x);
        x_builder.append(true);
        y_builder.values().append_slice(y);
        y_builder.append(true);
    }
    let names = StringArray::from(records.iter().map(|(n, _, _)| *n).collect::<Vec<_>>());

    let item = || Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item()), false),
        Field::new("y", DataType::List(item()), false),
        Field::new("name", DataType::Utf8, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(x_builder.finish()),
            Arc::new(y_builder.finish()),
            Arc::new(names),
        ],
    )
    .context("building sample batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing sample batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_csv<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let dir = &args.dir;
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut rng = SimpleRng::new(args.seed);

    let targets = targets();
    let fractions = true_fractions(&targets);
    write_csv(&dir.join("targets.csv"), &targets)?;

    let mut records = Vec::new();
    for spectrum in SPECTRA {
        let lines = fitted_lines(spectrum, &targets, &fractions, &mut rng);
        write_csv(&dir.join(format!("lines_{}.csv", spectrum.label)), &lines)?;
        let (x, y) = sample_axis(&lines, spectrum.range, &mut rng);
        records.push((spectrum.label, x, y));
    }
    write_samples(&dir.join("spectra.parquet"), &records)?;

    let mut curve = File::create(dir.join("response_B.asc")).context("creating response curve")?;
    writeln!(curve, "# wavenumber  response")?;
    for i in 0..=260 {
        let sigma = 20000.0 + 100.0 * i as f64;
        writeln!(curve, "{sigma:.1} {:.6}", response(sigma))?;
    }
    std::fs::write(dir.join("radiance_errors.csv"), "min,max,err\n200,300,2.0\n300,520,1.2\n")
        .context("writing radiance errors")?;

    let manifest = json!({
        "config": { "level_precision": 0.09, "correct_snr": false },
        "targets": "targets.csv",
        "reference": "A",
        "spectra": SPECTRA.iter().map(|s| {
            let mut entry = json!({
                "label": s.label,
                "name": format!("Synthetic Fe-Ne spectrum {}", s.label),
                "samples": "spectra.parquet",
                "record": s.label,
                "line_lists": [format!("lines_{}.csv", s.label)],
            });
            if s.calibrated {
                entry["calibration"] = json!({
                    "response": format!("response_{}.asc", s.label),
                    "radiance_errors": "radiance_errors.csv",
                });
            }
            entry
        }).collect::<Vec<_>>(),
        "links": [["A", "C"]],
        "lifetimes": LEVELS.iter().map(|l| json!({
            "energy": l.energy, "value": l.lifetime_ns, "error": 0.05 * l.lifetime_ns,
        })).collect::<Vec<_>>(),
    });
    let manifest_path = dir.join("manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("writing {}", manifest_path.display()))?;

    println!(
        "Wrote {} spectra and {} reference transitions to {}",
        SPECTRA.len(),
        targets.len(),
        dir.display()
    );
    Ok(())
}
