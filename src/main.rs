use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use rusty_branching::branching::LevelResult;
use rusty_branching::data::loader::load_project;
use rusty_branching::export;

#[derive(Parser)]
#[command(
    name = "rusty-branching",
    version,
    about = "Branching fractions, A-values and log(gf) from calibrated FTS spectra"
)]
struct Cli {
    /// Project manifest (JSON)
    manifest: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Only report the upper level with this index
    #[arg(long)]
    level: Option<usize>,

    /// Override the level / wavenumber matching tolerance (cm-1)
    #[arg(long)]
    precision: Option<f64>,

    /// Divide line S/N by the fit residual before estimating errors
    #[arg(long)]
    correct_snr: bool,

    /// List every observed line of the level instead of the branching fractions
    #[arg(long, requires = "level")]
    observed: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Csv,
    Json,
    Parquet,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut project = load_project(&cli.manifest)?;
    if cli.precision.is_some() || cli.correct_snr {
        let mut config = *project.config();
        if let Some(precision) = cli.precision {
            config.level_precision = precision;
        }
        config.correct_snr |= cli.correct_snr;
        project.set_config(config)?;
    }

    for level in 0..project.levels().len() {
        let missing = project.missing_significant(level)?;
        if !missing.is_empty() {
            log::warn!(
                "Level {}: {} significant branches have no selected line ({:.1}% complete)",
                project.levels()[level].name(),
                missing.len(),
                project.completeness(level)?
            );
        }
    }

    let results: &[LevelResult] = match cli.level {
        Some(i) => std::slice::from_ref(project.level_result(i)?),
        None => project.results(),
    };

    let mut out: Box<dyn Write + Send> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };

    if cli.observed {
        let observed = &results[0].observed;
        match cli.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut out, observed).context("writing JSON")?
            }
            _ => export::write_observed_csv(observed, &mut out)?,
        }
        out.flush()?;
        return Ok(());
    }

    match cli.format {
        Format::Table => {
            writeln!(out, "{}", export::format_table(results)?)?;
            for r in results {
                write_summary(&mut out, r)?;
            }
        }
        Format::Csv => export::write_csv(results, &mut out)?,
        Format::Json => export::write_json(results, &mut out)?,
        Format::Parquet => export::write_parquet(results, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn write_summary(out: &mut impl Write, result: &LevelResult) -> Result<()> {
    let s = &result.summary;
    write!(
        out,
        "{}: {} lines, ΣI = {:.4e} ± {:.2e}, {:.1}% of the theoretical decay observed",
        result.name,
        s.lines_used,
        s.total_intensity,
        s.total_intensity_error,
        100.0 * s.fraction_found
    )?;
    if let (Some(total), Some(missing)) = (s.tr_prob_total, s.missing_percent) {
        write!(out, ", A = {total:.4e} s-1, {missing:.1}% missing")?;
    }
    writeln!(out)?;
    Ok(())
}
