/// Data layer: core types, loading, level grouping, calibration and filtering.
///
/// Architecture:
/// ```text
///  manifest.json ─► samples (.parquet / .json / .csv / .asc)
///        │          line lists (.csv), targets (.csv), calibration curves
///        ▼
///   ┌──────────┐
///   │  loader   │  parse files → Spectrum, FittedLine, TargetTransition
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  levels   │  group targets by upper energy, theoretical BF
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  log(gf) / BF bounds, level completeness
///   └──────────┘
/// ```
///
/// `response` turns a standard lamp and its radiance into the response
/// function each spectrum's intensities are divided by.

pub mod filter;
pub mod levels;
pub mod loader;
pub mod model;
pub mod response;
