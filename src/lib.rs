//! Branching fractions and transition probabilities from calibrated
//! emission spectra.
//!
//! Pipeline per upper level:
//! ```text
//!   Project ──► pairing ──► scaling ──► branching ──► export
//!   (spectra,    nearest     intensity    BF, A,
//!    levels)     lines       transfer     log(gf)
//! ```

pub mod branching;
pub mod config;
pub mod data;
pub mod errors;
pub mod export;
pub mod pairing;
pub mod scaling;
pub mod state;

pub use config::AnalysisConfig;
pub use state::Project;
