use crate::branching::{calculate_level, LevelResult};
use crate::config::AnalysisConfig;
use crate::data::filter::{self, TransitionFilter};
use crate::data::levels::group_upper_levels;
use crate::data::model::{
    FittedLine, Lifetime, LineList, LineListId, LineRef, PairFlags, Spectrum, SpectrumId,
    TargetTransition, UpperLevel,
};
use crate::data::response::Calibration;
use crate::errors::{ProjectError, ProjectResult, ScalingError};
use crate::pairing::{PairingMatrix, TransitionPair};
use crate::scaling::{build_level_scaling, LevelScaling, ScalingFactor, SpectrumLink};

// ---------------------------------------------------------------------------
// Project state
// ---------------------------------------------------------------------------

/// Everything loaded for one analysis, plus the tables derived from it.
///
/// Every mutation ends in [`Project::refresh`], which rebuilds pairing,
/// scaling and branching fractions for all levels, so the derived tables
/// always reflect the current inputs.
#[derive(Debug, Clone, Default)]
pub struct Project {
    config: AnalysisConfig,

    /// Loaded spectra in project order.
    spectra: Vec<Spectrum>,

    /// Spectrum every intensity is scaled onto. `None` until one is loaded.
    reference: Option<SpectrumId>,

    /// Pairs of spectra recorded simultaneously.
    links: Vec<SpectrumLink>,

    /// Reference transitions as loaded, kept to regroup on a precision change.
    targets: Vec<TargetTransition>,
    filter: Option<TransitionFilter>,
    levels: Vec<UpperLevel>,

    next_id: u32,

    // Derived, rebuilt by `refresh`.
    pairing: PairingMatrix,
    scaling: Vec<LevelScaling>,
    results: Vec<LevelResult>,
}

impl Project {
    pub fn new(config: AnalysisConfig) -> Self {
        Project {
            config,
            ..Default::default()
        }
    }

    // -- accessors --

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    pub fn spectrum(&self, id: SpectrumId) -> ProjectResult<&Spectrum> {
        self.spectra
            .iter()
            .find(|s| s.id == id)
            .ok_or(ProjectError::UnknownSpectrum(id))
    }

    pub fn spectrum_by_label(&self, label: &str) -> Option<&Spectrum> {
        self.spectra.iter().find(|s| s.label == label)
    }

    pub fn reference(&self) -> Option<SpectrumId> {
        self.reference
    }

    pub fn links(&self) -> &[SpectrumLink] {
        &self.links
    }

    pub fn levels(&self) -> &[UpperLevel] {
        &self.levels
    }

    pub fn level(&self, level: usize) -> ProjectResult<&UpperLevel> {
        self.levels.get(level).ok_or(ProjectError::UnknownLevel(level))
    }

    /// Index of the level whose energy lies within the level precision.
    pub fn find_level(&self, energy: f64) -> Option<usize> {
        self.levels
            .iter()
            .position(|l| (l.energy() - energy).abs() < self.config.level_precision)
    }

    pub fn pairing(&self) -> &PairingMatrix {
        &self.pairing
    }

    pub fn level_scaling(&self, level: usize) -> ProjectResult<&LevelScaling> {
        self.scaling.get(level).ok_or(ProjectError::UnknownLevel(level))
    }

    pub fn level_result(&self, level: usize) -> ProjectResult<&LevelResult> {
        self.results.get(level).ok_or(ProjectError::UnknownLevel(level))
    }

    pub fn results(&self) -> &[LevelResult] {
        &self.results
    }

    /// Factor taking intensities of spectrum `to` onto the scale of `from`
    /// while `level` is reduced.
    pub fn scaling_factor(
        &self,
        level: usize,
        from: SpectrumId,
        to: SpectrumId,
    ) -> ProjectResult<Result<ScalingFactor, ScalingError>> {
        Ok(self.level_scaling(level)?.table.resolve(from, to))
    }

    /// Percentage of the level's theoretical decay covered by selected lines.
    pub fn completeness(&self, level: usize) -> ProjectResult<f64> {
        let pairing = self.pairing.level(level).ok_or(ProjectError::UnknownLevel(level))?;
        Ok(filter::level_completeness(self.level(level)?, pairing))
    }

    /// Significant branches of a level that no selected line accounts for.
    pub fn missing_significant(&self, level: usize) -> ProjectResult<Vec<usize>> {
        let pairing = self.pairing.level(level).ok_or(ProjectError::UnknownLevel(level))?;
        Ok(filter::missing_significant(
            self.level(level)?,
            pairing,
            self.config.min_significant_bf,
        ))
    }

    // -- configuration --

    /// Replace the analysis settings. A new level precision regroups the
    /// reference transitions.
    pub fn set_config(&mut self, config: AnalysisConfig) -> ProjectResult<()> {
        if !(config.level_precision > 0.0) {
            return Err(ProjectError::InvalidPrecision(config.level_precision));
        }
        let regroup = config.level_precision != self.config.level_precision;
        self.config = config;
        if regroup {
            self.regroup();
        }
        self.refresh();
        Ok(())
    }

    pub fn set_level_precision(&mut self, precision: f64) -> ProjectResult<()> {
        self.set_config(AnalysisConfig {
            level_precision: precision,
            ..self.config
        })
    }

    // -- spectra --

    /// Add a spectrum and return its id. The first spectrum becomes the
    /// reference.
    pub fn add_spectrum(&mut self, mut spectrum: Spectrum) -> SpectrumId {
        let id = SpectrumId(self.next_id);
        self.next_id += 1;
        spectrum.id = id;
        if spectrum.label.is_empty() {
            spectrum.label = default_label(id);
        }
        if self.reference.is_none() {
            self.reference = Some(id);
        }
        spectrum.is_reference = self.reference == Some(id);
        log::info!("Added spectrum {} ({}) as {id}", spectrum.label, spectrum.name);
        self.spectra.push(spectrum);
        self.refresh();
        id
    }

    /// Remove a spectrum with its links and line flags. If it was the
    /// reference, the first remaining spectrum takes over.
    pub fn remove_spectrum(&mut self, id: SpectrumId) -> ProjectResult<Spectrum> {
        let pos = self.position(id)?;
        let spectrum = self.spectra.remove(pos);
        self.links.retain(|l| !l.touches(id));
        for level in &mut self.levels {
            level.flags.retain(|(s, _), _| *s != id);
        }
        if self.reference == Some(id) {
            self.reference = None;
            if let Some(first) = self.spectra.first() {
                let first = first.id;
                self.mark_reference(first);
            }
        }
        log::info!("Removed spectrum {} ({id})", spectrum.label);
        self.refresh();
        Ok(spectrum)
    }

    pub fn set_reference(&mut self, id: SpectrumId) -> ProjectResult<()> {
        self.position(id)?;
        self.mark_reference(id);
        self.refresh();
        Ok(())
    }

    pub fn attach_lines(
        &mut self,
        id: SpectrumId,
        name: impl Into<String>,
        lines: Vec<FittedLine>,
    ) -> ProjectResult<LineListId> {
        let pos = self.position(id)?;
        let list = self.spectra[pos].attach_lines(name, lines);
        self.refresh();
        Ok(list)
    }

    /// Detach a line list. Flags stored for its lines are forgotten.
    pub fn detach_lines(&mut self, id: SpectrumId, list: LineListId) -> ProjectResult<LineList> {
        let pos = self.position(id)?;
        let detached = self.spectra[pos].detach_lines(list)?;
        for level in &mut self.levels {
            level.flags.retain(|(s, line), _| !(*s == id && line.list == list));
        }
        self.refresh();
        Ok(detached)
    }

    pub fn set_calibration(
        &mut self,
        id: SpectrumId,
        calibration: Option<Calibration>,
    ) -> ProjectResult<()> {
        let pos = self.position(id)?;
        self.spectra[pos].calibration = calibration;
        self.refresh();
        Ok(())
    }

    // -- links --

    /// Declare two spectra as recorded simultaneously.
    pub fn link(&mut self, a: SpectrumId, b: SpectrumId) -> ProjectResult<()> {
        if a == b {
            return Err(ProjectError::SelfLink(a));
        }
        self.position(a)?;
        self.position(b)?;
        if !self.links.iter().any(|l| l.joins(a, b)) {
            self.links.push(SpectrumLink { a, b });
            self.refresh();
        }
        Ok(())
    }

    pub fn unlink(&mut self, a: SpectrumId, b: SpectrumId) {
        let before = self.links.len();
        self.links.retain(|l| !l.joins(a, b));
        if self.links.len() != before {
            self.refresh();
        }
    }

    // -- levels --

    /// Replace the reference transitions and regroup them into levels.
    /// Lifetimes and flags of levels that survive the regrouping are kept.
    pub fn load_targets(
        &mut self,
        targets: Vec<TargetTransition>,
        filter: Option<TransitionFilter>,
    ) {
        log::info!("Loaded {} reference transitions", targets.len());
        self.targets = targets;
        self.filter = filter;
        self.regroup();
        self.refresh();
    }

    /// Drop a level and its transitions from the analysis.
    pub fn remove_level(&mut self, level: usize) -> ProjectResult<UpperLevel> {
        if level >= self.levels.len() {
            return Err(ProjectError::UnknownLevel(level));
        }
        let removed = self.levels.remove(level);
        let energy = removed.energy();
        let precision = self.config.level_precision;
        self.targets
            .retain(|t| (t.upper_energy() - energy).abs() >= precision);
        self.refresh();
        Ok(removed)
    }

    pub fn set_lifetime(&mut self, level: usize, lifetime: Option<Lifetime>) -> ProjectResult<()> {
        self.level_mut(level)?.lifetime = lifetime;
        self.refresh();
        Ok(())
    }

    // -- selection --

    pub fn set_pair_selected(
        &mut self,
        level: usize,
        spectrum: SpectrumId,
        transition: usize,
        selected: bool,
    ) -> ProjectResult<()> {
        self.update_flags(level, spectrum, transition, |flags| {
            flags.selected = selected && !flags.disabled;
        })
    }

    /// Disabling a pair also deselects it. Re-enabling leaves it deselected.
    pub fn set_pair_disabled(
        &mut self,
        level: usize,
        spectrum: SpectrumId,
        transition: usize,
        disabled: bool,
    ) -> ProjectResult<()> {
        self.update_flags(level, spectrum, transition, |flags| {
            flags.disabled = disabled;
            if disabled {
                flags.selected = false;
            }
        })
    }

    pub fn set_pair_hidden(
        &mut self,
        level: usize,
        spectrum: SpectrumId,
        transition: usize,
        hidden: bool,
    ) -> ProjectResult<()> {
        self.update_flags(level, spectrum, transition, |flags| flags.hidden = hidden)
    }

    /// Store flags for a line directly, whether or not it is currently
    /// paired. Used when restoring saved selections.
    pub fn set_line_flags(
        &mut self,
        level: usize,
        spectrum: SpectrumId,
        line: LineRef,
        flags: PairFlags,
    ) -> ProjectResult<()> {
        self.position(spectrum)?;
        let flags = PairFlags {
            selected: flags.selected && !flags.disabled,
            ..flags
        };
        self.level_mut(level)?.flags.insert((spectrum, line), flags);
        self.refresh();
        Ok(())
    }

    // -- internals --

    fn position(&self, id: SpectrumId) -> ProjectResult<usize> {
        self.spectra
            .iter()
            .position(|s| s.id == id)
            .ok_or(ProjectError::UnknownSpectrum(id))
    }

    fn level_mut(&mut self, level: usize) -> ProjectResult<&mut UpperLevel> {
        self.levels.get_mut(level).ok_or(ProjectError::UnknownLevel(level))
    }

    fn mark_reference(&mut self, id: SpectrumId) {
        self.reference = Some(id);
        for s in &mut self.spectra {
            s.is_reference = s.id == id;
        }
    }

    fn current_pair(
        &self,
        level: usize,
        spectrum: SpectrumId,
        transition: usize,
    ) -> ProjectResult<&TransitionPair> {
        let upper = self.level(level)?;
        self.position(spectrum)?;
        if transition >= upper.transitions.len() {
            return Err(ProjectError::UnknownTransition { level, transition });
        }
        self.pairing
            .pair(level, spectrum, transition)
            .filter(|p| p.is_matched())
            .ok_or(ProjectError::UnmatchedPair {
                level,
                spectrum,
                transition,
            })
    }

    fn update_flags(
        &mut self,
        level: usize,
        spectrum: SpectrumId,
        transition: usize,
        update: impl FnOnce(&mut PairFlags),
    ) -> ProjectResult<()> {
        let pair = self.current_pair(level, spectrum, transition)?;
        let mut flags = PairFlags {
            selected: pair.selected,
            disabled: pair.disabled,
            hidden: pair.hidden,
        };
        let line_ref = pair
            .line
            .as_ref()
            .map(|m| m.line_ref)
            .ok_or(ProjectError::UnmatchedPair {
                level,
                spectrum,
                transition,
            })?;
        update(&mut flags);
        self.level_mut(level)?.flags.insert((spectrum, line_ref), flags);
        self.refresh();
        Ok(())
    }

    /// Rebuild levels from the stored targets, carrying lifetimes and flags
    /// over to the new level at the same energy.
    fn regroup(&mut self) {
        let precision = self.config.level_precision;
        let mut grouped = group_upper_levels(self.targets.clone(), precision);
        if let Some(f) = self.filter {
            for level in &mut grouped {
                level.transitions.retain(|t| f.accepts(t));
            }
            grouped.retain(|l| !l.transitions.is_empty());
        }

        let previous = std::mem::take(&mut self.levels);
        for level in &mut grouped {
            if let Some(old) = previous
                .iter()
                .find(|o| (o.energy() - level.energy()).abs() < precision)
            {
                level.lifetime = old.lifetime;
                level.flags = old.flags.clone();
            }
        }
        log::debug!("Grouped reference transitions into {} upper levels", grouped.len());
        self.levels = grouped;
    }

    /// Rebuild every derived table: pairing, then scaling, then branching
    /// fractions.
    pub fn refresh(&mut self) {
        self.pairing = PairingMatrix::build(&self.levels, &self.spectra, &self.config);
        let Some(reference) = self.reference else {
            self.scaling.clear();
            self.results.clear();
            return;
        };

        self.scaling = self
            .pairing
            .levels
            .iter()
            .map(|p| build_level_scaling(p, &self.spectra, reference, &self.links, &self.config))
            .collect();
        self.results = self
            .levels
            .iter()
            .zip(&self.pairing.levels)
            .zip(&self.scaling)
            .enumerate()
            .map(|(i, ((level, pairing), scaling))| {
                calculate_level(
                    i,
                    level,
                    pairing,
                    &scaling.table,
                    &self.spectra,
                    reference,
                    &self.config,
                )
            })
            .collect();
        log::debug!(
            "Refreshed {} levels across {} spectra",
            self.levels.len(),
            self.spectra.len()
        );
    }
}

/// "A", "B", ..., "Z", "AA", "AB", ...
fn default_label(id: SpectrumId) -> String {
    let mut n = id.0 as usize;
    let mut label = String::new();
    loop {
        label.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Samples;

    fn line(wavenumber: f64, eq_width: f64) -> FittedLine {
        FittedLine {
            line: 1,
            wavenumber,
            peak: 1.0,
            width: 100.0,
            damping: 0.0,
            eq_width,
            eps_tot: 0.0,
            eps_evn: 0.0,
            eps_odd: 0.0,
            eps_ran: 0.0,
            snr: 100.0,
            noise: 1.0,
            wavelength: None,
            tag: String::new(),
        }
    }

    fn target(wavenumber: f64, e_upper: f64) -> TargetTransition {
        TargetTransition {
            wavenumber,
            wavelength: 1.0e7 / wavenumber,
            log_gf: -1.0,
            e_lower: e_upper - wavenumber,
            j_lower: 1.0,
            config_lower: String::new(),
            e_upper,
            j_upper: 1.0,
            config_upper: String::new(),
            tr_prob: 0.0,
            br_frac: 0.0,
        }
    }

    fn project() -> (Project, SpectrumId, SpectrumId) {
        let mut p = Project::new(AnalysisConfig::default());
        let a = p.add_spectrum(Spectrum::new("", "a", Samples::default()));
        let b = p.add_spectrum(Spectrum::new("", "b", Samples::default()));
        p.attach_lines(a, "a", vec![line(30000.0, 70.0)]).unwrap();
        p.attach_lines(b, "b", vec![line(30000.0, 35.0), line(20000.0, 15.0)]).unwrap();
        p.load_targets(vec![target(30000.0, 40000.0), target(20000.0, 40000.0)], None);
        (p, a, b)
    }

    #[test]
    fn labels_and_reference_default() {
        let (p, a, b) = project();
        assert_eq!(p.spectrum(a).unwrap().label, "A");
        assert_eq!(p.spectrum(b).unwrap().label, "B");
        assert_eq!(p.reference(), Some(a));
        assert!(p.spectrum(a).unwrap().is_reference);
        assert_eq!(default_label(SpectrumId(27)), "AB");
    }

    #[test]
    fn removing_the_reference_promotes_the_next_spectrum() {
        let (mut p, a, b) = project();
        p.link(a, b).unwrap();
        p.remove_spectrum(a).unwrap();
        assert_eq!(p.reference(), Some(b));
        assert!(p.links().is_empty());
        assert_eq!(p.pairing().levels[0].columns.len(), 1);
        // Ids are never reused.
        let c = p.add_spectrum(Spectrum::new("", "c", Samples::default()));
        assert_eq!(c, SpectrumId(2));
    }

    #[test]
    fn self_links_are_rejected() {
        let (mut p, a, _) = project();
        assert_eq!(p.link(a, a), Err(ProjectError::SelfLink(a)));
    }

    #[test]
    fn disabling_deselects_and_survives_refresh() {
        let (mut p, _, b) = project();
        p.set_pair_disabled(0, b, 1, true).unwrap();
        let pair = p.pairing().pair(0, b, 1).unwrap();
        assert!(pair.disabled);
        assert!(!pair.selected);
        p.set_lifetime(0, Some(Lifetime::from_ns(5.0, 0.1).unwrap())).unwrap();
        let pair = p.pairing().pair(0, b, 1).unwrap();
        assert!(pair.disabled && !pair.selected);
        assert!(p.level_result(0).unwrap().row(1).is_none());
    }

    #[test]
    fn unmatched_pairs_cannot_be_toggled() {
        let (mut p, a, _) = project();
        assert_eq!(
            p.set_pair_selected(0, a, 1, false),
            Err(ProjectError::UnmatchedPair {
                level: 0,
                spectrum: a,
                transition: 1
            })
        );
        assert_eq!(
            p.set_pair_selected(0, a, 5, false),
            Err(ProjectError::UnknownTransition { level: 0, transition: 5 })
        );
        assert_eq!(p.set_pair_selected(3, a, 0, false), Err(ProjectError::UnknownLevel(3)));
    }

    #[test]
    fn precision_change_keeps_lifetimes() {
        let (mut p, _, _) = project();
        p.set_lifetime(0, Some(Lifetime::from_ns(5.0, 0.1).unwrap())).unwrap();
        p.set_level_precision(0.05).unwrap();
        assert!(p.level(0).unwrap().lifetime.is_some());
        assert_eq!(p.set_level_precision(0.0), Err(ProjectError::InvalidPrecision(0.0)));
    }

    #[test]
    fn removed_levels_stay_removed() {
        let (mut p, _, _) = project();
        p.remove_level(0).unwrap();
        assert!(p.levels().is_empty());
        p.set_level_precision(0.2).unwrap();
        assert!(p.levels().is_empty());
    }

    #[test]
    fn detaching_a_list_drops_its_pairs() {
        let (mut p, _, b) = project();
        let list = p.spectrum(b).unwrap().line_lists[0].id;
        p.detach_lines(b, list).unwrap();
        // Only the reference's line at 30000 remains paired.
        assert_eq!(p.pairing().levels[0].len(), 1);
    }
}
