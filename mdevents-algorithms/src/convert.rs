//! Conversion of pre-parsed detector events into an event workspace.
//!
//! A conversion is selected by three tags: the momentum mode, the energy
//! analysis mode and the unit conversion applied to the raw `x` values.
//! [`ConversionRegistry::with_defaults`] maps every supported tag tuple to
//! a [`ConversionStrategy`]; [`convert_to_md`] drives the selected strategy.

use crate::workspace::MdEventWorkspace;
use mdevents_core::{
    apply_rotation, BoxControllerConfig, Error, EventBatch, Extent, Progress, Result,
    WorkspaceDescriptor,
};
use std::collections::HashMap;
use std::fmt;

/// `E[meV] = ENERGY_PER_K2 * k[1/A]^2` for a neutron.
pub const ENERGY_PER_K2: f64 = 2.0721;
/// `k[1/A] = K_PER_VELOCITY * v[m/s]` for a neutron.
pub const K_PER_VELOCITY: f64 = 1.58825e-3;

const MICROSECONDS: f64 = 1e-6;

/// Neutron wave-vector magnitude for an energy in meV.
pub fn k_from_energy(energy: f64) -> f64 {
    (energy / ENERGY_PER_K2).sqrt()
}

/// Neutron energy in meV for a wave-vector magnitude.
pub fn energy_from_k(k: f64) -> f64 {
    ENERGY_PER_K2 * k * k
}

/// Which momentum coordinates the conversion produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QMode {
    /// Raw `x` is copied; no momentum transfer.
    NoQ,
    /// Magnitude of the momentum transfer.
    ModQ,
    /// The three momentum-transfer components in the projection frame.
    Q3D,
}

/// How the energy transfer is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AnalysisMode {
    /// No energy transfer; `|k_i| = |k_f|`.
    Elastic,
    /// Fixed incident energy.
    Direct,
    /// Fixed final energy.
    Indirect,
    /// Any mode; used with [`QMode::NoQ`].
    Any,
}

/// Unit conversion applied to raw `x` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitConversion {
    /// `x` is already a wave vector (elastic) or an energy transfer.
    None,
    /// `x` is a time of flight in microseconds.
    FromTof,
}

/// Key of a registered conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConversionTags {
    /// Momentum mode.
    pub q_mode: QMode,
    /// Energy analysis mode.
    pub analysis: AnalysisMode,
    /// Unit conversion.
    pub units: UnitConversion,
}

impl ConversionTags {
    /// Builds a tag tuple.
    pub fn new(q_mode: QMode, analysis: AnalysisMode, units: UnitConversion) -> Self {
        Self {
            q_mode,
            analysis,
            units,
        }
    }

    /// Whether the conversion produces an energy-transfer dimension.
    pub fn is_inelastic(&self) -> bool {
        matches!(self.analysis, AnalysisMode::Direct | AnalysisMode::Indirect)
    }

    /// Number of dimensions produced before the extra per-run dimensions.
    pub fn base_dims(&self) -> usize {
        let q_dims = match self.q_mode {
            QMode::NoQ | QMode::ModQ => 1,
            QMode::Q3D => 3,
        };
        q_dims + usize::from(self.q_mode != QMode::NoQ && self.is_inelastic())
    }
}

impl fmt::Display for ConversionTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = match self.units {
            UnitConversion::None => "CnvNo",
            UnitConversion::FromTof => "CnvFromTOF",
        };
        write!(f, "{:?}{:?}{units}", self.q_mode, self.analysis)
    }
}

/// One recorded detector event before conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawEvent {
    /// Wave vector, energy transfer or time of flight, per [`UnitConversion`].
    pub x: f64,
    /// Signal.
    pub signal: f32,
    /// Squared error.
    pub error_sq: f32,
}

/// Events of one detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSpectrum {
    /// Unit vector from the sample to the detector, lab frame (beam along +z).
    pub direction: [f64; 3],
    /// Sample-to-detector distance in metres.
    pub l2: f64,
    /// The detector's events.
    pub events: Vec<RawEvent>,
}

/// Everything a conversion reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionInput {
    /// One entry per detector.
    pub spectra: Vec<DetectorSpectrum>,
    /// Moderator-to-sample distance in metres.
    pub l1: f64,
    /// Incident (direct) or final (indirect) energy in meV.
    pub efixed: Option<f64>,
    /// Values of the extra per-run dimensions, appended to every event.
    pub other_values: Vec<f64>,
}

/// Prepared state of one conversion run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPlan {
    /// Target dimensionality.
    pub num_dims: usize,
    /// Target ranges; events outside them are skipped.
    pub extents: Vec<Extent>,
    /// Lab-to-target rotation.
    pub rotation: [f64; 9],
    /// Fixed energy for inelastic modes.
    pub efixed: Option<f64>,
    /// Progress steps, one per spectrum.
    pub n_steps: usize,
}

/// Counts reported by a conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    /// Events inserted into the workspace.
    pub converted: usize,
    /// Events outside the target ranges or kinematically impossible.
    pub skipped: usize,
}

/// A conversion from raw detector events to workspace coordinates.
pub trait ConversionStrategy: Send + Sync {
    /// The tags the strategy implements.
    fn tags(&self) -> ConversionTags;

    /// Checks the input against the descriptor and prepares a run.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when the descriptor has the wrong
    /// number of dimensions or a required input is missing.
    fn setup_conversion(
        &self,
        input: &ConversionInput,
        descriptor: &WorkspaceDescriptor,
    ) -> Result<ConversionPlan> {
        let tags = self.tags();
        let num_dims = tags.base_dims() + input.other_values.len();
        descriptor.check_min_max_consistent(num_dims)?;
        if tags.is_inelastic() && !input.efixed.is_some_and(|e| e > 0.0) {
            return Err(Error::config(format!(
                "{tags} needs a positive fixed energy"
            )));
        }
        if tags.units == UnitConversion::FromTof && input.l1 <= 0.0 {
            return Err(Error::config("time-of-flight conversion needs a positive L1"));
        }
        Ok(ConversionPlan {
            num_dims,
            extents: descriptor.extents()?,
            rotation: descriptor.rotation,
            efixed: input.efixed,
            n_steps: input.spectra.len(),
        })
    }

    /// Writes the coordinates of `event` (before the extra dimensions) into
    /// `coords`. Returns `false` for an event that cannot be converted.
    fn event_coordinates(
        &self,
        plan: &ConversionPlan,
        input: &ConversionInput,
        spectrum: &DetectorSpectrum,
        event: &RawEvent,
        coords: &mut Vec<f64>,
    ) -> bool;

    /// Converts every event and inserts the ones inside the target ranges.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] or an insertion error.
    fn run_conversion(
        &self,
        plan: &ConversionPlan,
        input: &ConversionInput,
        workspace: &mut MdEventWorkspace,
        progress: &Progress,
    ) -> Result<ConversionSummary> {
        let mut summary = ConversionSummary::default();
        let mut coords = Vec::with_capacity(plan.num_dims);
        let mut point = Vec::with_capacity(plan.num_dims);
        for spectrum in &input.spectra {
            let mut batch = EventBatch::with_capacity(plan.num_dims, spectrum.events.len());
            for event in &spectrum.events {
                coords.clear();
                if !self.event_coordinates(plan, input, spectrum, event, &mut coords) {
                    summary.skipped += 1;
                    continue;
                }
                coords.extend_from_slice(&input.other_values);
                if !inside(&plan.extents, &coords) {
                    summary.skipped += 1;
                    continue;
                }
                point.clear();
                point.extend(coords.iter().map(|&c| narrow(c)));
                batch.push_parts(&point, event.signal, event.error_sq)?;
            }
            summary.converted += workspace.add_events(&batch, &Progress::silent())?;
            progress.advance(1)?;
        }
        Ok(summary)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn narrow(value: f64) -> f32 {
    value as f32
}

/// Containment test in the precision events are stored with.
fn inside(extents: &[Extent], coords: &[f64]) -> bool {
    extents
        .iter()
        .zip(coords)
        .all(|(extent, &c)| extent.contains(f64::from(narrow(c))))
}

/// Incident and final wave vectors plus the energy transfer of one event.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Kinematics {
    ki: f64,
    kf: f64,
    energy_transfer: f64,
}

fn kinematics(
    tags: ConversionTags,
    plan: &ConversionPlan,
    input: &ConversionInput,
    spectrum: &DetectorSpectrum,
    x: f64,
) -> Option<Kinematics> {
    let efixed = plan.efixed.unwrap_or(0.0);
    let result = match (tags.analysis, tags.units) {
        (AnalysisMode::Elastic | AnalysisMode::Any, UnitConversion::None) => Kinematics {
            ki: x,
            kf: x,
            energy_transfer: 0.0,
        },
        (AnalysisMode::Elastic | AnalysisMode::Any, UnitConversion::FromTof) => {
            let velocity = (input.l1 + spectrum.l2) / (x * MICROSECONDS);
            let k = K_PER_VELOCITY * velocity;
            Kinematics {
                ki: k,
                kf: k,
                energy_transfer: 0.0,
            }
        }
        (AnalysisMode::Direct, UnitConversion::None) => {
            let final_energy = efixed - x;
            if final_energy <= 0.0 {
                return None;
            }
            Kinematics {
                ki: k_from_energy(efixed),
                kf: k_from_energy(final_energy),
                energy_transfer: x,
            }
        }
        (AnalysisMode::Indirect, UnitConversion::None) => {
            let initial_energy = efixed + x;
            if initial_energy <= 0.0 {
                return None;
            }
            Kinematics {
                ki: k_from_energy(initial_energy),
                kf: k_from_energy(efixed),
                energy_transfer: x,
            }
        }
        (AnalysisMode::Direct, UnitConversion::FromTof) => {
            let ki = k_from_energy(efixed);
            let t_incident = input.l1 / (ki / K_PER_VELOCITY);
            let t_final = x * MICROSECONDS - t_incident;
            if t_final <= 0.0 {
                return None;
            }
            let kf = K_PER_VELOCITY * spectrum.l2 / t_final;
            Kinematics {
                ki,
                kf,
                energy_transfer: efixed - energy_from_k(kf),
            }
        }
        (AnalysisMode::Indirect, UnitConversion::FromTof) => {
            let kf = k_from_energy(efixed);
            let t_final = spectrum.l2 / (kf / K_PER_VELOCITY);
            let t_incident = x * MICROSECONDS - t_final;
            if t_incident <= 0.0 {
                return None;
            }
            let ki = K_PER_VELOCITY * input.l1 / t_incident;
            Kinematics {
                ki,
                kf,
                energy_transfer: energy_from_k(ki) - efixed,
            }
        }
    };
    (result.ki.is_finite() && result.kf.is_finite()).then_some(result)
}

/// Momentum transfer `Q = k_i - k_f` in the lab frame, beam along +z.
fn momentum_transfer(k: &Kinematics, direction: [f64; 3]) -> [f64; 3] {
    [
        -k.kf * direction[0],
        -k.kf * direction[1],
        k.ki - k.kf * direction[2],
    ]
}

/// Copies raw `x` as the first coordinate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQConversion;

impl ConversionStrategy for NoQConversion {
    fn tags(&self) -> ConversionTags {
        ConversionTags::new(QMode::NoQ, AnalysisMode::Any, UnitConversion::None)
    }

    fn event_coordinates(
        &self,
        _plan: &ConversionPlan,
        _input: &ConversionInput,
        _spectrum: &DetectorSpectrum,
        event: &RawEvent,
        coords: &mut Vec<f64>,
    ) -> bool {
        coords.push(event.x);
        true
    }
}

/// `|Q|`, followed by the energy transfer in inelastic modes.
#[derive(Debug, Clone, Copy)]
pub struct ModQConversion {
    analysis: AnalysisMode,
    units: UnitConversion,
}

impl ModQConversion {
    /// Creates the strategy for one analysis and unit mode.
    pub fn new(analysis: AnalysisMode, units: UnitConversion) -> Self {
        Self { analysis, units }
    }
}

impl ConversionStrategy for ModQConversion {
    fn tags(&self) -> ConversionTags {
        ConversionTags::new(QMode::ModQ, self.analysis, self.units)
    }

    fn event_coordinates(
        &self,
        plan: &ConversionPlan,
        input: &ConversionInput,
        spectrum: &DetectorSpectrum,
        event: &RawEvent,
        coords: &mut Vec<f64>,
    ) -> bool {
        let tags = self.tags();
        let Some(k) = kinematics(tags, plan, input, spectrum, event.x) else {
            return false;
        };
        let q = momentum_transfer(&k, spectrum.direction);
        coords.push((q[0] * q[0] + q[1] * q[1] + q[2] * q[2]).sqrt());
        if tags.is_inelastic() {
            coords.push(k.energy_transfer);
        }
        true
    }
}

/// The three components of `Q` rotated into the projection frame, followed
/// by the energy transfer in inelastic modes.
#[derive(Debug, Clone, Copy)]
pub struct Q3DConversion {
    analysis: AnalysisMode,
    units: UnitConversion,
}

impl Q3DConversion {
    /// Creates the strategy for one analysis and unit mode.
    pub fn new(analysis: AnalysisMode, units: UnitConversion) -> Self {
        Self { analysis, units }
    }
}

impl ConversionStrategy for Q3DConversion {
    fn tags(&self) -> ConversionTags {
        ConversionTags::new(QMode::Q3D, self.analysis, self.units)
    }

    fn event_coordinates(
        &self,
        plan: &ConversionPlan,
        input: &ConversionInput,
        spectrum: &DetectorSpectrum,
        event: &RawEvent,
        coords: &mut Vec<f64>,
    ) -> bool {
        let tags = self.tags();
        let Some(k) = kinematics(tags, plan, input, spectrum, event.x) else {
            return false;
        };
        let q = apply_rotation(&plan.rotation, momentum_transfer(&k, spectrum.direction));
        coords.extend_from_slice(&q);
        if tags.is_inelastic() {
            coords.push(k.energy_transfer);
        }
        true
    }
}

/// Runtime map from tags to conversion strategies.
#[derive(Default)]
pub struct ConversionRegistry {
    strategies: HashMap<ConversionTags, Box<dyn ConversionStrategy>>,
}

impl ConversionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in conversion: `NoQ` for any mode
    /// without unit conversion, and `ModQ`/`Q3D` for each analysis mode with
    /// either unit conversion.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NoQConversion));
        for analysis in [AnalysisMode::Elastic, AnalysisMode::Direct, AnalysisMode::Indirect] {
            for units in [UnitConversion::None, UnitConversion::FromTof] {
                registry.register(Box::new(ModQConversion::new(analysis, units)));
                registry.register(Box::new(Q3DConversion::new(analysis, units)));
            }
        }
        registry
    }

    /// Adds or replaces the strategy for its tags.
    pub fn register(&mut self, strategy: Box<dyn ConversionStrategy>) {
        self.strategies.insert(strategy.tags(), strategy);
    }

    /// The strategy for `tags`.
    pub fn get(&self, tags: ConversionTags) -> Option<&dyn ConversionStrategy> {
        self.strategies.get(&tags).map(AsRef::as_ref)
    }

    /// Number of registered strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<String> = self.strategies.keys().map(ToString::to_string).collect();
        ids.sort();
        f.debug_struct("ConversionRegistry").field("strategies", &ids).finish()
    }
}

/// Builds a new event workspace from raw detector events.
///
/// The descriptor's empty dimension ids are filled in, and in `Q3D` mode
/// the momentum dimensions are named after the projection. The root box is
/// split once and then down to the configured minimum depth before any
/// event is inserted.
///
/// # Errors
/// Returns [`Error::Configuration`] for an unregistered tag tuple, a
/// momentum conversion without detector positions, inconsistent ranges or
/// `min_depth > max_depth`; [`Error::Cancelled`] on cancellation.
pub fn convert_to_md(
    registry: &ConversionRegistry,
    tags: ConversionTags,
    input: &ConversionInput,
    mut descriptor: WorkspaceDescriptor,
    config: BoxControllerConfig,
    progress: &Progress,
) -> Result<(MdEventWorkspace, ConversionSummary)> {
    let strategy = registry
        .get(tags)
        .ok_or_else(|| Error::config(format!("no conversion registered for {tags}")))?;
    if descriptor.det_info_lost && tags.q_mode != QMode::NoQ {
        return Err(Error::config(format!(
            "{tags} needs detector positions, which this input has lost"
        )));
    }
    config.validate(descriptor.num_dims())?;
    if !descriptor.is_uv_default && tags.q_mode != QMode::Q3D {
        log::warn!("projection vectors only apply to Q3D conversions; {tags} ignores them");
    }

    descriptor.build_dim_names();
    if tags.q_mode == QMode::Q3D {
        descriptor.name_q3d_dimensions(["Q_h", "Q_k", "Q_l"])?;
    }
    let plan = strategy.setup_conversion(input, &descriptor)?;

    let min_depth = config.min_depth;
    let mut workspace = MdEventWorkspace::new(descriptor, config)?;
    workspace.tree_mut().split_box()?;
    if let Some(depth) = min_depth {
        workspace.tree_mut().set_min_recursion_depth(depth)?;
    }

    let summary = strategy.run_conversion(&plan, input, &mut workspace, progress)?;
    log::info!(
        "{tags}: converted {} events, skipped {}, {} boxes",
        summary.converted,
        summary.skipped,
        workspace.tree().box_count()
    );
    Ok((workspace, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_energy_wavevector_round_trip() {
        let k = k_from_energy(25.0);
        assert_relative_eq!(energy_from_k(k), 25.0, epsilon = 1e-12);
        assert_relative_eq!(k_from_energy(ENERGY_PER_K2), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ConversionRegistry::with_defaults();
        assert_eq!(registry.len(), 13);
        let tags = ConversionTags::new(QMode::ModQ, AnalysisMode::Direct, UnitConversion::FromTof);
        assert_eq!(registry.get(tags).unwrap().tags(), tags);
        let missing = ConversionTags::new(QMode::ModQ, AnalysisMode::Any, UnitConversion::None);
        assert!(registry.get(missing).is_none());
    }

    #[test]
    fn test_base_dims() {
        let t = |q, a| ConversionTags::new(q, a, UnitConversion::None).base_dims();
        assert_eq!(t(QMode::NoQ, AnalysisMode::Any), 1);
        assert_eq!(t(QMode::ModQ, AnalysisMode::Elastic), 1);
        assert_eq!(t(QMode::ModQ, AnalysisMode::Direct), 2);
        assert_eq!(t(QMode::Q3D, AnalysisMode::Indirect), 4);
    }

    #[test]
    fn test_tags_display() {
        let tags = ConversionTags::new(QMode::Q3D, AnalysisMode::Elastic, UnitConversion::FromTof);
        assert_eq!(tags.to_string(), "Q3DElasticCnvFromTOF");
    }

    #[test]
    fn test_elastic_back_scattering() {
        // Straight back-scattering: Q = 2k along the beam.
        let spectrum = DetectorSpectrum {
            direction: [0.0, 0.0, -1.0],
            l2: 1.0,
            events: Vec::new(),
        };
        let input = ConversionInput::default();
        let plan = ConversionPlan {
            num_dims: 1,
            extents: vec![Extent::new(0.0, 10.0).unwrap()],
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            efixed: None,
            n_steps: 1,
        };
        let event = RawEvent {
            x: 1.5,
            signal: 1.0,
            error_sq: 1.0,
        };
        let mut coords = Vec::new();
        let strategy = ModQConversion::new(AnalysisMode::Elastic, UnitConversion::None);
        assert!(strategy.event_coordinates(&plan, &input, &spectrum, &event, &mut coords));
        assert_relative_eq!(coords[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_direct_tof_matches_energy_transfer() {
        // A neutron that keeps its incident energy arrives at the elastic time.
        let efixed = 50.0;
        let (l1, l2) = (10.0, 4.0);
        let velocity = k_from_energy(efixed) / K_PER_VELOCITY;
        let tof_us = (l1 + l2) / velocity / MICROSECONDS;
        let input = ConversionInput {
            l1,
            efixed: Some(efixed),
            ..ConversionInput::default()
        };
        let spectrum = DetectorSpectrum {
            direction: [1.0, 0.0, 0.0],
            l2,
            events: Vec::new(),
        };
        let plan = ConversionPlan {
            num_dims: 2,
            extents: Vec::new(),
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            efixed: Some(efixed),
            n_steps: 1,
        };
        let tags = ConversionTags::new(QMode::ModQ, AnalysisMode::Direct, UnitConversion::FromTof);
        let k = kinematics(tags, &plan, &input, &spectrum, tof_us).unwrap();
        assert_relative_eq!(k.energy_transfer, 0.0, epsilon = 1e-9);
        assert_relative_eq!(k.ki, k.kf, epsilon = 1e-12);

        // Arriving before the incident flight is over is impossible.
        assert!(kinematics(tags, &plan, &input, &spectrum, 1.0).is_none());
    }

    #[test]
    fn test_q3d_uses_descriptor_projection() {
        let mut descriptor = WorkspaceDescriptor::from_ranges(&[-5.0; 3], &[5.0; 3], 4).unwrap();
        descriptor.set_projection([1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]).unwrap();
        let spectrum = DetectorSpectrum {
            direction: [1.0, 0.0, 0.0],
            l2: 1.0,
            events: Vec::new(),
        };
        let plan = ConversionPlan {
            num_dims: 3,
            extents: descriptor.extents().unwrap(),
            rotation: descriptor.rotation,
            efixed: None,
            n_steps: 1,
        };
        let event = RawEvent {
            x: 1.5,
            signal: 1.0,
            error_sq: 1.0,
        };
        let mut coords = Vec::new();
        let strategy = Q3DConversion::new(AnalysisMode::Elastic, UnitConversion::None);
        let input = ConversionInput::default();
        assert!(strategy.event_coordinates(&plan, &input, &spectrum, &event, &mut coords));

        // Q = k (z - x) in the lab, then into the projection frame.
        let expected = descriptor.rotate([-1.5, 0.0, 1.5]);
        assert_eq!(coords.len(), 3);
        for (got, want) in coords.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
        assert!((coords[0] - coords[1]).abs() > 1.0);
    }
}

