//! Ordered, append-only step sequences

use vflow_common::Phase;

use crate::spec::SpecRequirement;
use crate::step::Step;

/// A step together with its human-readable label
pub struct LabeledStep {
    pub label: String,
    pub step: Box<dyn Step>,
}

/// The ordered steps of one phase.
///
/// Steps run in the order they were appended. There is no way to reorder or
/// remove a step once appended.
pub struct StepSequence {
    phase: Phase,
    steps: Vec<LabeledStep>,
}

impl StepSequence {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            steps: Vec::new(),
        }
    }

    pub fn append_step(&mut self, label: impl Into<String>, step: impl Step + 'static) -> &mut Self {
        self.append_boxed(label, Box::new(step))
    }

    pub fn append_boxed(&mut self, label: impl Into<String>, step: Box<dyn Step>) -> &mut Self {
        self.steps.push(LabeledStep {
            label: label.into(),
            step,
        });
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledStep> {
        self.steps.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label.as_str()).collect()
    }

    /// Specs required by any step in the sequence
    pub fn requirements(&self) -> Vec<SpecRequirement> {
        self.steps.iter().flat_map(|s| s.step.requires()).collect()
    }
}

impl std::fmt::Debug for StepSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSequence")
            .field("phase", &self.phase)
            .field("steps", &self.labels())
            .finish()
    }
}
