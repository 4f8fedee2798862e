//! Workflow step ordinals
//!
//! The pipeline runs Upload → Motivations → Copy → Assets → Templates →
//! Matrix → Ready. Steps serialize as their ordinal (0..=6) so the persisted
//! record keeps the `activeStep: int` shape.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One ordinal stage of the brief-to-render pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    #[default]
    Upload,
    Motivations,
    Copy,
    Assets,
    Templates,
    Matrix,
    Ready,
}

impl Step {
    /// All steps in pipeline order
    pub const ALL: [Step; 7] = [
        Step::Upload,
        Step::Motivations,
        Step::Copy,
        Step::Assets,
        Step::Templates,
        Step::Matrix,
        Step::Ready,
    ];

    /// Ordinal position (0..=6)
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Step> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn next(self) -> Option<Step> {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(self) -> Option<Step> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    pub fn is_terminal(self) -> bool {
        self == Step::Ready
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Step::Upload => "Upload",
            Step::Motivations => "Motivations",
            Step::Copy => "Copy",
            Step::Assets => "Assets",
            Step::Templates => "Templates",
            Step::Matrix => "Matrix",
            Step::Ready => "Ready to Render",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.index(), self.label())
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.index())
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let index = u8::deserialize(deserializer)?;
        Step::from_index(index).ok_or_else(|| {
            serde::de::Error::custom(format!("activeStep out of range: {} (expected 0..=6)", index))
        })
    }
}
