//! Persisted workflow record
//!
//! `WorkflowState` is the single JSON record kept per session. Field names
//! serialize in camelCase so the record keeps the shape the web client
//! already stores.

use super::step::Step;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Current schema version of the persisted record
pub const SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Payloads
// =============================================================================

/// Descriptor of an uploaded brief file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }
}

/// Parsed brief returned by the brief parser
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefData {
    #[serde(default)]
    pub objective: String,

    #[serde(default)]
    pub target_audience: String,

    #[serde(default)]
    pub key_messages: Vec<String>,

    /// Any additional fields the parser returns
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Generated motivation candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motivation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub body: String,
}

/// Generated copy candidate, keyed to one motivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyVariation {
    pub id: String,
    pub motivation_id: String,
    pub text: String,
}

/// Asset or template candidate offered for selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
}

/// One combination of copy × asset × template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCell {
    pub copy_id: String,
    pub asset_id: String,
    pub template_id: String,
}

/// Structured combination assembled at the matrix step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMatrix {
    #[serde(default)]
    pub cells: Vec<MatrixCell>,
}

/// Which user selection a set of ids belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionKind {
    Motivations,
    Assets,
    Templates,
}

impl SelectionKind {
    /// Step at which the selection is made
    pub fn step(self) -> Step {
        match self {
            SelectionKind::Motivations => Step::Motivations,
            SelectionKind::Assets => Step::Assets,
            SelectionKind::Templates => Step::Templates,
        }
    }
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionKind::Motivations => "motivations",
            SelectionKind::Assets => "assets",
            SelectionKind::Templates => "templates",
        };
        f.write_str(name)
    }
}

/// Ids removed from a selection because they no longer exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedSelection {
    pub kind: SelectionKind,
    pub removed: Vec<String>,
}

// =============================================================================
// WorkflowState
// =============================================================================

/// Versioned progress record for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    /// Schema version tag
    pub version: u32,

    pub active_step: Step,

    /// Incremented only by an explicit start-over
    #[serde(default)]
    pub reset_epoch: u32,

    #[serde(default)]
    pub brief_confirmed: bool,

    #[serde(default)]
    pub brief_data: Option<BriefData>,

    #[serde(default)]
    pub uploaded_files: Vec<FileDescriptor>,

    #[serde(default)]
    pub motivations: Vec<Motivation>,

    #[serde(default)]
    pub selected_motivation_ids: BTreeSet<String>,

    #[serde(default)]
    pub copy_variations: Vec<CopyVariation>,

    #[serde(default)]
    pub asset_candidates: Vec<Candidate>,

    #[serde(default)]
    pub selected_asset_ids: BTreeSet<String>,

    #[serde(default)]
    pub template_candidates: Vec<Candidate>,

    #[serde(default)]
    pub selected_template_ids: BTreeSet<String>,

    #[serde(default)]
    pub content_matrix: Option<ContentMatrix>,

    /// Timestamp of the last mutation
    pub updated_at: DateTime<Utc>,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::fresh(0)
    }
}

impl WorkflowState {
    /// Step-0 state with every optional field empty
    pub fn fresh(reset_epoch: u32) -> Self {
        Self {
            version: SCHEMA_VERSION,
            active_step: Step::Upload,
            reset_epoch,
            brief_confirmed: false,
            brief_data: None,
            uploaded_files: Vec::new(),
            motivations: Vec::new(),
            selected_motivation_ids: BTreeSet::new(),
            copy_variations: Vec::new(),
            asset_candidates: Vec::new(),
            selected_asset_ids: BTreeSet::new(),
            template_candidates: Vec::new(),
            selected_template_ids: BTreeSet::new(),
            content_matrix: None,
            updated_at: Utc::now(),
        }
    }

    /// Stamp the record as mutated now
    pub fn touch(&mut self) {
        let now = Utc::now();
        // Keep updatedAt strictly increasing so conflict checks never tie
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + chrono::Duration::microseconds(1)
        };
    }

    /// Ids available for a given selection
    pub fn available_ids(&self, kind: SelectionKind) -> BTreeSet<&str> {
        match kind {
            SelectionKind::Motivations => self.motivations.iter().map(|m| m.id.as_str()).collect(),
            SelectionKind::Assets => self.asset_candidates.iter().map(|c| c.id.as_str()).collect(),
            SelectionKind::Templates => {
                self.template_candidates.iter().map(|c| c.id.as_str()).collect()
            }
        }
    }

    pub fn selection(&self, kind: SelectionKind) -> &BTreeSet<String> {
        match kind {
            SelectionKind::Motivations => &self.selected_motivation_ids,
            SelectionKind::Assets => &self.selected_asset_ids,
            SelectionKind::Templates => &self.selected_template_ids,
        }
    }

    pub fn selection_mut(&mut self, kind: SelectionKind) -> &mut BTreeSet<String> {
        match kind {
            SelectionKind::Motivations => &mut self.selected_motivation_ids,
            SelectionKind::Assets => &mut self.selected_asset_ids,
            SelectionKind::Templates => &mut self.selected_template_ids,
        }
    }

    /// Copy variations keyed to a currently selected motivation
    pub fn selected_copy(&self) -> impl Iterator<Item = &CopyVariation> {
        self.copy_variations
            .iter()
            .filter(|c| self.selected_motivation_ids.contains(&c.motivation_id))
    }

    /// Drop dangling references: selections that no longer exist in their
    /// candidate pool, copy keyed to unselected motivations, and a matrix that
    /// no longer matches the selections.
    pub fn prune_selections(&mut self) -> Vec<PrunedSelection> {
        let mut pruned = Vec::new();

        for kind in [
            SelectionKind::Motivations,
            SelectionKind::Assets,
            SelectionKind::Templates,
        ] {
            let available: BTreeSet<String> =
                self.available_ids(kind).into_iter().map(str::to_string).collect();
            let selection = self.selection_mut(kind);
            let removed: Vec<String> = selection.difference(&available).cloned().collect();
            if !removed.is_empty() {
                selection.retain(|id| available.contains(id));
                pruned.push(PrunedSelection { kind, removed });
            }
        }

        let selected = &self.selected_motivation_ids;
        self.copy_variations
            .retain(|c| selected.contains(&c.motivation_id));

        if self.content_matrix.is_some() && !self.matrix_is_well_formed() {
            self.content_matrix = None;
        }

        pruned
    }

    /// Whether every input the matrix needs is present and non-empty
    pub fn matrix_inputs_ready(&self) -> bool {
        !self.selected_motivation_ids.is_empty()
            && self.selected_copy().next().is_some()
            && !self.selected_asset_ids.is_empty()
            && !self.selected_template_ids.is_empty()
    }

    /// Whether `content_matrix` is present and only references current selections
    pub fn matrix_is_well_formed(&self) -> bool {
        let Some(matrix) = &self.content_matrix else {
            return false;
        };
        if !self.matrix_inputs_ready() || matrix.cells.is_empty() {
            return false;
        }

        let copy_ids: BTreeSet<&str> = self.selected_copy().map(|c| c.id.as_str()).collect();
        matrix.cells.iter().all(|cell| {
            copy_ids.contains(cell.copy_id.as_str())
                && self.selected_asset_ids.contains(&cell.asset_id)
                && self.selected_template_ids.contains(&cell.template_id)
        })
    }
}
