//! StepRegistry - static table of workflow steps

use super::ValidationError;
use crate::models::{Step, WorkflowState};
use crate::orchestrator::{GenerationCall, GenerationInput};

/// Entry check for a step; `Err` carries the human-readable reason
pub type Precondition = fn(&WorkflowState) -> Result<(), String>;

/// One row of the registry
#[derive(Clone, Copy)]
pub struct StepSpec {
    pub step: Step,
    pub precondition: Precondition,
    pub generation_call: Option<GenerationCall>,
}

impl std::fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSpec")
            .field("step", &self.step)
            .field("generation_call", &self.generation_call)
            .finish_non_exhaustive()
    }
}

impl StepSpec {
    pub fn is_terminal(&self) -> bool {
        self.step.is_terminal()
    }
}

fn require(condition: bool, reason: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(reason.to_string())
    }
}

fn can_enter_upload(_: &WorkflowState) -> Result<(), String> {
    Ok(())
}

fn can_enter_motivations(state: &WorkflowState) -> Result<(), String> {
    require(!state.uploaded_files.is_empty(), "no brief file uploaded")?;
    require(state.brief_data.is_some(), "brief has not been parsed")
}

fn can_enter_copy(state: &WorkflowState) -> Result<(), String> {
    require(state.brief_confirmed, "brief has not been confirmed")?;
    require(!state.motivations.is_empty(), "no motivations generated")?;
    require(
        !state.selected_motivation_ids.is_empty(),
        "no motivation selected",
    )
}

fn can_enter_assets(state: &WorkflowState) -> Result<(), String> {
    require(
        state.selected_copy().next().is_some(),
        "no copy variations for the selected motivations",
    )
}

fn can_enter_templates(state: &WorkflowState) -> Result<(), String> {
    require(!state.selected_asset_ids.is_empty(), "no asset selected")
}

fn can_enter_matrix(state: &WorkflowState) -> Result<(), String> {
    require(!state.selected_template_ids.is_empty(), "no template selected")
}

fn can_enter_ready(state: &WorkflowState) -> Result<(), String> {
    require(state.content_matrix.is_some(), "content matrix has not been built")?;
    require(
        state.matrix_is_well_formed(),
        "content matrix does not match the current selections",
    )
}

static STANDARD_STEPS: [StepSpec; 7] = [
    StepSpec {
        step: Step::Upload,
        precondition: can_enter_upload,
        generation_call: Some(GenerationCall::ParseBrief),
    },
    StepSpec {
        step: Step::Motivations,
        precondition: can_enter_motivations,
        generation_call: Some(GenerationCall::GenerateMotivations),
    },
    StepSpec {
        step: Step::Copy,
        precondition: can_enter_copy,
        generation_call: Some(GenerationCall::GenerateCopy),
    },
    StepSpec {
        step: Step::Assets,
        precondition: can_enter_assets,
        generation_call: Some(GenerationCall::GenerateAssets),
    },
    StepSpec {
        step: Step::Templates,
        precondition: can_enter_templates,
        generation_call: Some(GenerationCall::SelectTemplates),
    },
    StepSpec {
        step: Step::Matrix,
        precondition: can_enter_matrix,
        generation_call: Some(GenerationCall::BuildMatrix),
    },
    StepSpec {
        step: Step::Ready,
        precondition: can_enter_ready,
        generation_call: None,
    },
];

/// Static table of steps 0..=6
#[derive(Debug, Clone, Copy)]
pub struct StepRegistry {
    steps: &'static [StepSpec; 7],
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl StepRegistry {
    pub fn standard() -> Self {
        Self {
            steps: &STANDARD_STEPS,
        }
    }

    pub fn spec(&self, step: Step) -> &StepSpec {
        &self.steps[step.index() as usize]
    }

    pub fn generation_call(&self, step: Step) -> Option<GenerationCall> {
        self.spec(step).generation_call
    }

    /// Check whether `step` may be entered from `state`
    pub fn check_entry(&self, step: Step, state: &WorkflowState) -> Result<(), ValidationError> {
        (self.spec(step).precondition)(state)
            .map_err(|reason| ValidationError::PreconditionFailed { step, reason })
    }

    /// Build the collaborator request for the step's generation call
    pub fn generation_input(
        &self,
        step: Step,
        state: &WorkflowState,
    ) -> Result<GenerationInput, ValidationError> {
        let call = self
            .generation_call(step)
            .ok_or(ValidationError::NoGenerationCall { step })?;
        let missing = |reason: &str| ValidationError::MissingInput {
            call,
            reason: reason.to_string(),
        };

        let input = match call {
            GenerationCall::ParseBrief => {
                if state.uploaded_files.is_empty() {
                    return Err(missing("no brief file uploaded"));
                }
                GenerationInput::ParseBrief {
                    files: state.uploaded_files.clone(),
                    text: None,
                }
            }
            GenerationCall::GenerateMotivations => {
                let brief = state
                    .brief_data
                    .clone()
                    .ok_or_else(|| missing("brief has not been parsed"))?;
                if !state.brief_confirmed {
                    return Err(missing("brief has not been confirmed"));
                }
                GenerationInput::GenerateMotivations { brief }
            }
            GenerationCall::GenerateCopy => {
                let brief = state
                    .brief_data
                    .clone()
                    .ok_or_else(|| missing("brief has not been parsed"))?;
                let selected_motivations: Vec<_> = state
                    .motivations
                    .iter()
                    .filter(|m| state.selected_motivation_ids.contains(&m.id))
                    .cloned()
                    .collect();
                if selected_motivations.is_empty() {
                    return Err(missing("no motivation selected"));
                }
                GenerationInput::GenerateCopy {
                    selected_motivations,
                    brief,
                }
            }
            GenerationCall::GenerateAssets => {
                let copy_variations: Vec<_> = state.selected_copy().cloned().collect();
                if copy_variations.is_empty() {
                    return Err(missing("no copy variations for the selected motivations"));
                }
                GenerationInput::GenerateAssets { copy_variations }
            }
            GenerationCall::SelectTemplates => {
                let copy_variations: Vec<_> = state.selected_copy().cloned().collect();
                let selected_assets: Vec<_> = state
                    .asset_candidates
                    .iter()
                    .filter(|a| state.selected_asset_ids.contains(&a.id))
                    .cloned()
                    .collect();
                if copy_variations.is_empty() || selected_assets.is_empty() {
                    return Err(missing("copy and at least one asset must be selected"));
                }
                GenerationInput::SelectTemplates {
                    copy_variations,
                    selected_assets,
                }
            }
            GenerationCall::BuildMatrix => {
                if !state.matrix_inputs_ready() {
                    return Err(missing(
                        "motivations, copy, assets and templates must all be selected",
                    ));
                }
                GenerationInput::BuildMatrix {
                    copy_variations: state.selected_copy().cloned().collect(),
                    selected_asset_ids: state.selected_asset_ids.iter().cloned().collect(),
                    selected_template_ids: state.selected_template_ids.iter().cloned().collect(),
                }
            }
        };
        Ok(input)
    }
}
