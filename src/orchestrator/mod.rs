//! Generation collaborators
//!
//! The AI backends live elsewhere; the state machine only knows the
//! `ContentGenerator` contract and the typed inputs/outputs of each call.

#[cfg(feature = "api-direct")]
pub mod http;
pub mod runner;
pub mod script_runner;

#[cfg(feature = "api-direct")]
pub use http::HttpGenerator;
pub use runner::{Completion, GenerationTaskRunner, TaskHandle, TaskStatus};
pub use script_runner::ScriptGenerator;

use crate::models::{
    BriefData, Candidate, ContentMatrix, CopyVariation, FileDescriptor, Motivation, Step,
};
use crate::workflow::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// External generation call a step may trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GenerationCall {
    ParseBrief,
    GenerateMotivations,
    GenerateCopy,
    GenerateAssets,
    SelectTemplates,
    BuildMatrix,
}

impl GenerationCall {
    /// Step whose data this call produces
    pub fn step(self) -> Step {
        match self {
            GenerationCall::ParseBrief => Step::Upload,
            GenerationCall::GenerateMotivations => Step::Motivations,
            GenerationCall::GenerateCopy => Step::Copy,
            GenerationCall::GenerateAssets => Step::Assets,
            GenerationCall::SelectTemplates => Step::Templates,
            GenerationCall::BuildMatrix => Step::Matrix,
        }
    }

    /// Wire name (used as script key and HTTP path)
    pub fn name(self) -> &'static str {
        match self {
            GenerationCall::ParseBrief => "parseBrief",
            GenerationCall::GenerateMotivations => "generateMotivations",
            GenerationCall::GenerateCopy => "generateCopy",
            GenerationCall::GenerateAssets => "generateAssets",
            GenerationCall::SelectTemplates => "selectTemplates",
            GenerationCall::BuildMatrix => "buildMatrix",
        }
    }
}

impl fmt::Display for GenerationCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Request payload for one generation call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum GenerationInput {
    #[serde(rename_all = "camelCase")]
    ParseBrief {
        files: Vec<FileDescriptor>,
        text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GenerateMotivations { brief: BriefData },
    #[serde(rename_all = "camelCase")]
    GenerateCopy {
        selected_motivations: Vec<Motivation>,
        brief: BriefData,
    },
    #[serde(rename_all = "camelCase")]
    GenerateAssets { copy_variations: Vec<CopyVariation> },
    #[serde(rename_all = "camelCase")]
    SelectTemplates {
        copy_variations: Vec<CopyVariation>,
        selected_assets: Vec<Candidate>,
    },
    #[serde(rename_all = "camelCase")]
    BuildMatrix {
        copy_variations: Vec<CopyVariation>,
        selected_asset_ids: Vec<String>,
        selected_template_ids: Vec<String>,
    },
}

impl GenerationInput {
    pub fn call(&self) -> GenerationCall {
        match self {
            GenerationInput::ParseBrief { .. } => GenerationCall::ParseBrief,
            GenerationInput::GenerateMotivations { .. } => GenerationCall::GenerateMotivations,
            GenerationInput::GenerateCopy { .. } => GenerationCall::GenerateCopy,
            GenerationInput::GenerateAssets { .. } => GenerationCall::GenerateAssets,
            GenerationInput::SelectTemplates { .. } => GenerationCall::SelectTemplates,
            GenerationInput::BuildMatrix { .. } => GenerationCall::BuildMatrix,
        }
    }
}

/// Result payload of one generation call
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutput {
    Brief(BriefData),
    Motivations(Vec<Motivation>),
    Copy(Vec<CopyVariation>),
    Assets(Vec<Candidate>),
    Templates(Vec<Candidate>),
    Matrix(ContentMatrix),
}

impl GenerationOutput {
    pub fn call(&self) -> GenerationCall {
        match self {
            GenerationOutput::Brief(_) => GenerationCall::ParseBrief,
            GenerationOutput::Motivations(_) => GenerationCall::GenerateMotivations,
            GenerationOutput::Copy(_) => GenerationCall::GenerateCopy,
            GenerationOutput::Assets(_) => GenerationCall::GenerateAssets,
            GenerationOutput::Templates(_) => GenerationCall::SelectTemplates,
            GenerationOutput::Matrix(_) => GenerationCall::BuildMatrix,
        }
    }

    /// Decode a JSON response body for `call`
    pub fn from_json(call: GenerationCall, body: &str) -> Result<Self, GenerationError> {
        let malformed = |e: serde_json::Error| GenerationError::Malformed {
            call,
            message: e.to_string(),
        };
        let output = match call {
            GenerationCall::ParseBrief => {
                GenerationOutput::Brief(serde_json::from_str(body).map_err(malformed)?)
            }
            GenerationCall::GenerateMotivations => {
                GenerationOutput::Motivations(serde_json::from_str(body).map_err(malformed)?)
            }
            GenerationCall::GenerateCopy => {
                GenerationOutput::Copy(serde_json::from_str(body).map_err(malformed)?)
            }
            GenerationCall::GenerateAssets => {
                GenerationOutput::Assets(serde_json::from_str(body).map_err(malformed)?)
            }
            GenerationCall::SelectTemplates => {
                GenerationOutput::Templates(serde_json::from_str(body).map_err(malformed)?)
            }
            GenerationCall::BuildMatrix => {
                GenerationOutput::Matrix(serde_json::from_str(body).map_err(malformed)?)
            }
        };
        Ok(output)
    }
}

// =============================================================================
// Collaborator contract
// =============================================================================

/// AI content-generation backend
///
/// Every call must be safe to retry with the same input.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn parse_brief(
        &self,
        files: &[FileDescriptor],
        text: Option<&str>,
    ) -> Result<BriefData, GenerationError>;

    async fn generate_motivations(&self, brief: &BriefData)
        -> Result<Vec<Motivation>, GenerationError>;

    async fn generate_copy(
        &self,
        selected_motivations: &[Motivation],
        brief: &BriefData,
    ) -> Result<Vec<CopyVariation>, GenerationError>;

    async fn generate_assets(
        &self,
        copy_variations: &[CopyVariation],
    ) -> Result<Vec<Candidate>, GenerationError>;

    async fn select_templates(
        &self,
        copy_variations: &[CopyVariation],
        selected_assets: &[Candidate],
    ) -> Result<Vec<Candidate>, GenerationError>;

    async fn build_matrix(
        &self,
        copy_variations: &[CopyVariation],
        selected_asset_ids: &[String],
        selected_template_ids: &[String],
    ) -> Result<ContentMatrix, GenerationError>;
}

/// Collaborator reachable through a JSON request/response exchange
///
/// Implementors only move bytes; the typed `ContentGenerator` surface is
/// provided on top of them.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    /// Send `request` (a serialized `GenerationInput`) and return the raw JSON body
    async fn exchange(&self, call: GenerationCall, request: String) -> Result<String, GenerationError>;
}

async fn exchange_typed<T: JsonTransport + ?Sized>(
    transport: &T,
    input: GenerationInput,
) -> Result<GenerationOutput, GenerationError> {
    let call = input.call();
    let request = serde_json::to_string(&input).map_err(|e| GenerationError::Malformed {
        call,
        message: format!("failed to encode request: {}", e),
    })?;
    let body = transport.exchange(call, request).await?;
    GenerationOutput::from_json(call, &body)
}

fn unexpected(call: GenerationCall, output: GenerationOutput) -> GenerationError {
    GenerationError::Malformed {
        call,
        message: format!("expected {} output, got {}", call, output.call()),
    }
}

#[async_trait]
impl<T: JsonTransport> ContentGenerator for T {
    async fn parse_brief(
        &self,
        files: &[FileDescriptor],
        text: Option<&str>,
    ) -> Result<BriefData, GenerationError> {
        let input = GenerationInput::ParseBrief {
            files: files.to_vec(),
            text: text.map(str::to_string),
        };
        match exchange_typed(self, input).await? {
            GenerationOutput::Brief(brief) => Ok(brief),
            other => Err(unexpected(GenerationCall::ParseBrief, other)),
        }
    }

    async fn generate_motivations(
        &self,
        brief: &BriefData,
    ) -> Result<Vec<Motivation>, GenerationError> {
        let input = GenerationInput::GenerateMotivations {
            brief: brief.clone(),
        };
        match exchange_typed(self, input).await? {
            GenerationOutput::Motivations(items) => Ok(items),
            other => Err(unexpected(GenerationCall::GenerateMotivations, other)),
        }
    }

    async fn generate_copy(
        &self,
        selected_motivations: &[Motivation],
        brief: &BriefData,
    ) -> Result<Vec<CopyVariation>, GenerationError> {
        let input = GenerationInput::GenerateCopy {
            selected_motivations: selected_motivations.to_vec(),
            brief: brief.clone(),
        };
        match exchange_typed(self, input).await? {
            GenerationOutput::Copy(items) => Ok(items),
            other => Err(unexpected(GenerationCall::GenerateCopy, other)),
        }
    }

    async fn generate_assets(
        &self,
        copy_variations: &[CopyVariation],
    ) -> Result<Vec<Candidate>, GenerationError> {
        let input = GenerationInput::GenerateAssets {
            copy_variations: copy_variations.to_vec(),
        };
        match exchange_typed(self, input).await? {
            GenerationOutput::Assets(items) => Ok(items),
            other => Err(unexpected(GenerationCall::GenerateAssets, other)),
        }
    }

    async fn select_templates(
        &self,
        copy_variations: &[CopyVariation],
        selected_assets: &[Candidate],
    ) -> Result<Vec<Candidate>, GenerationError> {
        let input = GenerationInput::SelectTemplates {
            copy_variations: copy_variations.to_vec(),
            selected_assets: selected_assets.to_vec(),
        };
        match exchange_typed(self, input).await? {
            GenerationOutput::Templates(items) => Ok(items),
            other => Err(unexpected(GenerationCall::SelectTemplates, other)),
        }
    }

    async fn build_matrix(
        &self,
        copy_variations: &[CopyVariation],
        selected_asset_ids: &[String],
        selected_template_ids: &[String],
    ) -> Result<ContentMatrix, GenerationError> {
        let input = GenerationInput::BuildMatrix {
            copy_variations: copy_variations.to_vec(),
            selected_asset_ids: selected_asset_ids.to_vec(),
            selected_template_ids: selected_template_ids.to_vec(),
        };
        match exchange_typed(self, input).await? {
            GenerationOutput::Matrix(matrix) => Ok(matrix),
            other => Err(unexpected(GenerationCall::BuildMatrix, other)),
        }
    }
}

/// Route a typed input to the matching collaborator method
pub async fn dispatch(
    generator: &dyn ContentGenerator,
    input: &GenerationInput,
) -> Result<GenerationOutput, GenerationError> {
    let output = match input {
        GenerationInput::ParseBrief { files, text } => {
            GenerationOutput::Brief(generator.parse_brief(files, text.as_deref()).await?)
        }
        GenerationInput::GenerateMotivations { brief } => {
            GenerationOutput::Motivations(generator.generate_motivations(brief).await?)
        }
        GenerationInput::GenerateCopy {
            selected_motivations,
            brief,
        } => GenerationOutput::Copy(generator.generate_copy(selected_motivations, brief).await?),
        GenerationInput::GenerateAssets { copy_variations } => {
            GenerationOutput::Assets(generator.generate_assets(copy_variations).await?)
        }
        GenerationInput::SelectTemplates {
            copy_variations,
            selected_assets,
        } => GenerationOutput::Templates(
            generator
                .select_templates(copy_variations, selected_assets)
                .await?,
        ),
        GenerationInput::BuildMatrix {
            copy_variations,
            selected_asset_ids,
            selected_template_ids,
        } => GenerationOutput::Matrix(
            generator
                .build_matrix(copy_variations, selected_asset_ids, selected_template_ids)
                .await?,
        ),
    };
    Ok(output)
}
