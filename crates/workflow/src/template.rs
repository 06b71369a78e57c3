//! Template variant selection and loading.
//!
//! Four fixed template files exist, keyed by media kind and
//! participant count.  Each is a JSON object mapping node id to
//! `{class_type, inputs: {...}}`.  A graph is loaded fresh for every
//! request and exclusively owned by it; templates are never cached or
//! shared mutably across jobs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use talkgen_core::types::{MediaKind, ParticipantCount};

use crate::patch::{bindings, BindingPurpose};

/// The four workflow template variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Image-to-video, one speaker.
    I2vSingle,
    /// Image-to-video, two speakers.
    I2vMulti,
    /// Video-to-video, one speaker.
    V2vSingle,
    /// Video-to-video, two speakers.
    V2vMulti,
}

impl TemplateKind {
    /// Select the template variant for a job.  Total over both domains.
    pub fn select(kind: MediaKind, count: ParticipantCount) -> Self {
        match (kind, count) {
            (MediaKind::Image, ParticipantCount::Single) => Self::I2vSingle,
            (MediaKind::Image, ParticipantCount::Multi) => Self::I2vMulti,
            (MediaKind::Video, ParticipantCount::Single) => Self::V2vSingle,
            (MediaKind::Video, ParticipantCount::Multi) => Self::V2vMulti,
        }
    }

    /// File name of this variant inside the template directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::I2vSingle => "I2V_single.json",
            Self::I2vMulti => "I2V_multi.json",
            Self::V2vSingle => "V2V_single.json",
            Self::V2vMulti => "V2V_multi.json",
        }
    }

    /// The (media kind, participant count) pair this variant serves.
    pub fn key(self) -> (MediaKind, ParticipantCount) {
        match self {
            Self::I2vSingle => (MediaKind::Image, ParticipantCount::Single),
            Self::I2vMulti => (MediaKind::Image, ParticipantCount::Multi),
            Self::V2vSingle => (MediaKind::Video, ParticipantCount::Single),
            Self::V2vMulti => (MediaKind::Video, ParticipantCount::Multi),
        }
    }

    /// All four variants, for exhaustive startup validation.
    pub const ALL: [TemplateKind; 4] = [
        Self::I2vSingle,
        Self::I2vMulti,
        Self::V2vSingle,
        Self::V2vMulti,
    ];
}

/// Errors from template loading and patching.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The template file is missing or unreadable.
    #[error("failed to read workflow template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template file is not a well-formed node graph.
    #[error("failed to parse workflow template {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A binding every variant must carry is missing from the loaded
    /// graph.  This is a configuration defect, not a job error.
    #[error("malformed template: required {purpose:?} binding targets missing node {node_id}")]
    MissingBinding {
        purpose: BindingPurpose,
        node_id: &'static str,
    },
}

/// A loaded workflow node graph, exclusively owned by one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph(pub(crate) Map<String, Value>);

impl WorkflowGraph {
    /// Load the template variant from `template_dir`.
    pub async fn load(template_dir: &Path, kind: TemplateKind) -> Result<Self, TemplateError> {
        let path = template_dir.join(kind.file_name());
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| TemplateError::Read {
                path: path.clone(),
                source,
            })?;
        let graph: Map<String, Value> =
            serde_json::from_str(&raw).map_err(|source| TemplateError::Parse {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            template = %path.display(),
            nodes = graph.len(),
            "Loaded workflow template",
        );
        Ok(Self(graph))
    }

    /// Build a graph directly from a parsed node map (tests, fixtures).
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.0.len()
    }

    /// Whether a node with this id exists.
    pub fn contains_node(&self, node_id: &str) -> bool {
        self.0.contains_key(node_id)
    }

    /// Read back a single input slot value, if present.
    pub fn slot(&self, node_id: &str, slot: &str) -> Option<&Value> {
        self.0.get(node_id)?.get("inputs")?.get(slot)
    }
}

/// Fail-fast startup validation of all four template variants.
///
/// Loads every variant and checks that each required binding resolves
/// to an existing node with an `inputs` object, so a missing or
/// malformed template file is caught before the first job arrives.
pub async fn validate_templates(template_dir: &Path) -> Result<(), TemplateError> {
    for kind in TemplateKind::ALL {
        let graph = WorkflowGraph::load(template_dir, kind).await?;
        let (media, count) = kind.key();

        for binding in bindings(media, count) {
            if !binding.required {
                continue;
            }
            let has_inputs = graph
                .0
                .get(binding.node_id)
                .and_then(|n| n.get("inputs"))
                .is_some_and(Value::is_object);
            if !has_inputs {
                return Err(TemplateError::MissingBinding {
                    purpose: binding.purpose,
                    node_id: binding.node_id,
                });
            }
        }

        tracing::info!(
            template = kind.file_name(),
            nodes = graph.node_count(),
            "Validated workflow template",
        );
    }
    Ok(())
}
