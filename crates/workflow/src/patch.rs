//! Typed slot-binding table and graph patcher.
//!
//! Jobs are mapped onto a workflow graph through a fixed table of
//! (purpose, node id, slot name) bindings rather than ad-hoc indexing.
//! Required bindings exist in every template variant; optional ones
//! (second audio, sampler steps) are written only when the target node
//! is present in the loaded graph.

use std::path::Path;

use serde_json::Value;
use talkgen_core::types::{MediaKind, ParticipantCount};

use crate::template::{TemplateError, WorkflowGraph};

/// What a slot binding carries into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingPurpose {
    /// Primary media file (image or video, by job kind).
    Media,
    /// Primary driving audio file.
    Audio,
    /// Positive prompt text.
    Prompt,
    /// Output width in pixels.
    Width,
    /// Output height in pixels.
    Height,
    /// Maximum number of output frames.
    FrameBudget,
    /// Second speaker's audio file (multi-participant variants only).
    SecondAudio,
    /// Sampler step count.
    Steps,
}

/// One entry of the binding table: a slot the patcher may write.
#[derive(Debug, Clone, Copy)]
pub struct SlotBinding {
    pub purpose: BindingPurpose,
    /// Node id (string key) inside the workflow graph.
    pub node_id: &'static str,
    /// Input slot name on that node.
    pub slot: &'static str,
    /// Required bindings must resolve in every loaded variant;
    /// optional ones are skipped when the node is absent.
    pub required: bool,
}

/// The fixed binding table for one (media kind, participant count)
/// combination.
///
/// Node ids are the well-known slots of the shipped template files.
/// The media slot is chosen solely by `kind` — image workflows patch
/// the image-loader node, video workflows the video-loader node — and
/// never by inspecting the resolved file itself.
pub fn bindings(kind: MediaKind, count: ParticipantCount) -> Vec<SlotBinding> {
    let media = match kind {
        MediaKind::Image => SlotBinding {
            purpose: BindingPurpose::Media,
            node_id: "284",
            slot: "image",
            required: true,
        },
        MediaKind::Video => SlotBinding {
            purpose: BindingPurpose::Media,
            node_id: "228",
            slot: "video",
            required: true,
        },
    };

    let mut table = vec![
        media,
        SlotBinding {
            purpose: BindingPurpose::Audio,
            node_id: "125",
            slot: "audio",
            required: true,
        },
        SlotBinding {
            purpose: BindingPurpose::Prompt,
            node_id: "241",
            slot: "positive_prompt",
            required: true,
        },
        SlotBinding {
            purpose: BindingPurpose::Width,
            node_id: "245",
            slot: "value",
            required: true,
        },
        SlotBinding {
            purpose: BindingPurpose::Height,
            node_id: "246",
            slot: "value",
            required: true,
        },
        SlotBinding {
            purpose: BindingPurpose::FrameBudget,
            node_id: "270",
            slot: "value",
            required: true,
        },
        SlotBinding {
            purpose: BindingPurpose::Steps,
            node_id: "263",
            slot: "steps",
            required: false,
        },
    ];

    if count == ParticipantCount::Multi {
        // The second-audio node id differs between the I2V and V2V
        // multi variants.
        let node_id = match kind {
            MediaKind::Image => "307",
            MediaKind::Video => "313",
        };
        table.push(SlotBinding {
            purpose: BindingPurpose::SecondAudio,
            node_id,
            slot: "audio",
            required: false,
        });
    }

    table
}

/// Resolved values the patcher writes into the graph.
#[derive(Debug, Clone)]
pub struct PatchValues<'a> {
    pub media_path: &'a Path,
    pub audio_path: &'a Path,
    pub prompt: &'a str,
    pub width: u32,
    pub height: u32,
    pub frame_budget: u32,
    /// Second speaker audio; only meaningful for multi-participant jobs.
    pub second_audio_path: Option<&'a Path>,
    /// Sampler steps; written only when the template carries the slot.
    pub steps: Option<u32>,
}

impl PatchValues<'_> {
    /// The JSON value for one binding purpose, or `None` when the job
    /// carries nothing for an optional purpose.
    fn value_for(&self, purpose: BindingPurpose) -> Option<Value> {
        match purpose {
            BindingPurpose::Media => Some(path_value(self.media_path)),
            BindingPurpose::Audio => Some(path_value(self.audio_path)),
            BindingPurpose::Prompt => Some(Value::from(self.prompt)),
            BindingPurpose::Width => Some(Value::from(self.width)),
            BindingPurpose::Height => Some(Value::from(self.height)),
            BindingPurpose::FrameBudget => Some(Value::from(self.frame_budget)),
            BindingPurpose::SecondAudio => self.second_audio_path.map(path_value),
            BindingPurpose::Steps => self.steps.map(Value::from),
        }
    }
}

fn path_value(path: &Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

/// Patch resolved job values into the graph, in place.
///
/// Writes each binding's value into `graph[node_id].inputs[slot]`.
/// Idempotent: applying the same values twice leaves the same final
/// slot state.  A required binding whose node (or `inputs` object) is
/// missing fails with [`TemplateError::MissingBinding`].
pub fn apply(
    graph: &mut WorkflowGraph,
    kind: MediaKind,
    count: ParticipantCount,
    values: &PatchValues<'_>,
) -> Result<(), TemplateError> {
    for binding in bindings(kind, count) {
        let Some(value) = values.value_for(binding.purpose) else {
            continue;
        };

        let inputs = graph
            .0
            .get_mut(binding.node_id)
            .and_then(|node| node.get_mut("inputs"))
            .and_then(Value::as_object_mut);

        match inputs {
            Some(inputs) => {
                inputs.insert(binding.slot.to_string(), value);
            }
            None if binding.required => {
                return Err(TemplateError::MissingBinding {
                    purpose: binding.purpose,
                    node_id: binding.node_id,
                });
            }
            None => {
                tracing::debug!(
                    node_id = binding.node_id,
                    purpose = ?binding.purpose,
                    "Optional binding target absent, skipping",
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn graph_with_nodes(node_ids: &[&str]) -> WorkflowGraph {
        let mut map = serde_json::Map::new();
        for id in node_ids {
            map.insert(id.to_string(), json!({ "class_type": "Stub", "inputs": {} }));
        }
        WorkflowGraph::from_map(map)
    }

    fn required_single_image_nodes() -> Vec<&'static str> {
        vec!["284", "125", "241", "245", "246", "270"]
    }

    fn sample_values<'a>() -> PatchValues<'a> {
        PatchValues {
            media_path: Path::new("/in/image.jpg"),
            audio_path: Path::new("/in/audio.wav"),
            prompt: "two friends chatting",
            width: 640,
            height: 480,
            frame_budget: 150,
            second_audio_path: None,
            steps: None,
        }
    }

    #[test]
    fn patches_all_required_slots() {
        let mut graph = graph_with_nodes(&required_single_image_nodes());
        apply(
            &mut graph,
            MediaKind::Image,
            ParticipantCount::Single,
            &sample_values(),
        )
        .unwrap();

        assert_eq!(graph.slot("284", "image"), Some(&json!("/in/image.jpg")));
        assert_eq!(graph.slot("125", "audio"), Some(&json!("/in/audio.wav")));
        assert_eq!(
            graph.slot("241", "positive_prompt"),
            Some(&json!("two friends chatting"))
        );
        assert_eq!(graph.slot("245", "value"), Some(&json!(640)));
        assert_eq!(graph.slot("246", "value"), Some(&json!(480)));
        assert_eq!(graph.slot("270", "value"), Some(&json!(150)));
    }

    #[test]
    fn video_kind_patches_video_slot_not_image_slot() {
        let mut graph = graph_with_nodes(&["228", "125", "241", "245", "246", "270"]);
        apply(
            &mut graph,
            MediaKind::Video,
            ParticipantCount::Single,
            &sample_values(),
        )
        .unwrap();

        assert_eq!(graph.slot("228", "video"), Some(&json!("/in/image.jpg")));
        assert!(graph.slot("284", "image").is_none());
    }

    #[test]
    fn patching_twice_is_idempotent() {
        let mut graph = graph_with_nodes(&required_single_image_nodes());
        let values = sample_values();

        apply(&mut graph, MediaKind::Image, ParticipantCount::Single, &values).unwrap();
        let first = serde_json::to_value(&graph).unwrap();
        apply(&mut graph, MediaKind::Image, ParticipantCount::Single, &values).unwrap();
        let second = serde_json::to_value(&graph).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn missing_required_node_is_fatal() {
        // No audio node.
        let mut graph = graph_with_nodes(&["284", "241", "245", "246", "270"]);
        let err = apply(
            &mut graph,
            MediaKind::Image,
            ParticipantCount::Single,
            &sample_values(),
        )
        .unwrap_err();
        assert_matches!(
            err,
            TemplateError::MissingBinding {
                purpose: BindingPurpose::Audio,
                node_id: "125",
            }
        );
    }

    #[test]
    fn absent_optional_second_audio_node_is_skipped() {
        // A multi-participant job against a graph without the second
        // audio node: no error, nothing extra written.
        let mut graph = graph_with_nodes(&required_single_image_nodes());
        let mut values = sample_values();
        values.second_audio_path = Some(Path::new("/in/audio2.wav"));

        apply(&mut graph, MediaKind::Image, ParticipantCount::Multi, &values).unwrap();
        assert!(!graph.contains_node("307"));
    }

    #[test]
    fn present_second_audio_node_is_patched() {
        let mut nodes = required_single_image_nodes();
        nodes.push("307");
        let mut graph = graph_with_nodes(&nodes);
        let mut values = sample_values();
        values.second_audio_path = Some(Path::new("/in/audio2.wav"));

        apply(&mut graph, MediaKind::Image, ParticipantCount::Multi, &values).unwrap();
        assert_eq!(graph.slot("307", "audio"), Some(&json!("/in/audio2.wav")));
    }

    #[test]
    fn v2v_multi_uses_alternate_second_audio_node() {
        let mut graph = graph_with_nodes(&["228", "125", "241", "245", "246", "270", "313"]);
        let mut values = sample_values();
        values.second_audio_path = Some(Path::new("/in/audio2.wav"));

        apply(&mut graph, MediaKind::Video, ParticipantCount::Multi, &values).unwrap();
        assert_eq!(graph.slot("313", "audio"), Some(&json!("/in/audio2.wav")));
    }

    #[test]
    fn steps_written_only_when_slot_node_present() {
        let mut values = sample_values();
        values.steps = Some(12);

        let mut without = graph_with_nodes(&required_single_image_nodes());
        apply(&mut without, MediaKind::Image, ParticipantCount::Single, &values).unwrap();
        assert!(without.slot("263", "steps").is_none());

        let mut nodes = required_single_image_nodes();
        nodes.push("263");
        let mut with = graph_with_nodes(&nodes);
        apply(&mut with, MediaKind::Image, ParticipantCount::Single, &values).unwrap();
        assert_eq!(with.slot("263", "steps"), Some(&json!(12)));
    }
}
