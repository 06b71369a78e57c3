//! Workflow template handling for the generation worker.
//!
//! A workflow is a ComfyUI node graph stored as a JSON template, one
//! variant per (media kind x participant count) combination.  This
//! crate selects and loads the right variant and patches resolved job
//! inputs into its well-known node slots.

pub mod patch;
pub mod template;

pub use patch::{apply, bindings, BindingPurpose, PatchValues, SlotBinding};
pub use template::{validate_templates, TemplateError, TemplateKind, WorkflowGraph};
