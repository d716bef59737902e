//! Prompt templates for facilitation artifacts

use crate::facilitation::artifact::ArtifactKind;
use crate::facilitation::context::ContextSnapshot;

/// Templates for generating the prompt sent to the AI backend per artifact
/// kind.
pub struct PromptTemplate;

impl PromptTemplate {
    /// System prompt shared by all facilitation requests
    pub fn system() -> &'static str {
        r#"You are an expert workshop facilitator AI.
Base everything strictly on the workshop context provided; do not invent participants, ideas, or constraints.
Output only the requested content itself, with no introductory sentence, explanation, or trailing remarks.
Use Markdown for structure where lists are requested."#
    }

    /// User prompt for the given artifact kind and context
    pub fn for_artifact(kind: ArtifactKind, context: &ContextSnapshot) -> String {
        let instructions = match kind {
            ArtifactKind::Agenda => {
                "Create a structured, timed agenda proposal that flows toward the workshop's \
                 objective. Use a bulleted list with estimated timings per section. Keep \
                 descriptions concise."
            }
            ArtifactKind::Rules => {
                "Propose 4-6 short ground rules for a productive brainstorming workshop with \
                 this group. Number them."
            }
            ArtifactKind::Icebreaker => {
                "Suggest one quick icebreaker activity (under 5 minutes) suitable for this \
                 group and objective. One short paragraph."
            }
            ArtifactKind::Task => {
                "Write the working-session task: a single clear brainstorming prompt that \
                 directs participants toward the objective. One or two sentences."
            }
            ArtifactKind::Tip => {
                "Give one practical facilitation tip for the current moment of this workshop. \
                 One or two sentences."
            }
            ArtifactKind::Nudge => {
                "Write a short, encouraging nudge addressed to the participants to re-energize \
                 contribution right now. One or two sentences, friendly tone."
            }
            ArtifactKind::Plan => {
                "Draft an action plan from the top-ranked ideas: for each, one concrete next \
                 step and a suggested owner role. Numbered list, best-ranked idea first."
            }
        };

        format!(
            "Workshop context:\n{}\n\nInstructions:\n{}\n\nGenerate the {} now:",
            Self::context_block(context),
            instructions,
            kind
        )
    }

    fn context_block(context: &ContextSnapshot) -> String {
        let mut block = format!(
            "- Title: {}\n- Objective: {}\n- Current stage: {}\n- Participants: {}",
            context.title,
            context.objective.as_deref().unwrap_or("(not stated)"),
            context.stage,
            context.participant_count,
        );
        if !context.top_ideas.is_empty() {
            block.push_str("\n- Ideas so far (best ranked first):");
            for idea in &context.top_ideas {
                block.push_str(&format!("\n  - {idea}"));
            }
        }
        if !context.recent_chat.is_empty() {
            block.push_str("\n- Recent discussion:");
            for line in &context.recent_chat {
                block.push_str(&format!("\n  - {line}"));
            }
        }
        block
    }
}
