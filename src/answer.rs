use crate::document::{AnswerRepresentation, Document};

pub const ANSWER_NOT_FOUND: &str = "Answer not found in retrieved context.";

/// First stored ground-truth answer of `document`, or [`ANSWER_NOT_FOUND`].
pub fn select_answer(document: &Document) -> String {
    match &document.answers {
        AnswerRepresentation::List(answers) => answers.first(),
        AnswerRepresentation::Keyed { text, .. } => text.first(),
    }
    .cloned()
    .unwrap_or_else(|| ANSWER_NOT_FOUND.to_string())
}
