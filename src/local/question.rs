//! Detection of sessions blocked on the user.

use super::descriptor::{LocalDescriptor, Role};

/// Decides whether an assistant message is waiting on an answer.
///
/// The default heuristic is deliberately simple; callers can swap in their
/// own rules, including a plain closure.
pub trait QuestionDetector {
    fn asks_question(&self, message: &str) -> bool;
}

impl<F> QuestionDetector for F
where
    F: Fn(&str) -> bool,
{
    fn asks_question(&self, message: &str) -> bool {
        self(message)
    }
}

/// Phrases that present the user with an explicit choice
const CHOICE_PROMPTS: &[&str] = &[
    "(y/n)",
    "[y/n]",
    "(yes/no)",
    "please choose",
    "please confirm",
    "which option",
    "select one of",
    "would you like me to",
];

/// Message ends in `?` or contains a choice prompt
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingQuestion;

impl QuestionDetector for TrailingQuestion {
    fn asks_question(&self, message: &str) -> bool {
        let trimmed = message.trim_end();
        if trimmed.ends_with('?') {
            return true;
        }
        let lower = trimmed.to_lowercase();
        CHOICE_PROMPTS.iter().any(|prompt| lower.contains(prompt))
    }
}

/// True when the descriptor flags pending input, or the conversation's last
/// word belongs to the assistant and that word is a question.
///
/// Entries from other roles (tools, system) are skipped; a user reply after
/// the question means it is no longer pending.
pub fn awaits_input(desc: &LocalDescriptor, detector: &dyn QuestionDetector) -> bool {
    if desc.awaiting_user_input {
        return true;
    }

    let last_turn = desc
        .conversation
        .iter()
        .rev()
        .find(|entry| entry.is_from(Role::User) || entry.is_from(Role::Assistant));

    match last_turn {
        Some(entry) if entry.is_from(Role::Assistant) => {
            entry.text().is_some_and(|text| detector.asks_question(text))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::descriptor::ConversationEntry;

    fn turn(role: Role, content: &str) -> ConversationEntry {
        ConversationEntry {
            role: Some(role),
            content: Some(content.to_string()),
            timestamp: None,
        }
    }

    fn with_history(history: Vec<ConversationEntry>) -> LocalDescriptor {
        LocalDescriptor {
            session_id: "s".to_string(),
            conversation: history,
            ..Default::default()
        }
    }

    #[test]
    fn trailing_question_heuristic() {
        let detector = TrailingQuestion;
        assert!(detector.asks_question("Should I also update the docs?"));
        assert!(detector.asks_question("Should I continue?  \n"));
        assert!(detector.asks_question("Apply the migration (y/n)"));
        assert!(detector.asks_question("Please choose: A) rebase B) merge"));
        assert!(!detector.asks_question("Done. All tests pass."));
        assert!(!detector.asks_question("Is it? No. Moving on."));
    }

    #[test]
    fn pending_assistant_question_forces_input() {
        let desc = with_history(vec![
            turn(Role::User, "Fix the login bug"),
            turn(Role::Assistant, "I found two causes. Which one should I fix first?"),
        ]);
        assert!(awaits_input(&desc, &TrailingQuestion));
    }

    #[test]
    fn answered_question_is_not_pending() {
        let desc = with_history(vec![
            turn(Role::Assistant, "Which one should I fix first?"),
            turn(Role::User, "The first one"),
        ]);
        assert!(!awaits_input(&desc, &TrailingQuestion));
    }

    #[test]
    fn tool_entries_after_question_are_ignored() {
        let mut history = vec![turn(Role::Assistant, "Proceed with the deploy?")];
        history.push(turn(Role::Other, "tool output"));
        assert!(awaits_input(&with_history(history), &TrailingQuestion));
    }

    #[test]
    fn explicit_flag_wins_without_history() {
        let desc = LocalDescriptor {
            session_id: "s".to_string(),
            awaiting_user_input: true,
            ..Default::default()
        };
        assert!(awaits_input(&desc, &TrailingQuestion));
    }

    #[test]
    fn closures_are_detectors() {
        let desc = with_history(vec![turn(Role::Assistant, "WAITING FOR APPROVAL")]);
        let shouting = |msg: &str| msg.contains("APPROVAL");
        assert!(awaits_input(&desc, &shouting));
        assert!(!awaits_input(&desc, &TrailingQuestion));
    }
}
