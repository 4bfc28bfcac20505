//! Transcript-style prompt rendering

use super::Entry;

/// Render the context window followed by the new message as a transcript
///
/// Each prior exchange becomes a `User:` line and a `Bot:` line; the prompt
/// ends with an open `Bot:` turn for the assistant to complete.
#[must_use]
pub fn render_prompt(context: &[Entry], message: &str) -> String {
    let mut prompt = String::new();

    for entry in context {
        prompt.push_str("User: ");
        prompt.push_str(&entry.user_message);
        prompt.push_str("\nBot: ");
        prompt.push_str(&entry.bot_response);
        prompt.push('\n');
    }

    prompt.push_str("User: ");
    prompt.push_str(message);
    prompt.push_str("\nBot:");
    prompt
}
