use serde::Serialize;

/// Display name of the agent page that closes the intake flow.
pub const END_PAGE_DISPLAY_NAME: &str = "end flow";
/// Resource-name suffix of the agent's reserved end page.
pub const END_PAGE_NAME_SUFFIX: &str = "/pages/-";
/// Lowercase phrases the agent says once the patient is handed to staff.
pub const HANDOFF_MARKER_PHRASES: [&str; 2] =
    ["please wait for the clinic staff", "thank you for providing"];

/// Which end-of-conversation signals fired for a turn. Any single one ends
/// the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndFlags {
    pub by_end_intent: bool,
    pub by_end_page: bool,
    pub by_phrase: bool,
}

impl EndFlags {
    pub fn is_end(&self) -> bool {
        self.by_end_intent || self.by_end_page || self.by_phrase
    }
}

pub fn detect_end(
    intent_ends_interaction: bool,
    page_display_name: Option<&str>,
    page_name: Option<&str>,
    response_lines: &[String],
) -> EndFlags {
    let by_end_page = page_display_name
        .is_some_and(|display_name| display_name.eq_ignore_ascii_case(END_PAGE_DISPLAY_NAME))
        || page_name.is_some_and(|name| name.ends_with(END_PAGE_NAME_SUFFIX));

    let merged_text = response_lines.join(" ").to_lowercase();
    let by_phrase = HANDOFF_MARKER_PHRASES
        .iter()
        .any(|phrase| merged_text.contains(phrase));

    EndFlags {
        by_end_intent: intent_ends_interaction,
        by_end_page,
        by_phrase,
    }
}
