//! Built-in instructions and task prompts

/// Instructions for the tool-calling profile
pub const TOOL_CALLING_INSTRUCTIONS: &str = "You are a helpful agent that can create Speakers \
     and Events in Dataverse by using the tools create_speaker and create_event.";

/// Default instructions for the code-generation profile
pub const CODEGEN_INSTRUCTIONS: &str = include_str!("../../prompts/codegen.md");

/// Task text that precedes the past-events listing in an import run
pub const IMPORT_PROMPT: &str = "Please go through these past events and create the Events \
     and Speakers in Dataverse. After creating each Event or Speaker, make sure that it returns \
     'OK', before continuing to the next one. When done with all, just say 'Done!'";

/// Import task for the given past-events listing
pub fn build_import_task(past_events: &str) -> String {
    format!("{}\n\n{}", IMPORT_PROMPT, past_events.trim_end())
}

/// System prompt with the tool list appended
pub fn build_system_prompt(instructions: &str, tool_names: &[&str]) -> String {
    if tool_names.is_empty() {
        return instructions.trim_end().to_string();
    }
    format!(
        "{}\n\nAvailable tools: {}",
        instructions.trim_end(),
        tool_names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_task_keeps_listing() {
        let task = build_import_task("2024-03-14 Stockholm: Ada Lovelace\n");
        assert!(task.starts_with("Please go through these past events"));
        assert!(task.ends_with("Ada Lovelace"));
    }

    #[test]
    fn test_system_prompt_lists_tools() {
        let prompt = build_system_prompt(TOOL_CALLING_INSTRUCTIONS, &["create_event", "create_speaker"]);
        assert!(prompt.ends_with("Available tools: create_event, create_speaker"));
        assert_eq!(build_system_prompt("hi\n", &[]), "hi");
    }

    #[test]
    fn test_codegen_instructions_document_functions() {
        for name in ["who_am_i", "execute_fetch", "create_speaker", "create_event"] {
            assert!(CODEGEN_INSTRUCTIONS.contains(name), "missing {}", name);
        }
    }
}
