//! Prompts sent to the vision model.
//!
//! Every prompt lives here so wording changes happen in one place and tests can
//! pin the exact text. Callers can replace the analysis instruction with
//! [`crate::config::AssistConfig::system_prompt`]; the constants here are used
//! only when no override is provided.

use crate::analysis::QaPair;
use crate::chat::{ChatMessage, ChatRole};

/// JSON shape the model must answer with.
///
/// Providers without native structured output only see this text, so the
/// field descriptions double as instructions.
pub const RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "documentTitle": { "type": "string" },
    "summary": { "type": "string" },
    "status": { "type": "string", "enum": ["COMPLETE", "NEEDS_DETAILS"] },
    "questions": {
      "type": "array",
      "items": { "type": "string" },
      "description": "List of 3-5 specific questions to ask the user if status is NEEDS_DETAILS. Empty if COMPLETE."
    },
    "markdownGuide": {
      "type": "string",
      "description": "The full markdown guide if status is COMPLETE. Null/Empty if NEEDS_DETAILS."
    },
    "filledFields": {
      "type": "array",
      "items": {
        "type": "object",
        "properties": {
          "value": { "type": "string", "description": "The text value to write" },
          "box_2d": {
            "type": "array",
            "items": { "type": "number" },
            "description": "[ymin, xmin, ymax, xmax] coordinates (0-1000 scale preferred)"
          }
        }
      },
      "description": "List of fields to overlay on the image. Only required if status is COMPLETE."
    }
  },
  "required": ["documentTitle", "summary", "status"]
}"#;

/// Analysis instruction without the schema appendix.
const ANALYSIS_INSTRUCTION: &str = r#"You are an expert Legal and Administrative Assistant.
Your goal is to analyze a form (government, insurance, tax, legal, etc.) and help the user fill it out.

You must output a JSON object.

Step 1: Identify the document type and provide a 1-sentence summary.
Step 2: Check the "User Context" provided.
   - If the form requires specific personal data (Name, SSN, Address, Income, etc.) to be filled effectively, AND the User Context is missing this data, your status is "NEEDS_DETAILS".
   - Generate a list of specific, polite questions to get this missing information.
   - NOTE: If the User Context explicitly says "Just explain the form" or "Generic guide", ignore missing details and set status to "COMPLETE".
Step 3: If the User Context is sufficient OR if you have received the answers to your previous questions, set status to "COMPLETE".
   - Generate a "markdownGuide" that tells them EXACTLY what to write.
   - Generate a "filledFields" array. For every visual field you identify in the form that needs user data, provide the value (based on user context) and the 2D bounding box [ymin, xmin, ymax, xmax] (scale 0-1000 or 0-1).
   - The bounding box should cover the blank space where the text should be written.

MARKDOWN GUIDE FORMAT (for "markdownGuide" field):
# [Title of Document]
## 📄 Document Summary
[Summary]
## 🧠 Jargon Buster
* **[Term]**: [Simple definition]
## ✍️ Auto-Fill Guide
| Field Name | What to Write | Reasoning |
| :--- | :--- | :--- |
| [Label] | **[Value based on user info]** | [Reasoning] |
...
## ⚠️ Critical Checklist
* [Checklist items]"#;

/// Opening sentence of every chat prompt.
pub const CHAT_PREAMBLE: &str = "You are a helpful expert assistant for this specific document. Answer the user's question clearly, concisely, and accurately based on the visual document provided.";

/// Default system instruction for analysis requests: the assistant
/// instruction followed by the response schema.
pub fn system_instruction() -> String {
    format!(
        "{ANALYSIS_INSTRUCTION}\n\nRespond with a single JSON object (no prose, no code fences) matching this JSON schema:\n{RESPONSE_SCHEMA}"
    )
}

/// User-turn text for an analysis request.
///
/// With an empty `qa_history` the model decides whether to ask questions;
/// otherwise it is told to produce the complete guide from the answers.
pub fn analysis_prompt(user_context: Option<&str>, qa_history: &[QaPair]) -> String {
    let mut prompt = String::from("Analyze this form.");

    match user_context.filter(|c| !c.is_empty()) {
        Some(ctx) => {
            prompt.push_str("\n\nINITIAL USER CONTEXT:\n");
            prompt.push_str(ctx);
        }
        None => prompt.push_str("\n\nINITIAL USER CONTEXT: None provided."),
    }

    if qa_history.is_empty() {
        prompt.push_str(
            "\n\nINSTRUCTION: Check if you have enough info to fill the main fields. If not, ask questions. If yes, generate the guide and coordinates.",
        );
    } else {
        prompt.push_str("\n\nFOLLOW-UP: The user has answered your request for more details.\n");
        for (i, pair) in qa_history.iter().enumerate() {
            prompt.push_str(&format!(
                "Q{}: {}\nA: {}\n",
                i + 1,
                pair.question,
                pair.answer
            ));
        }
        prompt.push_str(
            "\nBased on these answers, please generate the COMPLETE guide and FILLED FIELD coordinates now.",
        );
    }

    prompt
}

/// User-turn text for a chat question. The history is inlined because each
/// request is stateless.
pub fn chat_prompt(question: &str, history: &[ChatMessage]) -> String {
    let mut prompt = String::from(CHAT_PREAMBLE);

    if !history.is_empty() {
        prompt.push_str("\n\nChat History:");
        for msg in history {
            let speaker = match msg.role {
                ChatRole::User => "User",
                ChatRole::Model => "Assistant",
            };
            prompt.push_str(&format!("\n{}: {}", speaker, msg.text));
        }
    }

    prompt.push_str("\n\nUser Question: ");
    prompt.push_str(question);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_prompt_without_context() {
        assert_eq!(
            analysis_prompt(None, &[]),
            "Analyze this form.\n\nINITIAL USER CONTEXT: None provided.\n\nINSTRUCTION: Check if you have enough info to fill the main fields. If not, ask questions. If yes, generate the guide and coordinates."
        );
        assert_eq!(analysis_prompt(Some(""), &[]), analysis_prompt(None, &[]));
    }

    #[test]
    fn initial_prompt_with_context() {
        let p = analysis_prompt(Some("I'm a student renting in Berlin"), &[]);
        assert!(p.starts_with(
            "Analyze this form.\n\nINITIAL USER CONTEXT:\nI'm a student renting in Berlin\n\nINSTRUCTION:"
        ));
    }

    #[test]
    fn follow_up_prompt_numbers_pairs() {
        let history = vec![
            QaPair::new("What is your name?", "Jane Doe"),
            QaPair::new("What is your SSN?", "Not provided"),
        ];
        let p = analysis_prompt(Some("W-4 for new job"), &history);
        assert_eq!(
            p,
            "Analyze this form.\n\nINITIAL USER CONTEXT:\nW-4 for new job\
             \n\nFOLLOW-UP: The user has answered your request for more details.\n\
             Q1: What is your name?\nA: Jane Doe\n\
             Q2: What is your SSN?\nA: Not provided\n\
             \nBased on these answers, please generate the COMPLETE guide and FILLED FIELD coordinates now."
        );
        assert!(!p.contains("INSTRUCTION:"));
    }

    #[test]
    fn chat_prompt_without_history() {
        assert_eq!(
            chat_prompt("Where do I sign?", &[]),
            format!("{CHAT_PREAMBLE}\n\nUser Question: Where do I sign?")
        );
    }

    #[test]
    fn chat_prompt_labels_roles() {
        let history = vec![
            ChatMessage::model("Hi!"),
            ChatMessage::user("What is box 3?"),
            ChatMessage::model("Your filing status."),
        ];
        let p = chat_prompt("And box 4?", &history);
        assert!(p.contains(
            "\n\nChat History:\nAssistant: Hi!\nUser: What is box 3?\nAssistant: Your filing status.\n\nUser Question: And box 4?"
        ));
    }

    #[test]
    fn system_instruction_embeds_schema() {
        let s = system_instruction();
        assert!(s.starts_with("You are an expert Legal and Administrative Assistant."));
        assert!(s.contains("## ⚠️ Critical Checklist"));
        assert!(s.contains("\"NEEDS_DETAILS\""));
        assert!(s.ends_with(RESPONSE_SCHEMA));
    }

    #[test]
    fn schema_is_valid_json() {
        let v: serde_json::Value = serde_json::from_str(RESPONSE_SCHEMA).unwrap();
        assert_eq!(v["required"][2], "status");
    }
}
