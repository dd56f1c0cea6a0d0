//! Prompt builder for menu-constrained order recognition.
//!
//! The prompt is fully deterministic: the same menu and transcript always
//! produce byte-identical text.

use crate::menu::Menu;

const PREAMBLE: &str = "\
The following is a transcribed text of a customer's spoken order.
Recognize the ordered item from this text and return it in JSON format.";

const INSTRUCTIONS: &str = "\
Instructions:
1. Identify ONLY ONE item that the customer ordered from the menu.
2. If multiple items are mentioned, select only the first or most prominent one.
3. If the customer asks for a recommendation, a suggestion, or \"your choice\", return \"recommendation\": true.
4. If the text is unclear, choose the menu item with the most similar pronunciation.
5. The \"order\" value must be copied exactly from the menu.
6. Return exactly one JSON object in the following format, with no other explanation:";

const RESPONSE_SHAPE: &str = r#"{
    "order": "single menu item name",
    "recommendation": true or false,
    "confidence": "high" or "medium" or "low"
}"#;

/// Builds the order-recognition prompt.
///
/// ```rust
/// use voice_order::llm::OrderPromptBuilder;
/// use voice_order::menu::Menu;
///
/// let menu = Menu::new(["egg", "tuna"]).unwrap();
/// let prompt = OrderPromptBuilder::new().build("one tuna please", &menu);
/// assert!(prompt.contains(r#"["egg","tuna"]"#));
/// assert!(prompt.contains("\"one tuna please\""));
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrderPromptBuilder;

impl OrderPromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Embed `menu` (as a JSON array in menu order) and `transcript` into
    /// the recognition prompt.
    pub fn build(&self, transcript: &str, menu: &Menu) -> String {
        format!(
            "{PREAMBLE}\n\nAvailable menu:\n{menu}\n\nCustomer's statement:\n\"{transcript}\"\n\n{INSTRUCTIONS}\n\n{RESPONSE_SHAPE}\n",
            menu = menu.to_json(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
