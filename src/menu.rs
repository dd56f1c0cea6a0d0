//! Menu, order and confidence types shared by every pipeline stage.
//!
//! A [`Menu`] is fixed at configuration time and never mutated during a run.
//! Every [`RecognitionResult`] handed out by the intent extractor names an
//! element of the menu it was extracted against.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// MenuError
// ---------------------------------------------------------------------------

/// Reasons a configured item list cannot become a [`Menu`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MenuError {
    #[error("menu must contain at least one item")]
    Empty,

    #[error("duplicate menu item: {0:?}")]
    Duplicate(String),

    #[error("menu items must not be blank")]
    BlankItem,
}

// ---------------------------------------------------------------------------
// MenuItem
// ---------------------------------------------------------------------------

/// A single fulfillable order option, e.g. `"tuna"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuItem(String);

impl MenuItem {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MenuItem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

/// Ordered, non-empty set of distinct menu items.
///
/// ```rust
/// use voice_order::menu::Menu;
///
/// let menu = Menu::new(["egg", "tuna"]).unwrap();
/// assert!(menu.contains("tuna"));
/// assert!(!menu.contains("Tuna")); // membership is case-sensitive
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Menu {
    items: Vec<MenuItem>,
}

impl Menu {
    /// Build a menu, preserving the given order.
    pub fn new<I, S>(items: I) -> Result<Self, MenuError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<MenuItem> = Vec::new();
        for item in items {
            let item = item.into();
            if item.trim().is_empty() {
                return Err(MenuError::BlankItem);
            }
            if out.iter().any(|existing| existing.0 == item) {
                return Err(MenuError::Duplicate(item));
            }
            out.push(MenuItem(item));
        }
        if out.is_empty() {
            return Err(MenuError::Empty);
        }
        Ok(Self { items: out })
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false`; a menu cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Exact, case-sensitive membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Look up the item whose name equals `name` exactly.
    pub fn get(&self, name: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.0 == name)
    }

    /// Pick an item uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &MenuItem {
        &self.items[rng.gen_range(0..self.items.len())]
    }

    /// Stable JSON rendering (menu order) used inside prompts.
    pub fn to_json(&self) -> String {
        let names: Vec<&str> = self.items.iter().map(MenuItem::as_str).collect();
        serde_json::to_string(&names).unwrap_or_else(|_| "[]".into())
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Coarse certainty label attached to a recognized order.
///
/// `High`, `Medium` and `Low` are the values solicited from the
/// generative-language service; `Unknown` is used when the service omitted
/// the field (or sent something else).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Unknown,
}

impl Confidence {
    /// Parse a label reported by the service.  Unrecognised labels map to
    /// [`Confidence::Unknown`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RecognitionResult
// ---------------------------------------------------------------------------

/// The single order recognized from one transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub order: MenuItem,
    pub confidence: Confidence,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sushi() -> Menu {
        Menu::new(["egg", "tuna", "cucumber roll", "tempura (fried shrimp)"]).unwrap()
    }

    #[test]
    fn preserves_configured_order() {
        let menu = sushi();
        let names: Vec<&str> = menu.items().iter().map(MenuItem::as_str).collect();
        assert_eq!(names, ["egg", "tuna", "cucumber roll", "tempura (fried shrimp)"]);
    }

    #[test]
    fn empty_menu_is_rejected() {
        let err = Menu::new(Vec::<String>::new()).unwrap_err();
        assert_eq!(err, MenuError::Empty);
    }

    #[test]
    fn duplicate_item_is_rejected() {
        let err = Menu::new(["egg", "tuna", "egg"]).unwrap_err();
        assert_eq!(err, MenuError::Duplicate("egg".into()));
    }

    #[test]
    fn blank_item_is_rejected() {
        assert_eq!(Menu::new(["egg", "  "]).unwrap_err(), MenuError::BlankItem);
    }

    #[test]
    fn membership_is_exact() {
        let menu = sushi();
        assert!(menu.contains("cucumber roll"));
        assert!(!menu.contains("Cucumber Roll"));
        assert!(!menu.contains("cucumber"));
    }

    #[test]
    fn choose_always_returns_a_member() {
        let menu = sushi();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let item = menu.choose(&mut rng);
            assert!(menu.contains(item.as_str()));
        }
    }

    #[test]
    fn json_rendering_is_stable() {
        assert_eq!(
            sushi().to_json(),
            r#"["egg","tuna","cucumber roll","tempura (fried shrimp)"]"#
        );
    }

    #[test]
    fn confidence_labels() {
        assert_eq!(Confidence::from_label("high"), Confidence::High);
        assert_eq!(Confidence::from_label(" Medium "), Confidence::Medium);
        assert_eq!(Confidence::from_label("LOW"), Confidence::Low);
        assert_eq!(Confidence::from_label("certain"), Confidence::Unknown);
        assert_eq!(Confidence::Unknown.to_string(), "unknown");
    }
}
