//! Menu-constrained order recognition with a guaranteed in-menu result.
//!
//! [`IntentExtractor::extract_order`] never fails.  The service round-trip
//! produces an [`Extraction`]; [`decide`] then maps every possible
//! extraction onto a [`RecognitionResult`] whose order is a menu element:
//!
//! | extraction                                  | order            | confidence          |
//! |---------------------------------------------|------------------|---------------------|
//! | `Parsed`, `recommendation == true`          | random menu item | as reported         |
//! | `Parsed`, order is an exact menu element    | that item        | as reported         |
//! | `Parsed`, order absent or off-menu          | random menu item | `low`               |
//! | `Degraded(_)`                               | random menu item | `low`               |
//!
//! "As reported" means [`Confidence::Unknown`] when the field was omitted.

use std::sync::Arc;

use rand::Rng;

use crate::config::LlmConfig;
use crate::llm::client::{client_from_config, GenerativeClient, LlmError};
use crate::llm::prompt::OrderPromptBuilder;
use crate::llm::response::{parse_reply, ParsedReply};
use crate::menu::{Confidence, Menu, RecognitionResult};

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Why the service could not produce a usable reply.
#[derive(Debug)]
pub enum DegradedReason {
    /// No API key configured; the service was not called.
    NoCredential,
    /// The request failed.
    Service(LlmError),
    /// The reply was not a JSON object.
    Malformed(String),
}

/// Outcome of one service round-trip.
#[derive(Debug)]
pub enum Extraction {
    Parsed(ParsedReply),
    Degraded(DegradedReason),
}

/// Map an extraction onto an in-menu recognition result.
pub fn decide<R: Rng + ?Sized>(
    extraction: Extraction,
    menu: &Menu,
    rng: &mut R,
) -> RecognitionResult {
    let reply = match extraction {
        Extraction::Parsed(reply) => reply,
        Extraction::Degraded(reason) => {
            log::warn!("extractor: falling back to a random item ({reason:?})");
            return fallback(menu, rng);
        }
    };

    let reported = reply
        .confidence
        .as_deref()
        .map(Confidence::from_label)
        .unwrap_or(Confidence::Unknown);

    if reply.recommendation {
        let order = menu.choose(rng).clone();
        log::info!("extractor: recommendation requested, suggesting '{order}'");
        return RecognitionResult {
            order,
            confidence: reported,
        };
    }

    match reply.order.as_deref().and_then(|name| menu.get(name)) {
        Some(item) => RecognitionResult {
            order: item.clone(),
            confidence: reported,
        },
        None => {
            log::warn!(
                "extractor: reply order {:?} is not on the menu, falling back",
                reply.order
            );
            fallback(menu, rng)
        }
    }
}

fn fallback<R: Rng + ?Sized>(menu: &Menu, rng: &mut R) -> RecognitionResult {
    RecognitionResult {
        order: menu.choose(rng).clone(),
        confidence: Confidence::Low,
    }
}

// ---------------------------------------------------------------------------
// IntentExtractor
// ---------------------------------------------------------------------------

/// Sends the transcript and menu to the generative service and turns its
/// reply into a [`RecognitionResult`].
pub struct IntentExtractor {
    client: Option<Arc<dyn GenerativeClient>>,
    prompt: OrderPromptBuilder,
}

impl IntentExtractor {
    /// `client == None` means no credential is configured; every call then
    /// falls back without contacting the service.
    pub fn new(client: Option<Arc<dyn GenerativeClient>>) -> Self {
        Self {
            client,
            prompt: OrderPromptBuilder::new(),
        }
    }

    /// Build the client for `config.provider` when a credential is
    /// available.
    pub fn from_config(config: &LlmConfig) -> Self {
        let extractor =
            Self::from_credential(config.credential(), |key| client_from_config(config, key));
        if !extractor.has_credential() {
            log::warn!(
                "extractor: no API key (set llm.api_key or ${}); orders will be chosen at random",
                config.api_key_env
            );
        }
        extractor
    }

    /// `connect` runs only when `credential` is present.
    pub fn from_credential<F>(credential: Option<String>, connect: F) -> Self
    where
        F: FnOnce(String) -> Arc<dyn GenerativeClient>,
    {
        Self::new(credential.map(connect))
    }

    pub fn has_credential(&self) -> bool {
        self.client.is_some()
    }

    /// Recognize one order from `transcript`.  Always returns a menu element.
    pub async fn extract_order(&self, transcript: &str, menu: &Menu) -> RecognitionResult {
        let extraction = self.query(transcript, menu).await;
        let mut rng = rand::thread_rng();
        decide(extraction, menu, &mut rng)
    }

    async fn query(&self, transcript: &str, menu: &Menu) -> Extraction {
        let Some(client) = &self.client else {
            return Extraction::Degraded(DegradedReason::NoCredential);
        };

        let prompt = self.prompt.build(transcript, menu);
        let raw = match client.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("extractor: service error: {e}");
                return Extraction::Degraded(DegradedReason::Service(e));
            }
        };
        log::debug!("extractor: raw reply {raw:?}");

        match parse_reply(&raw) {
            Ok(reply) => Extraction::Parsed(reply),
            Err(reason) => {
                log::warn!("extractor: could not parse reply: {reason}");
                Extraction::Degraded(DegradedReason::Malformed(reason))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Replies with a fixed text (or error) and counts calls.
#[cfg(test)]
pub struct ScriptedClient {
    reply: Result<String, String>,
    pub calls: std::sync::atomic::AtomicUsize,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ScriptedClient {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: Default::default(),
            prompts: Default::default(),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            calls: Default::default(),
            prompts: Default::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl GenerativeClient for ScriptedClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(LlmError::Request)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sushi_menu() -> Menu {
        Menu::new(["egg", "tuna", "cucumber roll", "tempura (fried shrimp)"]).unwrap()
    }

    fn extractor_with(client: &Arc<ScriptedClient>) -> IntentExtractor {
        let dyn_client: Arc<dyn GenerativeClient> = client.clone();
        IntentExtractor::new(Some(dyn_client))
    }

    // --- end-to-end through a scripted service ---

    #[tokio::test]
    async fn tuna_reply_is_recognized_with_reported_confidence() {
        let client = Arc::new(ScriptedClient::replying(
            "```json\n{\"order\": \"tuna\", \"recommendation\": false, \"confidence\": \"high\"}\n```",
        ));
        let result = extractor_with(&client)
            .extract_order("I'd like the tuna please", &sushi_menu())
            .await;

        assert_eq!(result.order.as_str(), "tuna");
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(client.call_count(), 1);
        assert!(client.prompts.lock().unwrap()[0].contains("I'd like the tuna please"));
    }

    #[tokio::test]
    async fn malformed_reply_falls_back_low() {
        let client = Arc::new(ScriptedClient::replying("Sorry, I can't help with that."));
        let menu = sushi_menu();
        let result = extractor_with(&client).extract_order("uh", &menu).await;

        assert!(menu.contains(result.order.as_str()));
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn off_menu_salmon_falls_back_low() {
        let client = Arc::new(ScriptedClient::replying(
            "{\"order\": \"salmon\", \"confidence\": \"high\"}",
        ));
        let menu = sushi_menu();
        let result = extractor_with(&client).extract_order("salmon please", &menu).await;

        assert_ne!(result.order.as_str(), "salmon");
        assert!(menu.contains(result.order.as_str()));
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn service_error_falls_back_low() {
        let client = Arc::new(ScriptedClient::failing("connection refused"));
        let menu = sushi_menu();
        let result = extractor_with(&client).extract_order("egg", &menu).await;

        assert!(menu.contains(result.order.as_str()));
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn no_credential_never_calls_service() {
        let config = unconfigured_llm();
        let client = Arc::new(ScriptedClient::replying("{\"order\": \"egg\"}"));
        let wired = client.clone();
        let extractor = IntentExtractor::from_credential(config.credential(), move |_| {
            let dyn_client: Arc<dyn GenerativeClient> = wired;
            dyn_client
        });
        assert!(!extractor.has_credential());

        let menu = sushi_menu();
        let result = extractor.extract_order("egg", &menu).await;

        assert!(menu.contains(result.order.as_str()));
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn credential_wires_the_client_in() {
        let client = Arc::new(ScriptedClient::replying("{\"order\": \"egg\"}"));
        let wired = client.clone();
        let extractor = IntentExtractor::from_credential(Some("key".into()), move |key| {
            assert_eq!(key, "key");
            let dyn_client: Arc<dyn GenerativeClient> = wired;
            dyn_client
        });
        assert!(extractor.has_credential());

        let result = extractor.extract_order("egg", &sushi_menu()).await;

        assert_eq!(result.order.as_str(), "egg");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn from_config_without_key_falls_back_low() {
        let extractor = IntentExtractor::from_config(&unconfigured_llm());
        assert!(!extractor.has_credential());

        let menu = sushi_menu();
        let result = extractor.extract_order("tuna please", &menu).await;

        assert!(menu.contains(result.order.as_str()));
        assert_eq!(result.confidence, Confidence::Low);
    }

    fn unconfigured_llm() -> LlmConfig {
        LlmConfig {
            api_key: None,
            api_key_env: "VOICE_ORDER_TEST_UNSET_API_KEY".into(),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn missing_confidence_is_unknown() {
        let client = Arc::new(ScriptedClient::replying("{\"order\": \"egg\"}"));
        let result = extractor_with(&client).extract_order("egg", &sushi_menu()).await;
        assert_eq!(result.order.as_str(), "egg");
        assert_eq!(result.confidence, Confidence::Unknown);
    }

    // --- decide ---

    #[test]
    fn recommendation_keeps_reported_confidence() {
        let menu = sushi_menu();
        let mut rng = StdRng::seed_from_u64(7);
        let reply = ParsedReply {
            order: Some("chef's choice".into()),
            confidence: Some("medium".into()),
            recommendation: true,
        };
        let result = decide(Extraction::Parsed(reply), &menu, &mut rng);
        assert!(menu.contains(result.order.as_str()));
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn membership_is_case_sensitive() {
        let menu = sushi_menu();
        let mut rng = StdRng::seed_from_u64(1);
        let reply = ParsedReply {
            order: Some("Tuna".into()),
            confidence: Some("high".into()),
            recommendation: false,
        };
        let result = decide(Extraction::Parsed(reply), &menu, &mut rng);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[test]
    fn unrecognised_confidence_label_is_unknown() {
        let menu = sushi_menu();
        let mut rng = StdRng::seed_from_u64(1);
        let reply = ParsedReply {
            order: Some("egg".into()),
            confidence: Some("very sure".into()),
            recommendation: false,
        };
        let result = decide(Extraction::Parsed(reply), &menu, &mut rng);
        assert_eq!(result.confidence, Confidence::Unknown);
    }

    #[test]
    fn every_reply_yields_a_menu_item() {
        let menu = sushi_menu();
        let mut rng = StdRng::seed_from_u64(42);
        let replies = [
            "",
            "null",
            "42",
            "{\"order\": null}",
            "{\"order\": \"\"}",
            "{\"order\": \"salmon\"}",
            "{\"order\": \"egg \"}",
            "{\"order\": \"cucumber roll\", \"confidence\": \"low\"}",
            "```json\n{\"order\": \"tempura (fried shrimp)\"}\n```",
            "{\"recommendation\": true}",
            "```\nnot json\n```",
        ];

        for raw in replies {
            let extraction = match parse_reply(raw) {
                Ok(reply) => Extraction::Parsed(reply),
                Err(reason) => Extraction::Degraded(DegradedReason::Malformed(reason)),
            };
            let result = decide(extraction, &menu, &mut rng);
            assert!(
                menu.contains(result.order.as_str()),
                "{raw:?} produced off-menu {}",
                result.order
            );
        }
    }
}
