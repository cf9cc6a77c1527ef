//! Gemini-backed entity extraction.
//!
//! Sends document text to the Gemini `generateContent` endpoint with a
//! prompt that constrains output to the FTM entity and relation classes
//! the graph understands, then maps the returned JSON into cleaned
//! extraction candidates.

use async_trait::async_trait;
use casefile_core::cleaning::PropertyCleaner;
use casefile_core::errors::LlmError;
use casefile_core::ingest::{json_object_to_properties, relation_slots};
use casefile_core::traits::EntityExtractor;
use casefile_core::types::{DocumentType, ExtractionCandidate};
use reqwest::Client;
use tracing::{debug, info, warn};

mod config;
mod models;

pub use config::GeminiConfig;
use models::*;

/// Entity classes the extractor may emit; relation classes come from the
/// relation-schema table.
const ENTITY_CLASSES: [&str; 5] = ["Person", "Company", "Organization", "Security", "Email"];

/// Gemini implementation of [`EntityExtractor`].
pub struct GeminiExtractor {
    client: Client,
    config: GeminiConfig,
    cleaner: PropertyCleaner,
}

impl GeminiExtractor {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Config(
                "Gemini API key is required for extraction".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| LlmError::Config(format!("Failed to create HTTP client: {err}")))?;
        Ok(Self {
            client,
            config,
            cleaner: PropertyCleaner::new(),
        })
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn prompt_for(document_type: DocumentType) -> String {
        let base = "Extract entities from the text in order of appearance. \
            Output Person, Company, Organization, Security, Email, Ownership, \
            Directorship, Employment, Associate, Family, Membership, Representation, \
            Payment, and UnknownLink entities. \
            Use exact text spans when possible. \
            For relation entities, extract FTM-compliant attributes when explicit: \
            startDate/endDate/date, role/status, summary/description, sourceUrl, percentage, \
            amount/currency, and relationship details. \
            Use relationship endpoints: Ownership(owner, asset), \
            Directorship(director, organization), Employment(employee, employer), \
            Associate(person, associate), Family(person, relative), \
            Membership(member, organization), Representation(agent, client), \
            Payment(payer, beneficiary), UnknownLink(subject, object). \
            When multiple mentions describe one relationship, \
            attach relationGroup with the same value.\n\
            Respond with a JSON array only. Each item: \
            {\"schema\": \"<class>\", \"span\": \"<exact text>\", \
            \"attributes\": {\"<property>\": \"<value>\"}, \
            \"confidence\": <0.0-1.0>, \"charStart\": <offset>, \"charEnd\": <offset>}.\n\
            Example for \"John Doe, CEO of Acme Corp\": \
            [{\"schema\": \"Person\", \"span\": \"John Doe\", \
            \"attributes\": {\"position\": \"CEO\"}}, \
            {\"schema\": \"Company\", \"span\": \"Acme Corp\", \"attributes\": {}}, \
            {\"schema\": \"Employment\", \"span\": \"John Doe, CEO of Acme Corp\", \
            \"attributes\": {\"employee\": \"John Doe\", \"employer\": \"Acme Corp\", \
            \"role\": \"CEO\"}}]";

        match document_type {
            DocumentType::SecFiling => format!(
                "{base} Prioritize issuers, executives, directors, securities, and \
                 subsidiaries mentioned in SEC filing sections."
            ),
            DocumentType::Email => format!(
                "{base} Prioritize sender/recipient people and organizations found in \
                 headers and message body."
            ),
            DocumentType::General => base.to_string(),
        }
    }

    fn allowed_class(schema: &str) -> bool {
        ENTITY_CLASSES.contains(&schema) || relation_slots(schema).is_some()
    }

    /// Parse the model's JSON array, tolerating markdown fences.
    fn parse_extractions(content: &str) -> Result<Vec<RawExtraction>, LlmError> {
        let cleaned = content
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        serde_json::from_str(cleaned).map_err(|err| {
            LlmError::ResponseParse(format!("Failed to parse JSON: {err}. Content: '{cleaned}'"))
        })
    }

    fn to_candidate(&self, raw: RawExtraction) -> Option<ExtractionCandidate> {
        let schema = raw.schema.trim().to_string();
        if !Self::allowed_class(&schema) {
            debug!("Dropping extraction with unknown class '{}'", schema);
            return None;
        }

        let mut properties = json_object_to_properties(&raw.attributes);
        if let Some(confidence) = raw.confidence {
            properties.set("confidence", vec![confidence.to_string()]);
        }
        if let Some(start) = raw.char_start {
            properties.set("charStart", vec![start.to_string()]);
        }
        if let Some(end) = raw.char_end {
            properties.set("charEnd", vec![end.to_string()]);
        }
        if let Some(span) = raw.span.as_deref() {
            let span = span.trim();
            if !span.is_empty() && properties.values("name").is_empty() {
                properties.set("name", vec![span.to_string()]);
            }
        }

        let properties = self.cleaner.clean(&properties);
        if properties.is_empty() {
            return None;
        }
        Some(ExtractionCandidate { schema, properties })
    }
}

#[async_trait]
impl EntityExtractor for GeminiExtractor {
    async fn extract(
        &self,
        text: &str,
        document_type: DocumentType,
    ) -> Result<Vec<ExtractionCandidate>, LlmError> {
        let prompt = Self::prompt_for(document_type);
        let request = ContentRequest {
            contents: vec![Content::user(format!("{prompt}\n\nText:\n{text}"))],
            generation_config: Some(GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
                response_mime_type: Some("application/json".to_string()),
            }),
        };

        let url = format!("{}?key={}", self.api_url(), self.config.api_key);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|err| LlmError::Network(format!("HTTP request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Api(format!(
                "Gemini API error {status}: {error_text}"
            )));
        }

        let body: ContentResponse = response
            .json()
            .await
            .map_err(|err| LlmError::ResponseParse(format!("Failed to parse response: {err}")))?;
        let content = body
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| LlmError::ResponseParse("No content in response".to_string()))?;

        let raw_extractions = Self::parse_extractions(&content)?;
        let total = raw_extractions.len();
        let candidates: Vec<ExtractionCandidate> = raw_extractions
            .into_iter()
            .filter_map(|raw| self.to_candidate(raw))
            .collect();
        if candidates.len() < total {
            warn!(
                "Dropped {} of {} extractions (unknown class or empty properties)",
                total - candidates.len(),
                total
            );
        }
        info!(
            "Gemini extraction produced {} candidates from {} chars",
            candidates.len(),
            text.len()
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn extractor_for(server_url: &str) -> GeminiExtractor {
        let config = GeminiConfig::new("test-key")
            .with_model("gemini-test")
            .with_api_base(server_url);
        GeminiExtractor::new(config).unwrap()
    }

    fn gemini_reply(payload: &str) -> serde_json::Value {
        json!({
            "candidates": [
                {"content": {"parts": [{"text": payload}], "role": "model"}}
            ]
        })
    }

    #[test]
    fn requires_an_api_key() {
        assert!(matches!(
            GeminiExtractor::new(GeminiConfig::default()),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn prompt_is_augmented_per_document_type() {
        let sec = GeminiExtractor::prompt_for(DocumentType::SecFiling);
        assert!(sec.contains("SEC filing"));
        let email = GeminiExtractor::prompt_for(DocumentType::Email);
        assert!(email.contains("sender/recipient"));
        let general = GeminiExtractor::prompt_for(DocumentType::General);
        assert!(!general.contains("SEC filing"));
    }

    #[test]
    fn parses_fenced_payloads() {
        let parsed = GeminiExtractor::parse_extractions(
            "```json\n[{\"schema\": \"Person\", \"span\": \"Jane\"}]\n```",
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].schema, "Person");
    }

    #[tokio::test]
    async fn maps_extractions_into_cleaned_candidates() {
        let server = MockServer::start().await;
        let payload = json!([
            {
                "schema": "Person",
                "span": "John Doe",
                "attributes": {"position": "CEO"},
                "confidence": 0.93,
                "charStart": 0,
                "charEnd": 8
            },
            {
                "schema": "Ownership",
                "span": "owns 9.8% of Amazon.com",
                "attributes": {
                    "owner": "Bezos Family Trust",
                    "asset": "Amazon.com",
                    "percentage": "9.8%"
                }
            },
            {"schema": "Spaceship", "span": "Falcon 9", "attributes": {}},
            {"schema": "Company", "span": "   ", "attributes": {}}
        ])
        .to_string();
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply(&payload)))
            .mount(&server)
            .await;

        let extractor = extractor_for(&server.uri());
        let candidates = extractor
            .extract("John Doe ...", DocumentType::General)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        let person = &candidates[0];
        assert_eq!(person.schema, "Person");
        assert_eq!(person.properties.values("name"), ["John Doe"]);
        assert_eq!(person.properties.values("confidence"), ["0.93"]);
        assert_eq!(person.properties.values("charStart"), ["0"]);

        let ownership = &candidates[1];
        assert_eq!(ownership.schema, "Ownership");
        // the cleaner normalized the percentage
        assert_eq!(ownership.properties.values("percentage"), ["9.8"]);
        assert_eq!(ownership.properties.values("name"), ["owns 9.8% of Amazon.com"]);
    }

    #[tokio::test]
    async fn api_failures_surface_as_llm_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let extractor = extractor_for(&server.uri());
        let err = extractor
            .extract("text", DocumentType::General)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn garbage_payloads_are_parse_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply("not json at all")),
            )
            .mount(&server)
            .await;

        let extractor = extractor_for(&server.uri());
        let err = extractor
            .extract("text", DocumentType::General)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ResponseParse(_)));
    }
}
