use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{
    AdAssets, AdCreative, FunnelContent, FunnelStage, FunnelStageCreative, GenerationRequest,
    KeywordSet, Page, Sitelink, CALLOUTS_PER_STAGE, DESCRIPTIONS_PER_STAGE, DESCRIPTION_MAX_CHARS,
    HEADLINES_PER_STAGE, HEADLINE_MAX_CHARS, KEYWORDS_PER_MATCH_TYPE_MAX,
    KEYWORDS_PER_MATCH_TYPE_MIN, SITELINKS_PER_STAGE,
};
use crate::prompt::{build_generation_prompt, resolved_tofu_link, response_schema};

const MODEL: &str = "gemini-2.5-flash";
pub const DEMO_KEY: &str = "DEMO_KEY";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("the generation service returned an empty response")]
    EmptyResponse,
    #[error("the generation service response could not be parsed: {0}")]
    MalformedResponse(String),
    #[error("the generation service response is missing the `{0}` section")]
    IncompleteResponse(&'static str),
    #[error("generation service call failed: {0}")]
    ServiceError(String),
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    /// One generation call: prompt plus required response schema in, a
    /// normalized funnel result or a classified failure out. No retry; a
    /// fresh user-triggered generation is the retry.
    pub async fn generate_funnel(
        &self,
        request: &GenerationRequest,
    ) -> Result<FunnelContent, GenerationError> {
        if self.api_key == DEMO_KEY {
            info!("demo mode, fabricating funnel content locally");
            return Ok(demo_funnel(request));
        }

        let prompt = build_generation_prompt(request);
        let body = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
                "temperature": 0.7,
                "candidateCount": 1
            }
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, MODEL, self.api_key
        );
        info!("requesting funnel generation from {}", url.replace(&self.api_key, "***"));

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::ServiceError(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| GenerationError::ServiceError(e.to_string()))?;

        if !status.is_success() {
            error!("generation service returned status {status}: {response_text}");
            return Err(GenerationError::ServiceError(format!(
                "status={status} body={response_text}"
            )));
        }

        let payload_text = extract_payload_text(&response_text)?;
        let payload = parse_generation_payload(&payload_text)?;
        check_creative_contract(&payload.ad_creative);
        Ok(normalize(payload))
    }
}

// --- Response parsing ---

/// Raw structured result, exactly as the schema requires it on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    pages: RawPages,
    ad_creative: AdCreative,
}

#[derive(Debug, Deserialize)]
struct RawPages {
    tofu: String,
    mofu: String,
    bofu: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(Value),
}

/// Pulls the first text part out of the service envelope. An unparseable
/// envelope is a malformed body; an envelope with no text yields an empty
/// payload, classified downstream.
fn extract_payload_text(body: &str) -> Result<String, GenerationError> {
    if body.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    let envelope: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("unexpected envelope: {e}")))?;
    let text = envelope
        .candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .find_map(|p| match p {
            Part::Text { text } => Some(text.clone()),
            Part::Other(_) => None,
        })
        .unwrap_or_default();
    Ok(text)
}

/// Classifies the payload text: empty, unparseable, missing a top-level
/// section, or shape-violating — in that order.
pub fn parse_generation_payload(text: &str) -> Result<GenerationPayload, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
    if value.get("pages").is_none() {
        return Err(GenerationError::IncompleteResponse("pages"));
    }
    if value.get("adCreative").is_none() {
        return Err(GenerationError::IncompleteResponse("adCreative"));
    }
    serde_json::from_value(value).map_err(|e| GenerationError::MalformedResponse(e.to_string()))
}

/// Pure mapping from the validated payload into domain entities. Page HTML
/// passes through untouched; the creative is already in domain shape.
pub fn normalize(payload: GenerationPayload) -> FunnelContent {
    let GenerationPayload { pages, ad_creative } = payload;
    let mut keyed = BTreeMap::new();
    for (stage, html_content) in [
        (FunnelStage::Tofu, pages.tofu),
        (FunnelStage::Mofu, pages.mofu),
        (FunnelStage::Bofu, pages.bofu),
    ] {
        keyed.insert(stage, Page { stage, html_content });
    }
    FunnelContent {
        pages: keyed,
        ad_creative,
    }
}

/// The count/length contract is instructed, not enforced: deviations are
/// logged so the looseness is observable, and the data is kept as-is.
fn check_creative_contract(creative: &AdCreative) {
    for stage in FunnelStage::ALL {
        let FunnelStageCreative { keywords, ad_assets } = creative.for_stage(stage);
        let stage = stage.key();

        if ad_assets.headlines.len() != HEADLINES_PER_STAGE {
            warn!(stage, count = ad_assets.headlines.len(), "unexpected headline count");
        }
        if let Some(h) = ad_assets
            .headlines
            .iter()
            .find(|h| h.chars().count() > HEADLINE_MAX_CHARS)
        {
            warn!(stage, headline = %h, "headline over {HEADLINE_MAX_CHARS} chars");
        }
        if ad_assets.descriptions.len() != DESCRIPTIONS_PER_STAGE {
            warn!(stage, count = ad_assets.descriptions.len(), "unexpected description count");
        }
        if ad_assets
            .descriptions
            .iter()
            .any(|d| d.chars().count() > DESCRIPTION_MAX_CHARS)
        {
            warn!(stage, "description over {DESCRIPTION_MAX_CHARS} chars");
        }
        if ad_assets.callouts.len() != CALLOUTS_PER_STAGE {
            warn!(stage, count = ad_assets.callouts.len(), "unexpected callout count");
        }
        if ad_assets.sitelinks.len() != SITELINKS_PER_STAGE {
            warn!(stage, count = ad_assets.sitelinks.len(), "unexpected sitelink count");
        }
        for (match_type, bucket) in [
            ("broad", &keywords.broad),
            ("phrase", &keywords.phrase),
            ("exact", &keywords.exact),
        ] {
            let in_range = (KEYWORDS_PER_MATCH_TYPE_MIN..=KEYWORDS_PER_MATCH_TYPE_MAX)
                .contains(&bucket.len());
            if !in_range {
                warn!(stage, match_type, count = bucket.len(), "keyword count out of range");
            }
        }
    }
}

// --- Demo mode ---

/// Deterministic stand-in funnel so the whole flow works without an API key.
fn demo_funnel(request: &GenerationRequest) -> FunnelContent {
    let mut pages = BTreeMap::new();
    for stage in FunnelStage::ALL {
        let cta = match stage {
            FunnelStage::Tofu => resolved_tofu_link(request),
            _ => request.primary_link.as_str(),
        };
        let html_content = format!(
            "<!DOCTYPE html>\n<html><body class=\"bg-white text-gray-900\">\
             <main class=\"max-w-2xl mx-auto p-8\">\
             <h1 class=\"text-3xl font-bold\">{label}</h1>\
             <p class=\"mt-4\">Demo page generated without an API key.</p>\
             <a href=\"{cta}\" target=\"_blank\" rel=\"noopener noreferrer\" \
             class=\"mt-6 inline-block bg-cyan-600 text-white px-6 py-3 rounded-lg\">Learn more</a>\
             </main>\
             <footer class=\"p-4 text-xs text-gray-500\">Terms Of Use | Disclaimer | Privacy Policy</footer>\
             </body></html>",
            label = stage.label(),
        );
        pages.insert(stage, Page { stage, html_content });
    }

    let creative = |stage: FunnelStage| {
        let key = stage.key();
        FunnelStageCreative {
            keywords: KeywordSet {
                broad: (1..=KEYWORDS_PER_MATCH_TYPE_MIN)
                    .map(|i| format!("{key} broad keyword {i}"))
                    .collect(),
                phrase: (1..=KEYWORDS_PER_MATCH_TYPE_MIN)
                    .map(|i| format!("{key} phrase keyword {i}"))
                    .collect(),
                exact: (1..=KEYWORDS_PER_MATCH_TYPE_MIN)
                    .map(|i| format!("{key} exact keyword {i}"))
                    .collect(),
            },
            ad_assets: AdAssets {
                headlines: (1..=HEADLINES_PER_STAGE)
                    .map(|i| format!("Demo {key} headline {i}"))
                    .collect(),
                descriptions: (1..=DESCRIPTIONS_PER_STAGE)
                    .map(|i| format!("Demo {key} description {i} with room for detail."))
                    .collect(),
                callouts: (1..=CALLOUTS_PER_STAGE)
                    .map(|i| format!("Demo callout {i}"))
                    .collect(),
                sitelinks: (1..=SITELINKS_PER_STAGE)
                    .map(|i| Sitelink {
                        title: format!("Sitelink {i}"),
                        description1: "First description line.".into(),
                        description2: "Second description line.".into(),
                    })
                    .collect(),
            },
        }
    };

    FunnelContent {
        pages,
        ad_creative: AdCreative {
            tofu: creative(FunnelStage::Tofu),
            mofu: creative(FunnelStage::Mofu),
            bofu: creative(FunnelStage::Bofu),
        },
    }
}
