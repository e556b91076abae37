//! Builds the generation instruction and the structural contract the
//! generation service must answer with. Pure string/JSON assembly; input is
//! validated upstream, so nothing here can fail.

use serde_json::{json, Value};

use crate::models::{
    GenerationRequest, ImageSource, TofuLinkSource, CALLOUTS_PER_STAGE, DESCRIPTIONS_PER_STAGE,
    DESCRIPTION_MAX_CHARS, HEADLINES_PER_STAGE, HEADLINE_MAX_CHARS, KEYWORDS_PER_MATCH_TYPE_MAX,
    KEYWORDS_PER_MATCH_TYPE_MIN, SITELINKS_PER_STAGE,
};

/// CTA link for the TOFU page: the secondary link when it is both selected
/// and present, the primary link otherwise. MOFU and BOFU always use the
/// primary link.
pub fn resolved_tofu_link(request: &GenerationRequest) -> &str {
    match request.tofu_link_source {
        TofuLinkSource::Secondary if !request.secondary_link.is_empty() => &request.secondary_link,
        _ => &request.primary_link,
    }
}

/// Exactly one of three branches: inline data, external URL, or stock-image
/// fallback.
fn image_directive(image: &ImageSource) -> String {
    match image {
        ImageSource::Inline { data, mime_type } => format!(
            "**PRODUCT IMAGE (for the MOFU & BOFU pages):**\n\
             The user uploaded a product image, supplied here as base64 data. You MUST use this \
             exact image on the MOFU and BOFU pages with the HTML syntax \
             `<img src=\"data:{mime_type};base64,{data}\" alt=\"[Product Name]\">`, replacing \
             [Product Name] with the product name you extract. Place it prominently, near the \
             main headline or the primary call to action."
        ),
        ImageSource::Url { url } => format!(
            "**PRODUCT IMAGE (for the MOFU & BOFU pages):**\n\
             The user supplied a product image URL. You MUST use this exact image on the MOFU \
             and BOFU pages with the HTML syntax `<img src=\"{url}\" alt=\"[Product Name]\">`, \
             replacing [Product Name] with the product name you extract. Place it prominently, \
             near the main headline or the primary call to action."
        ),
        ImageSource::None => "**PRODUCT IMAGE (for the MOFU & BOFU pages):**\n\
             No product image was supplied. Select a high-quality stock image that best \
             represents the product itself: if the product information contains image URLs, use \
             them, otherwise use `https://source.unsplash.com/800x600/?<product-keywords>` with \
             keywords drawn from your analysis."
            .to_string(),
    }
}

/// The full natural-language instruction for one generation.
pub fn build_generation_prompt(request: &GenerationRequest) -> String {
    let primary_link = &request.primary_link;
    let tofu_link = resolved_tofu_link(request);
    let language = request.language.display_name();
    let image_instruction = image_directive(&request.product_image);
    let product_description = &request.product_description;

    format!(
        "**ROLE & OBJECTIVE:** You are an expert marketer, web developer, and search-ads \
         specialist. Generate three distinct landing pages (TOFU, MOFU, BOFU) AND a complete \
         set of search-ad assets for each funnel stage, all in {language}. The final output \
         must be a single valid JSON object.\n\
         \n\
         **ANALYSIS (Step 1):** Deeply analyze the product information below and extract: the \
         product name, the target audience, the core problem the product solves, and the 5-7 \
         most important keywords describing its benefits and features.\n\
         \n\
         **PRODUCT INFORMATION (source of truth):**\n\
         ---\n\
         {product_description}\n\
         ---\n\
         \n\
         {image_instruction}\n\
         \n\
         **PAGE GENERATION (Step 2):** Using only the insights from your analysis, produce the \
         HTML for the three pages. Each page value (\"tofu\", \"mofu\", \"bofu\") must be one \
         string of complete, responsive, mobile-first HTML styled with inline Tailwind CSS \
         classes only, no <style> tags. Every page must carry a footer with \"Terms Of Use\", \
         \"Disclaimer\" and \"Privacy Policy\" links and the standard affiliate disclaimer \
         texts.\n\
         - Affiliate link for MOFU & BOFU CTAs: {primary_link}\n\
         - TOFU page CTA link: {tofu_link}\n\
         - Every CTA anchor must open in a new tab (`target=\"_blank\"` with \
         `rel=\"noopener noreferrer\"`).\n\
         - TOFU (problem awareness): an engaging blog-style article educating the reader about \
         the core problem, with a soft CTA using the TOFU page CTA link, and a 1024x1024 \
         AI-generated illustration of the core problem using \
         `<img src=\"https://image.pollinations.ai/prompt/{{URL_ENCODED_PROMPT}}?width=1024&height=1024\" alt=\"...\">`.\n\
         - MOFU (solution comparison): a professional review page (what it is, how it works, \
         benefits, testimonials) positioning the product as the best solution, with a clear \
         CTA button on the affiliate link and the image from the PRODUCT IMAGE instruction.\n\
         - BOFU (direct conversion): a high-urgency sales page (scarcity, social proof) driving \
         an immediate sale, with a compelling CTA button on the affiliate link and the image \
         from the PRODUCT IMAGE instruction.\n\
         \n\
         **AD CREATIVE (Step 3):** For EACH funnel stage, generate search-ad assets highly \
         congruent with that stage's landing page:\n\
         - Keywords: {keywords_min}-{keywords_max} per match type (broad, phrase, exact). TOFU \
         keywords are problem-focused, MOFU keywords are solution/category-focused, BOFU \
         keywords are brand/purchase-intent focused.\n\
         - Headlines: EXACTLY {headlines} unique headlines of {headline_chars} characters or \
         less each.\n\
         - Descriptions: EXACTLY {descriptions} unique descriptions of {description_chars} \
         characters or less each.\n\
         - Callouts: EXACTLY {callouts} unique concise callouts.\n\
         - Sitelinks: EXACTLY {sitelinks} unique sitelinks, each with a title, description1 and \
         description2.\n\
         \n\
         **OUTPUT:** Respond with a single valid JSON object following the supplied schema. Do \
         not add any text or markdown before or after the JSON object.",
        keywords_min = KEYWORDS_PER_MATCH_TYPE_MIN,
        keywords_max = KEYWORDS_PER_MATCH_TYPE_MAX,
        headlines = HEADLINES_PER_STAGE,
        headline_chars = HEADLINE_MAX_CHARS,
        descriptions = DESCRIPTIONS_PER_STAGE,
        description_chars = DESCRIPTION_MAX_CHARS,
        callouts = CALLOUTS_PER_STAGE,
        sitelinks = SITELINKS_PER_STAGE,
    )
}

fn string_array() -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" } })
}

fn keyword_set_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "broad": string_array(),
            "phrase": string_array(),
            "exact": string_array(),
        },
        "required": ["broad", "phrase", "exact"],
    })
}

fn ad_assets_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "headlines": string_array(),
            "descriptions": string_array(),
            "callouts": string_array(),
            "sitelinks": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": { "type": "STRING" },
                        "description1": { "type": "STRING" },
                        "description2": { "type": "STRING" },
                    },
                    "required": ["title", "description1", "description2"],
                },
            },
        },
        "required": ["headlines", "descriptions", "callouts", "sitelinks"],
    })
}

fn stage_creative_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "keywords": keyword_set_schema(),
            "adAssets": ad_assets_schema(),
        },
        "required": ["keywords", "adAssets"],
    })
}

/// Machine-checkable response schema handed to the generation service: an
/// object with a `pages` string per stage and an `adCreative` section per
/// stage, everything required.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "pages": {
                "type": "OBJECT",
                "properties": {
                    "tofu": { "type": "STRING", "description": "Complete HTML for the TOFU page." },
                    "mofu": { "type": "STRING", "description": "Complete HTML for the MOFU page." },
                    "bofu": { "type": "STRING", "description": "Complete HTML for the BOFU page." },
                },
                "required": ["tofu", "mofu", "bofu"],
            },
            "adCreative": {
                "type": "OBJECT",
                "properties": {
                    "tofu": stage_creative_schema(),
                    "mofu": stage_creative_schema(),
                    "bofu": stage_creative_schema(),
                },
                "required": ["tofu", "mofu", "bofu"],
            },
        },
        "required": ["pages", "adCreative"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Language;
    use pretty_assertions::assert_eq;

    fn request() -> GenerationRequest {
        GenerationRequest {
            primary_link: "https://x.com/aff".into(),
            product_description: "Great widget".into(),
            language: Language::Portuguese,
            ..Default::default()
        }
    }

    #[test]
    fn tofu_cta_uses_primary_link_by_default() {
        let request = request();
        assert_eq!(resolved_tofu_link(&request), "https://x.com/aff");

        let prompt = build_generation_prompt(&request);
        assert!(prompt.contains("Affiliate link for MOFU & BOFU CTAs: https://x.com/aff"));
        assert!(prompt.contains("TOFU page CTA link: https://x.com/aff"));
    }

    #[test]
    fn tofu_cta_uses_secondary_link_when_selected_and_present() {
        let mut request = request();
        request.tofu_link_source = TofuLinkSource::Secondary;
        request.secondary_link = "https://vsl.com/aff".into();
        assert_eq!(resolved_tofu_link(&request), "https://vsl.com/aff");

        let prompt = build_generation_prompt(&request);
        assert!(prompt.contains("Affiliate link for MOFU & BOFU CTAs: https://x.com/aff"));
        assert!(prompt.contains("TOFU page CTA link: https://vsl.com/aff"));
    }

    #[test]
    fn tofu_cta_falls_back_to_primary_when_secondary_missing() {
        let mut request = request();
        request.tofu_link_source = TofuLinkSource::Secondary;
        assert_eq!(resolved_tofu_link(&request), "https://x.com/aff");
    }

    #[test]
    fn image_directive_is_exclusive_and_total() {
        let none = image_directive(&ImageSource::None);
        assert!(none.contains("stock image"));
        assert!(!none.contains("base64"));

        let inline = image_directive(&ImageSource::Inline {
            data: "aGVsbG8=".into(),
            mime_type: "image/jpeg".into(),
        });
        assert!(inline.contains("data:image/jpeg;base64,aGVsbG8="));
        assert!(!inline.contains("stock image"));

        let by_url = image_directive(&ImageSource::Url {
            url: "https://example.com/p.jpg".into(),
        });
        assert!(by_url.contains("src=\"https://example.com/p.jpg\""));
        assert!(!by_url.contains("base64"));
        assert!(!by_url.contains("stock image"));
    }

    #[test]
    fn prompt_embeds_description_language_and_contract() {
        let prompt = build_generation_prompt(&request());
        assert!(prompt.contains("Great widget"));
        assert!(prompt.contains("Português"));
        assert!(prompt.contains("EXACTLY 15 unique headlines of 30 characters"));
        assert!(prompt.contains("EXACTLY 4 unique descriptions of 90 characters"));
        assert!(prompt.contains("5-10 per match type"));
    }

    #[test]
    fn schema_requires_pages_and_ad_creative_for_all_stages() {
        let schema = response_schema();
        assert_eq!(schema["required"], json!(["pages", "adCreative"]));
        assert_eq!(schema["properties"]["pages"]["required"], json!(["tofu", "mofu", "bofu"]));
        assert_eq!(
            schema["properties"]["adCreative"]["required"],
            json!(["tofu", "mofu", "bofu"])
        );
        let stage = &schema["properties"]["adCreative"]["properties"]["tofu"];
        assert_eq!(stage["required"], json!(["keywords", "adAssets"]));
        assert_eq!(
            stage["properties"]["adAssets"]["required"],
            json!(["headlines", "descriptions", "callouts", "sitelinks"])
        );
    }
}
