use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Ad asset cardinalities requested from the generation service. These are
/// instructed, not enforced: the response checker only logs deviations.
pub const HEADLINES_PER_STAGE: usize = 15;
pub const HEADLINE_MAX_CHARS: usize = 30;
pub const DESCRIPTIONS_PER_STAGE: usize = 4;
pub const DESCRIPTION_MAX_CHARS: usize = 90;
pub const CALLOUTS_PER_STAGE: usize = 4;
pub const SITELINKS_PER_STAGE: usize = 4;
pub const KEYWORDS_PER_MATCH_TYPE_MIN: usize = 5;
pub const KEYWORDS_PER_MATCH_TYPE_MAX: usize = 10;

pub const DISPLAY_NAME_MAX_CHARS: usize = 40;

/// The three funnel stages, in funnel order. Iteration and default tab
/// selection follow this order everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunnelStage {
    #[default]
    Tofu,
    Mofu,
    Bofu,
}

impl FunnelStage {
    pub const ALL: [FunnelStage; 3] = [FunnelStage::Tofu, FunnelStage::Mofu, FunnelStage::Bofu];

    pub fn label(self) -> &'static str {
        match self {
            FunnelStage::Tofu => "Problem Awareness (TOFU)",
            FunnelStage::Mofu => "Solution Comparison (MOFU)",
            FunnelStage::Bofu => "Direct Conversion (BOFU)",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            FunnelStage::Tofu => "tofu",
            FunnelStage::Mofu => "mofu",
            FunnelStage::Bofu => "bofu",
        }
    }

    /// Download filename for this stage's page, derived from the label:
    /// lowercased, with non-alphanumeric runs collapsed to underscores.
    pub fn export_file_name(self) -> String {
        let mut name = String::new();
        for c in self.label().chars() {
            if c.is_ascii_alphanumeric() {
                name.extend(c.to_lowercase());
            } else if !name.ends_with('_') && !name.is_empty() {
                name.push('_');
            }
        }
        let trimmed = name.trim_end_matches('_');
        format!("{trimmed}.html")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    #[default]
    Portuguese,
    Spanish,
    German,
    French,
}

impl Language {
    /// Native name, as shown to the generation service.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Portuguese => "Português",
            Language::Spanish => "Español",
            Language::German => "Deutsch",
            Language::French => "Français",
        }
    }
}

/// Product image source. At most one source exists at a time by construction;
/// replacing the value is how "setting one clears the other" is realized.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageSource {
    #[serde(rename_all = "camelCase")]
    Inline { data: String, mime_type: String },
    Url { url: String },
    #[default]
    None,
}

/// Which link the TOFU page's call to action points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TofuLinkSource {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the primary affiliate link is required")]
    MissingPrimaryLink,
    #[error("the primary affiliate link is not a valid URL")]
    InvalidPrimaryLink,
    #[error("the product description is required")]
    MissingProductDescription,
    #[error("a secondary link is required when the TOFU CTA uses it")]
    MissingSecondaryLink,
    #[error("the secondary link is not a valid URL")]
    InvalidSecondaryLink,
}

/// Form inputs for one generation. Checked by `validate` before any request
/// is built, so the request builder itself cannot fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub primary_link: String,
    #[serde(default)]
    pub secondary_link: String,
    pub product_description: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub product_image: ImageSource,
    #[serde(default)]
    pub tofu_link_source: TofuLinkSource,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.primary_link.trim().is_empty() {
            return Err(ValidationError::MissingPrimaryLink);
        }
        if Url::parse(&self.primary_link).is_err() {
            return Err(ValidationError::InvalidPrimaryLink);
        }
        if self.product_description.trim().is_empty() {
            return Err(ValidationError::MissingProductDescription);
        }
        if self.tofu_link_source == TofuLinkSource::Secondary {
            if self.secondary_link.trim().is_empty() {
                return Err(ValidationError::MissingSecondaryLink);
            }
            if Url::parse(&self.secondary_link).is_err() {
                return Err(ValidationError::InvalidSecondaryLink);
            }
        }
        Ok(())
    }

    /// History display name: the product description truncated to 40 chars.
    pub fn display_name(&self) -> String {
        let mut name: String = self
            .product_description
            .chars()
            .take(DISPLAY_NAME_MAX_CHARS)
            .collect();
        if self.product_description.chars().count() > DISPLAY_NAME_MAX_CHARS {
            name.push('…');
        }
        name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub stage: FunnelStage,
    pub html_content: String,
}

/// Keywords bucketed by search-ad match type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    pub broad: Vec<String>,
    pub phrase: Vec<String>,
    pub exact: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sitelink {
    pub title: String,
    pub description1: String,
    pub description2: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdAssets {
    pub headlines: Vec<String>,
    pub descriptions: Vec<String>,
    pub callouts: Vec<String>,
    pub sitelinks: Vec<Sitelink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStageCreative {
    pub keywords: KeywordSet,
    pub ad_assets: AdAssets,
}

/// Ad creative for all three funnel stages. All stages are required, so this
/// is a struct rather than a map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdCreative {
    pub tofu: FunnelStageCreative,
    pub mofu: FunnelStageCreative,
    pub bofu: FunnelStageCreative,
}

impl AdCreative {
    pub fn for_stage(&self, stage: FunnelStage) -> &FunnelStageCreative {
        match stage {
            FunnelStage::Tofu => &self.tofu,
            FunnelStage::Mofu => &self.mofu,
            FunnelStage::Bofu => &self.bofu,
        }
    }
}

/// One successful generation: pages keyed by stage plus the matching ad
/// creative. Consumers treat any page as potentially absent even though the
/// generator supplies all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelContent {
    pub pages: BTreeMap<FunnelStage, Page>,
    pub ad_creative: AdCreative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub pages: BTreeMap<FunnelStage, Page>,
    pub ad_creative: AdCreative,
}

impl HistoryEntry {
    pub fn new(
        display_name: String,
        pages: BTreeMap<FunnelStage, Page>,
        ad_creative: AdCreative,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            created_at: Utc::now(),
            pages,
            ad_creative,
        }
    }
}
