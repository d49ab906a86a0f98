use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Coarse product category
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ItemCategory {
    KitchenDining,
    Electronics,
    Clothing,
    Footwear,
    BagsAccessories,
    JewelryWatches,
    BeautyPersonalCare,
    HomeDecor,
    Furniture,
    SportsOutdoors,
    ToysGames,
    BooksMedia,
    OfficeSupplies,
    ToolsHardware,
    Automotive,
    PetSupplies,
    FoodBeverage,
    #[default]
    Other,
}

/// Fine iconographic category used by clients to pick a glyph
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IconCategory {
    Mug,
    Bottle,
    Phone,
    Laptop,
    Headphones,
    Camera,
    Watch,
    Glasses,
    Shirt,
    Dress,
    Pants,
    Jacket,
    Shoe,
    Bag,
    Hat,
    Ring,
    Lamp,
    Chair,
    Sofa,
    Plant,
    Book,
    Toy,
    Ball,
    Bike,
    Car,
    Tool,
    Pen,
    Cosmetics,
    Food,
    Pet,
    #[default]
    Other,
}

/// Target demographic of a recognized product
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Demographic {
    Men,
    Women,
    #[default]
    Unisex,
    Kids,
}

/// Parse a closed enum leniently, falling back to its default variant.
pub(crate) fn parse_or_default<T: FromStr + Default>(raw: Option<&str>) -> T {
    raw.map(|s| s.trim().replace([' ', '-'], "_"))
        .and_then(|s| T::from_str(&s).ok())
        .unwrap_or_default()
}

/// A product recognized in an image, validated and sanitized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedItem {
    pub name: String,
    pub category: ItemCategory,
    pub icon_category: IconCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub target_demographic: Demographic,
    pub search_query: String,
    /// 1..=10
    pub confidence: u8,
}

/// One similarity-ranked candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankedCandidate {
    pub id: String,
    /// 0..=100
    pub similarity_score: u8,
    /// 1..=10
    pub rank: u8,
}

/// Base64 image as sent by clients: either bare base64 or a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ImagePayload(String);

impl ImagePayload {
    pub const DEFAULT_MIME: &'static str = "image/jpeg";

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Mime type from the `data:` prefix, or jpeg for bare base64
    pub fn mime_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(';'))
            .map(|(mime, _)| mime)
            .filter(|mime| !mime.is_empty())
            .unwrap_or(Self::DEFAULT_MIME)
    }

    /// Base64 body without any `data:...;base64,` prefix
    pub fn base64_data(&self) -> &str {
        if self.0.starts_with("data:") {
            if let Some((_, data)) = self.0.split_once(',') {
                return data;
            }
        }
        &self.0
    }

    /// Render as a `data:` URL
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.base64_data())
    }
}

/// An ephemeral session holding the image of one analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub image: ImagePayload,
    pub created_at: DateTime<Utc>,
}

/// Token usage reported by the provider at stream end
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Aggregated metrics sent with the `complete` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetrics {
    /// Milliseconds until the first text fragment, if any arrived
    pub first_token_ms: Option<u64>,
    pub total_ms: u64,
    pub item_count: usize,
    pub usage: TokenUsage,
    pub provider: ProviderKind,
    pub model: String,
}

/// Supported generation backends
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProviderKind {
    Gemini,
    #[strum(serialize = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

/// Typed capability flags of a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub ranking: bool,
}

/// Analysis request body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// Base64 image or data URL
    #[validate(length(min = 1))]
    pub image: String,
    /// Optional caller-supplied session id; the image is stored under it
    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,
}

/// A candidate image to rank against the original
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CandidateInput {
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    #[validate(length(min = 1))]
    pub image: String,
}

/// Ranking request body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_image_source"))]
pub struct RankRequest {
    /// Original image; required unless `sessionId` is given
    pub image: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub product_name: String,
    #[validate(length(min = 1, max = 100))]
    pub category_tag: String,
    #[validate(length(min = 1, max = 50), nested)]
    pub candidates: Vec<CandidateInput>,
}

fn validate_image_source(request: &RankRequest) -> Result<(), ValidationError> {
    let has_image = request.image.as_deref().is_some_and(|i| !i.is_empty());
    if has_image || request.session_id.is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("image_source")
            .with_message("either image or sessionId is required".into()))
    }
}

/// A ranking job with the original image already resolved
#[derive(Debug, Clone)]
pub struct RankingJob {
    pub original: ImagePayload,
    pub product_name: String,
    pub category_tag: String,
    pub candidates: Vec<CandidateInput>,
}

/// Payload of the `start` event
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Payload of the `error` event
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StreamErrorPayload {
    pub message: String,
    pub code: String,
}

/// Session image response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionImageResponse {
    pub session_id: String,
    pub image: ImagePayload,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionImageResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            image: session.image,
            created_at: session.created_at,
        }
    }
}

/// End-session acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EndSessionResponse {
    pub success: bool,
    pub existed: bool,
}
