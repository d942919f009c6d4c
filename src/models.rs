use serde::{Serialize, Deserialize};

/// Placeholder for a field that could not be located on the page.
pub const NOT_FOUND: &str = "N/A";
/// Placeholder for both price fields when the price block is unreadable.
pub const PRICE_UNAVAILABLE: &str = "Currently Unavailable";
/// Info placeholder when the price block exists but carries no discount or price.
pub const PRICE_NOT_LISTED: &str = "Not available";
/// Placeholder for every aspect bucket when the review widget has no aspects.
pub const NO_ASPECTS: &str = "Nothing found";

/// Site-specific product token used to build the detail page address.
pub type Asin = String;

/// One scraped detail page, flattened to the columns of the output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Amazon Info")]
    pub amazon_info: String,
    #[serde(rename = "Discounted Price")]
    pub discounted_price: String,
    #[serde(rename = "Image URL")]
    pub image_url: String,
    #[serde(rename = "More Image Links")]
    pub more_image_links: String,
    #[serde(rename = "Model Name")]
    pub model_name: String,
    #[serde(rename = "Details")]
    pub details: String,
    #[serde(rename = "More Details")]
    pub more_details: String,
    #[serde(rename = "Positive")]
    pub positive: String,
    #[serde(rename = "Average")]
    pub average: String,
    #[serde(rename = "Negative")]
    pub negative: String,
    #[serde(rename = "Scraped At")]
    pub scraped_at: String,
}

impl ProductRecord {
    pub const COLUMNS: [&'static str; 12] = [
        "URL",
        "Amazon Info",
        "Discounted Price",
        "Image URL",
        "More Image Links",
        "Model Name",
        "Details",
        "More Details",
        "Positive",
        "Average",
        "Negative",
        "Scraped At",
    ];
}

/// Review-aspect snippets grouped by the sentiment the site tags them with.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AspectRatings {
    pub positive: Vec<String>,
    pub average: Vec<String>,
    pub negative: Vec<String>,
}

impl AspectRatings {
    pub fn nothing_found() -> Self {
        Self {
            positive: vec![NO_ASPECTS.to_string()],
            average: vec![NO_ASPECTS.to_string()],
            negative: vec![NO_ASPECTS.to_string()],
        }
    }
}
