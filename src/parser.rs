use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use tracing::error;

use crate::error::FieldError;
use crate::models::{
    AspectRatings, NOT_FOUND, PRICE_NOT_LISTED, PRICE_UNAVAILABLE, ProductRecord,
};

/// The "next page" control on a search result page.
pub const NEXT_PAGE_SELECTOR: &str = "a.s-pagination-next";

const MODEL_TERMS: [&str; 3] = ["Model Name", "Model", "Item model number"];
const IMAGE_SECTION_HEADINGS: [&str; 2] = ["From the manufacturer", "Product Description"];
const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".png", ".jpeg", ".tif", ".tiff"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static RESULT_ASIN: LazyLock<Selector> = LazyLock::new(|| selector("div.s-main-slot div[data-asin]"));
static NEXT_PAGE: LazyLock<Selector> = LazyLock::new(|| selector(NEXT_PAGE_SELECTOR));

static OVERVIEW: LazyLock<Selector> = LazyLock::new(|| selector("#productOverview_feature_div"));
static PROD_DETAILS: LazyLock<Selector> = LazyLock::new(|| selector("#prodDetails"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static TH: LazyLock<Selector> = LazyLock::new(|| selector("th"));
static TD: LazyLock<Selector> = LazyLock::new(|| selector("td"));

static FEATURE_BULLETS: LazyLock<Selector> = LazyLock::new(|| selector("#feature-bullets"));
static BULLET: LazyLock<Selector> = LazyLock::new(|| selector("li span.a-list-item"));

static PRICE_BLOCK: LazyLock<Selector> =
    LazyLock::new(|| selector("#corePriceDisplay_desktop_feature_div"));
static SAVINGS: LazyLock<Selector> = LazyLock::new(|| selector("span.savingsPercentage"));
static PRICE_WHOLE: LazyLock<Selector> = LazyLock::new(|| selector("span.a-price-whole"));
static PRICE_MRP: LazyLock<Selector> = LazyLock::new(|| selector("span.a-text-price"));
static VISIBLE_PRICE: LazyLock<Selector> = LazyLock::new(|| selector("span[aria-hidden=\"true\"]"));
static OFFSCREEN_PRICE: LazyLock<Selector> = LazyLock::new(|| selector("span.a-offscreen"));

static LANDING_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("#landingImage"));
static H2: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static CONTENT_GRID: LazyLock<Selector> = LazyLock::new(|| selector("div.content-grid-block"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));

static ASPECT_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| selector("div[data-hook=\"cr-insights-widget-aspects\"] button"));

/// Product identifiers on a search result page, in document order.
pub fn extract_asins(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&RESULT_ASIN)
        .filter_map(|e| e.value().attr("data-asin"))
        .map(str::trim)
        .filter(|asin| !asin.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn has_next_page(html: &str) -> bool {
    Html::parse_document(html).select(&NEXT_PAGE).next().is_some()
}

pub fn parse_product(url: &str, html: &str) -> ProductRecord {
    let doc = Html::parse_document(html);

    let details = extract_details(&doc).unwrap_or_else(|e| {
        error!(url, "Error extracting product details: {e}");
        NOT_FOUND.to_string()
    });

    let more_details = extract_bullets(&doc).unwrap_or_else(|e| {
        error!(url, "Error extracting more details: {e}");
        NOT_FOUND.to_string()
    });

    let (amazon_info, discounted_price) = extract_price(&doc, url).unwrap_or_else(|e| {
        error!(url, "Error extracting price information: {e}");
        (PRICE_UNAVAILABLE.to_string(), PRICE_UNAVAILABLE.to_string())
    });

    let image_url = extract_landing_image(&doc).unwrap_or_else(|e| {
        error!(url, "Error extracting image URL: {e}");
        NOT_FOUND.to_string()
    });

    let more_images = extract_more_image_links(&doc);
    let more_image_links = if more_images.is_empty() {
        NOT_FOUND.to_string()
    } else {
        more_images.join("|")
    };

    let model_name = extract_model_name(&doc, url);
    let aspects = extract_aspect_ratings(&doc);

    ProductRecord {
        url: url.to_string(),
        amazon_info,
        discounted_price,
        image_url,
        more_image_links,
        model_name,
        details,
        more_details,
        positive: aspects.positive.join("|"),
        average: aspects.average.join("|"),
        negative: aspects.negative.join("|"),
        scraped_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Descendant text with runs of whitespace collapsed to one space.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn find<'a>(
    scope: ElementRef<'a>,
    sel: &Selector,
    name: &'static str,
) -> Result<ElementRef<'a>, FieldError> {
    scope.select(sel).next().ok_or(FieldError::MissingElement(name))
}

fn find_in<'a>(doc: &'a Html, sel: &Selector, name: &'static str) -> Result<ElementRef<'a>, FieldError> {
    doc.select(sel).next().ok_or(FieldError::MissingElement(name))
}

fn extract_details(doc: &Html) -> Result<String, FieldError> {
    let overview = find_in(doc, &OVERVIEW, "#productOverview_feature_div")?;
    Ok(overview.select(&ROW).map(text_of).collect::<Vec<_>>().join("\n"))
}

fn extract_bullets(doc: &Html) -> Result<String, FieldError> {
    let bullets = find_in(doc, &FEATURE_BULLETS, "#feature-bullets")?;
    Ok(bullets.select(&BULLET).map(text_of).collect::<Vec<_>>().join("\n"))
}

/// Returns `(info, discounted price)`.
fn extract_price(doc: &Html, url: &str) -> Result<(String, String), FieldError> {
    let block = find_in(doc, &PRICE_BLOCK, "#corePriceDisplay_desktop_feature_div")?;
    let discount = text_of(find(block, &SAVINGS, "span.savingsPercentage")?)
        .replace(['-', '%'], "");
    let price = text_of(find(block, &PRICE_WHOLE, "span.a-price-whole")?);

    if discount.trim().is_empty() || price.trim().is_empty() {
        return Ok((PRICE_NOT_LISTED.to_string(), PRICE_UNAVAILABLE.to_string()));
    }

    let discount = parse_amount(&discount)?;
    let price = parse_amount(&price)?;
    let mrp = parse_amount(&price_text(find(block, &PRICE_MRP, "span.a-text-price")?))?;

    Ok((
        format!("MRP: ₹{mrp} | DISCOUNT: {discount}% | PRICE: ₹{price} | URL: {url}"),
        price.to_string(),
    ))
}

/// Strike-through prices repeat the amount in an off-screen span for screen
/// readers; only the visible copy is wanted.
fn price_text(element: ElementRef<'_>) -> String {
    element
        .select(&VISIBLE_PRICE)
        .next()
        .or_else(|| element.select(&OFFSCREEN_PRICE).next())
        .map(text_of)
        .unwrap_or_else(|| text_of(element))
}

/// Integer part of a displayed amount such as `₹1,299.` or `25`.
fn parse_amount(text: &str) -> Result<u64, FieldError> {
    let cleaned = text.replace(['₹', ','], "");
    let whole = cleaned.split('.').next().unwrap_or_default().trim();
    whole.parse().map_err(|source| FieldError::InvalidNumber {
        text: text.to_string(),
        source,
    })
}

/// The landing image advertises its renditions as `{url: [width, height]}`;
/// pick the largest.
fn extract_landing_image(doc: &Html) -> Result<String, FieldError> {
    let img = find_in(doc, &LANDING_IMAGE, "#landingImage")?;
    let raw = img
        .value()
        .attr("data-a-dynamic-image")
        .ok_or(FieldError::MissingAttribute {
            element: "#landingImage",
            attr: "data-a-dynamic-image",
        })?;
    let Renditions(renditions) =
        serde_json::from_str(raw).map_err(|source| FieldError::InvalidJson {
            element: "#landingImage",
            source,
        })?;

    // First of equally large renditions wins.
    renditions
        .into_iter()
        .map(|(url, (w, h))| (url, w * h))
        .fold(None, |best: Option<(String, f64)>, (url, area)| match best {
            Some((_, top)) if area <= top => best,
            _ => Some((url, area)),
        })
        .map(|(url, _)| url)
        .ok_or(FieldError::Empty("#landingImage"))
}

/// `{url: [width, height]}` entries in document order.
struct Renditions(Vec<(String, (f64, f64))>);

impl<'de> Deserialize<'de> for Renditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RenditionsVisitor;

        impl<'de> Visitor<'de> for RenditionsVisitor {
            type Value = Renditions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of image URLs to [width, height]")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Renditions, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(Renditions(entries))
            }
        }

        deserializer.deserialize_map(RenditionsVisitor)
    }
}

fn is_image_url(url: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|ext| url.ends_with(ext))
}

/// Images in the first manufacturer/description section and the first
/// content grid, deduplicated in first-seen order.
fn extract_more_image_links(doc: &Html) -> Vec<String> {
    let described = doc
        .select(&H2)
        .find(|heading| {
            let title = text_of(*heading);
            IMAGE_SECTION_HEADINGS.iter().any(|h| title.contains(h))
        })
        .and_then(|heading| {
            heading
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|e| e.value().name() == "div")
        });
    let sections = described.into_iter().chain(doc.select(&CONTENT_GRID).next());

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for section in sections {
        for img in section.select(&IMG) {
            let attrs = img.value();
            let src = attrs
                .attr("src")
                .filter(|s| is_image_url(s))
                .or_else(|| attrs.attr("data-src").filter(|s| is_image_url(s)));
            if let Some(src) = src {
                if seen.insert(src.to_string()) {
                    links.push(src.to_string());
                }
            }
        }
    }
    links
}

fn mentions_model(text: &str) -> bool {
    MODEL_TERMS.iter().any(|term| text.contains(term))
}

fn model_from_overview(doc: &Html) -> Result<Option<String>, FieldError> {
    let overview = find_in(doc, &OVERVIEW, "#productOverview_feature_div")?;
    for row in overview.select(&ROW) {
        if !mentions_model(&text_of(row)) {
            continue;
        }
        let cells: Vec<_> = row.select(&TD).collect();
        if cells.len() > 1 {
            return Ok(Some(text_of(cells[1])));
        }
    }
    Ok(None)
}

fn model_from_details_table(doc: &Html) -> Result<Option<String>, FieldError> {
    let details = find_in(doc, &PROD_DETAILS, "#prodDetails")?;
    for row in details.select(&ROW) {
        let Some(th) = row.select(&TH).next() else {
            continue;
        };
        if mentions_model(&text_of(th)) {
            let td = find(row, &TD, "#prodDetails td")?;
            return Ok(Some(text_of(td)));
        }
    }
    Ok(None)
}

/// Model name from the overview table, falling back to the technical
/// details table.
fn extract_model_name(doc: &Html, url: &str) -> String {
    match model_from_overview(doc) {
        Ok(Some(model)) => return model,
        Ok(None) => {}
        Err(e) => error!(url, "Error extracting model name from product overview: {e}"),
    }
    match model_from_details_table(doc) {
        Ok(Some(model)) => model,
        Ok(None) => NOT_FOUND.to_string(),
        Err(e) => {
            error!(url, "Error extracting model name from product details: {e}");
            NOT_FOUND.to_string()
        }
    }
}

fn extract_aspect_ratings(doc: &Html) -> AspectRatings {
    let buttons: Vec<_> = doc.select(&ASPECT_BUTTON).collect();
    if buttons.is_empty() {
        return AspectRatings::nothing_found();
    }

    let mut ratings = AspectRatings::default();
    for button in buttons {
        let text = text_of(button);
        let tag = button.value().attr("aria-describedby").unwrap_or_default();
        if tag.contains("POSITIVE") {
            ratings.positive.push(text);
        } else if tag.contains("NEGATIVE") {
            ratings.negative.push(text);
        } else {
            ratings.average.push(text);
        }
    }
    ratings
}
