//! Product field extraction with per-field fallback cascades.
//!
//! Every field is resolved on its own. A field whose elements are missing
//! falls back to its zero value, so a page template change degrades the
//! product instead of failing the scrape. The HTML parser accepts any input,
//! so extraction itself never fails; only selector compilation does.

use indexmap::IndexMap;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::ExtractError;
use crate::models::Product;
use crate::numbers::first_number_or;
use crate::traits::ProductSelectors;

const HIRES_ATTR: &str = "data-old-hires";
const SIZE_MAP_ATTR: &str = "data-a-dynamic-image";

/// Ordered candidate selectors for one field
#[derive(Debug, Clone)]
pub struct Locators(Vec<Selector>);

impl Locators {
    pub fn compile(selectors: &[String]) -> Result<Self, ExtractError> {
        selectors
            .iter()
            .map(|s| {
                Selector::parse(s).map_err(|e| ExtractError::Selector {
                    selector: s.clone(),
                    reason: format!("{e:?}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// All elements matched by the first selector that matches anything
    pub fn find<'a>(&self, root: ElementRef<'a>) -> Option<Vec<ElementRef<'a>>> {
        self.0.iter().find_map(|selector| {
            let matched: Vec<_> = root.select(selector).collect();
            (!matched.is_empty()).then_some(matched)
        })
    }

    fn first<'a>(&self, root: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.find(root).and_then(|matched| matched.into_iter().next())
    }

    fn text(&self, root: ElementRef<'_>) -> String {
        self.find(root).map(|matched| joined_text(&matched)).unwrap_or_default()
    }
}

/// Turns product page markup into a [`Product`]
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    image: Locators,
    title: Locators,
    title_noise: Locators,
    price: Locators,
    original_price: Locators,
    availability: Locators,
    description: Locators,
    paragraph: Selector,
    ratings_count: Locators,
    rating: Locators,
    out_of_stock_text: String,
}

impl ProductExtractor {
    pub fn new(selectors: &ProductSelectors, out_of_stock_text: impl Into<String>) -> Result<Self, ExtractError> {
        Ok(Self {
            image: Locators::compile(&selectors.image)?,
            title: Locators::compile(&selectors.title)?,
            title_noise: Locators::compile(&selectors.title_noise)?,
            price: Locators::compile(&selectors.price)?,
            original_price: Locators::compile(&selectors.original_price)?,
            availability: Locators::compile(&selectors.availability)?,
            description: Locators::compile(&selectors.description)?,
            paragraph: Selector::parse("p").map_err(|e| ExtractError::Selector {
                selector: "p".to_string(),
                reason: format!("{e:?}"),
            })?,
            ratings_count: Locators::compile(&selectors.ratings_count)?,
            rating: Locators::compile(&selectors.rating)?,
            out_of_stock_text: out_of_stock_text.into(),
        })
    }

    /// Extracts a product from raw markup served for `url`.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
    /// stray Latin-1 character only garbles the text it sits in.
    pub fn extract(&self, html: &[u8], url: &Url) -> Product {
        let html = String::from_utf8_lossy(html);
        let document = Html::parse_document(&html);
        let root = document.root_element();

        let image = self.image.first(root);
        let image_url = image.map(|img| resolve_image_url(img, url)).unwrap_or_default();

        let mut title = image
            .and_then(|img| img.value().attr("alt"))
            .unwrap_or_default()
            .to_string();
        if title.is_empty() {
            title = self.title_text(root);
        }

        let price = self
            .price
            .first(root)
            .map(|el| first_number_or(&el.text().collect::<String>(), 0.0))
            .unwrap_or(0.0);
        let original_price = first_number_or(&self.original_price.text(root), 0.0);

        let availability = self.availability.text(root);
        let out_of_stock = trim_text(&availability) == self.out_of_stock_text;

        let description = self
            .description
            .find(root)
            .map(|containers| {
                let paragraphs: Vec<_> = containers
                    .iter()
                    .flat_map(|c| c.select(&self.paragraph))
                    .collect();
                joined_text(&paragraphs)
            })
            .unwrap_or_default();

        let ratings_count = self
            .ratings_count
            .first(root)
            .map(|el| first_number_or(&el.text().collect::<String>(), 0.0))
            .unwrap_or(0.0);
        let rating = self
            .rating
            .first(root)
            .and_then(|el| el.value().attr("title"))
            .map_or(0.0, |t| first_number_or(t, 0.0));

        Product {
            title: trim_text(&title).to_string(),
            price,
            original_price,
            image_url,
            description: trim_text(&description).to_string(),
            ratings_count: ratings_count as u32,
            rating,
            out_of_stock,
            url: url.clone(),
        }
    }

    /// Title heading text with advisory sub-elements left out
    fn title_text(&self, root: ElementRef<'_>) -> String {
        let Some(headings) = self.title.find(root) else {
            return String::new();
        };

        let mut out = String::new();
        for heading in headings {
            let noise = self.title_noise.find(heading).unwrap_or_default();
            push_text_without(heading, &noise, &mut out);
        }
        out
    }
}

/// Picks the best image URL an image element offers.
///
/// Prefers the hi-res attribute. When it is missing or an inline `data:` URI,
/// starts from `src` and then takes the largest entry (by width × height) of
/// the embedded size map; on equal pixel counts the entry listed first wins.
fn resolve_image_url(img: ElementRef<'_>, page: &Url) -> String {
    let element = img.value();
    let hires = element.attr(HIRES_ATTR).unwrap_or_default();
    if !hires.is_empty() && !hires.starts_with("data:") {
        return absolute(hires, page);
    }

    let mut best = element.attr("src").unwrap_or_default().to_string();
    let sizes: IndexMap<String, Vec<u64>> = element
        .attr(SIZE_MAP_ATTR)
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default();

    let mut highest = 0;
    for (candidate, dimensions) in &sizes {
        let pixels = match dimensions.as_slice() {
            [width, height, ..] => width.saturating_mul(*height),
            _ => 0,
        };
        if pixels > highest {
            best = candidate.replacen("images-na.ssl-images-", "www.", 1);
            highest = pixels;
        }
    }

    if best.is_empty() {
        best
    } else {
        absolute(&best, page)
    }
}

/// Resolves protocol-relative and path-relative image sources against the page
fn absolute(src: &str, page: &Url) -> String {
    if src.starts_with("http") || src.starts_with("data:") {
        src.to_string()
    } else if src.starts_with("//") {
        format!("{}:{src}", page.scheme())
    } else {
        page.join(src).map_or_else(|_| src.to_string(), |u| u.to_string())
    }
}

fn joined_text(elements: &[ElementRef<'_>]) -> String {
    elements.iter().flat_map(|el| el.text()).collect()
}

fn push_text_without(element: ElementRef<'_>, skip: &[ElementRef<'_>], out: &mut String) {
    for child in element.children() {
        if skip.iter().any(|s| s.id() == child.id()) {
            continue;
        }
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    push_text_without(child, skip, out);
                }
            }
            _ => {}
        }
    }
}

fn trim_text(text: &str) -> &str {
    text.trim_matches(|c| c == '\n' || c == ' ')
}
