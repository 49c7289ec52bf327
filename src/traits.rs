//! Traits and configuration for site-agnostic product scraping

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::Cookie;
use crate::error::PipelineError;
use crate::scraper::ScrapedProduct;

/// Configuration for a product page scraper
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Display name for the website
    pub name: String,
    /// Origin the configured cookies belong to when the request URL has no host
    pub base_url: String,
    pub user_agent: String,
    /// Transport timeout for the whole request
    pub timeout: Duration,
    /// Cookies installed on every session
    pub cookies: Vec<Cookie>,
    /// Candidate CSS selectors for each product field
    pub selectors: ProductSelectors,
    /// Availability text that marks a product as out of stock
    pub out_of_stock_text: String,
}

/// Candidate CSS selectors per product field, in priority order.
///
/// Each field is resolved by the first selector in its list that matches
/// anything; later selectors are ignored even if they would match too.
#[derive(Debug, Clone)]
pub struct ProductSelectors {
    /// Main product image, read for its hi-res/src/size-map attributes and alt text
    pub image: Vec<String>,
    /// Title heading, used when the image has no alt text
    pub title: Vec<String>,
    /// Elements inside the title heading whose text is not part of the title
    pub title_noise: Vec<String>,
    pub price: Vec<String>,
    pub original_price: Vec<String>,
    /// Availability message compared against `out_of_stock_text`
    pub availability: Vec<String>,
    /// Description container; the text of its paragraphs is used
    pub description: Vec<String>,
    pub ratings_count: Vec<String>,
    /// Element whose `title` attribute holds the star rating
    pub rating: Vec<String>,
}

impl Default for ProductSelectors {
    fn default() -> Self {
        fn list(selectors: &[&str]) -> Vec<String> {
            selectors.iter().map(|s| (*s).to_string()).collect()
        }

        Self {
            image: list(&["#imgTagWrapperId img:last-child", "#landingImage"]),
            title: list(&["#productTitle", "#title"]),
            title_noise: list(&["#parentalAdvisory"]),
            price: list(&[
                "#price_inside_buybox",
                "#priceblock_ourprice",
                "#priceblock_dealprice",
                "#corePrice_feature_div .a-offscreen",
            ]),
            original_price: list(&[
                "span.priceBlockStrikePriceString.a-text-strike",
                ".basisPrice .a-offscreen",
            ]),
            availability: list(&["#almOutOfStockAvailability_feature_div", "#availability > span"]),
            description: list(&["#productDescription"]),
            ratings_count: list(&["#acrCustomerReviewText"]),
            rating: list(&["#acrPopover"]),
        }
    }
}

/// Something that turns a product URL into a product and the markup it came from
#[async_trait]
pub trait ProductScraper: Send + Sync {
    /// Scrape a single product page
    ///
    /// # Arguments
    /// * `url` - The product page to fetch
    ///
    /// # Returns
    /// * `Result<ScrapedProduct, PipelineError>` - The product and raw markup, or the failing step
    async fn scrape(&self, url: &Url) -> Result<ScrapedProduct, PipelineError>;
}
