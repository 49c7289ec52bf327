//! Product page scraping built from pipeline steps:
//! session setup, the HTTP request, then field extraction.

pub mod extractor;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::cookie::Jar;
use tracing::{info, warn};
use url::Url;

use crate::config::Cookie;
use crate::error::{PipelineError, StepError};
use crate::models::Product;
use crate::pipeline::{InboundResponse, OutboundRequest, Pipeline, RoutineStep, Step, StepContext};
use crate::traits::{ProductScraper, ScraperConfig};

pub use extractor::ProductExtractor;

/// Output of a scrape pipeline: the product and the markup it came from
#[derive(Debug, Clone)]
pub struct ScrapedProduct {
    pub product: Product,
    pub raw_html: Bytes,
}

/// Installs a fresh client whose cookie jar is seeded from configuration
pub struct CreateSession {
    pub cookies: Vec<Cookie>,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: std::time::Duration,
}

#[async_trait]
impl<T: Send> Step<T> for CreateSession {
    fn name(&self) -> &'static str {
        "create-session"
    }

    async fn run(&self, ctx: &mut StepContext<T>) -> Result<(), StepError> {
        let origin = if ctx.request.url.has_host() {
            ctx.request.url.clone()
        } else {
            Url::parse(&self.base_url).map_err(|e| StepError::Other(format!("bad base URL: {e}")))?
        };

        let jar = Jar::default();
        for cookie in &self.cookies {
            jar.add_cookie_str(&format!("{}={}; Path=/", cookie.name, cookie.value), &origin);
        }

        let client = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .cookie_provider(Arc::new(jar))
            .build()?;

        ctx.client = Some(client);
        Ok(())
    }
}

/// Sends the outbound request with the session's client and reads the body
pub struct MakeRequest;

#[async_trait]
impl<T: Send> Step<T> for MakeRequest {
    fn name(&self) -> &'static str {
        "make-request"
    }

    async fn run(&self, ctx: &mut StepContext<T>) -> Result<(), StepError> {
        let client = ctx.client.as_ref().ok_or(StepError::MissingInput("an HTTP client"))?;

        let response = client
            .request(ctx.request.method.clone(), ctx.request.url.clone())
            .headers(ctx.request.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} answered with {}", ctx.request.url, status);
        }

        let url = response.url().clone();
        let body = response.bytes().await?;

        ctx.response = Some(InboundResponse { status, url, body });
        Ok(())
    }
}

/// Runs the field extractor over the response body
pub struct ParseProduct {
    pub extractor: ProductExtractor,
}

#[async_trait]
impl Step<ScrapedProduct> for ParseProduct {
    fn name(&self) -> &'static str {
        "parse-product"
    }

    async fn run(&self, ctx: &mut StepContext<ScrapedProduct>) -> Result<(), StepError> {
        let response = ctx.response.as_ref().ok_or(StepError::MissingInput("a response"))?;

        // the product keeps the URL that was asked for, not the redirect target
        let product = self.extractor.extract(&response.body, &ctx.request.url);

        ctx.output = Some(ScrapedProduct {
            product,
            raw_html: response.body.clone(),
        });
        Ok(())
    }
}

/// Builds the three-step product scrape pipeline
pub fn product_pipeline(config: &ScraperConfig) -> Result<Pipeline<ScrapedProduct>, StepError> {
    let extractor = ProductExtractor::new(&config.selectors, config.out_of_stock_text.clone())?;

    Ok(Pipeline::new(vec![
        RoutineStep::new(CreateSession {
            cookies: config.cookies.clone(),
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout,
        }),
        RoutineStep::new(MakeRequest),
        RoutineStep::new(ParseProduct { extractor }),
    ]))
}

/// Pipeline-backed scraper for Amazon product pages
pub struct AmazonScraper {
    config: ScraperConfig,
    pipeline: Pipeline<ScrapedProduct>,
}

impl AmazonScraper {
    pub fn new(config: ScraperConfig) -> Result<Self, StepError> {
        let pipeline = product_pipeline(&config)?;
        Ok(Self { config, pipeline })
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }
}

#[async_trait]
impl ProductScraper for AmazonScraper {
    async fn scrape(&self, url: &Url) -> Result<ScrapedProduct, PipelineError> {
        info!("Scraping {} product page {}", self.config.name, url);

        let ctx = StepContext::new(OutboundRequest::get(url.clone()));
        let scraped = self.pipeline.run_to_output(ctx).await?;

        info!(
            "Scraped '{}' ({} bytes of markup)",
            scraped.product.title,
            scraped.raw_html.len()
        );
        Ok(scraped)
    }
}
