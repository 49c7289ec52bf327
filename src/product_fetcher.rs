//! Cache-first product fetching and correlation of delivered messages back to
//! the product and markup that produced them.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CorrelationError, FetchError, RepositoryError};
use crate::links::cache_key;
use crate::models::{ArchiveRecord, DeliveryRecord, Product};
use crate::report::ReportHandler;
use crate::storage::{ByteStore, Cached, Repository};
use crate::traits::ProductScraper;

/// Receives errors that do not stop a fetch
pub type ErrorSink = Arc<dyn Fn(&FetchError) + Send + Sync>;

#[derive(Clone)]
pub struct ProductFetcher {
    scraper: Arc<dyn ProductScraper>,
    products: Arc<dyn Repository<Product>>,
    deliveries: Arc<dyn Repository<DeliveryRecord>>,
    archive: Arc<dyn ByteStore>,
    report_handler: Arc<dyn ReportHandler>,
    error_sink: ErrorSink,
}

impl ProductFetcher {
    pub fn new(
        scraper: Arc<dyn ProductScraper>,
        products: Arc<dyn Repository<Product>>,
        deliveries: Arc<dyn Repository<DeliveryRecord>>,
        archive: Arc<dyn ByteStore>,
        report_handler: Arc<dyn ReportHandler>,
    ) -> Self {
        Self {
            scraper,
            products,
            deliveries,
            archive,
            report_handler,
            error_sink: Arc::new(|e| warn!("Product fetcher error: {}", e)),
        }
    }

    #[must_use]
    pub fn with_error_sink(mut self, sink: impl Fn(&FetchError) + Send + Sync + 'static) -> Self {
        self.error_sink = Arc::new(sink);
        self
    }

    /// Returns the cached product for `url` while fresh, otherwise scrapes it.
    ///
    /// After a scrape the raw markup is archived in the background and the
    /// product cache is refreshed. Concurrent fetches of the same uncached URL
    /// each scrape.
    pub async fn fetch(&self, url: &Url) -> Result<Product, FetchError> {
        let key = cache_key(url);

        match self.products.get(&key) {
            Ok(Cached::Fresh(product)) => {
                debug!("Cache hit for {}", key);
                return Ok(product);
            }
            Ok(Cached::Expired(_)) => debug!("Cached product for {} expired", key),
            Err(RepositoryError::NotFound(_)) => debug!("Cache miss for {}", key),
            Err(e) => (self.error_sink)(&FetchError::Cache(e)),
        }

        let scraped = self.scraper.scrape(url).await.inspect_err(|e| {
            warn!("Failed to scrape {}: {}", url, e);
        })?;

        let archive = Arc::clone(&self.archive);
        let archive_key = key.clone();
        let raw_html = scraped.raw_html;
        tokio::spawn(async move {
            if let Err(e) = archive.save(&archive_key, raw_html).await {
                warn!("Failed to archive markup for {}: {}", archive_key, e);
            }
        });

        if let Err(e) = self.products.save(&key, scraped.product.clone()) {
            (self.error_sink)(&FetchError::Cache(e));
        }

        info!("Fetched product '{}' for {}", scraped.product.title, key);
        Ok(scraped.product)
    }

    /// Remembers which product a delivered message carried
    pub fn on_product_delivered(&self, message_id: &str, product: &Product) {
        let key = cache_key(&product.url);
        let record = DeliveryRecord {
            message_id: message_id.to_string(),
            cache_key: key,
            delivered_at: Utc::now(),
        };

        match self.deliveries.save(message_id, record) {
            Ok(()) => debug!("Message {} delivered {}", message_id, product.url),
            Err(e) => warn!("Failed to record delivery of message {}: {}", message_id, e),
        }
    }

    /// Passes the product and markup behind a reported message to the report
    /// handler. Reports that cannot be resolved are logged and dropped.
    pub async fn on_report(&self, message_id: &str) {
        let record = match self.resolve_report(message_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Dropping report for message {}: {}", message_id, e);
                return;
            }
        };

        info!("Report for message {} ({})", message_id, record.product.url);
        if let Err(e) = self.report_handler.handle(record).await {
            warn!("Report handler failed for message {}: {}", message_id, e);
        }
    }

    /// Looks up the product and archived markup a delivered message was built from.
    ///
    /// Expired entries still resolve: a report may arrive long after delivery.
    pub async fn resolve_report(&self, message_id: &str) -> Result<ArchiveRecord, CorrelationError> {
        let delivery = match self.deliveries.get(message_id) {
            Ok(cached) => cached.into_inner(),
            Err(RepositoryError::NotFound(_)) => {
                return Err(CorrelationError::UnknownMessage(message_id.to_string()));
            }
            Err(e) => return Err(CorrelationError::Delivery(e)),
        };

        let html = self
            .archive
            .get(&delivery.cache_key)
            .await
            .map_err(|source| CorrelationError::MissingMarkup {
                cache_key: delivery.cache_key.clone(),
                source,
            })?;

        let product = self
            .products
            .get(&delivery.cache_key)
            .map_err(|source| CorrelationError::MissingProduct {
                cache_key: delivery.cache_key.clone(),
                source,
            })?
            .into_inner();

        Ok(ArchiveRecord {
            product,
            html: String::from_utf8_lossy(&html).into_owned(),
        })
    }
}
