use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use product_link_bot::bot::{LogDelivery, Message, ProductBot};
use product_link_bot::links::cache_key;
use product_link_bot::report::CollectingReportHandler;
use product_link_bot::scraper::ScrapedProduct;
use product_link_bot::storage::{ByteStore, Cached, ExpiringRepository, MemoryArchive, Repository};
use product_link_bot::traits::ProductScraper;
use product_link_bot::{
    CorrelationError, DeliveryRecord, FetchError, PipelineError, Product, ProductFetcher, RepositoryError, StepError,
};
use url::Url;

/// Scraper that builds a product from the URL and counts calls
#[derive(Default)]
struct FakeScraper {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl ProductScraper for FakeScraper {
    async fn scrape(&self, url: &Url) -> Result<ScrapedProduct, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(PipelineError::Step {
                index: 1,
                step: "make-request",
                source: StepError::Other("connection refused".to_string()),
            });
        }

        Ok(ScrapedProduct {
            product: Product {
                title: format!("Product #{call}"),
                price: 10.0,
                original_price: 0.0,
                image_url: String::new(),
                description: String::new(),
                ratings_count: 3,
                rating: 4.0,
                out_of_stock: false,
                url: url.clone(),
            },
            raw_html: Bytes::from(format!("<html><body>{} #{call}</body></html>", url.path())),
        })
    }
}

/// Product repository whose reads always fail with an IO error
struct BrokenRepository;

impl Repository<Product> for BrokenRepository {
    fn save(&self, _id: &str, _value: Product) -> Result<(), RepositoryError> {
        Ok(())
    }

    fn get(&self, _id: &str) -> Result<Cached<Product>, RepositoryError> {
        Err(RepositoryError::Io(std::io::Error::other("disk on fire")))
    }
}

/// Archive whose writes always fail
struct ReadOnlyArchive;

#[async_trait]
impl ByteStore for ReadOnlyArchive {
    async fn save(&self, _id: &str, _data: Bytes) -> Result<(), RepositoryError> {
        Err(RepositoryError::Io(std::io::Error::other("read-only file system")))
    }

    async fn get(&self, id: &str) -> Result<Bytes, RepositoryError> {
        Err(RepositoryError::NotFound(id.to_string()))
    }
}

struct Harness {
    scraper: Arc<FakeScraper>,
    products: Arc<ExpiringRepository<Product>>,
    deliveries: Arc<ExpiringRepository<DeliveryRecord>>,
    archive: Arc<MemoryArchive>,
    reports: Arc<CollectingReportHandler>,
    fetcher: ProductFetcher,
}

fn harness(product_ttl: Duration, scraper: FakeScraper) -> Harness {
    let scraper = Arc::new(scraper);
    let products = Arc::new(ExpiringRepository::new(product_ttl));
    let deliveries = Arc::new(ExpiringRepository::new(Duration::from_secs(60)));
    let archive = Arc::new(MemoryArchive::new());
    let reports = Arc::new(CollectingReportHandler::new());

    let fetcher = ProductFetcher::new(
        scraper.clone(),
        products.clone(),
        deliveries.clone(),
        archive.clone(),
        reports.clone(),
    );

    Harness {
        scraper,
        products,
        deliveries,
        archive,
        reports,
        fetcher,
    }
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Archiving happens on a spawned task; wait for it to land
async fn archived(archive: &MemoryArchive, key: &str) -> Bytes {
    for _ in 0..100 {
        if let Ok(html) = archive.get(key).await {
            return html;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("markup for {key} was never archived");
}

#[tokio::test]
async fn fresh_cache_hit_skips_scrape() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP");

    let first = h.fetcher.fetch(&link).await.unwrap();
    let second = h.fetcher.fetch(&link).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn affiliate_variants_share_one_entry() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());

    h.fetcher.fetch(&url("https://www.amazon.com/Lamp/dp/B0LAMP?tag=a-20")).await.unwrap();
    let product = h
        .fetcher
        .fetch(&url("https://www.amazon.com/Lamp/dp/B0LAMP?tag=b-20&th=1#reviews"))
        .await
        .unwrap();

    assert_eq!(product.title, "Product #1");
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.products.len(), 1);
}

#[tokio::test]
async fn expired_entry_is_refetched() {
    let h = harness(Duration::ZERO, FakeScraper::default());
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP");

    h.fetcher.fetch(&link).await.unwrap();
    let refreshed = h.fetcher.fetch(&link).await.unwrap();

    assert_eq!(refreshed.title, "Product #2");
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fetch_archives_markup_under_cache_key() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP?tag=a-20");

    h.fetcher.fetch(&link).await.unwrap();

    let html = archived(&h.archive, &cache_key(&link)).await;
    assert_eq!(html, Bytes::from_static(b"<html><body>/Lamp/dp/B0LAMP #1</body></html>"));
}

#[tokio::test]
async fn scrape_failure_leaves_cache_untouched() {
    let h = harness(
        Duration::from_secs(60),
        FakeScraper {
            fail: true,
            ..FakeScraper::default()
        },
    );
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP");

    let error = h.fetcher.fetch(&link).await.unwrap_err();

    assert!(matches!(error, FetchError::Scrape(PipelineError::Step { index: 1, .. })));
    assert!(h.products.is_empty());
    assert!(h.archive.is_empty());
}

#[tokio::test]
async fn broken_cache_is_reported_and_refetched() {
    let scraper = Arc::new(FakeScraper::default());
    let sunk = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sunk);

    let fetcher = ProductFetcher::new(
        scraper.clone(),
        Arc::new(BrokenRepository),
        Arc::new(ExpiringRepository::<DeliveryRecord>::new(Duration::from_secs(60))),
        Arc::new(MemoryArchive::new()),
        Arc::new(CollectingReportHandler::new()),
    )
    .with_error_sink(move |e| sink.lock().unwrap().push(e.to_string()));

    let product = fetcher.fetch(&url("https://www.amazon.com/Lamp/dp/B0LAMP")).await.unwrap();

    assert_eq!(product.title, "Product #1");
    assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
    let sunk = sunk.lock().unwrap();
    assert_eq!(sunk.len(), 1);
    assert!(sunk[0].contains("disk on fire"));
}

#[tokio::test]
async fn failed_archive_write_does_not_fail_fetch() {
    let products = Arc::new(ExpiringRepository::<Product>::new(Duration::from_secs(60)));
    let fetcher = ProductFetcher::new(
        Arc::new(FakeScraper::default()),
        products.clone(),
        Arc::new(ExpiringRepository::<DeliveryRecord>::new(Duration::from_secs(60))),
        Arc::new(ReadOnlyArchive),
        Arc::new(CollectingReportHandler::new()),
    );
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP");

    let product = fetcher.fetch(&link).await.unwrap();
    // let the spawned archive write run and fail
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(product.title, "Product #1");
    let cached = products.get(&cache_key(&link)).unwrap();
    assert_eq!(cached, Cached::Fresh(product));
}

#[tokio::test]
async fn delivery_is_recorded_under_message_id() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP?tag=a-20");

    let product = h.fetcher.fetch(&link).await.unwrap();
    h.fetcher.on_product_delivered("msg-1", &product);

    let record = h.deliveries.get("msg-1").unwrap().into_inner();
    assert_eq!(record.message_id, "msg-1");
    assert_eq!(record.cache_key, "https://www.amazon.com/Lamp/dp/B0LAMP");
}

#[tokio::test]
async fn report_resolves_delivered_product_and_markup() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP?tag=a-20");

    let product = h.fetcher.fetch(&link).await.unwrap();
    archived(&h.archive, &cache_key(&link)).await;
    h.fetcher.on_product_delivered("msg-1", &product);

    h.fetcher.on_report("msg-1").await;

    let reports = h.reports.records();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].product, product);
    assert_eq!(reports[0].html, "<html><body>/Lamp/dp/B0LAMP #1</body></html>");
}

#[tokio::test]
async fn report_uses_expired_product() {
    let h = harness(Duration::ZERO, FakeScraper::default());
    let link = url("https://www.amazon.com/Lamp/dp/B0LAMP");

    let product = h.fetcher.fetch(&link).await.unwrap();
    archived(&h.archive, &cache_key(&link)).await;
    h.fetcher.on_product_delivered("msg-1", &product);

    let record = h.fetcher.resolve_report("msg-1").await.unwrap();
    assert_eq!(record.product.title, "Product #1");
}

#[tokio::test]
async fn unknown_message_report_is_dropped() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());

    let error = h.fetcher.resolve_report("never-sent").await.unwrap_err();
    assert!(matches!(error, CorrelationError::UnknownMessage(id) if id == "never-sent"));

    h.fetcher.on_report("never-sent").await;
    assert!(h.reports.records().is_empty());
}

#[tokio::test]
async fn report_without_archived_markup_is_dropped() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());
    let product = Product {
        title: "Never fetched".to_string(),
        price: 1.0,
        original_price: 0.0,
        image_url: String::new(),
        description: String::new(),
        ratings_count: 0,
        rating: 0.0,
        out_of_stock: false,
        url: url("https://www.amazon.com/Ghost/dp/B0GHOST"),
    };
    h.fetcher.on_product_delivered("msg-9", &product);

    let error = h.fetcher.resolve_report("msg-9").await.unwrap_err();
    assert!(matches!(error, CorrelationError::MissingMarkup { .. }));

    h.fetcher.on_report("msg-9").await;
    assert!(h.reports.records().is_empty());
}

#[tokio::test]
async fn bot_answers_each_link_and_records_delivery() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());
    let bot = ProductBot::new(h.fetcher.clone(), Arc::new(LogDelivery::default()));

    let message = Message {
        id: "in-1".to_string(),
        content: "two for you\nhttps://www.amazon.com/Lamp/dp/B0LAMP\nchat\nwww.amazon.com/gp/product/B0DESK"
            .to_string(),
        from_this_bot: false,
    };
    let outcomes = bot.handle_message(&message).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].link, "https://www.amazon.com/Lamp/dp/B0LAMP");
    assert_eq!(outcomes[1].link, "www.amazon.com/gp/product/B0DESK");

    let mut delivered = Vec::new();
    for outcome in &outcomes {
        let id = outcome.result.as_ref().unwrap();
        delivered.push(id.clone());
    }
    delivered.sort();
    assert_eq!(delivered, vec!["local-1".to_string(), "local-2".to_string()]);
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 2);

    let desk = url("https://www.amazon.com/gp/product/B0DESK");
    archived(&h.archive, &cache_key(&desk)).await;
    let id = outcomes[1].result.as_ref().unwrap();
    let record = h.fetcher.resolve_report(id).await.unwrap();
    assert_eq!(record.product.url, desk);
}

#[tokio::test]
async fn bot_ignores_its_own_messages() {
    let h = harness(Duration::from_secs(60), FakeScraper::default());
    let bot = ProductBot::new(h.fetcher.clone(), Arc::new(LogDelivery::default()));

    let message = Message {
        id: "out-1".to_string(),
        content: "https://www.amazon.com/Lamp/dp/B0LAMP".to_string(),
        from_this_bot: true,
    };

    assert!(bot.handle_message(&message).await.is_empty());
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 0);
}
