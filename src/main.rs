use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use product_link_bot::bot::{LogDelivery, Message, ProductBot, ProductDelivery};
use product_link_bot::config::Config;
use product_link_bot::discord::DiscordNotifier;
use product_link_bot::models::{DeliveryRecord, Product};
use product_link_bot::report::FixtureWriter;
use product_link_bot::scraper::AmazonScraper;
use product_link_bot::storage::{ByteStore, ExpiringRepository, FileArchive, MemoryArchive};
use product_link_bot::ProductFetcher;

const REPORT_COMMAND: &str = "!report ";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting product link bot");

    let config = Config::from_env()?;
    let bot = build_bot(&config)?;

    info!("Reading chat messages from stdin ('{}<message id>' reports a reply)", REPORT_COMMAND);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut message_count: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(message_id) = line.strip_prefix(REPORT_COMMAND) {
            bot.handle_report(message_id.trim()).await;
            continue;
        }

        message_count += 1;
        let message = Message {
            id: format!("stdin-{message_count}"),
            content: line.to_string(),
            from_this_bot: false,
        };

        for outcome in bot.handle_message(&message).await {
            match outcome.result {
                Ok(id) => info!("Answered {} with message {}", outcome.link, id),
                Err(e) => error!("Could not answer {}: {:#}", outcome.link, e),
            }
        }
    }

    info!("Input closed, shutting down");
    Ok(())
}

fn build_bot(config: &Config) -> Result<ProductBot> {
    let scraper = AmazonScraper::new(config.scraper_config())?;

    let archive: Arc<dyn ByteStore> = match &config.archive_dir {
        Some(dir) => Arc::new(FileArchive::new(dir, "html")),
        None => Arc::new(MemoryArchive::new()),
    };

    let fetcher = ProductFetcher::new(
        Arc::new(scraper),
        Arc::new(ExpiringRepository::<Product>::new(config.product_ttl)),
        Arc::new(ExpiringRepository::<DeliveryRecord>::new(config.delivery_ttl)),
        archive,
        Arc::new(FixtureWriter::new(&config.report_dir)),
    );

    let delivery: Arc<dyn ProductDelivery> = match &config.discord_webhook_url {
        Some(webhook_url) => Arc::new(DiscordNotifier::new(webhook_url, config.referral_tag.clone())),
        None => {
            warn!("DISCORD_WEBHOOK_URL not set - products will only be logged");
            Arc::new(LogDelivery::new(config.referral_tag.clone()))
        }
    };

    Ok(ProductBot::new(fetcher, delivery))
}
