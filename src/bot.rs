//! Chat-facing glue: finds product links in incoming messages, answers each
//! with the scraped product, and routes reports back to the fetcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::links::{delivered_link, extract_many, parse_link};
use crate::models::Product;
use crate::product_fetcher::ProductFetcher;

/// Sends a product to the chat and returns the id of the message it created
#[async_trait]
pub trait ProductDelivery: Send + Sync {
    async fn deliver(&self, product: &Product) -> Result<String>;
}

/// Delivery that only logs; ids are local and sequential
#[derive(Debug, Default)]
pub struct LogDelivery {
    next_id: AtomicU64,
    referral_tag: Option<String>,
}

impl LogDelivery {
    pub fn new(referral_tag: Option<String>) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            referral_tag,
        }
    }

    /// Link logged for `product`, tagged like a chat delivery would be
    pub fn link_for(&self, product: &Product) -> String {
        delivered_link(&product.url, self.referral_tag.as_deref()).to_string()
    }
}

#[async_trait]
impl ProductDelivery for LogDelivery {
    async fn deliver(&self, product: &Product) -> Result<String> {
        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        info!(
            "[{}] {} - {:.2} ({:.1}★, {} ratings) {}",
            id,
            product.title,
            product.price,
            product.rating,
            product.ratings_count,
            self.link_for(product)
        );
        Ok(id)
    }
}

/// An incoming chat message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub content: String,
    /// Messages the bot sent itself are ignored
    pub from_this_bot: bool,
}

/// Result of answering one link
#[derive(Debug)]
pub struct LinkOutcome {
    pub link: String,
    pub result: Result<String>,
}

#[derive(Clone)]
pub struct ProductBot {
    fetcher: ProductFetcher,
    delivery: Arc<dyn ProductDelivery>,
}

impl ProductBot {
    pub fn new(fetcher: ProductFetcher, delivery: Arc<dyn ProductDelivery>) -> Self {
        Self { fetcher, delivery }
    }

    pub fn fetcher(&self) -> &ProductFetcher {
        &self.fetcher
    }

    /// Answers every product link in `message`, fetching them concurrently.
    ///
    /// Outcomes come back in the order the links appear in the message.
    pub async fn handle_message(&self, message: &Message) -> Vec<LinkOutcome> {
        if message.from_this_bot {
            return Vec::new();
        }

        let links: Vec<String> = extract_many(&message.content)
            .into_iter()
            .map(str::to_string)
            .collect();
        if links.is_empty() {
            return Vec::new();
        }
        info!("Message {} carries {} product links", message.id, links.len());

        let mut tasks = JoinSet::new();
        for (index, link) in links.iter().enumerate() {
            let bot = self.clone();
            let link = link.clone();
            tasks.spawn(async move { (index, bot.answer_link(&link).await) });
        }

        let mut results: Vec<Option<Result<String>>> = links.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("Link task failed: {}", e),
            }
        }

        links
            .into_iter()
            .zip(results)
            .map(|(link, result)| LinkOutcome {
                link,
                result: result.unwrap_or_else(|| Err(anyhow::anyhow!("link task did not finish"))),
            })
            .collect()
    }

    /// Forwards a report on one of our messages
    pub async fn handle_report(&self, message_id: &str) {
        self.fetcher.on_report(message_id).await;
    }

    async fn answer_link(&self, link: &str) -> Result<String> {
        let url = parse_link(link)?;
        let product = self.fetcher.fetch(&url).await?;
        let message_id = self.delivery.deliver(&product).await?;
        self.fetcher.on_product_delivered(&message_id, &product);
        Ok(message_id)
    }
}
