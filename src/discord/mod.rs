//! # Discord Webhook Delivery
//!
//! Posts scraped products to a Discord channel as rich embeds and returns the
//! id of the created message, so a later report on that message can be traced
//! back to the product.
//!
//! ## Embed Structure
//!
//! - **Title**: product title, linking to the product page (with the referral tag when configured)
//! - **Description**: product description cut to 150 characters
//! - **Thumbnail**: product image
//! - **Fields**: Price (struck-through original price and savings when discounted),
//!   Rating, #Ratings, and Out Of Stock when applicable
//! - **Color**: Amazon orange (`0xFF9900`)
//!
//! ## Environment Configuration
//!
//! Set `DISCORD_WEBHOOK_URL` with your webhook URL. Messages are posted with
//! `?wait=true` so Discord answers with the created message.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};

use crate::bot::ProductDelivery;
use crate::links::delivered_link;
use crate::models::{DiscordCreatedMessage, DiscordEmbed, DiscordField, DiscordMessage, DiscordThumbnail, Product};

const EMBED_COLOR: u32 = 0x00FF_9900;
const MAX_DESCRIPTION_LENGTH: usize = 150;

/// Discord webhook client for product deliveries.
///
/// `Clone` is cheap: `reqwest::Client` shares its connection pool.
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    referral_tag: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, referral_tag: Option<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.into(),
            referral_tag,
        }
    }

    /// Posts the product embed and returns the created message id.
    pub async fn send_product(&self, product: &Product) -> Result<String> {
        let message = DiscordMessage {
            embeds: vec![product_embed(product, self.referral_tag.as_deref())],
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .query(&[("wait", "true")])
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            error!("Failed to send Discord message: {}", response.status());
            anyhow::bail!("Discord webhook answered {}", response.status());
        }

        let created: DiscordCreatedMessage = response
            .json()
            .await
            .context("Discord webhook reply had no message id")?;

        info!("Discord message {} sent for product: {}", created.id, product.title);
        Ok(created.id)
    }
}

#[async_trait]
impl ProductDelivery for DiscordNotifier {
    async fn deliver(&self, product: &Product) -> Result<String> {
        self.send_product(product).await
    }
}

/// Builds the rich embed for a product
pub fn product_embed(product: &Product, referral_tag: Option<&str>) -> DiscordEmbed {
    let url = delivered_link(&product.url, referral_tag);

    let mut fields = vec![
        DiscordField {
            name: "Price".to_string(),
            value: price_text(product),
            inline: true,
        },
        DiscordField {
            name: "Rating".to_string(),
            value: format!("{:.1}", product.rating),
            inline: true,
        },
        DiscordField {
            name: "#Ratings".to_string(),
            value: product.ratings_count.to_string(),
            inline: true,
        },
    ];
    if product.out_of_stock {
        fields.push(DiscordField {
            name: "Out Of Stock".to_string(),
            value: "😢".to_string(),
            inline: true,
        });
    }

    DiscordEmbed {
        title: product.title.clone(),
        description: cutoff(&product.description, MAX_DESCRIPTION_LENGTH, "..."),
        url: url.to_string(),
        color: EMBED_COLOR,
        thumbnail: (!product.image_url.is_empty()).then(|| DiscordThumbnail {
            url: product.image_url.clone(),
        }),
        fields,
    }
}

fn price_text(product: &Product) -> String {
    if product.original_price > 0.0 {
        let savings = product.original_price - product.price;
        let percent_off = savings / product.original_price * 100.0;
        format!(
            "~~{:.2}~~\n**{:.2}**\n*{:.2} ({:.0}%) off*",
            product.original_price, product.price, savings, percent_off
        )
    } else {
        format!("{:.2}", product.price)
    }
}

/// Cuts `input` to `max` characters and appends `replacement` when it was longer
fn cutoff(input: &str, max: usize, replacement: &str) -> String {
    match input.char_indices().nth(max) {
        Some((end, _)) => format!("{}{replacement}", &input[..end]),
        None => input.to_string(),
    }
}
