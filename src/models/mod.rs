//! Data models for scraped products, correlation records and Discord webhook payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A product scraped from a product page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub title: String,
    pub price: f64,
    /// Price before discount, `0.0` when the page shows none
    pub original_price: f64,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub description: String,
    /// Number of people who rated the product
    pub ratings_count: u32,
    /// Star rating between 0 and 5
    pub rating: f64,
    pub out_of_stock: bool,
    pub url: Url,
}

/// Product plus the markup it was extracted from.
///
/// Written to disk when a delivered product is reported, and read back by the
/// fixture regression test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub product: Product,
    pub html: String,
}

/// Ties a delivered chat message to the product that answered it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub message_id: String,
    pub cache_key: String,
    pub delivered_at: DateTime<Utc>,
}

/// Discord embed structure for rich notifications
#[derive(Debug, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    pub description: String,
    pub url: String,
    pub color: u32,
    pub thumbnail: Option<DiscordThumbnail>,
    pub fields: Vec<DiscordField>,
}

/// Small thumbnail image for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordThumbnail {
    pub url: String,
}

/// Key-value field for Discord embeds
#[derive(Debug, Serialize)]
pub struct DiscordField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub embeds: Vec<DiscordEmbed>,
}

/// The part of Discord's reply to `?wait=true` webhook calls we need
#[derive(Debug, Deserialize)]
pub struct DiscordCreatedMessage {
    pub id: String,
}
