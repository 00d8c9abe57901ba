//! Replies produced by the dispatcher

use super::event::{ChatId, MessageId};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::PathBuf;

/// Where an image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote URL. A `{ts}` placeholder is replaced by epoch millis when sent.
    Url(String),
    /// Local file uploaded with the request
    File(PathBuf),
}

impl ImageSource {
    /// `http://` and `https://` values are URLs, anything else a file path
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            ImageSource::Url(value.to_string())
        } else {
            ImageSource::File(PathBuf::from(value))
        }
    }

    /// Fill in the cache-busting timestamp
    pub fn resolved_at(&self, now: DateTime<Utc>) -> Self {
        match self {
            ImageSource::Url(url) => {
                ImageSource::Url(url.replace("{ts}", &now.timestamp_millis().to_string()))
            }
            ImageSource::File(_) => self.clone(),
        }
    }
}

/// Send an image when free text matches a pattern
#[derive(Debug, Clone)]
pub struct ImageTrigger {
    pub pattern: Regex,
    pub image: ImageSource,
}

impl ImageTrigger {
    pub fn new(pattern: Regex, image: ImageSource) -> Self {
        Self { pattern, image }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text(String),
    /// Telegram HTML subset; callers escape user text
    Html(String),
    Image(ImageSource),
    Sticker {
        sticker: String,
        reply_to: Option<MessageId>,
    },
}

/// One message to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub chat_id: ChatId,
    pub content: OutboundContent,
}

impl Outbound {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            content: OutboundContent::Text(text.into()),
        }
    }

    pub fn html(chat_id: ChatId, html: impl Into<String>) -> Self {
        Self {
            chat_id,
            content: OutboundContent::Html(html.into()),
        }
    }

    pub fn image(chat_id: ChatId, image: ImageSource) -> Self {
        Self {
            chat_id,
            content: OutboundContent::Image(image),
        }
    }

    pub fn sticker(chat_id: ChatId, sticker: impl Into<String>, reply_to: Option<MessageId>) -> Self {
        Self {
            chat_id,
            content: OutboundContent::Sticker {
                sticker: sticker.into(),
                reply_to,
            },
        }
    }
}
