use std::path::Path;
use std::sync::Arc;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::{DateTime, FixedOffset};
use log::{debug, info};
use serde::Serialize;

use crate::auth::{RefreshTokenSource, TokenSource};
use crate::decode::{decode, decode_all};
use crate::error::{GmailError, GmailResult};
use crate::parser::{MailParser, MimeParser};
use crate::transport::{GmailApi, MailService, MAX_PAGE_SIZE};

/// RFC 5322 date layout after the weekday, e.g. `9 Jul 2019 14:46:08 +0800`
const DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Gmail sends raw messages base64url encoded; accept them with or without padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One row of a message listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRow {
    pub id: String,
    pub thread_id: String,
}

/// A fetched message with decoded headers and bodies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub reply_to: Vec<String>,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    /// Sender header as written in the message (not decoded)
    pub sender: String,
    /// None when the message carries no Date header
    pub date: Option<DateTime<FixedOffset>>,
}

/// Authenticated handle to one mailbox
#[derive(Clone)]
pub struct GmailClient {
    user: String,
    service: Arc<dyn MailService>,
    parser: Arc<dyn MailParser>,
}

impl GmailClient {
    /// Exchange `refresh_token` for an access token and bind the session to `user`
    ///
    /// The OAuth2 client must be a web application registered in the Google API
    /// console; the refresh token can be generated with the OAuth playground
    /// using the client id and secret from `credentials_path`.
    pub async fn connect(
        user: &str,
        credentials_path: impl AsRef<Path>,
        refresh_token: &str,
    ) -> GmailResult<Self> {
        info!("Connecting to Gmail API via OAuth2 for {}", user);

        let tokens = RefreshTokenSource::from_credentials_file(credentials_path, refresh_token).await?;
        Self::with_token_source(user, Arc::new(tokens)).await
    }

    /// Perform the initial token exchange, then talk to Gmail with `tokens`
    pub async fn with_token_source(user: &str, tokens: Arc<dyn TokenSource>) -> GmailResult<Self> {
        let token = tokens.exchange().await?;
        debug!("Initial access token expires at {:?}", token.expires_at);

        let service = GmailApi::new(tokens)?;

        info!("✅ Gmail API connection established successfully");
        Ok(Self::with_service(user, Arc::new(service), Arc::new(MimeParser)))
    }

    /// Build a client on top of any mail service and parser
    pub fn with_service(
        user: &str,
        service: Arc<dyn MailService>,
        parser: Arc<dyn MailParser>,
    ) -> Self {
        Self {
            user: user.to_string(),
            service,
            parser,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// List every message matching `query`, spam and trash included
    ///
    /// An empty query matches the whole mailbox. `max_results <= 0` drains all
    /// pages; a positive value caps the number of rows returned.
    pub async fn list_messages(&self, query: &str, max_results: i64) -> GmailResult<Vec<MessageRow>> {
        let limit = usize::try_from(max_results).ok().filter(|&n| n > 0);
        debug!("Listing messages for {} (query: {:?}, limit: {:?})", self.user, query, limit);

        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page_size = limit.map(|limit| {
                u32::try_from(limit - rows.len()).map_or(MAX_PAGE_SIZE, |left| left.min(MAX_PAGE_SIZE))
            });

            let page = self
                .service
                .list_page(&self.user, query, page_token.take(), page_size)
                .await?;
            pages += 1;

            rows.extend(page.messages);

            if let Some(limit) = limit {
                if rows.len() >= limit {
                    rows.truncate(limit);
                    break;
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!("Found {} message(s) across {} page(s)", rows.len(), pages);
        Ok(rows)
    }

    /// Fetch a message in raw form and parse it
    pub async fn read_message(&self, id: &str) -> GmailResult<Message> {
        debug!("Complete email retrieval for ID: {}", id);

        let raw = self.service.fetch_raw(&self.user, id).await?;
        let bytes = URL_SAFE_LENIENT.decode(raw.trim())?;
        debug!("Email retrieved, size: {} bytes", bytes.len());

        let parsed = self.parser.parse(&bytes)?;
        let date = parse_date(parsed.date.as_deref())?;

        Ok(Message {
            id: id.to_string(),
            reply_to: decode_all(&parsed.reply_to),
            from: decode(&parsed.from),
            to: decode_all(&parsed.to),
            cc: decode_all(&parsed.cc),
            bcc: decode_all(&parsed.bcc),
            subject: decode(&parsed.subject),
            text: decode(&parsed.text),
            html: decode(&parsed.html),
            sender: parsed.sender,
            date,
        })
    }
}

/// Parse a Date header, ignoring a trailing zone comment such as ` (UTC)`
///
/// An absent or empty header yields None; anything else must match
/// `Mon, 2 Jan 2006 15:04:05 -0700`. The weekday has to be a valid name but
/// is not checked against the date.
pub fn parse_date(value: Option<&str>) -> GmailResult<Option<DateTime<FixedOffset>>> {
    let value = match value.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(None),
    };

    let invalid = |reason: String| {
        GmailError::Format(format!("invalid Date header {:?}: {}", value, reason))
    };

    let without_comment = value.split(" (").next().unwrap_or(value).trim_end();

    let rest = without_comment
        .split_once(", ")
        .filter(|(day, _)| WEEKDAYS.iter().any(|name| name.eq_ignore_ascii_case(day)))
        .map(|(_, rest)| rest)
        .ok_or_else(|| invalid("missing day of week".to_string()))?;

    DateTime::parse_from_str(rest, DATE_FORMAT)
        .map(Some)
        .map_err(|e| invalid(e.to_string()))
}
