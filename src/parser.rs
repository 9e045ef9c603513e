use log::debug;
use mail_parser::{Addr, Address, Header, HeaderName, MessageParser, PartType};

use crate::error::{GmailError, GmailResult};

/// Header and body fields extracted from a raw RFC 822 message, not yet decoded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    pub reply_to: Vec<String>,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
    /// Raw Sender header
    pub sender: String,
    /// Raw Date header, if present
    pub date: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
pub trait MailParser: Send + Sync {
    fn parse(&self, raw: &[u8]) -> GmailResult<ParsedMessage>;
}

/// [`MailParser`] backed by the `mail-parser` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct MimeParser;

impl MailParser for MimeParser {
    fn parse(&self, raw: &[u8]) -> GmailResult<ParsedMessage> {
        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| GmailError::Format("unable to parse MIME structure".to_string()))?;

        let headers: &[Header] = message
            .parts
            .first()
            .map(|root| root.headers.as_slice())
            .unwrap_or_default();

        let text = message
            .text_part(0)
            .and_then(|part| match &part.body {
                PartType::Text(text) => Some(text.to_string()),
                _ => None,
            })
            .unwrap_or_default();

        let html = message
            .html_part(0)
            .and_then(|part| match &part.body {
                PartType::Html(html) => Some(html.to_string()),
                _ => None,
            })
            .unwrap_or_default();

        let parsed = ParsedMessage {
            reply_to: format_addresses(message.reply_to()),
            from: format_addresses(message.from()).join(", "),
            to: format_addresses(message.to()),
            cc: format_addresses(message.cc()),
            bcc: format_addresses(message.bcc()),
            subject: message.subject().unwrap_or_default().to_string(),
            text,
            html,
            sender: raw_header(raw, headers, HeaderName::Sender).unwrap_or_default(),
            date: raw_header(raw, headers, HeaderName::Date),
        };

        debug!(
            "Parsed message: {} recipient(s), text {} bytes, html {} bytes",
            parsed.to.len(),
            parsed.text.len(),
            parsed.html.len()
        );

        Ok(parsed)
    }
}

/// Render every address of a header as `Name <address>` or `address`, groups flattened
fn format_addresses(address: Option<&Address>) -> Vec<String> {
    let addrs: Vec<&Addr> = match address {
        Some(Address::List(list)) => list.iter().collect(),
        Some(Address::Group(groups)) => groups.iter().flat_map(|group| group.addresses.iter()).collect(),
        None => Vec::new(),
    };

    addrs
        .into_iter()
        .filter_map(|addr| match (&addr.name, &addr.address) {
            (Some(name), Some(email)) if !name.is_empty() => Some(format!("{} <{}>", name, email)),
            (_, Some(email)) => Some(email.to_string()),
            (Some(name), None) => Some(name.to_string()),
            (None, None) => None,
        })
        .collect()
}

/// Last occurrence of a header, exactly as written in the message, unfolded and trimmed
fn raw_header<'x>(raw: &[u8], headers: &[Header<'x>], name: HeaderName<'x>) -> Option<String> {
    let header = headers.iter().rev().find(|header| header.name == name)?;
    let value = raw.get(header.offset_start as usize..header.offset_end as usize)?;

    let unfolded = String::from_utf8_lossy(value)
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    (!unfolded.is_empty()).then_some(unfolded)
}
