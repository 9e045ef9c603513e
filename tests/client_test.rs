use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{FixedOffset, TimeZone};
use gmail_reader::error::{GmailError, GmailResult};
use gmail_reader::parser::MimeParser;
use gmail_reader::transport::{MailService, MessagePage};
use gmail_reader::{GmailClient, MessageRow};
use tokio_test::{assert_err, assert_ok};

/// In-memory mailbox serving fixed pages and raw payloads
#[derive(Default)]
struct FakeMailbox {
    pages: Vec<Vec<MessageRow>>,
    raw: HashMap<String, String>,
    requested_sizes: Mutex<Vec<Option<u32>>>,
}

impl FakeMailbox {
    fn with_pages(pages: Vec<Vec<&str>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| {
                page.into_iter()
                    .map(|id| MessageRow {
                        id: id.to_string(),
                        thread_id: format!("thread-{}", id),
                    })
                    .collect()
            })
            .collect();

        Self {
            pages,
            ..Self::default()
        }
    }

    fn with_message(mut self, id: &str, eml: &[u8]) -> Self {
        self.raw.insert(id.to_string(), URL_SAFE_NO_PAD.encode(eml));
        self
    }
}

#[async_trait]
impl MailService for FakeMailbox {
    async fn list_page(
        &self,
        _user: &str,
        _query: &str,
        page_token: Option<String>,
        page_size: Option<u32>,
    ) -> GmailResult<MessagePage> {
        self.requested_sizes.lock().unwrap().push(page_size);

        let index: usize = page_token.map_or(0, |token| token.parse().unwrap());
        let mut messages = self.pages.get(index).cloned().unwrap_or_default();
        if let Some(size) = page_size {
            messages.truncate(size as usize);
        }

        let next_page_token = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(MessagePage {
            messages,
            next_page_token,
        })
    }

    async fn fetch_raw(&self, _user: &str, id: &str) -> GmailResult<String> {
        self.raw
            .get(id)
            .cloned()
            .ok_or_else(|| GmailError::Transport(format!("404 Not Found: {}", id)))
    }
}

fn client(mailbox: FakeMailbox) -> GmailClient {
    GmailClient::with_service("me", Arc::new(mailbox), Arc::new(MimeParser))
}

#[tokio::test]
async fn test_read_report_fixture() {
    let eml = fs::read("data_test/report.eml").expect("Failed to read data_test/report.eml");
    let client = client(FakeMailbox::default().with_message("r1", &eml));

    let message = assert_ok!(client.read_message("r1").await);

    assert_eq!(message.id, "r1");
    assert_eq!(message.from, "Chloé Martin <chloe@example.com>");
    assert_eq!(message.to, vec!["team@example.com", "Bob <bob@example.com>"]);
    assert_eq!(message.cc, vec!["张三 <zhang@example.com>"]);
    assert_eq!(message.reply_to, vec!["replies@example.com"]);
    assert_eq!(message.subject, "Rapport hebdomadaire");
    assert!(message.text.contains("le café est prêt."));
    assert_eq!(message.html.trim_end(), "<p>Bonjour</p>");
    assert_eq!(message.sender, "=?UTF-8?Q?Robot?= <robot@example.com>");

    let utc = FixedOffset::east_opt(0).unwrap();
    assert_eq!(
        message.date,
        Some(utc.with_ymd_and_hms(2019, 7, 9, 14, 46, 8).unwrap())
    );
}

#[tokio::test]
async fn test_read_keeps_date_offset() {
    let eml = b"From: a@example.com\r\n\
        Subject: offset\r\n\
        Date: Tue, 9 Jul 2019 14:46:08 +0800\r\n\
        \r\n\
        hi\r\n";
    let client = client(FakeMailbox::default().with_message("d1", eml));

    let message = assert_ok!(client.read_message("d1").await);
    let date = message.date.unwrap();

    assert_eq!(date.offset().local_minus_utc(), 8 * 3600);
    assert_eq!(date.to_rfc3339(), "2019-07-09T14:46:08+08:00");
}

#[tokio::test]
async fn test_read_without_date() {
    let eml = b"From: a@example.com\r\nSubject: undated\r\n\r\nhi\r\n";
    let client = client(FakeMailbox::default().with_message("n1", eml));

    let message = assert_ok!(client.read_message("n1").await);
    assert_eq!(message.date, None);
    assert_eq!(message.subject, "undated");
}

#[tokio::test]
async fn test_read_rejects_unparseable_date() {
    let eml = b"From: a@example.com\r\nDate: next tuesday\r\n\r\nhi\r\n";
    let client = client(FakeMailbox::default().with_message("bad", eml));

    let err = assert_err!(client.read_message("bad").await);
    assert!(matches!(err, GmailError::Format(_)));
}

#[tokio::test]
async fn test_read_unknown_id_is_transport_error() {
    let client = client(FakeMailbox::default());

    let err = assert_err!(client.read_message("missing").await);
    assert!(matches!(err, GmailError::Transport(_)));
}

#[tokio::test]
async fn test_list_walks_every_page() {
    let mailbox = FakeMailbox::with_pages(vec![vec!["a", "b"], vec!["c"], vec!["d", "e"]]);
    let client = client(mailbox);

    let rows = assert_ok!(client.list_messages("", 0).await);

    let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(rows[2].thread_id, "thread-c");
}

#[tokio::test]
async fn test_list_stops_at_max() {
    let mailbox = Arc::new(FakeMailbox::with_pages(vec![
        vec!["a", "b"],
        vec!["c", "d"],
        vec!["e", "f"],
    ]));
    let client = GmailClient::with_service("me", mailbox.clone(), Arc::new(MimeParser));

    let rows = assert_ok!(client.list_messages("in:inbox", 3).await);

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].id, "c");
    assert_eq!(
        *mailbox.requested_sizes.lock().unwrap(),
        vec![Some(3), Some(1)]
    );
}

#[tokio::test]
async fn test_list_empty_mailbox() {
    let client = client(FakeMailbox::with_pages(vec![vec![]]));

    let rows = assert_ok!(client.list_messages("from:nobody", 10).await);
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_connect_with_missing_credentials() {
    let dir = tempfile::tempdir().unwrap();

    let err = GmailClient::connect("me", dir.path().join("credentials.json"), "refresh")
        .await
        .err()
        .expect("connect should fail without credentials");
    assert!(err.is_config());
}

#[tokio::test]
async fn test_connect_with_empty_refresh_token() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(
        br#"{"web": {
            "client_id": "1234.apps.googleusercontent.com",
            "client_secret": "shh",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["https://developers.google.com/oauthplayground"]
        }}"#,
    )
    .unwrap();

    let err = GmailClient::connect("me", file.path(), "")
        .await
        .err()
        .expect("connect should fail without a refresh token");
    assert!(err.is_auth());
}
