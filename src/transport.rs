use std::sync::Arc;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{header, Body, Client, Method, Request};
use hyper_rustls::HttpsConnector;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::auth::TokenSource;
use crate::client::MessageRow;
use crate::error::{GmailError, GmailResult};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Largest page the messages.list endpoint serves
pub const MAX_PAGE_SIZE: u32 = 500;

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<MessageRow>,
    pub next_page_token: Option<String>,
}

/// Remote mail service operations used by the client
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailService: Send + Sync {
    /// Fetch one page of messages matching `query`, spam and trash included
    async fn list_page(
        &self,
        user: &str,
        query: &str,
        page_token: Option<String>,
        page_size: Option<u32>,
    ) -> GmailResult<MessagePage>;

    /// Fetch a message in raw form: the RFC 822 bytes, base64url encoded
    async fn fetch_raw(&self, user: &str, id: &str) -> GmailResult<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    messages: Option<Vec<MessageRef>>,
    next_page_token: Option<String>,
    result_size_estimate: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: Option<String>,
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessageResponse {
    raw: Option<String>,
}

/// HTTPS-only hyper client trusting the bundled webpki roots
pub fn https_client() -> Client<HttpsConnector<HttpConnector>> {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_only()
        .enable_http1()
        .build();

    Client::builder().build(connector)
}

/// Gmail REST API v1 over HTTPS
pub struct GmailApi {
    http: Client<HttpsConnector<HttpConnector>>,
    tokens: Arc<dyn TokenSource>,
    base_url: Url,
}

impl GmailApi {
    pub fn new(tokens: Arc<dyn TokenSource>) -> GmailResult<Self> {
        let http = https_client();
        let base_url = Url::parse(GMAIL_API_BASE)
            .map_err(|e| GmailError::Config(format!("invalid Gmail API base URL: {}", e)))?;

        Ok(Self {
            http,
            tokens,
            base_url,
        })
    }

    fn messages_url(&self, user: &str, id: Option<&str>) -> GmailResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| GmailError::Config("Gmail API base URL cannot hold a path".to_string()))?;
            segments.extend(["users", user, "messages"]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> GmailResult<T> {
        let token = self.tokens.exchange().await?;

        debug!("GET {}", url);
        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {}", token.secret))
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .map_err(|e| GmailError::Transport(format!("unable to build request: {}", e)))?;

        let response = self.http.request(request).await?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body);
            warn!("Gmail API answered {} for {}", status, url.path());
            return Err(GmailError::Transport(format!(
                "Gmail API returned {}: {}",
                status,
                body.trim()
            )));
        }

        serde_json::from_slice(&body)
            .map_err(|e| GmailError::Transport(format!("unexpected Gmail API response: {}", e)))
    }
}

#[async_trait]
impl MailService for GmailApi {
    async fn list_page(
        &self,
        user: &str,
        query: &str,
        page_token: Option<String>,
        page_size: Option<u32>,
    ) -> GmailResult<MessagePage> {
        let mut url = self.messages_url(user, None)?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("includeSpamTrash", "true");
            if !query.is_empty() {
                params.append_pair("q", query);
            }
            if let Some(size) = page_size {
                params.append_pair("maxResults", &size.min(MAX_PAGE_SIZE).to_string());
            }
            if let Some(token) = page_token.as_deref() {
                params.append_pair("pageToken", token);
            }
        }

        let response: ListMessagesResponse = self.get_json(url).await?;
        debug!(
            "Listed {} message(s), estimate {:?}, more: {}",
            response.messages.as_ref().map_or(0, Vec::len),
            response.result_size_estimate,
            response.next_page_token.is_some()
        );

        let messages = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| {
                msg.id.map(|id| MessageRow {
                    id,
                    thread_id: msg.thread_id.unwrap_or_default(),
                })
            })
            .collect();

        Ok(MessagePage {
            messages,
            next_page_token: response.next_page_token,
        })
    }

    async fn fetch_raw(&self, user: &str, id: &str) -> GmailResult<String> {
        let mut url = self.messages_url(user, Some(id))?;
        url.query_pairs_mut().append_pair("format", "raw");

        let response: RawMessageResponse = self.get_json(url).await?;
        response
            .raw
            .ok_or_else(|| GmailError::Format(format!("message {} has no raw payload", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockTokenSource;

    fn api() -> GmailApi {
        GmailApi::new(Arc::new(MockTokenSource::new())).unwrap()
    }

    #[test]
    fn test_messages_url_for_address() {
        let url = api().messages_url("someone@example.com", None).unwrap();
        assert_eq!(
            url.as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/someone@example.com/messages"
        );
    }

    #[test]
    fn test_message_url_includes_id() {
        let url = api().messages_url("me", Some("18c2f0a1b2")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/messages/18c2f0a1b2"
        );
    }

    #[test]
    fn test_list_response_deserialization() {
        let json = r#"{
            "messages": [
                {"id": "a1", "threadId": "t1"},
                {"id": "a2", "threadId": "t2"}
            ],
            "nextPageToken": "next",
            "resultSizeEstimate": 2
        }"#;

        let response: ListMessagesResponse = serde_json::from_str(json).unwrap();
        let messages = response.messages.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].thread_id.as_deref(), Some("t2"));
        assert_eq!(response.next_page_token.as_deref(), Some("next"));
    }

    #[test]
    fn test_empty_list_response() {
        let response: ListMessagesResponse =
            serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(response.messages.is_none());
        assert!(response.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_token_failure_stops_request() {
        let mut tokens = MockTokenSource::new();
        tokens
            .expect_exchange()
            .times(1)
            .returning(|| Err(GmailError::Auth("revoked".to_string())));
        let api = GmailApi::new(Arc::new(tokens)).unwrap();

        let err = api.fetch_raw("me", "abc").await.unwrap_err();
        assert!(err.is_auth());
    }
}
