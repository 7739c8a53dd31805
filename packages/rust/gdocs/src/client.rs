//! Minimal Google Docs REST client.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use docscrawl_shared::{DocsCrawlError, Result};

use crate::auth::AccessToken;
use crate::requests::{chunk_text, insert_text, markdown_to_requests};

/// Default base URL of the Docs API.
pub const DEFAULT_BASE_URL: &str = "https://docs.googleapis.com/v1";

/// Requests sent per `batchUpdate` call.
const BATCH_SIZE: usize = 100;

/// Maximum characters sent by the plain-text fallback insert.
const FALLBACK_MAX_CHARS: usize = 1_000_000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Document {
    document_id: Option<String>,
    body: Body,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Body {
    content: Vec<StructuralElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StructuralElement {
    end_index: Option<usize>,
    paragraph: Option<Paragraph>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Paragraph {
    elements: Vec<ParagraphElement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ParagraphElement {
    text_run: Option<TextRun>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TextRun {
    content: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Creates, clears, fills and reads Google Docs with a bearer token.
#[derive(Debug, Clone)]
pub struct DocsClient {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl DocsClient {
    pub fn new(token: AccessToken) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DocsCrawlError::GoogleDocs(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        })
    }

    /// Point the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Browser URL for a document.
    pub fn document_url(document_id: &str) -> String {
        format!("https://docs.google.com/document/d/{document_id}/edit")
    }

    /// Create a document titled `title` and fill it with `content`.
    #[instrument(skip_all, fields(title = %title, chars = content.len()))]
    pub async fn create_document(&self, title: &str, content: &str) -> Result<String> {
        let url = format!("{}/documents", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.secret())
            .json(&json!({ "title": title }))
            .send()
            .await
            .map_err(|e| DocsCrawlError::GoogleDocs(format!("create request failed: {e}")))?;

        let doc: Document = parse_json(response).await?;
        let document_id = doc
            .document_id
            .ok_or_else(|| DocsCrawlError::GoogleDocs("create response has no documentId".into()))?;
        info!(document_id = %document_id, "created Google Doc");

        self.insert_content(&document_id, content).await?;
        Ok(document_id)
    }

    /// Replace (or with `append`, extend) a document's content.
    #[instrument(skip_all, fields(document_id = %document_id, append = append))]
    pub async fn update_document(&self, document_id: &str, content: &str, append: bool) -> Result<()> {
        if !append {
            self.clear_document(document_id).await?;
        }
        self.insert_content(document_id, content).await?;
        info!("updated Google Doc");
        Ok(())
    }

    /// Delete everything but the final newline the API always keeps.
    pub async fn clear_document(&self, document_id: &str) -> Result<()> {
        let doc = self.get_document(document_id).await?;
        let end_index = doc
            .body
            .content
            .iter()
            .filter_map(|el| el.end_index)
            .max()
            .unwrap_or(0);

        if end_index <= 2 {
            debug!(document_id, "document already empty");
            return Ok(());
        }

        let request = json!({
            "deleteContentRange": {
                "range": { "startIndex": 1, "endIndex": end_index - 1 }
            }
        });
        self.batch_update(document_id, &[request]).await
    }

    /// Plain text of a document, one paragraph per line.
    pub async fn get_document_content(&self, document_id: &str) -> Result<String> {
        let doc = self.get_document(document_id).await?;
        let paragraphs: Vec<String> = doc
            .body
            .content
            .iter()
            .filter_map(|el| el.paragraph.as_ref())
            .map(|p| {
                p.elements
                    .iter()
                    .filter_map(|e| e.text_run.as_ref())
                    .map(|run| run.content.as_str())
                    .collect()
            })
            .collect();
        Ok(paragraphs.join("\n"))
    }

    async fn get_document(&self, document_id: &str) -> Result<Document> {
        let url = format!("{}/documents/{document_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.token.secret())
            .send()
            .await
            .map_err(|e| DocsCrawlError::GoogleDocs(format!("get request failed: {e}")))?;
        parse_json(response).await
    }

    /// Insert formatted content; on failure retry once as a single plain insert.
    async fn insert_content(&self, document_id: &str, content: &str) -> Result<()> {
        let requests = markdown_to_requests(content);

        let mut failure = None;
        for (i, batch) in requests.chunks(BATCH_SIZE).enumerate() {
            if let Err(e) = self.batch_update(document_id, batch).await {
                failure = Some(e);
                break;
            }
            debug!(batch = i + 1, "inserted content batch");
        }

        let Some(err) = failure else {
            return Ok(());
        };
        warn!(error = %err, "formatted insert failed, falling back to plain text");

        let text = chunk_text(content, FALLBACK_MAX_CHARS)
            .first()
            .copied()
            .unwrap_or_default();
        self.batch_update(document_id, &[insert_text(1, text)]).await
    }

    async fn batch_update(&self, document_id: &str, requests: &[Value]) -> Result<()> {
        let url = format!("{}/documents/{document_id}:batchUpdate", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.secret())
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|e| DocsCrawlError::GoogleDocs(format!("batchUpdate request failed: {e}")))?;
        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("authentication failed (HTTP {})", status.as_u16())
        }
        _ => format!("HTTP {}: {}", status.as_u16(), body.trim()),
    };
    Err(DocsCrawlError::GoogleDocs(message))
}

async fn parse_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| DocsCrawlError::GoogleDocs(format!("failed to read response: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DocsCrawlError::GoogleDocs(format!("unexpected response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DocsClient {
        DocsClient::new(AccessToken::new("tkn"))
            .unwrap()
            .with_base_url(server.uri())
    }

    async fn batch_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().ends_with(":batchUpdate"))
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn create_inserts_formatted_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .and(header("authorization", "Bearer tkn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documentId": "doc-1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/documents/doc-1:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).create_document("Docs", "# Intro\nhello").await.unwrap();
        assert_eq!(id, "doc-1");

        let bodies = batch_bodies(&server).await;
        assert_eq!(bodies[0]["requests"].as_array().unwrap().len(), 3);
        assert_eq!(bodies[0]["requests"][2]["insertText"]["text"], "hello\n");
    }

    #[tokio::test]
    async fn large_content_is_sent_in_batches_of_100() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/doc-2:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(3)
            .mount(&server)
            .await;

        let content = vec!["line"; 250].join("\n");
        client(&server).update_document("doc-2", &content, true).await.unwrap();

        let sizes: Vec<usize> = batch_bodies(&server)
            .await
            .iter()
            .map(|b| b["requests"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn replace_clears_before_inserting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents/doc-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documentId": "doc-3",
                "body": { "content": [
                    { "endIndex": 1, "sectionBreak": {} },
                    { "endIndex": 12, "paragraph": { "elements": [ { "textRun": { "content": "old content\n" } } ] } }
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/documents/doc-3:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let c = client(&server);
        assert_eq!(c.get_document_content("doc-3").await.unwrap(), "old content\n");
        c.update_document("doc-3", "new", false).await.unwrap();

        let bodies = batch_bodies(&server).await;
        let range = &bodies[0]["requests"][0]["deleteContentRange"]["range"];
        assert_eq!(range["startIndex"], 1);
        assert_eq!(range["endIndex"], 11);
        assert_eq!(bodies[1]["requests"][0]["insertText"]["text"], "new\n");
    }

    #[tokio::test]
    async fn failed_batch_falls_back_to_plain_insert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/doc-4:batchUpdate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/documents/doc-4:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        client(&server).update_document("doc-4", "# T\nbody", true).await.unwrap();

        let bodies = batch_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        let fallback = bodies[1]["requests"].as_array().unwrap();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0]["insertText"]["text"], "# T\nbody");
    }

    #[tokio::test]
    async fn auth_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents/doc-5"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).get_document_content("doc-5").await.unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn document_urls() {
        assert_eq!(
            DocsClient::document_url("abc"),
            "https://docs.google.com/document/d/abc/edit"
        );
    }
}
