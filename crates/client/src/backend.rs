use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};

use crate::error::{
    BuildHttpClientSnafu, ClientResult, DecodePayloadSnafu, EncodeRequestSnafu, ReadBodySnafu,
    RequestSnafu, UnexpectedStatusSnafu,
};
use crate::settings::ClientSettings;

pub const CHAT_ENDPOINT: &str = "/chat";
pub const FETCH_ENDPOINT: &str = "/fetch";
pub const GENERATE_ENDPOINT: &str = "/generate";
pub const LIST_INDEXES_ENDPOINT: &str = "/list_indexes";
pub const REMOVE_ENDPOINT: &str = "/remove";

pub const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Body of a successful `/list_indexes` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListIndexesResponse {
    #[serde(default)]
    pub indexes: Vec<String>,
}

/// Body of a successful `/generate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateResponse {
    #[serde(rename = "indexName", default)]
    pub index_name: String,
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    #[serde(rename = "indexName")]
    index_name: &'a str,
    extensions: &'a str,
}

#[derive(Debug, Serialize)]
struct RemoveRequest<'a> {
    #[serde(rename = "indexName")]
    index_name: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatQuery<'a> {
    msg: &'a str,
    #[serde(rename = "indexName", skip_serializing_if = "Option::is_none")]
    index_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct FetchQuery<'a> {
    link: &'a str,
    format: &'a str,
    extension: &'a str,
}

/// HTTP transport shared by the chat stream and the index registry.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    generate_timeout: Duration,
}

impl BackendClient {
    pub fn new(settings: &ClientSettings) -> ClientResult<Self> {
        let settings = settings.clone().normalized();
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .context(BuildHttpClientSnafu {
                stage: "build-backend-client",
            })?;

        let generate_timeout = settings.generate_timeout();
        Ok(Self {
            http,
            base_url: settings.backend_url,
            generate_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Opens the chat event stream. The caller owns the body and reads it incrementally.
    pub async fn open_chat(
        &self,
        message: &str,
        index_name: Option<&str>,
    ) -> ClientResult<reqwest::Response> {
        let query = ChatQuery {
            msg: message,
            index_name: index_name.filter(|name| !name.is_empty()),
        };

        let response = self
            .http
            .get(self.endpoint_url(CHAT_ENDPOINT))
            .query(&query)
            .header(ACCEPT, EVENT_STREAM_MIME)
            .send()
            .await
            .context(RequestSnafu {
                stage: "open-chat-stream",
                endpoint: CHAT_ENDPOINT,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return UnexpectedStatusSnafu {
                stage: "chat-http-status",
                endpoint: CHAT_ENDPOINT,
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        Ok(response)
    }

    pub async fn list_indexes(&self) -> ClientResult<ListIndexesResponse> {
        let response = self
            .http
            .get(self.endpoint_url(LIST_INDEXES_ENDPOINT))
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-list-indexes",
                endpoint: LIST_INDEXES_ENDPOINT,
            })?;

        let payload = Self::ok_text(response, LIST_INDEXES_ENDPOINT, "list-indexes").await?;
        serde_json::from_str(&payload).context(DecodePayloadSnafu {
            stage: "parse-list-indexes",
            endpoint: LIST_INDEXES_ENDPOINT,
        })
    }

    pub async fn generate(
        &self,
        source_link: &str,
        extensions: &str,
    ) -> ClientResult<GenerateResponse> {
        let data = serde_json::to_string(&GenerateRequest {
            index_name: source_link,
            extensions,
        })
        .context(EncodeRequestSnafu {
            stage: "encode-generate-request",
            endpoint: GENERATE_ENDPOINT,
        })?;

        let response = self
            .http
            .post(self.endpoint_url(GENERATE_ENDPOINT))
            .form(&[("data", data.as_str())])
            .timeout(self.generate_timeout)
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-generate",
                endpoint: GENERATE_ENDPOINT,
            })?;

        let payload = Self::ok_text(response, GENERATE_ENDPOINT, "generate").await?;
        serde_json::from_str(&payload).context(DecodePayloadSnafu {
            stage: "parse-generate-response",
            endpoint: GENERATE_ENDPOINT,
        })
    }

    pub async fn remove(&self, index_name: &str) -> ClientResult<String> {
        let data = serde_json::to_string(&RemoveRequest { index_name }).context(
            EncodeRequestSnafu {
                stage: "encode-remove-request",
                endpoint: REMOVE_ENDPOINT,
            },
        )?;

        let response = self
            .http
            .post(self.endpoint_url(REMOVE_ENDPOINT))
            .form(&[("data", data.as_str())])
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-remove",
                endpoint: REMOVE_ENDPOINT,
            })?;

        Self::ok_text(response, REMOVE_ENDPOINT, "remove").await
    }

    /// Returns the `/fetch` body as-is, whatever the status code.
    pub async fn fetch(&self, link: &str, format: &str, extension: &str) -> ClientResult<String> {
        let response = self
            .http
            .get(self.endpoint_url(FETCH_ENDPOINT))
            .query(&FetchQuery {
                link,
                format,
                extension,
            })
            .send()
            .await
            .context(RequestSnafu {
                stage: "send-fetch",
                endpoint: FETCH_ENDPOINT,
            })?;

        response.text().await.context(ReadBodySnafu {
            stage: "read-fetch-body",
            endpoint: FETCH_ENDPOINT,
        })
    }

    async fn ok_text(
        response: reqwest::Response,
        endpoint: &'static str,
        stage: &'static str,
    ) -> ClientResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .context(ReadBodySnafu { stage, endpoint })?;

        ensure!(
            status == reqwest::StatusCode::OK,
            UnexpectedStatusSnafu {
                stage,
                endpoint,
                status: status.as_u16(),
                body,
            }
        );

        Ok(body)
    }
}
