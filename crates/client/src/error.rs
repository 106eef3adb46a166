use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ClientError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to `{endpoint}` failed on `{stage}`: {source}"))]
    Request {
        stage: &'static str,
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read `{endpoint}` response body on `{stage}`: {source}"))]
    ReadBody {
        stage: &'static str,
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("backend endpoint `{endpoint}` returned status {status}: {body}"))]
    UnexpectedStatus {
        stage: &'static str,
        endpoint: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode `{endpoint}` payload on `{stage}`: {source}"))]
    DecodePayload {
        stage: &'static str,
        endpoint: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode `{endpoint}` request on `{stage}`: {source}"))]
    EncodeRequest {
        stage: &'static str,
        endpoint: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("index '{index_name}' is not among the known indexes"))]
    UnknownIndex {
        stage: &'static str,
        index_name: String,
    },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateSettingsDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteSettings {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameSettings {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Renders the error the way request/response operations report it to users.
    ///
    /// Status failures embed the status code and body, everything else the reason.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnexpectedStatus { status, body, .. } => format!("Error {status}: {body}"),
            other => format!("Error: {other}"),
        }
    }
}
