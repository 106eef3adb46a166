use std::fmt;
use std::str::FromStr;

use crate::backend::BackendClient;

use super::selection::{IndexDescriptor, IndexSelection};

/// Conversions offered by the backend's `/fetch` endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    #[default]
    Github,
    PlainText,
    Markdown,
    Summary,
}

impl ContentFormat {
    pub const ALL: [ContentFormat; 4] = [
        ContentFormat::Github,
        ContentFormat::PlainText,
        ContentFormat::Markdown,
        ContentFormat::Summary,
    ];

    /// Wire value of the `format` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "Github",
            Self::PlainText => "Plain Text",
            Self::Markdown => "Markdown",
            Self::Summary => "Summary",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw
            .trim()
            .chars()
            .filter(|ch| !matches!(*ch, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();

        Self::ALL
            .into_iter()
            .find(|format| format.as_str().replace(' ', "").to_ascii_lowercase() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown content format '{raw}', expected one of: {}",
                    Self::ALL.map(|format| format.as_str()).join(", ")
                )
            })
    }
}

/// Outcome of an index mutation: the status text for the user and, on success,
/// the selection to render next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexUpdate {
    pub message: String,
    pub selection: Option<IndexSelection>,
}

impl IndexUpdate {
    fn applied(message: impl Into<String>, selection: IndexSelection) -> Self {
        Self {
            message: message.into(),
            selection: Some(selection),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            selection: None,
        }
    }
}

/// Index lifecycle operations against the backend.
///
/// Failures never escape as errors: they become user-facing messages or empty
/// results, and are logged.
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    backend: BackendClient,
}

impl IndexRegistry {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    pub async fn refresh(&self) -> Vec<IndexDescriptor> {
        match self.backend.list_indexes().await {
            Ok(response) => response
                .indexes
                .into_iter()
                .map(IndexDescriptor::from_id)
                .collect(),
            Err(error) => {
                tracing::warn!(error = %error, "failed to list indexes; showing none");
                Vec::new()
            }
        }
    }

    /// Replaces the choices with the server's list, keeping the active index when
    /// it is still listed.
    pub async fn reload(&self, current: &IndexSelection) -> IndexSelection {
        let descriptors = self.refresh().await;
        current.clone().with_descriptors(descriptors)
    }

    pub async fn create_index(
        &self,
        current: &IndexSelection,
        source_link: &str,
        extensions: &str,
    ) -> IndexUpdate {
        match self.backend.generate(source_link, extensions).await {
            Ok(response) => {
                tracing::info!(
                    index_name = %response.index_name,
                    known = current.contains(&response.index_name),
                    "index generated"
                );
                let selection = current.clone().with_index(response.index_name);
                IndexUpdate::applied(response.result, selection)
            }
            Err(error) => {
                tracing::warn!(
                    source_link = %source_link,
                    error = %error,
                    "index generation failed"
                );
                IndexUpdate::rejected(error.user_message())
            }
        }
    }

    pub async fn remove_index(&self, current: &IndexSelection, index_name: &str) -> IndexUpdate {
        match self.backend.remove(index_name).await {
            Ok(message) => {
                tracing::info!(index_name = %index_name, "index removed");
                IndexUpdate::applied(message, current.clone().without(index_name))
            }
            Err(error) => {
                tracing::warn!(
                    index_name = %index_name,
                    error = %error,
                    "index removal failed"
                );
                IndexUpdate::rejected(error.user_message())
            }
        }
    }

    /// Fetches `link` converted to `format_type`; the body is returned untouched.
    pub async fn fetch_content(&self, link: &str, format_type: &str, extensions: &str) -> String {
        match self.backend.fetch(link, format_type, extensions).await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(link = %link, error = %error, "content fetch failed");
                error.user_message()
            }
        }
    }
}
