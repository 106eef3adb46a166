use gitinsp_client::ClientError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("client failed on `{stage}`: {source}"))]
    Client {
        stage: &'static str,
        source: ClientError,
    },
    #[snafu(display("terminal i/o failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to render settings on `{stage}`: {source}"))]
    RenderSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type CliResult<T> = Result<T, CliError>;
