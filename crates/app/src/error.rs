use std::path::PathBuf;

use parley_llm::ProviderError;
use snafu::Snafu;

use crate::settings::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display(
        "no api key configured on `{stage}`; set `api_key` in {path:?} or PARLEY_API_KEY"
    ))]
    MissingApiKey { stage: &'static str, path: PathBuf },

    #[snafu(display("failed to create provider on `{stage}`: {source}"))]
    CreateProvider {
        stage: &'static str,
        source: ProviderError,
    },

    #[snafu(display("settings operation failed on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },

    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },

    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },

    #[snafu(display("nothing to translate on `{stage}`; pass a sentence, --link or --listen"))]
    NothingToTranslate { stage: &'static str },
}

pub type AppResult<T> = Result<T, AppError>;
