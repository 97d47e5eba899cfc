use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use parley_core::{LANGUAGES, TranslateConfig, TypingConfig};
use parley_llm::{DEFAULT_OPENAI_MODEL, Model, ModelRegistry, ProviderConfig};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

pub const DEFAULT_PROVIDER_ID: &str = "openai";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;
pub const SETTINGS_DIRECTORY_NAME: &str = "parley";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
/// Environment variables with this prefix override file values, e.g.
/// `PARLEY_API_KEY` or `PARLEY_TYPING__CHARS_PER_TICK`.
pub const ENV_PREFIX: &str = "PARLEY_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_OPENAI_MODEL.to_string(),
            description: None,
        }
    }
}

impl ModelSettings {
    fn normalized(mut self) -> Option<Self> {
        self.model_name = self.model_name.trim().to_string();
        if self.model_name.is_empty() {
            return None;
        }

        Some(self)
    }

    pub fn as_registry_model(&self) -> Model {
        let model = Model::from_id(self.model_name.clone());
        match &self.description {
            Some(description) => model.with_description(description.clone()),
            None => model,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSettings {
    #[serde(default = "default_chars_per_tick")]
    pub chars_per_tick: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self {
            chars_per_tick: default_chars_per_tick(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_models")]
    pub models: Vec<ModelSettings>,
    #[serde(default)]
    pub typing: TypingSettings,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            models: default_models(),
            typing: TypingSettings::default(),
            debounce_ms: default_debounce_ms(),
            default_language: default_language(),
        }
    }
}

/// Keys accepted by [`Settings::set`].
pub const SETTING_KEYS: &[&str] = &[
    "provider_id",
    "api_key",
    "endpoint",
    "models",
    "typing.chars_per_tick",
    "typing.tick_interval_ms",
    "debounce_ms",
    "default_language",
];

impl Settings {
    pub fn to_provider_config(&self) -> Option<ProviderConfig> {
        if self.api_key.trim().is_empty() {
            return None;
        }

        Some(ProviderConfig::new(
            &self.provider_id,
            &self.api_key,
            &self.endpoint,
        ))
    }

    /// Configured models in order; the first one is the default selection.
    pub fn model_registry(&self) -> ModelRegistry {
        ModelRegistry::new(
            self.models
                .iter()
                .filter_map(|model| model.clone().normalized())
                .map(|model| model.as_registry_model()),
        )
    }

    pub fn typing_config(&self) -> TypingConfig {
        TypingConfig {
            chars_per_tick: self.typing.chars_per_tick.max(1),
            tick_interval: Duration::from_millis(self.typing.tick_interval_ms),
        }
    }

    pub fn translate_config(&self) -> TranslateConfig {
        TranslateConfig {
            typing: self.typing_config(),
            quiet_period: Duration::from_millis(self.debounce_ms),
        }
    }

    /// Sets one value by its dotted key. `models` takes a comma-separated
    /// list whose first entry becomes the default.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "provider_id" => self.provider_id = value.trim().to_string(),
            "api_key" => self.api_key = value.trim().to_string(),
            "endpoint" => self.endpoint = value.trim().to_string(),
            "models" => {
                self.models = value
                    .split(',')
                    .map(|name| ModelSettings {
                        model_name: name.trim().to_string(),
                        description: None,
                    })
                    .collect();
            }
            "typing.chars_per_tick" => self.typing.chars_per_tick = parse_number(key, value)?,
            "typing.tick_interval_ms" => self.typing.tick_interval_ms = parse_number(key, value)?,
            "debounce_ms" => self.debounce_ms = parse_number(key, value)?,
            "default_language" => {
                let language = value.trim();
                ensure!(
                    LANGUAGES.contains(&language),
                    UnsupportedLanguageSnafu {
                        stage: "set-default-language",
                        language,
                    }
                );
                self.default_language = language.to_string();
            }
            _ => {
                return UnknownKeySnafu {
                    stage: "set-setting",
                    key,
                }
                .fail();
            }
        }

        Ok(())
    }

    /// Copy safe to print: the api key is reduced to whether it is set.
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        if !settings.api_key.is_empty() {
            settings.api_key = "<set>".to_string();
        }
        settings
    }

    pub fn to_pretty_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_string()
        };
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = if self.endpoint.trim().is_empty() {
            default_endpoint()
        } else {
            self.endpoint.trim().to_string()
        };

        // Blank model rows would leave the registry without a usable default.
        self.models = self
            .models
            .into_iter()
            .filter_map(ModelSettings::normalized)
            .collect();
        if self.models.is_empty() {
            self.models.push(ModelSettings::default());
        }

        self.typing.chars_per_tick = self.typing.chars_per_tick.max(1);

        if !LANGUAGES.contains(&self.default_language.trim()) {
            self.default_language = default_language();
        } else {
            self.default_language = self.default_language.trim().to_string();
        }

        self
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr<Err = ParseIntError>,
{
    value.trim().parse().context(InvalidNumberSnafu {
        stage: "parse-setting-number",
        key,
        value,
    })
}

/// Effective settings behind a swappable pointer.
///
/// Reads layer defaults, the JSON file and `PARLEY_` variables. Edits only
/// touch the file layer, so environment overrides are never written back.
pub struct SettingsStore {
    current: ArcSwap<Settings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parley"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_effective(&config_path);
        Self {
            current: ArcSwap::from_pointee(settings),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    /// Sets one key in the settings file and returns the new effective
    /// settings.
    pub fn set(&self, key: &str, value: &str) -> Result<Arc<Settings>, SettingsError> {
        self.edit(|settings| settings.set(key, value))
    }

    /// Applies `change` to the file layer, writes the file and reloads.
    ///
    /// A file that does not parse is left untouched.
    pub fn edit(
        &self,
        change: impl FnOnce(&mut Settings) -> Result<(), SettingsError>,
    ) -> Result<Arc<Settings>, SettingsError> {
        let mut file_settings = file_layers(&self.config_path)
            .extract::<Settings>()
            .context(ParseFileSnafu {
                stage: "read-settings-file",
                path: self.config_path.clone(),
            })?;
        change(&mut file_settings)?;
        self.write_atomically(&file_settings.normalized())?;

        let reloaded = Arc::new(Self::load_effective(&self.config_path));
        self.current.store(reloaded.clone());
        Ok(reloaded)
    }

    fn load_effective(path: &Path) -> Settings {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults");
        }

        let figment = file_layers(path).merge(Env::prefixed(ENV_PREFIX).split("__"));
        match figment.extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to parse settings, using defaults");
                Settings::default()
            }
        }
    }

    fn write_atomically(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = settings.to_pretty_json()?;
        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;
        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

fn file_layers(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(Settings::default())).merge(Json::file(path))
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("unknown setting `{key}` on `{stage}`"))]
    UnknownKey { stage: &'static str, key: String },
    #[snafu(display("setting `{key}` expects a whole number, got `{value}` on `{stage}`: {source}"))]
    InvalidNumber {
        stage: &'static str,
        key: String,
        value: String,
        source: ParseIntError,
    },
    #[snafu(display("unsupported language `{language}` on `{stage}`"))]
    UnsupportedLanguage {
        stage: &'static str,
        language: String,
    },
    #[snafu(display("failed to read settings file at {path:?} on `{stage}`: {source}"))]
    ParseFile {
        stage: &'static str,
        path: PathBuf,
        source: figment::Error,
    },
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_models() -> Vec<ModelSettings> {
    vec![ModelSettings::default()]
}

fn default_chars_per_tick() -> usize {
    parley_core::typing::DEFAULT_CHARS_PER_TICK
}

fn default_tick_interval_ms() -> u64 {
    parley_core::typing::DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_language() -> String {
    LANGUAGES[0].to_string()
}
