use parley_llm::ModelRegistry;
use url::form_urlencoded;

/// Initial page values carried in a query string.
///
/// Read once when a page mounts; later changes to the query are not observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepLinkParams {
    pub sentence: Option<String>,
    pub additional_context: Option<String>,
    pub language: Option<String>,
    pub model_id: Option<String>,
}

impl DeepLinkParams {
    /// Parses `sentence`, `additionalContext`, `language` and `modelId`.
    ///
    /// A leading `?` is optional. The first occurrence of a repeated key wins
    /// and unknown keys are ignored.
    pub fn parse(query: &str) -> Self {
        let query = query.trim().trim_start_matches('?');
        let mut params = Self::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match &*key {
                "sentence" => &mut params.sentence,
                "additionalContext" => &mut params.additional_context,
                "language" => &mut params.language,
                "modelId" => &mut params.model_id,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        params
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Linked model when registered, otherwise `current` when registered,
    /// otherwise the registry default.
    pub fn resolve_model<'a>(&'a self, registry: &'a ModelRegistry, current: &'a str) -> &'a str {
        match self.model_id.as_deref() {
            Some(model_id) if registry.contains(model_id) => model_id,
            _ => registry.resolve(Some(current)),
        }
    }

    /// Linked language unless missing or empty, otherwise `fallback`.
    pub fn language_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.language.as_deref() {
            Some(language) if !language.is_empty() => language,
            _ => fallback,
        }
    }

    /// Renders the parameters back into a query string (without `?`).
    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in [
            ("sentence", &self.sentence),
            ("additionalContext", &self.additional_context),
            ("language", &self.language),
            ("modelId", &self.model_id),
        ] {
            if let Some(value) = value {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }
}
