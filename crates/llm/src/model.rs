#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl Model {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Static lookup of the model identifiers a session may select.
///
/// The first entry is the default selection. Blank and duplicate ids are
/// dropped on construction, and an empty input falls back to
/// [`default_openai_models`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    models: Vec<Model>,
}

impl ModelRegistry {
    pub fn new(models: impl IntoIterator<Item = Model>) -> Self {
        let mut unique: Vec<Model> = Vec::new();
        for mut model in models {
            model.id = model.id.trim().to_string();
            if model.id.is_empty() || unique.iter().any(|known| known.id == model.id) {
                continue;
            }
            unique.push(model);
        }

        if unique.is_empty() {
            unique = default_openai_models();
        }

        Self { models: unique }
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(Model::from_id))
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|model| model.id.as_str())
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.iter().any(|model| model.id == model_id)
    }

    pub fn default_model_id(&self) -> &str {
        // `new` guarantees at least one entry.
        self.models
            .first()
            .map(|model| model.id.as_str())
            .unwrap_or(DEFAULT_OPENAI_MODEL)
    }

    /// Returns `candidate` when registered, otherwise the default model id.
    pub fn resolve<'a>(&'a self, candidate: Option<&'a str>) -> &'a str {
        match candidate {
            Some(id) if self.contains(id) => id,
            _ => self.default_model_id(),
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(default_openai_models())
    }
}

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

pub fn default_openai_models() -> Vec<Model> {
    vec![
        Model::from_id("gpt-4o-mini").with_description("Balanced cost/performance default"),
        Model::from_id("gpt-4o").with_description("High quality general model"),
        Model::from_id("gpt-4.1").with_description("Reasoning-forward GPT-4.1"),
        Model::from_id("o3").with_description("Advanced reasoning model"),
    ]
}
