use rand::Rng;

/// Initial sounds a generated theme may start with.
pub const HIRAGANA: [char; 46] = [
    'あ', 'い', 'う', 'え', 'お', 'か', 'き', 'く', 'け', 'こ', 'さ', 'し', 'す', 'せ', 'そ', 'た',
    'ち', 'つ', 'て', 'と', 'な', 'に', 'ぬ', 'ね', 'の', 'は', 'ひ', 'ふ', 'へ', 'ほ', 'ま', 'み',
    'む', 'め', 'も', 'や', 'ゆ', 'よ', 'ら', 'り', 'る', 'れ', 'ろ', 'わ', 'を', 'ん',
];

const THEME_CATEGORIES: &[&str] = &[
    "food and cooking",
    "sports and exercise",
    "culture and art",
    "science and technology",
    "everyday life",
    "nature and animals",
    "entertainment",
    "business and work",
    "school and education",
    "hobbies and pastimes",
];

/// Inputs of one translation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRequest {
    pub sentence: String,
    pub language: String,
    pub context: Option<String>,
}

/// Inputs of one theme-generation request.
///
/// The seed and timestamp only vary the prompt text so that repeated
/// requests do not read as identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeRequest {
    pub initial: char,
    pub seed: u32,
    pub timestamp_ms: i64,
}

impl ThemeRequest {
    pub fn random(rng: &mut impl Rng, timestamp_ms: i64) -> Self {
        Self {
            initial: HIRAGANA[rng.gen_range(0..HIRAGANA.len())],
            seed: rng.gen_range(0..1000),
            timestamp_ms,
        }
    }
}

/// Builds prompt text for page workflows.
///
/// Implementations own all wording; the orchestration layer only forwards
/// the resulting string.
pub trait Prompter: Send + Sync {
    fn translate_prompt(&self, request: &TranslateRequest) -> String;
    fn theme_prompt(&self, request: &ThemeRequest) -> String;
}

/// Model-agnostic prompt wording.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainPrompter;

impl Prompter for PlainPrompter {
    fn translate_prompt(&self, request: &TranslateRequest) -> String {
        let mut prompt = format!(
            "Translate the text inside <input></input> into {}. \
             Output only the translation.\n<input>{}</input>",
            request.language, request.sentence
        );
        if let Some(context) = request.context.as_deref().filter(|context| !context.is_empty()) {
            prompt.push_str("\nTake the following into account: ");
            prompt.push_str(context);
        }
        prompt
    }

    fn theme_prompt(&self, request: &ThemeRequest) -> String {
        let initial = request.initial;
        let mut prompt = format!(
            "Come up with one theme for a word game where players name things \
             that start with 「{initial}」.\n\
             Output format:\n「{initial}」から始まる[theme]\n\
             Rules:\n\
             - The theme is concrete, fun and has several valid answers.\n\
             - Output only the line in the format above, no explanation.\n\
             - Pick one of these categories at random (seed: {}):\n",
            request.seed
        );
        for category in THEME_CATEGORIES {
            prompt.push_str("  * ");
            prompt.push_str(category);
            prompt.push('\n');
        }
        prompt.push_str(&format!("Timestamp: {}", request.timestamp_ms));
        prompt
    }
}
