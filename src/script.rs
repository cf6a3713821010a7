use crate::api::{ChatMessage, TextCompletion};
use crate::error::{Error, Result};
use crate::{logi, logok};
use std::fmt;
use std::str::FromStr;

const SYSTEM_INSTRUCTION: &str = "You write product scripts.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptStyle {
    #[default]
    Review,
    Demo,
}

impl FromStr for ScriptStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "review" => Ok(ScriptStyle::Review),
            "demo" => Ok(ScriptStyle::Demo),
            other => Err(format!("unknown script style '{}' (expected review or demo)", other)),
        }
    }
}

impl fmt::Display for ScriptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptStyle::Review => f.write_str("review"),
            ScriptStyle::Demo => f.write_str("demo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    pub product_title: String,
    pub features: Vec<String>,
    pub style: ScriptStyle,
}

impl ScriptRequest {
    /// Build from raw form fields; `features_text` is one feature per line.
    pub fn from_form(product_title: &str, features_text: &str, style: ScriptStyle) -> Self {
        let features = features_text
            .lines()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            product_title: product_title.trim().to_string(),
            features,
            style,
        }
    }

    pub fn user_prompt(&self) -> String {
        let mut prompt = match self.style {
            ScriptStyle::Review => format!(
                "Write a 1-minute first-person product review script for the product titled '{}'.\n\
                 The script should describe life before and after using the product.\n\
                 Start with a unique, conversational intro.\n\
                 Avoid section labels.\n\
                 Make it at least one minute (~150-180 words).\n",
                self.product_title
            ),
            ScriptStyle::Demo => format!(
                "Write a 1-minute first-person product demo script for the product titled '{}'.\n\
                 Walk the viewer through how to use the product in real time.\n\
                 Use a friendly tone.\n\
                 Avoid section labels.\n\
                 Make it at least one minute (~150-180 words).\n",
                self.product_title
            ),
        };

        if !self.features.is_empty() {
            prompt.push_str("Work in these product features:\n");
            for feature in &self.features {
                prompt.push_str("- ");
                prompt.push_str(feature);
                prompt.push('\n');
            }
        }
        prompt
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(self.user_prompt()),
        ]
    }
}

/// Narration text as returned by the model. Length and style are requested in
/// the prompt, not verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedScript {
    pub text: String,
}

impl GeneratedScript {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

pub struct ScriptGenerator {
    backend: Box<dyn TextCompletion>,
}

impl ScriptGenerator {
    pub fn new(backend: Box<dyn TextCompletion>) -> Self {
        Self { backend }
    }

    pub async fn generate(&self, request: &ScriptRequest) -> Result<GeneratedScript> {
        if request.product_title.is_empty() {
            return Err(Error::Generation("product title is empty".to_string()));
        }

        logi(format!(
            "Generating {} script for '{}' ({} features)",
            request.style,
            request.product_title,
            request.features.len()
        ));
        let text = self.backend.complete(&request.messages()).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Generation("model returned an empty script".to_string()));
        }

        let script = GeneratedScript::new(text);
        logok(format!("Script generated ({} words)", script.word_count()));
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct CannedCompletion {
        reply: String,
        seen: Arc<Mutex<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl TextCompletion for CannedCompletion {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok(self.reply.clone())
        }
    }

    struct DownCompletion;

    #[async_trait]
    impl TextCompletion for DownCompletion {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            Err(Error::Generation("connection refused".to_string()))
        }
    }

    #[test]
    fn features_split_on_lines_and_trimmed() {
        let req = ScriptRequest::from_form(
            "  Trail Kettle ",
            "boils in 90s\n\n  folds flat  \r\n",
            ScriptStyle::Demo,
        );
        assert_eq!(req.product_title, "Trail Kettle");
        assert_eq!(req.features, vec!["boils in 90s", "folds flat"]);
    }

    #[test]
    fn style_parses_case_insensitively() {
        assert_eq!("Review".parse::<ScriptStyle>().unwrap(), ScriptStyle::Review);
        assert_eq!(" DEMO ".parse::<ScriptStyle>().unwrap(), ScriptStyle::Demo);
        assert!("unboxing".parse::<ScriptStyle>().is_err());
    }

    #[test]
    fn templates_differ_by_style() {
        let review = ScriptRequest::from_form("Lamp", "", ScriptStyle::Review).user_prompt();
        let demo = ScriptRequest::from_form("Lamp", "", ScriptStyle::Demo).user_prompt();

        assert!(review.contains("product review script"));
        assert!(review.contains("before and after"));
        assert!(demo.contains("product demo script"));
        assert!(demo.contains("in real time"));
        for prompt in [&review, &demo] {
            assert!(prompt.contains("first-person"));
            assert!(prompt.contains("Avoid section labels"));
            assert!(prompt.contains("150-180 words"));
            assert!(prompt.contains("'Lamp'"));
            assert!(!prompt.contains("features"));
        }
    }

    #[tokio::test]
    async fn generate_sends_system_and_user_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let backend = CannedCompletion {
            reply: "  I never thought a lamp could change my evenings.  ".to_string(),
            seen: Arc::clone(&seen),
        };
        let request = ScriptRequest::from_form("Lamp", "dimmable", ScriptStyle::Review);

        let generator = ScriptGenerator::new(Box::new(backend));
        let script = generator.generate(&request).await.unwrap();
        assert_eq!(script.text, "I never thought a lamp could change my evenings.");

        let sent = seen.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], ChatMessage::system("You write product scripts."));
        assert_eq!(sent[1].role, crate::api::Role::User);
        assert!(sent[1].content.contains("- dimmable"));
    }

    #[tokio::test]
    async fn empty_completion_is_a_generation_failure() {
        let backend = CannedCompletion {
            reply: "   ".to_string(),
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let generator = ScriptGenerator::new(Box::new(backend));
        let request = ScriptRequest::from_form("Lamp", "", ScriptStyle::Review);
        let err = generator.generate(&request).await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        let generator = ScriptGenerator::new(Box::new(DownCompletion));
        let request = ScriptRequest::from_form("Lamp", "", ScriptStyle::Demo);
        let err = generator.generate(&request).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
