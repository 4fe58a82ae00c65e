use secrecy::SecretBox;
use std::sync::Arc;

use crate::error::ChatError;
use crate::geminiclient::RemoteModel;

pub const PERSONA_PROMPT: &str = "You are Sutrabot, a wise, pragmatic mentor offering practical advice. \
You provide clear, actionable, step-by-step solutions to life's challenges. While grounded in modern \
problem-solving, you occasionally draw upon wisdom from the Vedas, Bhagavad Gita, and Chanakya Niti to \
provide deeper insights.";

/// API key shared between the controller and the client it configures.
pub type Credential = Arc<SecretBox<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub user_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub raw_text: String,
}

pub fn build_prompt(user_text: &str) -> String {
    format!("{PERSONA_PROMPT}\ninput: {user_text}\noutput: ")
}

/// Owns the credential and the remote client configured with it.
///
/// Cloning takes a snapshot: a clone handed to a worker keeps the credential it was
/// cloned with, even if `set_credential` is called on the original afterwards.
#[derive(Clone)]
pub struct SessionController<M> {
    model: M,
    credential: Option<Credential>,
}

impl<M: RemoteModel> SessionController<M> {
    pub fn new(model: M, credential: Option<&str>) -> Self {
        let mut session = Self {
            model,
            credential: None,
        };
        session.set_credential(credential.unwrap_or_default());
        session
    }

    /// Replaces the credential and reconfigures the client before returning.
    /// Surrounding whitespace is ignored and an empty value clears the credential.
    pub fn set_credential(&mut self, value: &str) {
        let value = value.trim();
        self.credential = if value.is_empty() {
            None
        } else {
            Some(Arc::new(SecretBox::new(Box::new(value.to_string()))))
        };
        self.model.configure(self.credential.clone());
        tracing::debug!(configured = self.credential.is_some(), "API key updated");
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Sends the persona-prefixed prompt and returns the completion verbatim.
    pub async fn ask(&self, user_text: &str) -> Result<Response, ChatError> {
        let prompt = build_prompt(user_text);
        let raw_text = self.model.generate(&prompt).await?;
        Ok(Response { raw_text })
    }

    #[cfg(test)]
    pub fn model(&self) -> &M {
        &self.model
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// What a stub model does when asked to generate.
    #[derive(Clone)]
    pub enum Reply {
        Text(String),
        Fail(ChatError),
        /// Never answers; exercises timeouts and cancellation.
        Hang,
        /// Answers after a delay.
        Slow(Duration, String),
    }

    /// In-memory `RemoteModel` recording every prompt and the key it was sent with.
    #[derive(Clone)]
    pub struct StubModel {
        pub reply: Reply,
        pub credential: Option<Credential>,
        pub calls: Arc<AtomicUsize>,
        pub seen: Arc<Mutex<Vec<(Option<String>, String)>>>,
    }

    impl StubModel {
        pub fn new(reply: Reply) -> Self {
            Self {
                reply,
                credential: None,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn replying(text: &str) -> Self {
            Self::new(Reply::Text(text.to_string()))
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn seen(&self) -> Vec<(Option<String>, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl RemoteModel for StubModel {
        fn configure(&mut self, credential: Option<Credential>) {
            self.credential = credential;
        }

        async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = self
                .credential
                .as_ref()
                .map(|c| c.expose_secret().to_string());
            self.seen.lock().unwrap().push((key, prompt.to_string()));
            match &self.reply {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail(err) => Err(err.clone()),
                Reply::Hang => std::future::pending().await,
                Reply::Slow(delay, text) => {
                    tokio::time::sleep(*delay).await;
                    Ok(text.clone())
                }
            }
        }
    }

    #[test]
    fn prompt_wraps_input_in_template() {
        let prompt = build_prompt("How do I stay focused?");
        assert!(prompt.starts_with(PERSONA_PROMPT));
        assert!(prompt.ends_with("How do I stay focused?\noutput: "));
        assert_eq!(
            prompt,
            format!("{PERSONA_PROMPT}\ninput: How do I stay focused?\noutput: ")
        );
    }

    #[test]
    fn prompt_is_deterministic() {
        assert_eq!(build_prompt("same"), build_prompt("same"));
    }

    #[test]
    fn blank_credential_clears_it() {
        let mut session = SessionController::new(StubModel::replying("ok"), Some("key-a"));
        assert!(session.has_credential());
        session.set_credential("   ");
        assert!(!session.has_credential());
        assert!(session.model().credential.is_none());
    }

    #[tokio::test]
    async fn ask_returns_completion_verbatim() {
        let session = SessionController::new(StubModel::replying("  **Breathe.**\n"), Some("key"));
        let response = session.ask("Who are you?").await.unwrap();
        assert_eq!(response.raw_text, "  **Breathe.**\n");

        let seen = session.model().seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, build_prompt("Who are you?"));
    }

    #[tokio::test]
    async fn ask_surfaces_remote_failure_unchanged() {
        let err = ChatError::Quota("rate limit reached".to_string());
        let session = SessionController::new(StubModel::new(Reply::Fail(err.clone())), Some("key"));
        assert_eq!(session.ask("hello").await.unwrap_err(), err);
        assert_eq!(session.model().call_count(), 1);
    }

    #[tokio::test]
    async fn latest_credential_wins() {
        let mut session = SessionController::new(StubModel::replying("ok"), None);
        session.set_credential("key-a");
        let in_flight = session.clone();
        session.set_credential(" key-b ");

        session.ask("next").await.unwrap();
        in_flight.ask("earlier").await.unwrap();

        let seen = session.model().seen();
        assert_eq!(seen[0].0.as_deref(), Some("key-b"));
        assert_eq!(seen[1].0.as_deref(), Some("key-a"));
    }
}
