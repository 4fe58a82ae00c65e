use eframe::egui;
use std::time::Duration;

use crate::chatstate::ChatState;
use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::geminiclient::{GeminiClient, RemoteModel};
use crate::session::SessionController;

pub struct ChatApp<M: RemoteModel = GeminiClient> {
    pub session: SessionController<M>,
    pub dispatcher: Dispatcher,
    pub state: ChatState,
    pub input: String,
    pub api_key_input: String,
    pub request_timeout: Duration,
}

impl ChatApp<GeminiClient> {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        session: SessionController<GeminiClient>,
        config: &AppConfig,
    ) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        Self::with_session(session, config)
    }
}

impl<M: RemoteModel> ChatApp<M> {
    pub fn with_session(session: SessionController<M>, config: &AppConfig) -> Self {
        Self {
            session,
            dispatcher: Dispatcher::new(),
            state: ChatState::new(config.output_mode),
            input: String::new(),
            api_key_input: config.api_key.clone().unwrap_or_default(),
            request_timeout: config.request_timeout,
        }
    }

    pub fn send_message(&mut self, ctx: &egui::Context) {
        if self.dispatcher.is_busy() {
            return;
        }
        let Some(request) = self.state.submit(&self.input) else {
            return;
        };
        self.input.clear();

        tracing::info!(chars = request.user_text.len(), "Submitting question");
        let ctx = ctx.clone();
        let started = self.dispatcher.dispatch(
            self.session.clone(),
            request,
            self.request_timeout,
            move || ctx.request_repaint(),
        );
        debug_assert!(started, "dispatcher was idle when the state machine accepted");
    }

    /// Pushes the key entry field into the session. Only later requests see it.
    pub fn update_api_key(&mut self) {
        self.session.set_credential(&self.api_key_input);
    }

    pub fn process_response(&mut self) {
        if let Some(outcome) = self.dispatcher.poll() {
            self.state.complete(outcome);
        }
    }

    pub fn cancel_request(&mut self) {
        self.dispatcher.cancel();
    }

    pub fn clear_chat(&mut self) {
        if self.state.reset() {
            self.input.clear();
        }
    }
}
