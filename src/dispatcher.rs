use poll_promise::Promise;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::ChatError;
use crate::geminiclient::RemoteModel;
use crate::session::{Request, Response, SessionController};

pub type Outcome = Result<Response, ChatError>;

struct InFlight {
    promise: Promise<Outcome>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Runs one request at a time on a worker thread and hands the outcome back to
/// whoever polls it, which is always the UI thread.
#[derive(Default)]
pub struct Dispatcher {
    in_flight: Option<InFlight>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Starts `request` on a worker thread. Returns false, without starting anything,
    /// if a request is already in flight.
    ///
    /// `notify` is called from the worker once the outcome is ready to be polled.
    pub fn dispatch<M, F>(
        &mut self,
        session: SessionController<M>,
        request: Request,
        timeout: Duration,
        notify: F,
    ) -> bool
    where
        M: RemoteModel,
        F: FnOnce() + Send + 'static,
    {
        if self.is_busy() {
            tracing::debug!("Dispatch refused, a request is already in flight");
            return false;
        }

        let (sender, promise) = Promise::new();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let spawned = std::thread::Builder::new()
            .name("gemini_request".to_string())
            .spawn(move || {
                let outcome = run_request(session, request, timeout, cancel_rx);
                sender.send(outcome);
                notify();
            });

        let in_flight = match spawned {
            Ok(_) => InFlight {
                promise,
                cancel: Some(cancel_tx),
            },
            Err(e) => {
                tracing::error!("Failed to spawn request thread: {}", e);
                InFlight {
                    promise: Promise::from_ready(Err(ChatError::Transport(format!(
                        "could not start request worker: {e}"
                    )))),
                    cancel: None,
                }
            }
        };
        self.in_flight = Some(in_flight);
        true
    }

    /// Takes the outcome if the worker has finished. Never blocks.
    pub fn poll(&mut self) -> Option<Outcome> {
        let in_flight = self.in_flight.take()?;
        match in_flight.promise.try_take() {
            Ok(outcome) => Some(outcome),
            Err(promise) => {
                self.in_flight = Some(InFlight {
                    promise,
                    cancel: in_flight.cancel,
                });
                None
            }
        }
    }

    /// Asks the worker to stop. Its outcome, `ChatError::Cancelled`, still arrives
    /// through `poll`. Returns false if nothing was in flight.
    pub fn cancel(&mut self) -> bool {
        match self.in_flight.as_mut().and_then(|f| f.cancel.take()) {
            Some(cancel) => {
                tracing::info!("Cancelling in-flight request");
                // The worker may have finished already, in which case its result stands.
                let _ = cancel.send(());
                true
            }
            None => false,
        }
    }
}

fn run_request<M: RemoteModel>(
    session: SessionController<M>,
    request: Request,
    timeout: Duration,
    cancel: oneshot::Receiver<()>,
) -> Outcome {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ChatError::Transport(format!("could not start async runtime: {e}")))?;

    runtime.block_on(async move {
        tokio::select! {
            result = tokio::time::timeout(timeout, session.ask(&request.user_text)) => {
                result.unwrap_or_else(|_| {
                    tracing::warn!("Request timed out after {:?}", timeout);
                    Err(ChatError::Transport(format!("request timed out after {timeout:?}")))
                })
            }
            _ = cancel => Err(ChatError::Cancelled),
        }
    })
}
