use crate::picker::{BoxError, DataUri, ImagePicker, PickerError};
use crate::prediction::{PredictionClient, PredictionError};
use crate::state::{ViewSnapshot, ViewState};
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

pub type UploadStream = BoxStream<'static, Result<Bytes, BoxError>>;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("upload controller is no longer running")]
    Closed,
}

type Ack = oneshot::Sender<ViewSnapshot>;

enum Command {
    AcceptFile {
        media_type: String,
        data: UploadStream,
        ack: Ack,
    },
    RemoveImage {
        ack: Ack,
    },
    Analyze {
        ack: Ack,
    },
}

enum Msg {
    Cmd(Command),
    ImageRead {
        generation: u64,
        result: Result<DataUri, PickerError>,
    },
    Prediction {
        generation: u64,
        result: Result<String, PredictionError>,
    },
}

/// Handle to the upload-and-predict state machine. All mutation happens on a
/// single consumer task fed by a message queue; the handle is cheap to clone.
#[derive(Clone)]
pub struct UploadController {
    commands: mpsc::Sender<Msg>,
    view: watch::Receiver<ViewSnapshot>,
}

impl UploadController {
    pub fn spawn(
        picker: ImagePicker,
        client: Arc<dyn PredictionClient>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (commands, queue) = mpsc::channel(16);
        let (view_tx, view_rx) = watch::channel(ViewSnapshot::of(&ViewState::Empty));

        let task = ControllerTask {
            state: ViewState::Empty,
            generation: 0,
            pending: None,
            picker,
            client,
            completions: commands.clone(),
            view: view_tx,
        };
        tokio::spawn(task.run(queue, shutdown_rx));

        Self {
            commands,
            view: view_rx,
        }
    }

    /// Resolves with the snapshot once the upload has been validated, read
    /// and encoded (or rejected).
    pub async fn accept_upload(
        &self,
        media_type: impl Into<String>,
        data: UploadStream,
    ) -> Result<ViewSnapshot, ControllerError> {
        let media_type = media_type.into();
        self.send(|ack| Command::AcceptFile {
            media_type,
            data,
            ack,
        })
        .await
    }

    pub async fn remove_image(&self) -> Result<ViewSnapshot, ControllerError> {
        self.send(|ack| Command::RemoveImage { ack }).await
    }

    /// Resolves with the final snapshot (resolved or failed). While the
    /// request is outstanding the watch channel shows the loading state.
    pub async fn analyze(&self) -> Result<ViewSnapshot, ControllerError> {
        self.send(|ack| Command::Analyze { ack }).await
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.view.clone()
    }

    async fn send(
        &self,
        make: impl FnOnce(Ack) -> Command,
    ) -> Result<ViewSnapshot, ControllerError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Msg::Cmd(make(ack)))
            .await
            .map_err(|_| ControllerError::Closed)?;
        done.await.map_err(|_| ControllerError::Closed)
    }
}

struct ControllerTask {
    state: ViewState,
    /// Bumped on every user-initiated action. Read and predict completions
    /// carry the generation they were spawned under; a mismatch means the
    /// operation was superseded and its result is discarded.
    generation: u64,
    pending: Option<Ack>,
    picker: ImagePicker,
    client: Arc<dyn PredictionClient>,
    completions: mpsc::Sender<Msg>,
    view: watch::Sender<ViewSnapshot>,
}

impl ControllerTask {
    async fn run(mut self, mut queue: mpsc::Receiver<Msg>, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                msg = queue.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
                _ = shutdown_rx.recv() => {
                    tracing::info!("upload controller received shutdown signal");
                    break;
                }
            }
        }
        tracing::info!("upload controller stopped");
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Cmd(cmd) => self.handle_command(cmd),
            Msg::ImageRead { generation, result } => {
                if generation != self.generation {
                    tracing::debug!(generation, current = self.generation, "discarding stale file read");
                    return;
                }
                self.transition(|state| match result {
                    Ok(image) => state.on_image_accepted(image),
                    Err(err) => {
                        tracing::warn!(error = %err, "file upload rejected");
                        state.on_rejected(err.user_message().to_string())
                    }
                });
                self.resolve_pending();
            }
            Msg::Prediction { generation, result } => {
                if generation != self.generation {
                    tracing::debug!(generation, current = self.generation, "discarding superseded prediction");
                    return;
                }
                self.transition(|state| match result {
                    Ok(prediction) => state.on_prediction(prediction),
                    Err(err) => {
                        tracing::warn!(error = %err, "prediction failed");
                        state.on_prediction_failed(err.user_message().to_string())
                    }
                });
                self.resolve_pending();
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::AcceptFile {
                media_type,
                data,
                ack,
            } => {
                self.begin_action(ack);
                let generation = self.generation;
                let picker = self.picker;
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let result = picker.accept(&media_type, data).await;
                    let _ = completions
                        .send(Msg::ImageRead { generation, result })
                        .await;
                });
            }
            Command::RemoveImage { ack } => {
                self.supersede();
                self.transition(ViewState::on_image_removed);
                let _ = ack.send(self.snapshot());
            }
            Command::Analyze { ack } => {
                // At most one outstanding prediction request.
                if self.state.is_loading() {
                    let _ = ack.send(self.snapshot());
                    return;
                }

                let Some(image) = self.state.selected_image().cloned() else {
                    tracing::warn!("analyze requested with no image selected");
                    self.supersede();
                    let message = PredictionError::MissingImage.user_message().to_string();
                    self.transition(|state| state.on_rejected(message));
                    let _ = ack.send(self.snapshot());
                    return;
                };

                self.begin_action(ack);
                self.transition(ViewState::on_analyze_started);

                let generation = self.generation;
                let client = self.client.clone();
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let result = client.predict(&image).await;
                    let _ = completions
                        .send(Msg::Prediction { generation, result })
                        .await;
                });
            }
        }
    }

    /// Starts a new generation; a still-unresolved prior operation is
    /// answered with the current snapshot and its completion will be dropped
    /// on arrival.
    fn supersede(&mut self) {
        self.generation += 1;
        if let Some(ack) = self.pending.take() {
            let _ = ack.send(self.snapshot());
        }
    }

    fn begin_action(&mut self, ack: Ack) {
        self.supersede();
        self.pending = Some(ack);
    }

    fn resolve_pending(&mut self) {
        if let Some(ack) = self.pending.take() {
            let _ = ack.send(self.snapshot());
        }
    }

    fn transition(&mut self, f: impl FnOnce(ViewState) -> ViewState) {
        let state = std::mem::replace(&mut self.state, ViewState::Empty);
        self.state = f(state);
        let _ = self.view.send(self.snapshot());
    }

    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot::of(&self.state)
    }
}
