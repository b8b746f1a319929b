use crate::picker::DataUri;
use serde::Serialize;

/// What the user currently sees. The four UI fields (selected image,
/// prediction, error, loading flag) are a projection of this machine, never
/// stored separately.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Empty,
    Selected {
        image: DataUri,
    },
    Analyzing {
        image: DataUri,
    },
    Resolved {
        image: DataUri,
        prediction: String,
    },
    /// A failure banner. The image is retained when one was on screen so the
    /// user can retry; a rejected upload with nothing selected leaves it
    /// absent.
    Failed {
        image: Option<DataUri>,
        message: String,
    },
}

impl ViewState {
    pub fn selected_image(&self) -> Option<&DataUri> {
        match self {
            ViewState::Empty => None,
            ViewState::Selected { image }
            | ViewState::Analyzing { image }
            | ViewState::Resolved { image, .. } => Some(image),
            ViewState::Failed { image, .. } => image.as_ref(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Analyzing { .. })
    }

    /// A new upload always resets any prior prediction or error.
    pub fn on_image_accepted(self, image: DataUri) -> ViewState {
        ViewState::Selected { image }
    }

    /// A rejected upload or a rejected analyze keeps whatever image was
    /// already on screen.
    pub fn on_rejected(self, message: String) -> ViewState {
        ViewState::Failed {
            image: self.into_image(),
            message,
        }
    }

    pub fn on_image_removed(self) -> ViewState {
        ViewState::Empty
    }

    pub fn on_analyze_started(self) -> ViewState {
        match self {
            ViewState::Selected { image }
            | ViewState::Analyzing { image }
            | ViewState::Resolved { image, .. }
            | ViewState::Failed {
                image: Some(image), ..
            } => ViewState::Analyzing { image },
            other => other,
        }
    }

    /// Completions outside of `Analyzing` leave the state untouched.
    pub fn on_prediction(self, prediction: String) -> ViewState {
        match self {
            ViewState::Analyzing { image } => ViewState::Resolved { image, prediction },
            other => other,
        }
    }

    pub fn on_prediction_failed(self, message: String) -> ViewState {
        match self {
            ViewState::Analyzing { image } => ViewState::Failed {
                image: Some(image),
                message,
            },
            other => other,
        }
    }

    fn into_image(self) -> Option<DataUri> {
        match self {
            ViewState::Empty => None,
            ViewState::Selected { image }
            | ViewState::Analyzing { image }
            | ViewState::Resolved { image, .. } => Some(image),
            ViewState::Failed { image, .. } => image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Empty,
    Selected,
    Analyzing,
    Resolved,
    Failed,
}

/// Serializable projection of [`ViewState`], published to API consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub phase: Phase,
    pub selected_image: Option<String>,
    pub prediction: Option<String>,
    pub error: Option<String>,
    pub is_loading: bool,
}

impl ViewSnapshot {
    pub fn of(state: &ViewState) -> Self {
        let phase = match state {
            ViewState::Empty => Phase::Empty,
            ViewState::Selected { .. } => Phase::Selected,
            ViewState::Analyzing { .. } => Phase::Analyzing,
            ViewState::Resolved { .. } => Phase::Resolved,
            ViewState::Failed { .. } => Phase::Failed,
        };

        ViewSnapshot {
            phase,
            selected_image: state
                .selected_image()
                .map(|image| image.as_str().to_string()),
            prediction: match state {
                ViewState::Resolved { prediction, .. } => Some(prediction.clone()),
                _ => None,
            },
            error: match state {
                ViewState::Failed { message, .. } => Some(message.clone()),
                _ => None,
            },
            is_loading: state.is_loading(),
        }
    }
}
