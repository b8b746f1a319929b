use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub const INVALID_TYPE_MESSAGE: &str = "Please upload a valid image file.";
pub const READ_FAILURE_MESSAGE: &str = "Failed to read the file. Please try again.";

#[derive(Error, Debug)]
pub enum PickerError {
    #[error("unsupported file type: {0}")]
    InvalidType(String),
    #[error("failed to read file: {0}")]
    ReadFailure(BoxError),
}

impl PickerError {
    pub fn user_message(&self) -> &'static str {
        match self {
            PickerError::InvalidType(_) => INVALID_TYPE_MESSAGE,
            PickerError::ReadFailure(_) => READ_FAILURE_MESSAGE,
        }
    }
}

/// `data:<media type>;base64,<payload>` encoding of an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DataUri(String);

impl DataUri {
    pub fn encode(media_type: &str, bytes: &[u8]) -> Self {
        DataUri(format!(
            "data:{};base64,{}",
            media_type,
            STANDARD.encode(bytes)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn media_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(';'))
            .map(|(media_type, _)| media_type)
            .unwrap_or("")
    }

    /// The base64 payload after the first comma.
    pub fn payload(&self) -> &str {
        self.0
            .split_once(',')
            .map(|(_, payload)| payload)
            .unwrap_or(&self.0)
    }

    pub fn decode_payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.payload())
    }
}

#[derive(Clone, Copy)]
pub struct ImagePicker;

impl ImagePicker {
    /// Validates the declared media type, reads the upload to completion and
    /// encodes it as a data URI. The stream is not consumed when the type is
    /// rejected.
    pub async fn accept<S, E>(&self, media_type: &str, data: S) -> Result<DataUri, PickerError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Into<BoxError>,
    {
        if !media_type.starts_with("image/") {
            return Err(PickerError::InvalidType(media_type.to_string()));
        }

        let mut data = data;
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = data.next().await {
            let chunk = chunk.map_err(|e| PickerError::ReadFailure(e.into()))?;
            buf.extend_from_slice(&chunk);
        }

        Ok(DataUri::encode(media_type, &buf))
    }
}
