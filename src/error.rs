use thiserror::Error;

/// Local checks that fail before anything is sent to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File not found.")]
    FileNotFound,

    #[error("File type not supported. Please upload a PDF, image (JPG/PNG), text, CSV or JSON file.")]
    UnsupportedFileType,

    #[error("File is too large. Maximum size is 10MB.")]
    FileTooLarge,

    #[error("Not a valid PDF file.")]
    InvalidPdf,

    #[error("No file selected.")]
    NoFileSelected,

    #[error("An upload is already in progress.")]
    UploadInProgress,

    #[error("Missing {0}.")]
    MissingIdentifier(&'static str),

    #[error("Line item {0} does not exist.")]
    NoSuchLineItem(usize),

    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{}", transport_message(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Unexpected response from server: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export failed: {0}")]
    Export(String),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Request failed ({}): {}", code, message),
        None => message.to_string(),
    }
}

impl AppError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        let message = if error.is_connect() || error.is_timeout() {
            "Check your internet connection and try again."
        } else if error.is_decode() {
            return AppError::Parse(error.to_string());
        } else {
            "Network error."
        };
        AppError::Transport {
            status: error.status().map(|s| s.as_u16()),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Parse(error.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(error: rust_xlsxwriter::XlsxError) -> Self {
        AppError::Export(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
