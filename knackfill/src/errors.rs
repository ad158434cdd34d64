use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is detached from DOM: {0}")]
    StaleElement(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("WebDriver error ({code}): {message}")]
    WebDriver { code: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Browser session could not be created: {0}")]
    SessionNotCreated(String),

    #[error("Location '{0}' is not in the location mapping")]
    UnknownLocation(String),

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Step failed: {0}")]
    StepFailed(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Failed after {attempts} attempts: {label}")]
    RetryExhausted { label: String, attempts: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// Short variant name, written into the row log next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AutomationError::ElementNotFound(_) => "ElementNotFound",
            AutomationError::Timeout(_) => "Timeout",
            AutomationError::StaleElement(_) => "StaleElement",
            AutomationError::ElementNotVisible(_) => "ElementNotVisible",
            AutomationError::InvalidArgument(_) => "InvalidArgument",
            AutomationError::InvalidSelector(_) => "InvalidSelector",
            AutomationError::WebDriver { .. } => "WebDriver",
            AutomationError::Http(_) => "Http",
            AutomationError::SessionNotCreated(_) => "SessionNotCreated",
            AutomationError::UnknownLocation(_) => "UnknownLocation",
            AutomationError::UnknownStatus(_) => "UnknownStatus",
            AutomationError::StepFailed(_) => "StepFailed",
            AutomationError::LoginFailed(_) => "LoginFailed",
            AutomationError::RetryExhausted { .. } => "RetryExhausted",
            AutomationError::Internal(_) => "Internal",
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, AutomationError::StaleElement(_))
    }

    /// Maps a W3C WebDriver error code onto the matching variant.
    pub fn from_webdriver(code: &str, message: &str) -> Self {
        let message = message.to_string();
        match code {
            "stale element reference" => AutomationError::StaleElement(message),
            "no such element" => AutomationError::ElementNotFound(message),
            "element not interactable" | "element click intercepted" => {
                AutomationError::ElementNotVisible(message)
            }
            "timeout" | "script timeout" => AutomationError::Timeout(message),
            "session not created" => AutomationError::SessionNotCreated(message),
            "invalid selector" => AutomationError::InvalidSelector(message),
            "invalid argument" => AutomationError::InvalidArgument(message),
            other => AutomationError::WebDriver {
                code: other.to_string(),
                message,
            },
        }
    }
}

impl From<reqwest::Error> for AutomationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AutomationError::Timeout(e.to_string())
        } else {
            AutomationError::Http(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid credentials file: {0}")]
    Credentials(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid spreadsheet URL: {0}")]
    InvalidUrl(String),

    #[error("Cell ({row}, {col}) is outside the sheet; rows and columns start at 1")]
    InvalidCell { row: usize, col: usize },

    #[error("Column '{0}' missing from header row")]
    MissingColumn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
