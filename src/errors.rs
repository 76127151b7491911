use failure::Fail;

/// Returned by the expansion driver when a token keeps requesting
/// re-entry past the retry budget.
#[derive(Fail, Debug, PartialEq, Copy, Clone)]
pub enum ExpansionError {
    #[fail(
        display = "Attribute expansion did not settle after {} passes over the token stream.",
        _0
    )]
    RetryLimitExceeded(u32),
}

/// Page bundle validation failure. No partial result is produced when
/// validation fails.
#[derive(Fail, Debug, PartialEq, Clone)]
#[fail(display = "Invalid page bundle: {}", message)]
pub struct BundleValidationError {
    pub message: String,
}

impl BundleValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        BundleValidationError {
            message: message.into(),
        }
    }
}

/// The in-flight transformation was canceled through its
/// `CancellationToken`; the partial result has been discarded.
#[derive(Fail, Debug, PartialEq, Copy, Clone)]
#[fail(display = "The transformation has been canceled.")]
pub struct Canceled;
