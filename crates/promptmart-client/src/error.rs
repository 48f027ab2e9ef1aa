//! Client error types.

/// Errors that can occur when using the promptmart client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// Not enough coins for the purchase.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The item is already owned.
    #[error("already owned: {message}")]
    AlreadyOwned {
        /// Server message.
        message: String,
    },

    /// Account, item or session not found.
    #[error("not found: {message}")]
    NotFound {
        /// Server message.
        message: String,
    },

    /// The checkout was not credited within the polling budget.
    #[error("checkout {session_id} not credited after {attempts} attempts")]
    PollTimeout {
        /// The checkout session polled.
        session_id: String,
        /// Polls made.
        attempts: u32,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
