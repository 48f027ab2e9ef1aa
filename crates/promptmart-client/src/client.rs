//! Promptmart HTTP client implementation.

use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use promptmart_core::ItemId;

use crate::error::ClientError;
use crate::types::{
    AccountResponse, ApiErrorResponse, BalanceResponse, CheckoutRequest, CheckoutResponse,
    CheckoutStatus, EntitlementsResponse, ItemDetail, ItemsResponse, PackagesResponse,
    PurchaseResponse,
};

/// Promptmart API client acting for one signed-in user.
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    client: Client,
    base_url: String,
    token: String,
}

impl MarketplaceClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the promptmart service (e.g., `"http://promptmart:8080"`)
    /// * `token` - The user's bearer token
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, token, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        token: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ClientError::Configuration("token must not be empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Register the user's account.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with status 409 if the account exists.
    pub async fn register(&self) -> Result<AccountResponse, ClientError> {
        let request = self.authed(self.client.post(self.url("/v1/accounts")));
        self.send(request).await
    }

    /// Current coin balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn get_balance(&self) -> Result<BalanceResponse, ClientError> {
        let request = self.authed(self.client.get(self.url("/v1/credits/balance")));
        self.send(request).await
    }

    /// Coin packages on sale.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_packages(&self) -> Result<PackagesResponse, ClientError> {
        self.send(self.client.get(self.url("/v1/packages"))).await
    }

    /// Catalog, optionally filtered by category and a search query.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_items(
        &self,
        category: Option<&str>,
        query: Option<&str>,
    ) -> Result<ItemsResponse, ClientError> {
        let mut params = Vec::new();
        if let Some(category) = category {
            params.push(("category", category));
        }
        if let Some(query) = query {
            params.push(("q", query));
        }

        let request = self.client.get(self.url("/v1/items")).query(&params);
        self.send(request).await
    }

    /// Item detail; full content if owned.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` for an unknown item.
    pub async fn get_item(&self, item_id: ItemId) -> Result<ItemDetail, ClientError> {
        let request = self.authed(self.client.get(self.url(&format!("/v1/items/{item_id}"))));
        self.send(request).await
    }

    /// Buy an item with coins.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::AlreadyOwned`, `ClientError::InsufficientCredits`
    /// or `ClientError::NotFound` for the refused outcomes.
    pub async fn purchase_item(&self, item_id: ItemId) -> Result<PurchaseResponse, ClientError> {
        let request = self.authed(
            self.client
                .post(self.url(&format!("/v1/items/{item_id}/purchase"))),
        );
        self.send(request).await
    }

    /// Items the user owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_entitlements(&self) -> Result<EntitlementsResponse, ClientError> {
        let request = self.authed(self.client.get(self.url("/v1/entitlements")));
        self.send(request).await
    }

    /// Start a Stripe Checkout for a coin package.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn create_checkout(
        &self,
        package_id: impl Into<String>,
    ) -> Result<CheckoutResponse, ClientError> {
        let body = CheckoutRequest {
            package_id: package_id.into(),
        };
        let request = self.authed(self.client.post(self.url("/v1/checkout")).json(&body));
        self.send(request).await
    }

    /// Whether a checkout has been credited yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, ClientError> {
        let request = self.authed(
            self.client
                .get(self.url(&format!("/v1/checkout/{session_id}"))),
        );
        self.send(request).await
    }

    /// Poll a checkout until its payment is credited.
    ///
    /// Crediting is driven by the payment webhook; this only observes it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::PollTimeout` when the attempts run out, or the
    /// first request error.
    pub async fn wait_for_credit(
        &self,
        session_id: &str,
        options: PollOptions,
    ) -> Result<CheckoutStatus, ClientError> {
        let attempts = options.max_attempts.max(1);

        for attempt in 1..=attempts {
            let status = self.checkout_status(session_id).await?;
            if status.credited {
                tracing::debug!(session_id, attempt, "Checkout credited");
                return Ok(status);
            }

            if attempt < attempts {
                tokio::time::sleep(options.interval).await;
            }
        }

        tracing::warn!(session_id, attempts, "Checkout not credited in time");
        Err(ClientError::PollTimeout {
            session_id: session_id.to_string(),
            attempts,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;

                // Map specific error codes to typed errors
                match code {
                    "insufficient_credits" => {
                        let detail = |key: &str| {
                            api_error
                                .error
                                .details
                                .as_ref()
                                .and_then(|d| d.get(key))
                                .and_then(serde_json::Value::as_i64)
                                .unwrap_or(0)
                        };

                        Err(ClientError::InsufficientCredits {
                            balance: detail("balance"),
                            required: detail("required"),
                        })
                    }
                    "already_owned" => Err(ClientError::AlreadyOwned { message }),
                    "not_found" => Err(ClientError::NotFound { message }),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}

/// How [`MarketplaceClient::wait_for_credit`] polls.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Delay between polls (default: 2s).
    pub interval: Duration,
    /// Polls before giving up (default: 30).
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}
