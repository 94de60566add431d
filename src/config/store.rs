//! Remote parameter store access

use async_trait::async_trait;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::error::DisplayErrorContext;

/// Why a parameter could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    NotFound,
    Transport(String),
}

/// A key-value store holding (possibly encrypted) deployment parameters
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Fetches and decrypts the value stored at `key`.
    async fn get_parameter(&self, key: &str) -> Result<String, FetchError>;
}

/// SSM Parameter Store backed implementation
#[derive(Clone)]
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS credential and region chain.
    pub async fn from_env() -> Self {
        let shared = aws_config::load_from_env().await;
        Self::new(Client::new(&shared))
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, key: &str) -> Result<String, FetchError> {
        let output = self
            .client
            .get_parameter()
            .name(key)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_parameter_not_found())
                    .unwrap_or(false);
                if not_found {
                    FetchError::NotFound
                } else {
                    FetchError::Transport(DisplayErrorContext(&e).to_string())
                }
            })?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_string)
            .ok_or(FetchError::NotFound)
    }
}
