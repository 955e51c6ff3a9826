pub mod api_key;
pub mod generation;
pub mod provider;
pub mod usage;

use serde::Serialize;

/// Success envelope shared by the public API: `{data, usage?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T, U = ()> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<U>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self { data, usage: None }
    }
}

impl<T, U> ApiResponse<T, U> {
    pub fn with_usage(data: T, usage: U) -> Self {
        Self {
            data,
            usage: Some(usage),
        }
    }
}
