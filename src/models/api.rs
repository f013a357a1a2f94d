use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AddCardRequest {
    pub id: u32,
    pub nm: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveCardQuery {
    pub id: u32,
}

/// Identifier as typed by the user, hex with a `0x` prefix or decimal
#[derive(Debug, Deserialize)]
pub struct CheckCardRequest {
    pub card_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckCardResponse {
    pub exists: bool,
    pub card_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub status: String,
    pub message: String,
}

impl SuccessResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}
