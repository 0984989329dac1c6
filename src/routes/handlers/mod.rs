pub mod auth;
pub mod chat;
pub mod mail;

use bson::oid::ObjectId;

use crate::error::AppError;

fn parse_object_id(id: &str, what: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| AppError::BadRequest(format!("Invalid {what} id")))
}
