pub mod chat;
pub mod mail;
pub mod response;
pub mod user;
