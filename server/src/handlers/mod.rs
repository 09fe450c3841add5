//! HTTP request handlers for Scroll Server

pub mod chats;
pub mod health;
pub mod users;
pub mod websocket;
