//! HTTP handlers for rbac-service.

pub mod auth;
pub mod health;
pub mod permission;
pub mod role;
pub mod user;
