/// Agora - social media API server
///
/// Accounts with password and Google sign-in, short-lived access tokens with
/// rotating refresh tokens, and owner-gated posts, comments, likes and media.

pub mod account;
pub mod api;
pub mod auth;
pub mod authz;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod jobs;
pub mod media;
pub mod post;
pub mod rate_limit;
pub mod server;
pub mod social;
pub mod token;
