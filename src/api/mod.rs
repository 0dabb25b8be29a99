//! Spotify Web API client, authorization and typed records

pub mod auth;
pub mod client;
pub mod model;

pub use client::SpotifyClient;
