// Ephemeral key-value store (state, verifiers, credentials)
pub mod store;

// OAuth authorization-code flow and credential handoff
pub mod oauth;

// Provider item loaders
pub mod items;

// Configuration loading
pub mod config;

// HTTP API
pub mod api;
