// Handlers grouped by the credential their routes require:
// public (none) → management (Cloudflare Access token) → integration (bot API key)
pub mod extract;
pub mod integration;
pub mod management;
pub mod public;
