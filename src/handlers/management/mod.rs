// Management handlers: admin UI operations, Cloudflare Access token required.
pub mod pr;
pub mod upload;
