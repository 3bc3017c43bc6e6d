// Authentication module
// OAuth2 handshake, token persistence and refresh

mod manager;
mod oauth;
mod provider;
mod store;
mod types;

pub use manager::{AuthManager, STATE_TTL_SECS};
pub use oauth::OAuthClient;
pub use provider::{ClientAuth, GoogleClientSecrets, ProviderEndpoints};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{AuthorizationRequest, CallbackParams, ProviderMetadata, TokenRecord, TokenResponse};
