// Authentication module
// Manages the Twitch token lifecycle: storage, refresh and the sign-in handshake

mod clock;
mod manager;
mod notifier;
mod refresh;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::TokenProvider;
pub use notifier::{SignInNotifier, SignInWaiter};
pub use refresh::TokenRefresher;
pub use store::CredentialStore;
pub use types::{CredentialRecord, OAuthConfig, TokenResponse, DEFAULT_TOKEN_URL, SIGN_IN_PATH};
