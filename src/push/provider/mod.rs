pub mod apns;
pub mod fcm;
pub mod mock;
pub mod provider_trait;

pub use apns::ApnsClient;
pub use fcm::FcmClient;
pub use mock::MockClient;
pub use provider_trait::{DegradedState, FailureKind, PlatformClient, SendError};
