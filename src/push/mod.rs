pub mod dispatcher;
pub mod provider;
pub mod queue;
pub mod retry;
pub mod stats;
pub mod status;
pub mod types;

pub use dispatcher::{Dispatcher, DispatcherConfig, IngressResult, StopReport};
pub use provider::{ApnsClient, FcmClient, FailureKind, MockClient, PlatformClient, SendError};
pub use queue::{NotificationQueue, QueueError};
pub use retry::{BackoffConfig, BackoffStrategy, RetryDecision, RetryPolicy, HARD_RETRY_CEILING};
pub use stats::{StatsCollector, StatsSnapshot};
pub use status::{LogStatusReporter, OutcomeKind, PushOutcome, StatusFormat, StatusReporter};
pub use types::{Notification, Platform, PushPayload, PushRequest, QueueEntry};
