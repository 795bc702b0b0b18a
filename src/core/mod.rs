//! Orchestration core: classification, resilience state, selection and the
//! retry/failover loop.

pub mod circuit_breaker;
pub mod classifier;
pub mod clock;
pub mod conductor;
pub mod events;
pub mod executor;
pub mod health;
pub mod logging;
pub mod models;
pub mod provider_manager;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerSettings, CircuitState};
pub use classifier::{ErrorCategory, PatternTable, RecoveryAction, classify, parse_retry_after};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use conductor::{Conductor, RetryPolicy};
pub use events::{EventBus, EventSink, RelayEvent, TracingSink};
pub use executor::{CommandExecutor, CommandSpec, ExecError, ExecOutput, TokioExecutor};
pub use health::{HealthMonitor, HealthSettings};
pub use models::{Capabilities, ProviderKind, Response, SendOptions, TokenUsage};
pub use provider_manager::{Availability, ManagerSettings, ProviderManager, ProviderStatus};
pub use rate_limiter::RateLimiter;
