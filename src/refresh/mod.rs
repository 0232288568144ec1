//! Instance refresh orchestration
//!
//! Finds the Auto Scaling Groups of a cluster scope, starts a rolling
//! instance refresh on each in turn and waits for it to finish, honouring
//! the operator's cancel flag between polls.

pub mod cancel;
pub mod clock;
pub mod provider;
pub mod service;
pub mod types;
pub mod waiter;

pub use cancel::{cancel_requested, CancelOracle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use provider::{AutoScalingApi, StartRefreshError};
pub use service::{InstanceRefreshService, RefreshConfig, RefreshJob, RECENT_REFRESH_WINDOW};
pub use types::{
    Group, GroupOutcome, GroupResult, Instance, LaunchTemplateRef, MinHealthyPercentage,
    RefreshOperation, RefreshReport, RefreshRequest, RefreshScope, RefreshStatus,
    RefreshStrategy, TargetFilter, DEFAULT_MIN_HEALTHY_PERCENTAGE,
    LATEST_LAUNCH_TEMPLATE_VERSION,
};
pub use waiter::{RefreshWaiter, WaitConfig, WaitOutcome, DEFAULT_POLL_INTERVAL};
