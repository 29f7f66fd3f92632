//! Optional observability hooks for renewal flows.
//!
//! # Feature Flags
//!
//! - `tracing` wraps each flow in an `oauth2_silent.flow` span carrying `flow` and `client_id`
//!   fields, and turns on the debug/warn events emitted at decision points.
//! - `metrics` increments `oauth2_silent_flow_total`, labeled by `flow` and `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flows observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Public token request, cache hits included.
	GetToken,
	/// Refresh-token grant, in-process or through the worker.
	RefreshExchange,
	/// Hidden-iframe `prompt=none` re-authentication.
	IframeReauth,
	/// Session probe run at startup.
	CheckSession,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::GetToken => "get_token",
			FlowKind::RefreshExchange => "refresh_exchange",
			FlowKind::IframeReauth => "iframe_reauth",
			FlowKind::CheckSession => "check_session",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Flow entered.
	Attempt,
	/// Answered from the cache without a renewal.
	CacheHit,
	/// Completed successfully.
	Success,
	/// Error propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::CacheHit => "cache_hit",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
