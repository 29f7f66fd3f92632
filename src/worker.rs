//! Worker execution context for refresh-token exchanges.
//!
//! The worker is an actor: a tokio task that owns its own handle to the token endpoint and is
//! reachable only through a request/response channel. The main context sends the auth settings,
//! the refresh token, and the timeout; the worker holds the token only while the exchange runs
//! and answers with [`WorkerResponse`]. Persistence stays with the cache manager.

// crates.io
use tokio::{
	runtime::Handle,
	sync::{mpsc, oneshot},
};
// self
use crate::{
	_prelude::*,
	auth::{Audience, ScopeSet, TokenSecret},
	error::TransportError,
	oauth::{self, TokenEndpoint, TokenEndpointResponse, TokenGrant, TokenRequest},
};

const QUEUE_DEPTH: usize = 32;

/// Token request settings forwarded to the worker.
#[derive(Clone, Debug)]
pub struct WorkerAuthConfig {
	/// Audience to request.
	pub audience: Audience,
	/// Scope to request.
	pub scope: ScopeSet,
	/// Additional form parameters.
	pub extra_params: BTreeMap<String, String>,
}

/// Message sent to the worker.
#[derive(Clone, Debug)]
pub struct WorkerRequest {
	/// Token request settings.
	pub auth: WorkerAuthConfig,
	/// Refresh token to spend.
	pub refresh_token: TokenSecret,
	/// Deadline after which the worker aborts the request.
	pub timeout: Duration,
}

/// Message returned by the worker.
#[derive(Clone, Debug)]
pub enum WorkerResponse {
	/// Exchange succeeded.
	Success {
		/// Token endpoint answer.
		response: TokenEndpointResponse,
	},
	/// Exchange failed; the error has the same shape as on the in-process path.
	Failure {
		/// Propagated error.
		error: Error,
	},
}

/// Handle to a running worker.
///
/// Clones talk to the same worker; the worker stops once every handle is dropped.
#[derive(Clone, Debug)]
pub struct TokenWorker {
	sender: mpsc::Sender<Envelope>,
}
impl TokenWorker {
	/// Returns `true` when a worker can be hosted from the calling context.
	pub fn is_supported() -> bool {
		Handle::try_current().is_ok()
	}

	/// Spawns a worker on the ambient tokio runtime.
	pub fn spawn(endpoint: Arc<dyn TokenEndpoint>) -> Result<Self> {
		let handle = Handle::try_current().map_err(|_| TransportError::WorkerUnavailable)?;
		let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);

		handle.spawn(run(endpoint, receiver));

		Ok(Self { sender })
	}

	/// Sends `request` to the worker and waits for its answer.
	pub async fn exchange(&self, request: WorkerRequest) -> Result<TokenEndpointResponse> {
		let (reply, response) = oneshot::channel();

		self.sender
			.send(Envelope { request, reply })
			.await
			.map_err(|_| TransportError::WorkerUnavailable)?;

		match response.await.map_err(|_| TransportError::WorkerUnavailable)? {
			WorkerResponse::Success { response } => Ok(response),
			WorkerResponse::Failure { error } => Err(error),
		}
	}
}

struct Envelope {
	request: WorkerRequest,
	reply: oneshot::Sender<WorkerResponse>,
}

async fn run(endpoint: Arc<dyn TokenEndpoint>, mut receiver: mpsc::Receiver<Envelope>) {
	while let Some(Envelope { request, reply }) = receiver.recv().await {
		let endpoint = endpoint.clone();

		tokio::spawn(async move {
			let response = handle(endpoint.as_ref(), request).await;

			// The caller may have stopped waiting.
			let _ = reply.send(response);
		});
	}
}

async fn handle(endpoint: &dyn TokenEndpoint, request: WorkerRequest) -> WorkerResponse {
	let WorkerRequest { auth, refresh_token, timeout } = request;

	if refresh_token.is_empty() {
		return WorkerResponse::Failure { error: Error::MissingRefreshToken };
	}

	let token_request =
		TokenRequest::new(TokenGrant::RefreshToken { refresh_token }, auth.audience, auth.scope)
			.with_extra_params(auth.extra_params);

	match oauth::exchange_with_timeout(endpoint, token_request, timeout).await {
		Ok(response) => WorkerResponse::Success { response },
		Err(error) => WorkerResponse::Failure { error },
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{error::TimeoutKind, oauth::EndpointFuture};

	struct SlowEndpoint {
		url: Url,
		delay: std::time::Duration,
		calls: AtomicUsize,
	}
	impl TokenEndpoint for SlowEndpoint {
		fn token_url(&self) -> &Url {
			&self.url
		}

		fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_, TokenEndpointResponse> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				tokio::time::sleep(self.delay).await;

				let TokenGrant::RefreshToken { refresh_token } = request.grant else {
					return Err(Error::MissingRefreshToken);
				};

				Ok(TokenEndpointResponse {
					access_token: TokenSecret::new(format!("at-for-{}", refresh_token.expose())),
					id_token: None,
					refresh_token: None,
					expires_in: 3_600,
					scope: None,
				})
			})
		}
	}

	fn worker(delay: std::time::Duration) -> (TokenWorker, Arc<SlowEndpoint>) {
		let endpoint = Arc::new(SlowEndpoint {
			url: Url::parse("https://tenant.example.com/oauth/token").expect("URL should parse."),
			delay,
			calls: AtomicUsize::new(0),
		});
		let worker = TokenWorker::spawn(endpoint.clone()).expect("Worker should spawn in a runtime.");

		(worker, endpoint)
	}

	fn request(refresh_token: &str, timeout: Duration) -> WorkerRequest {
		WorkerRequest {
			auth: WorkerAuthConfig {
				audience: Audience::default(),
				scope: ScopeSet::default(),
				extra_params: BTreeMap::new(),
			},
			refresh_token: TokenSecret::new(refresh_token),
			timeout,
		}
	}

	#[tokio::test]
	async fn exchanges_are_relayed_through_the_channel() {
		let (worker, endpoint) = worker(std::time::Duration::ZERO);
		let response = worker
			.exchange(request("rt-1", Duration::seconds(5)))
			.await
			.expect("Exchange should succeed.");

		assert_eq!(response.access_token.expose(), "at-for-rt-1");
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn empty_refresh_tokens_never_reach_the_endpoint() {
		let (worker, endpoint) = worker(std::time::Duration::ZERO);
		let err = worker
			.exchange(request("", Duration::seconds(5)))
			.await
			.expect_err("Empty refresh token should be rejected.");

		assert!(matches!(err, Error::MissingRefreshToken));
		assert!(err.is_invalid_grant());
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn worker_timeouts_match_the_in_process_shape() {
		let (worker, _) = worker(std::time::Duration::from_secs(5));
		let err = worker
			.exchange(request("rt-1", Duration::milliseconds(20)))
			.await
			.expect_err("Slow exchange should time out.");

		assert_eq!(err.timeout_kind(), Some(TimeoutKind::Fetch));
		assert_eq!(err.to_string(), "Timeout when executing 'fetch'.");
	}

	#[test]
	fn support_requires_a_runtime() {
		assert!(!TokenWorker::is_supported());
	}
}
