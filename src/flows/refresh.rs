//! Refresh-token exchange, in-process or through the worker.

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, TokenSetEntry},
	flows::{SilentClient, get_token::RenewalRequest},
	oauth::{self, TokenGrant, TokenRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	worker::{WorkerAuthConfig, WorkerRequest},
};

impl SilentClient {
	/// Spends `refresh_token` at the token endpoint, through the worker when one is running.
	///
	/// A refresh token that comes back unrotated is carried over into the new entry.
	pub(super) async fn refresh_exchange(
		&self,
		request: &RenewalRequest,
		refresh_token: TokenSecret,
	) -> Result<TokenSetEntry> {
		const KIND: FlowKind = FlowKind::RefreshExchange;

		let span = FlowSpan::new(KIND, &self.config.client_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_refresh_exchange();

		let result = span
			.instrument(async move {
				let key = &request.key;
				let response = match self.worker.as_ref() {
					Some(worker) =>
						worker
							.exchange(WorkerRequest {
								auth: WorkerAuthConfig {
									audience: key.audience.clone(),
									scope: key.scope.clone(),
									extra_params: request.extra_params.clone(),
								},
								refresh_token: refresh_token.clone(),
								timeout: self.config.fetch_timeout,
							})
							.await?,
					None => {
						let token_request = TokenRequest::new(
							TokenGrant::RefreshToken { refresh_token: refresh_token.clone() },
							key.audience.clone(),
							key.scope.clone(),
						)
						.with_extra_params(request.extra_params.clone());

						oauth::exchange_with_timeout(
							self.endpoint.as_ref(),
							token_request,
							self.config.fetch_timeout,
						)
						.await?
					},
				};

				self.build_entry(key, response, None, Some(refresh_token))
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}
