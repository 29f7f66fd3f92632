mod common;

// std
use std::{str::FromStr, sync::Arc};
// crates.io
use time::Duration;
// self
use common::*;
use oauth2_silent::{
	auth::{Audience, ScopeSet, TokenSecret, TokenSetEntry},
	error::{AuthError, Error, TimeoutKind, TransportError},
	flows::{GetTokenOptions, TokenOutput},
	store::MemoryStore,
};

async fn seed(harness: &Harness, access_token: &str, refresh_token: Option<&str>, expires_in: i64) {
	let key = harness.client.cache_key(&GetTokenOptions::default());
	let entry = TokenSetEntry::builder(key.client_id, key.audience, key.scope)
		.access_token(access_token)
		.id_token(id_token(user_claims("user-1")))
		.refresh_token(refresh_token.map(TokenSecret::new))
		.issued_at(START)
		.expires_in(expires_in)
		.build()
		.expect("Seed entry should build.");

	harness.client.cache().set(entry).await.expect("Seeding the cache should succeed.");
}

fn refresh_config() -> oauth2_silent::config::ClientConfig {
	config_builder().use_refresh_tokens(true).build().expect("Refresh configuration should build.")
}

#[tokio::test]
async fn entry_outside_leeway_is_served_from_cache() {
	let harness = Harness::new(config());

	seed(&harness, "cached-at", None, 70).await;

	let token = harness.client.get_access_token().await.expect("Cached token should be returned.");

	assert_eq!(token, "cached-at");
	assert_eq!(harness.endpoint.call_count(), 0);
	assert_eq!(harness.authenticator.call_count(), 0);
	assert_eq!(harness.lock.attempts(), 0, "Cache hits never take the lock.");
	assert_eq!(harness.client.metrics().cache_hits(), 1);
}

#[tokio::test]
async fn entry_inside_leeway_triggers_one_renewal() {
	let harness = Harness::new(config());

	seed(&harness, "stale-at", None, 50).await;

	let token = harness.client.get_access_token().await.expect("Renewal should succeed.");

	assert_eq!(token, "at-1");
	assert_eq!(harness.endpoint.call_count(), 1);
	assert_eq!(harness.endpoint.calls()[0].grant, "authorization_code");
	assert_eq!(harness.endpoint.calls()[0].code.as_deref(), Some("code-default"));
	assert_eq!(harness.authenticator.call_count(), 1);
	assert_eq!(harness.lock.releases(), 1);
	assert_eq!(harness.client.metrics().network_renewals(), 1);

	let again = harness.client.get_access_token().await.expect("Second call should hit.");

	assert_eq!(again, "at-1");
	assert_eq!(harness.endpoint.call_count(), 1);
}

#[tokio::test]
async fn invalid_refresh_token_falls_back_to_the_iframe() {
	let harness = Harness::new(refresh_config());

	assert!(harness.client.uses_worker());

	seed(&harness, "stale-at", Some("rt-old"), 10).await;
	harness.endpoint.push(Err(invalid_grant()));

	let token = harness.client.get_access_token().await.expect("Fallback should succeed.");
	let calls = harness.endpoint.calls();

	assert_eq!(token, "at-1");
	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].grant, "refresh_token");
	assert_eq!(calls[0].refresh_token.as_deref(), Some("rt-old"));
	assert_eq!(calls[1].grant, "authorization_code");
	assert_eq!(harness.authenticator.call_count(), 1);
	assert_eq!(harness.client.metrics().fallbacks(), 1);
	assert_eq!(harness.client.metrics().failures(), 0);
}

#[tokio::test]
async fn login_required_from_the_iframe_logs_out_before_rejecting() {
	let harness = Harness::new(config());

	harness.client.get_access_token().await.expect("First renewal should succeed.");

	assert!(harness.client.has_session_hint().await.expect("Hint lookup should succeed."));

	harness.clock.advance(Duration::hours(2));
	harness.authenticator.push(IframeStep::Error("login_required"));

	let err = harness.client.get_access_token().await.expect_err("Login required should surface.");

	assert!(err.is_login_required());
	assert!(!harness.client.is_authenticated().await.expect("Auth check should succeed."));
	assert!(!harness.client.has_session_hint().await.expect("Hint lookup should succeed."));
	assert!(!harness.client.cache().is_clearing());
	assert!(harness.store.is_empty(), "Cache keys and hints should be removed.");
	assert_eq!(harness.lock.releases(), 2);
}

#[tokio::test]
async fn tenth_lock_attempt_proceeds_normally() {
	let harness = Harness::with_parts(
		config(),
		Arc::new(MemoryStore::default()),
		Arc::new(ScriptedLock::refusing(9)),
		Arc::new(CountingEndpoint::new()),
	);
	let token = harness.client.get_access_token().await.expect("Tenth attempt should succeed.");

	assert_eq!(token, "at-1");
	assert_eq!(harness.lock.attempts(), 10);
	assert_eq!(harness.lock.releases(), 1);
}

#[tokio::test]
async fn exhausted_lock_attempts_time_out_without_network() {
	let harness = Harness::with_parts(
		config(),
		Arc::new(MemoryStore::default()),
		Arc::new(ScriptedLock::refusing(10)),
		Arc::new(CountingEndpoint::new()),
	);
	let err = harness.client.get_access_token().await.expect_err("Lock should time out.");

	assert_eq!(err.timeout_kind(), Some(TimeoutKind::Lock));
	assert_eq!(err.to_string(), "Timeout when executing 'lock'.");
	assert_eq!(harness.lock.attempts(), 10);
	assert_eq!(harness.endpoint.call_count(), 0);
	assert_eq!(harness.authenticator.call_count(), 0);
	assert_eq!(harness.client.metrics().failures(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_renewal() {
	let endpoint = Arc::new(CountingEndpoint::new().with_delay(std::time::Duration::from_millis(50)));
	let harness = Harness::with_parts(
		config(),
		Arc::new(MemoryStore::default()),
		Arc::new(ScriptedLock::default()),
		endpoint,
	);
	let (a, b, c) = tokio::join!(
		harness.client.get_access_token(),
		harness.client.get_access_token(),
		harness.client.get_token(GetTokenOptions::default().detailed_response(true)),
	);

	assert_eq!(a.expect("First caller should succeed."), "at-1");
	assert_eq!(b.expect("Second caller should succeed."), "at-1");
	assert_eq!(c.expect("Third caller should succeed.").access_token(), "at-1");
	assert_eq!(harness.endpoint.call_count(), 1);
	assert_eq!(harness.authenticator.call_count(), 1);
	assert_eq!(harness.lock.attempts(), 1);
	assert_eq!(harness.client.metrics().attempts(), 3);
}

#[tokio::test]
async fn concurrent_callers_share_one_rejection() {
	let endpoint = Arc::new(CountingEndpoint::new().with_delay(std::time::Duration::from_millis(50)));

	endpoint.push(Err(TransportError::HttpStatus {
		url: format!("https://{DOMAIN}/oauth/token"),
		status: 500,
	}
	.into()));

	let harness = Harness::with_parts(
		config(),
		Arc::new(MemoryStore::default()),
		Arc::new(ScriptedLock::default()),
		endpoint,
	);
	let (a, b) = tokio::join!(harness.client.get_access_token(), harness.client.get_access_token());
	let a = a.expect_err("First caller should fail.");
	let b = b.expect_err("Second caller should fail.");

	assert_eq!(a.to_string(), b.to_string());
	assert_eq!(a.to_string(), "HTTP error. Unable to fetch https://tenant.example.com/oauth/token");
	assert_eq!(harness.endpoint.call_count(), 1);
	assert_eq!(harness.lock.releases(), 1);
	assert_eq!(harness.client.metrics().failures(), 2);
	assert!(harness.client.is_authenticated().await.is_ok_and(|authenticated| !authenticated));
}

#[tokio::test]
async fn second_instance_reuses_the_first_instance_renewal() {
	let store = Arc::new(MemoryStore::default());
	let lock = Arc::new(ScriptedLock::default());
	let first = Harness::with_parts(
		config(),
		store.clone(),
		lock.clone(),
		Arc::new(CountingEndpoint::new().with_delay(std::time::Duration::from_millis(50))),
	);
	let second = Harness::with_parts(
		config(),
		store,
		lock.clone(),
		Arc::new(CountingEndpoint::new().with_delay(std::time::Duration::from_millis(50))),
	);
	let (a, b) = tokio::join!(first.client.get_access_token(), second.client.get_access_token());

	assert_eq!(a.expect("First instance should succeed."), "at-1");
	assert_eq!(b.expect("Second instance should succeed."), "at-1");
	assert_eq!(first.endpoint.call_count() + second.endpoint.call_count(), 1);
	assert_eq!(
		first.client.metrics().cache_hits() + second.client.metrics().cache_hits(),
		1,
		"The waiting instance should find the entry on its re-check."
	);
	assert_eq!(lock.releases(), 2);
}

#[tokio::test]
async fn detailed_response_carries_the_echoed_scope_only() {
	let harness = Harness::new(config());
	let mut echoed = token_response("at-echo", None, 3_600);

	echoed.scope = Some(ScopeSet::from_str("openid profile").expect("Scope should parse."));
	harness.endpoint.push(Ok(echoed));

	let detailed = harness
		.client
		.get_token(GetTokenOptions::default().detailed_response(true))
		.await
		.expect("Renewal should succeed.")
		.into_detailed()
		.expect("Detailed response should be returned.");

	assert_eq!(detailed.access_token, "at-echo");
	assert_eq!(detailed.expires_in, 3_600);
	assert_eq!(detailed.scope.as_deref(), Some("openid profile"));
	assert!(detailed.id_token.contains('.'));

	let cached = harness
		.client
		.get_token(GetTokenOptions::default().detailed_response(true))
		.await
		.expect("Cache hit should succeed.");

	assert!(matches!(
		&cached,
		TokenOutput::Detailed(response) if response.scope.as_deref() == Some("openid profile")
	));

	let entry = harness
		.client
		.cache()
		.get(&harness.client.cache_key(&GetTokenOptions::default()))
		.await
		.expect("Lookup should succeed.")
		.expect("Entry should be cached.");

	assert_eq!(entry.scope.normalized(), "email openid profile");
}

#[tokio::test]
async fn mismatched_state_is_fatal_and_releases_the_lock() {
	let harness = Harness::new(config());

	harness.authenticator.push(IframeStep::WrongState);

	let err = harness.client.get_access_token().await.expect_err("State mismatch should fail.");

	assert!(matches!(err, Error::StateMismatch));
	assert_eq!(err.to_string(), "Invalid state.");
	assert_eq!(harness.endpoint.call_count(), 0);
	assert_eq!(harness.authenticator.call_count(), 1);
	assert_eq!(harness.lock.releases(), 1);
}

#[tokio::test]
async fn iframe_wait_is_bounded_by_the_request_timeout() {
	let harness = Harness::new(config());

	harness.authenticator.push(IframeStep::Hang);

	let err = harness
		.client
		.get_token(GetTokenOptions::default().timeout(Duration::milliseconds(30)))
		.await
		.expect_err("Hanging iframe should time out.");

	assert_eq!(err.timeout_kind(), Some(TimeoutKind::Authorize));
	assert_eq!(harness.lock.releases(), 1);
}

#[tokio::test]
async fn refresh_errors_other_than_invalid_grant_do_not_fall_back() {
	let harness = Harness::new(
		config_builder()
			.use_refresh_tokens(true)
			.use_worker(false)
			.build()
			.expect("Config should build."),
	);

	assert!(!harness.client.uses_worker());

	seed(&harness, "stale-at", Some("rt-old"), 10).await;
	harness.endpoint.push(Err(TransportError::HttpStatus {
		url: format!("https://{DOMAIN}/oauth/token"),
		status: 503,
	}
	.into()));

	let err = harness.client.get_access_token().await.expect_err("Transport error should surface.");

	assert!(matches!(err, Error::Transport(TransportError::HttpStatus { status: 503, .. })));
	assert_eq!(harness.authenticator.call_count(), 0);
	assert_eq!(harness.client.metrics().fallbacks(), 0);
}

#[tokio::test]
async fn login_required_from_the_refresh_exchange_logs_out() {
	let harness = Harness::new(refresh_config());

	seed(&harness, "stale-at", Some("rt-old"), 10).await;
	harness.endpoint.push(Err(AuthError::new("consent_required", None).into()));

	let err = harness.client.get_access_token().await.expect_err("Consent required should surface.");

	assert!(err.is_login_required());
	assert_eq!(harness.authenticator.call_count(), 0);
	assert!(
		harness
			.client
			.cache()
			.get_refresh_token(&client_id(), &Audience::default())
			.await
			.expect("Refresh lookup should succeed.")
			.is_none()
	);
}

#[tokio::test]
async fn unrotated_refresh_tokens_are_kept() {
	let harness = Harness::new(refresh_config());

	seed(&harness, "stale-at", Some("rt-old"), 10).await;
	harness.endpoint.push(Ok(token_response("at-new", None, 3_600)));

	let token = harness.client.get_access_token().await.expect("Refresh should succeed.");
	let kept = harness
		.client
		.cache()
		.get_refresh_token(&client_id(), &Audience::default())
		.await
		.expect("Refresh lookup should succeed.");

	assert_eq!(token, "at-new");
	assert_eq!(kept.map(|token| token.expose().to_owned()), Some("rt-old".into()));
	assert!(harness.verifier.requests.lock()[0].nonce.is_none());
}

#[tokio::test]
async fn ignore_cache_always_renews() {
	let harness = Harness::new(config());

	seed(&harness, "cached-at", None, 3_600).await;

	let token = harness
		.client
		.get_token(GetTokenOptions::default().ignore_cache(true))
		.await
		.expect("Renewal should succeed.");

	assert_eq!(token.access_token(), "at-1");
	assert_eq!(harness.endpoint.call_count(), 1);
	assert_eq!(harness.client.metrics().cache_hits(), 0);
}

#[tokio::test]
async fn request_overrides_reach_the_authorize_url() {
	let harness = Harness::new(
		config_builder().extra_param("ui_locales", "en").build().expect("Config should build."),
	);

	harness
		.client
		.get_token(
			GetTokenOptions::default()
				.audience(Audience::new("https://api.example.com/").expect("Audience should be valid."))
				.scope(ScopeSet::from_str("read:messages").expect("Scope should parse."))
				.extra_param("ui_locales", "fr"),
		)
		.await
		.expect("Renewal should succeed.");

	let url = &harness.authenticator.urls()[0];
	let param = |name: &str| {
		url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
	};

	assert_eq!(param("scope").as_deref(), Some("email openid profile read:messages"));
	assert_eq!(param("audience").as_deref(), Some("https://api.example.com/"));
	assert_eq!(param("ui_locales").as_deref(), Some("fr"));
	assert_eq!(param("prompt").as_deref(), Some("none"));
	assert_eq!(url.path(), "/authorize");

	let verified = harness.verifier.requests.lock()[0].clone();

	assert_eq!(verified.issuer, "https://tenant.example.com/");
	assert_eq!(verified.audience.as_ref(), CLIENT_ID);
	assert_eq!(verified.nonce, param("nonce"));
}

#[tokio::test]
async fn refresh_requests_carry_merged_extra_params() {
	let harness = Harness::new(
		config_builder()
			.use_refresh_tokens(true)
			.extra_param("tenant_hint", "acme")
			.build()
			.expect("Config should build."),
	);

	seed(&harness, "stale-at", Some("rt-old"), 10).await;
	harness
		.client
		.get_token(GetTokenOptions::default().extra_param("device", "kiosk"))
		.await
		.expect("Refresh should succeed.");

	let call = &harness.endpoint.calls()[0];

	assert_eq!(call.grant, "refresh_token");
	assert_eq!(call.scope, "email offline_access openid profile");
	assert_eq!(call.extra_params.get("tenant_hint").map(String::as_str), Some("acme"));
	assert_eq!(call.extra_params.get("device").map(String::as_str), Some("kiosk"));
}
