//! ID-token verification contract and a claims-only verifier.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, IdTokenClaims},
};

/// Inputs to ID-token verification.
#[derive(Clone, Debug)]
pub struct VerifyRequest {
	/// Raw ID token.
	pub id_token: String,
	/// Expected `iss`.
	pub issuer: String,
	/// Expected `aud`; always the client id.
	pub audience: ClientId,
	/// Nonce generated for the attempt; refresh exchanges have none.
	pub nonce: Option<String>,
	/// Clock skew tolerated on time-based claims.
	pub leeway: Duration,
	/// Maximum authentication age, when configured.
	pub max_age: Option<Duration>,
	/// Organization the session must belong to (`org_…` id or organization name).
	pub organization: Option<String>,
	/// Instant used for time-based checks.
	pub now: OffsetDateTime,
}

/// Outcome of a successful verification.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedIdToken {
	/// Every claim in the token.
	pub claims: IdTokenClaims,
	/// Profile view of the claims.
	pub user: IdTokenClaims,
}

/// Verifies ID tokens; any failure is fatal for the renewal that produced the token.
pub trait TokenVerifier
where
	Self: Send + Sync,
{
	/// Verifies `request.id_token`, returning [`Error::Verification`] on rejection.
	fn verify(&self, request: &VerifyRequest) -> Result<VerifiedIdToken>;
}

/// Verifier that decodes the JWT payload and checks its claims without checking the signature.
///
/// Suitable when the token arrives directly from the token endpoint over TLS, which is the
/// only way the renewal engine obtains ID tokens.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClaimsVerifier;
impl TokenVerifier for ClaimsVerifier {
	fn verify(&self, request: &VerifyRequest) -> Result<VerifiedIdToken> {
		let claims = decode_payload(&request.id_token)?;

		check_claims(&claims, request)?;

		Ok(VerifiedIdToken { user: claims.user(), claims })
	}
}

/// Decodes the payload segment of a compact JWT.
pub fn decode_payload(id_token: &str) -> Result<IdTokenClaims> {
	let mut segments = id_token.split('.');
	let (Some(_), Some(payload), Some(_), None) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return Err(rejection("ID token could not be decoded"));
	};
	let bytes = URL_SAFE_NO_PAD
		.decode(payload.trim_end_matches('='))
		.map_err(|_| rejection("ID token could not be decoded"))?;
	let claims = serde_json::from_slice::<Map<String, Value>>(&bytes)
		.map_err(|_| rejection("ID token could not be decoded"))?;

	Ok(IdTokenClaims::new(claims))
}

fn check_claims(claims: &IdTokenClaims, request: &VerifyRequest) -> Result<()> {
	let issuer = claims
		.get_str("iss")
		.ok_or_else(|| rejection("Issuer (iss) claim must be a string present in the ID token"))?;

	if issuer != request.issuer {
		return Err(rejection(format!(
			"Issuer (iss) claim mismatch in the ID token; expected \"{}\", found \"{issuer}\"",
			request.issuer
		)));
	}
	if claims.sub().is_none() {
		return Err(rejection("Subject (sub) claim must be a string present in the ID token"));
	}

	check_audience(claims, request.audience.as_ref())?;

	let exp = numeric_claim(claims, "exp")
		.ok_or_else(|| rejection("Expiration Time (exp) claim must be a number present in the ID token"))?;

	if numeric_claim(claims, "iat").is_none() {
		return Err(rejection("Issued At (iat) claim must be a number present in the ID token"));
	}
	if let Some(expected) = request.nonce.as_deref() {
		match claims.nonce() {
			None => return Err(rejection("Nonce (nonce) claim must be a string present in the ID token")),
			Some(found) if found != expected =>
				return Err(rejection(format!(
					"Nonce (nonce) claim mismatch in the ID token; expected \"{expected}\", found \"{found}\""
				))),
			Some(_) => {},
		}
	}

	let now = request.now.unix_timestamp();
	let leeway = request.leeway.whole_seconds();

	let expires_at = exp.saturating_add(leeway);

	if now > expires_at {
		return Err(rejection(format!(
			"Expiration Time (exp) claim error in the ID token; current time ({now}) is after expiration time ({expires_at})"
		)));
	}
	if let Some(not_before) =
		numeric_claim(claims, "nbf").map(|nbf| nbf.saturating_sub(leeway)).filter(|nbf| now < *nbf)
	{
		return Err(rejection(format!(
			"Not Before time (nbf) claim in the ID token indicates that this token can't be used just yet. Current time ({now}) is before {not_before}"
		)));
	}
	if let Some(max_age) = request.max_age {
		let auth_time = numeric_claim(claims, "auth_time").ok_or_else(|| {
			rejection("Authentication Time (auth_time) claim must be a number present in the ID token when Max Age (max_age) is specified")
		})?;

		let auth_deadline =
			auth_time.saturating_add(max_age.whole_seconds()).saturating_add(leeway);

		if now > auth_deadline {
			return Err(rejection(format!(
				"Authentication Time (auth_time) claim in the ID token indicates that too much time has passed since the last end-user authentication. Current time ({now}) is after last auth at {auth_deadline}"
			)));
		}
	}
	if let Some(organization) = request.organization.as_deref() {
		check_organization(claims, organization)?;
	}

	Ok(())
}

fn check_audience(claims: &IdTokenClaims, client_id: &str) -> Result<()> {
	match claims.get("aud") {
		Some(Value::String(aud)) if aud == client_id => Ok(()),
		Some(Value::Array(values)) => {
			if !values.iter().any(|value| value.as_str() == Some(client_id)) {
				return Err(rejection(format!(
					"Audience (aud) claim mismatch in the ID token; expected \"{client_id}\" but was not one of the listed audiences"
				)));
			}
			if values.len() > 1 && claims.get_str("azp") != Some(client_id) {
				return Err(rejection(
					"Authorized Party (azp) claim must match the client id when multiple audiences are present",
				));
			}

			Ok(())
		},
		Some(Value::String(aud)) => Err(rejection(format!(
			"Audience (aud) claim mismatch in the ID token; expected \"{client_id}\" but found \"{aud}\""
		))),
		_ => Err(rejection("Audience (aud) claim must be a string or array of strings present in the ID token")),
	}
}

fn check_organization(claims: &IdTokenClaims, organization: &str) -> Result<()> {
	if organization.starts_with("org_") {
		match claims.org_id() {
			Some(found) if found == organization => Ok(()),
			Some(found) => Err(rejection(format!(
				"Organization ID (org_id) claim mismatch in the ID token; expected \"{organization}\", found \"{found}\""
			))),
			None => Err(rejection("Organization ID (org_id) claim must be a string present in the ID token")),
		}
	} else {
		let expected = organization.to_lowercase();

		match claims.get_str("org_name") {
			Some(found) if found == expected => Ok(()),
			Some(found) => Err(rejection(format!(
				"Organization Name (org_name) claim mismatch in the ID token; expected \"{expected}\", found \"{found}\""
			))),
			None => Err(rejection("Organization Name (org_name) claim must be a string present in the ID token")),
		}
	}
}

fn numeric_claim(claims: &IdTokenClaims, name: &str) -> Option<i64> {
	claims.get(name).and_then(Value::as_i64)
}

fn rejection(reason: impl Into<String>) -> Error {
	Error::Verification { reason: reason.into() }
}
