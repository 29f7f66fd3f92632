//! Token cache and concurrent silent-renewal engine for browser-style OAuth 2.0/OIDC public
//! clients: scope-aware caching, cross-instance renewal locks, single-flight coalescing, and
//! refresh-token or hidden-iframe re-authentication with strict failure semantics.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod ext;
pub mod flows;
pub mod http;
pub mod lock;
pub mod oauth;
pub mod obs;
pub mod store;
pub mod worker;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ClientId,
		config::{ClientConfig, ClientConfigBuilder},
	};

	/// Domain used by test configurations.
	pub const TEST_DOMAIN: &str = "tenant.example.com";
	/// Client identifier used by test configurations.
	pub const TEST_CLIENT_ID: &str = "spa-client";

	/// Returns a config builder seeded with the test domain and the provided client id.
	pub fn test_config_builder(client_id: &str) -> ClientConfigBuilder {
		let client_id =
			ClientId::new(client_id).expect("Test client identifier should always be valid.");

		ClientConfig::builder(TEST_DOMAIN, client_id).redirect_uri(
			Url::parse("https://app.example.com/callback")
				.expect("Test redirect URI should parse successfully."),
		)
	}

	/// Builds the default test configuration.
	pub fn test_config() -> ClientConfig {
		test_config_builder(TEST_CLIENT_ID)
			.build()
			.expect("Default test configuration should build successfully.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
