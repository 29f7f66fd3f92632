// self
use crate::{_prelude::*, obs::FlowKind};

/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// `oauth2_silent.flow` span for one client flow.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` on behalf of `client_id`.
	pub fn new(kind: FlowKind, client_id: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("oauth2_silent.flow", flow = %kind, client_id) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, client_id);

			Self {}
		}
	}

	/// Runs `fut` inside the span; nothing is entered across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			tracing::Instrument::instrument(fut, self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrumented_futures_keep_their_output() {
		let span = FlowSpan::new(FlowKind::RefreshExchange, "spa-client");

		assert_eq!(span.instrument(async { "rotated" }).await, "rotated");
		assert_eq!(span.clone().instrument(async { 7 }).await, 7);
	}
}
