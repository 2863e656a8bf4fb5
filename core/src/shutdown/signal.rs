use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
	task::{Context, Poll},
};

use super::ControllerInner;

/// Resolves with the shutdown reason once the shutdown is triggered.
#[derive(Clone)]
pub struct Signal<T: Clone> {
	pub(super) inner: Arc<Mutex<ControllerInner<T>>>,
}

impl<T: Clone> Signal<T> {
	/// Runs the future until it completes, or fails with the reason if the shutdown comes first.
	pub async fn with_cancel<F: Future>(self, future: F) -> Result<F::Output, T> {
		tokio::select! {
			biased;
			reason = self => Err(reason),
			output = future => Ok(output),
		}
	}
}

impl<T: Clone> Future for Signal<T> {
	type Output = T;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let mut inner = self.inner.lock().unwrap();
		if let Some(reason) = inner.reason.clone() {
			return Poll::Ready(reason);
		}

		inner.on_shutdown_trigger.push(cx.waker().clone());
		Poll::Pending
	}
}
