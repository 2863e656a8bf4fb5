use std::{
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex},
	task::{Context, Poll},
};

use super::ControllerInner;

/// Resolves with the shutdown reason once the shutdown is triggered and every delay token is dropped.
pub struct Completed<T: Clone> {
	pub(super) inner: Arc<Mutex<ControllerInner<T>>>,
}

impl<T: Clone> Future for Completed<T> {
	type Output = T;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let mut inner = self.inner.lock().unwrap();
		if let (0, Some(reason)) = (inner.delay_tokens, inner.reason.as_ref()) {
			return Poll::Ready(reason.clone());
		}

		// fresh waker on every poll
		inner.on_shutdown_complete.push(cx.waker().clone());
		Poll::Pending
	}
}
