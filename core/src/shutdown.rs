//! Graceful shutdown of the sync service and its peer workers.
//!
//! Triggering the [`Controller`] resolves every [`Signal`], completion waits until every
//! [`DelayToken`] has been dropped.
use std::{
	fmt::{self, Debug, Display, Formatter},
	future::Future,
	mem,
	sync::{Arc, Mutex},
	task::Waker,
};

pub use self::{completed::Completed, signal::Signal};

mod completed;
mod signal;

/// Cloneable, thread-safe shutdown controller carrying the shutdown reason.
#[derive(Clone)]
pub struct Controller<T: Clone> {
	inner: Arc<Mutex<ControllerInner<T>>>,
}

impl<T: Clone> Controller<T> {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(ControllerInner::new())),
		}
	}

	pub fn is_shutdown_triggered(&self) -> bool {
		self.inner.lock().unwrap().reason.is_some()
	}

	pub fn is_shutdown_completed(&self) -> bool {
		let inner = self.inner.lock().unwrap();
		inner.reason.is_some() && inner.delay_tokens == 0
	}

	pub fn shutdown_reason(&self) -> Option<T> {
		self.inner.lock().unwrap().reason.clone()
	}

	/// Starts the shutdown. Only the first reason is kept.
	pub fn trigger_shutdown(&self, reason: T) -> Result<(), ShutdownHasStarted<T>> {
		self.inner.lock().unwrap().shutdown(reason)
	}

	/// Resolves with the reason once the shutdown is triggered and no delay token is left.
	pub fn completed_shutdown(&self) -> Completed<T> {
		Completed {
			inner: self.inner.clone(),
		}
	}

	/// Resolves with the reason once the shutdown is triggered.
	pub fn triggered_shutdown(&self) -> Signal<T> {
		Signal {
			inner: self.inner.clone(),
		}
	}

	/// Runs the future until it completes or the shutdown is triggered, whichever comes first.
	pub async fn with_cancel<F: Future>(&self, future: F) -> Result<F::Output, T> {
		self.triggered_shutdown().with_cancel(future).await
	}

	/// Token delaying shutdown completion as long as it exists.
	pub fn delay_token(&self) -> Result<DelayToken<T>, ShutdownHasCompleted<T>> {
		let mut inner = self.inner.lock().unwrap();
		if let (0, Some(reason)) = (inner.delay_tokens, &inner.reason) {
			return Err(ShutdownHasCompleted {
				reason: reason.clone(),
			});
		}

		inner.delay_tokens += 1;
		Ok(DelayToken {
			inner: self.inner.clone(),
		})
	}
}

impl<T: Clone> Default for Controller<T> {
	fn default() -> Self {
		Self::new()
	}
}

pub struct ControllerInner<T> {
	reason: Option<T>,
	/// Must reach zero before the shutdown completes.
	delay_tokens: usize,
	on_shutdown_trigger: Vec<Waker>,
	on_shutdown_complete: Vec<Waker>,
}

impl<T: Clone> ControllerInner<T> {
	fn new() -> Self {
		Self {
			reason: None,
			delay_tokens: 0,
			on_shutdown_trigger: vec![],
			on_shutdown_complete: vec![],
		}
	}

	fn release_delay_token(&mut self) {
		self.delay_tokens = self.delay_tokens.saturating_sub(1);
		if self.delay_tokens == 0 {
			wake_all(&mut self.on_shutdown_complete);
		}
	}

	fn shutdown(&mut self, reason: T) -> Result<(), ShutdownHasStarted<T>> {
		if let Some(original) = &self.reason {
			return Err(ShutdownHasStarted {
				reason: original.clone(),
				ignored: reason,
			});
		}

		self.reason = Some(reason);
		wake_all(&mut self.on_shutdown_trigger);
		if self.delay_tokens == 0 {
			wake_all(&mut self.on_shutdown_complete);
		}
		Ok(())
	}
}

fn wake_all(wakers: &mut Vec<Waker>) {
	for waker in mem::take(wakers) {
		waker.wake();
	}
}

/// Delays shutdown completion until dropped.
pub struct DelayToken<T: Clone> {
	inner: Arc<Mutex<ControllerInner<T>>>,
}

impl<T: Clone> Drop for DelayToken<T> {
	fn drop(&mut self) {
		self.inner.lock().unwrap().release_delay_token();
	}
}

#[derive(Debug, Clone)]
pub struct ShutdownHasStarted<T> {
	pub reason: T,
	/// Reason of the rejected trigger.
	pub ignored: T,
}

impl<T: Debug> std::error::Error for ShutdownHasStarted<T> {}

impl<T> Display for ShutdownHasStarted<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Shutdown has already started")
	}
}

#[derive(Debug)]
pub struct ShutdownHasCompleted<T> {
	pub reason: T,
}

impl<T: Debug> std::error::Error for ShutdownHasCompleted<T> {}

impl<T> Display for ShutdownHasCompleted<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Shutdown has been completed, cannot delay any further")
	}
}
