//! Cooperative shutdown of the ingestion tasks.
//!
//! A [`Controller`] hands out a [`Monitor`] to every task that has to finish
//! before the process exits. [`Controller::shutdown`] signals all monitors and
//! waits until each of them has been dropped.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Controller {
	/// Shared with every [`Monitor`] and [`Trigger`].
	cancellation_token: CancellationToken,

	/// Cloned into monitors, dropped on shutdown.
	task_tracker: Option<mpsc::Sender<()>>,

	/// Resolves once every sender half has been dropped.
	task_waiter: mpsc::Receiver<()>,
}

impl Controller {
	pub fn new() -> Self {
		let (task_tracker, task_waiter) = mpsc::channel::<()>(1);
		Self {
			cancellation_token: CancellationToken::new(),
			task_tracker: Some(task_tracker),
			task_waiter,
		}
	}

	/// Creates a [`Monitor`] for a task that has to finish before shutdown completes.
	pub fn watch(&self) -> Monitor {
		Monitor {
			cancellation_token: self.cancellation_token.clone(),
			_task_tracker: self.task_tracker.clone(),
		}
	}

	/// Creates a [`Trigger`] which can start the shutdown without waiting for it.
	pub fn trigger(&self) -> Trigger {
		Trigger(self.cancellation_token.clone())
	}

	/// Waits until shutdown is triggered, without starting it.
	pub async fn triggered(&self) {
		self.cancellation_token.cancelled().await;
	}

	pub async fn shutdown(&mut self) {
		self.cancellation_token.cancel();

		// receiver returns once every monitor dropped its sender
		self.task_tracker.take();
		let _ = self.task_waiter.recv().await;
	}
}

impl Default for Controller {
	fn default() -> Self {
		Self::new()
	}
}

/// Starts the shutdown from places that cannot wait for it, such as a panic hook.
#[derive(Clone)]
pub struct Trigger(CancellationToken);

impl Trigger {
	pub fn trigger_shutdown(&self, reason: &str) {
		if !self.0.is_cancelled() {
			info!(reason, "Shutdown triggered");
		}
		self.0.cancel();
	}

	/// Triggers the shutdown once the operator stops the process.
	pub async fn on_user_signal(self) {
		let signal = user_signal().await;
		self.trigger_shutdown(&format!("User signaled shutdown ({signal})"));
	}
}

/// Completes on Ctrl-C, or on SIGTERM where available, naming the signal.
pub async fn user_signal() -> &'static str {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		match signal(SignalKind::terminate()) {
			Ok(mut terminate) => tokio::select! {
				_ = tokio::signal::ctrl_c() => "SIGINT",
				_ = terminate.recv() => "SIGTERM",
			},
			Err(error) => {
				warn!(%error, "Cannot listen for SIGTERM, waiting for Ctrl-C only");
				let _ = tokio::signal::ctrl_c().await;
				"SIGINT"
			},
		}
	}

	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
		"Ctrl-C"
	}
}

/// Observes the shutdown signal of a [`Controller`].
pub struct Monitor {
	cancellation_token: CancellationToken,

	/// Keeps [`Controller::shutdown`] waiting while the monitor is alive.
	_task_tracker: Option<mpsc::Sender<()>>,
}

impl Monitor {
	pub fn is_shutdown(&self) -> bool {
		self.cancellation_token.is_cancelled()
	}

	/// Waits for the shutdown signal.
	pub async fn canceled(&self) {
		if self.is_shutdown() {
			return;
		}
		self.cancellation_token.cancelled().await;
	}
}
