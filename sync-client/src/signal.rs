//! Heart-rate input for auto-advance.
//!
//! A [`HeartRateSource`] is the platform sensor seam: it asks for permission,
//! then streams readings (beats per minute) over a channel until the session
//! ends. The device driver bounds the permission request with a timeout so a
//! prompt the user never answers cannot stall a workout.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Heart-rate errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The user declined access.
    #[error("heart-rate access denied")]
    Denied,

    /// No answer within the allowed time.
    #[error("heart-rate authorization timed out after {0:?}")]
    Timeout(Duration),

    /// The sensor could not be started.
    #[error("heart-rate sensor unavailable: {0}")]
    Unavailable(String),
}

/// A stream of heart-rate readings.
#[async_trait]
pub trait HeartRateSource: Send + Sync {
    /// Ask for permission. `Ok(false)` means the user declined.
    async fn request_authorization(&self) -> Result<bool, SignalError>;

    /// Begin streaming readings.
    async fn start_session(&self) -> Result<mpsc::Receiver<f64>, SignalError>;

    /// Stop streaming.
    async fn end_session(&self) -> Result<(), SignalError>;
}

/// Request authorization, giving up after `timeout`.
pub async fn authorize(source: &dyn HeartRateSource, timeout: Duration) -> Result<(), SignalError> {
    match tokio::time::timeout(timeout, source.request_authorization()).await {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(SignalError::Denied),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(SignalError::Timeout(timeout)),
    }
}

/// How a [`ScriptedHeartRate`] answers the permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// Grant immediately.
    Grant,
    /// Decline immediately.
    Deny,
    /// Never answer.
    Hang,
}

/// Heart-rate source replaying a fixed list of readings, one per interval.
#[derive(Debug)]
pub struct ScriptedHeartRate {
    readings: Vec<f64>,
    interval: Duration,
    authorization: Authorization,
    state: Mutex<ScriptState>,
}

#[derive(Debug, Default)]
struct ScriptState {
    task: Option<JoinHandle<()>>,
    sessions_started: usize,
}

impl ScriptedHeartRate {
    /// Replay `readings`, one per second, after granting access.
    pub fn new(readings: Vec<f64>) -> Self {
        Self {
            readings,
            interval: Duration::from_secs(1),
            authorization: Authorization::Grant,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Set the spacing between readings.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set how the permission prompt is answered.
    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether readings are currently being streamed.
    pub fn is_streaming(&self) -> bool {
        self.lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// How many times `start_session` succeeded.
    pub fn sessions_started(&self) -> usize {
        self.lock().sessions_started
    }
}

#[async_trait]
impl HeartRateSource for ScriptedHeartRate {
    async fn request_authorization(&self) -> Result<bool, SignalError> {
        match self.authorization {
            Authorization::Grant => Ok(true),
            Authorization::Deny => Ok(false),
            Authorization::Hang => Ok(std::future::pending::<bool>().await),
        }
    }

    async fn start_session(&self) -> Result<mpsc::Receiver<f64>, SignalError> {
        let (tx, rx) = mpsc::channel(self.readings.len().max(1));
        let readings = self.readings.clone();
        let interval = self.interval;
        let task = tokio::spawn(async move {
            for bpm in readings {
                tokio::time::sleep(interval).await;
                if tx.send(bpm).await.is_err() {
                    break;
                }
            }
        });

        let mut state = self.lock();
        if let Some(previous) = state.task.replace(task) {
            previous.abort();
        }
        state.sessions_started += 1;
        Ok(rx)
    }

    async fn end_session(&self) -> Result<(), SignalError> {
        if let Some(task) = self.lock().task.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn scripted_readings_arrive_in_order() {
        let source = ScriptedHeartRate::new(vec![80.0, 95.0, 110.0]);
        authorize(&source, Duration::from_secs(10)).await.unwrap();

        let mut readings = source.start_session().await.unwrap();
        assert!(source.is_streaming());

        let mut got = Vec::new();
        while let Some(bpm) = readings.recv().await {
            got.push(bpm);
        }
        assert_eq!(got, vec![80.0, 95.0, 110.0]);
        assert_eq!(source.sessions_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_stops_stream() {
        let source = ScriptedHeartRate::new(vec![80.0; 100]);
        let mut readings = source.start_session().await.unwrap();
        assert_eq!(readings.recv().await, Some(80.0));

        source.end_session().await.unwrap();
        assert!(!source.is_streaming());
        assert_eq!(readings.recv().await, None);
    }

    #[tokio::test]
    async fn denied_authorization() {
        let source = ScriptedHeartRate::new(vec![]).with_authorization(Authorization::Deny);
        assert_eq!(
            authorize(&source, Duration::from_secs(10)).await,
            Err(SignalError::Denied)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_authorization_times_out() {
        let source = ScriptedHeartRate::new(vec![]).with_authorization(Authorization::Hang);
        let timeout = Duration::from_secs(10);

        let started = tokio::time::Instant::now();
        assert_eq!(
            authorize(&source, timeout).await,
            Err(SignalError::Timeout(timeout))
        );
        assert_eq!(started.elapsed(), timeout);
    }
}
