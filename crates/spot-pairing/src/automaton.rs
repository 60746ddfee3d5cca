//! [`PairingAutomaton`] – drives one controller pairing session.
//!
//! # Stages
//!
//! ```text
//! Idle → AdapterUnblockRequested → AdapterUp → AgentReady → Scanning
//!      → Matching → Found → Pairing → Trusting → Connecting → Complete
//!                 ↘ NotFound
//! ```
//!
//! Any error before `Found` ends the session immediately. Pair, trust and
//! connect are each retried according to the session's [`RetryPolicy`]
//! before the session fails. Every adapter call is bounded by
//! `step_timeout`, and the scan wait by `scan_window`, so a session always
//! terminates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use spot_types::{DeviceRecord, PairingReport};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapter::{BluetoothAdapter, bounded};
use crate::error::{AdapterError, PairingError};
use crate::matcher::{DeviceMatcher, match_first};
use crate::retry::RetryPolicy;

// ─────────────────────────────────────────────────────────────────────────────
// Session model
// ─────────────────────────────────────────────────────────────────────────────

/// Position of the automaton in the pairing workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingStage {
    Idle,
    AdapterUnblockRequested,
    AdapterUp,
    AgentReady,
    Scanning,
    Matching,
    Found,
    NotFound,
    Pairing,
    Trusting,
    Connecting,
    Complete,
    Failed,
}

impl PairingStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PairingStage::Complete | PairingStage::NotFound | PairingStage::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Down,
    Up,
    AgentReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Idle,
    Paired,
    Trusted,
    Connected,
    Failed,
}

/// Everything learned during one pairing attempt. Never persisted.
#[derive(Debug, Clone)]
pub struct PairingSession {
    pub id: Uuid,
    pub adapter_state: AdapterState,
    /// When the discovery window closes (set on entering `Scanning`).
    pub scan_deadline: Option<Instant>,
    /// Discovery snapshot, sorted by discovery order.
    pub candidates: Vec<DeviceRecord>,
    pub selected: Option<DeviceRecord>,
    pub pair_state: PairState,
}

impl PairingSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            adapter_state: AdapterState::Down,
            scan_deadline: None,
            candidates: Vec::new(),
            selected: None,
            pair_state: PairState::Idle,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingConfig {
    /// How long discovery runs before the snapshot is taken.
    pub scan_window: Duration,
    /// Upper bound on any single adapter call.
    pub step_timeout: Duration,
    /// Retry budget for pair, trust and connect.
    pub retry: RetryPolicy,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(15),
            step_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Pair,
    Trust,
    Connect,
}

impl Step {
    fn label(self) -> &'static str {
        match self {
            Step::Pair => "pair",
            Step::Trust => "trust",
            Step::Connect => "connect",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PairingAutomaton
// ─────────────────────────────────────────────────────────────────────────────

/// Sequential pairing state machine over a [`BluetoothAdapter`].
///
/// # Example
///
/// `MockAdapter` requires the `test-util` feature.
///
/// ```rust,ignore
/// use spot_pairing::{DeviceMatcher, PairingAutomaton, PairingConfig, PairingStage};
/// use spot_pairing::testing::MockAdapter;
/// use spot_types::DeviceRecord;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let adapter = MockAdapter::new()
///     .with_discovered(vec![DeviceRecord::new("AA:BB:CC:DD:EE:FF", "Wireless Controller", 0)]);
/// let config = PairingConfig {
///     scan_window: std::time::Duration::from_millis(10),
///     ..PairingConfig::default()
/// };
/// let mut automaton = PairingAutomaton::new(adapter, DeviceMatcher::controllers(), config);
///
/// let report = automaton.run().await.unwrap();
/// assert_eq!(report.address, "AA:BB:CC:DD:EE:FF");
/// assert_eq!(automaton.stage(), PairingStage::Complete);
/// # });
/// ```
pub struct PairingAutomaton<A> {
    adapter: A,
    matcher: DeviceMatcher,
    config: PairingConfig,
    stage: PairingStage,
    history: Vec<PairingStage>,
    session: PairingSession,
    cancel: Arc<Notify>,
}

impl<A: BluetoothAdapter> PairingAutomaton<A> {
    pub fn new(adapter: A, matcher: DeviceMatcher, config: PairingConfig) -> Self {
        Self {
            adapter,
            matcher,
            config,
            stage: PairingStage::Idle,
            history: vec![PairingStage::Idle],
            session: PairingSession::new(),
            cancel: Arc::new(Notify::new()),
        }
    }

    /// Handle that aborts the discovery wait when notified.
    ///
    /// A notification sent before the scan starts is remembered, so the
    /// session is cancelled as soon as it reaches `Scanning`.
    pub fn cancel_handle(&self) -> Arc<Notify> {
        self.cancel.clone()
    }

    pub fn stage(&self) -> PairingStage {
        self.stage
    }

    /// Every stage entered so far, starting with `Idle`.
    pub fn history(&self) -> &[PairingStage] {
        &self.history
    }

    pub fn session(&self) -> &PairingSession {
        &self.session
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run the session to a terminal stage.
    ///
    /// # Errors
    ///
    /// Returns the [`PairingError`] that ended the session. The automaton is
    /// then in [`PairingStage::NotFound`] (for `DeviceNotFound`) or
    /// [`PairingStage::Failed`].
    #[instrument(skip(self), fields(session = %self.session.id))]
    pub async fn run(&mut self) -> Result<PairingReport, PairingError> {
        let result = self.drive().await;
        match &result {
            Ok(report) => info!(address = %report.address, name = %report.display_name, "pairing complete"),
            Err(e) => {
                if self.stage != PairingStage::NotFound {
                    self.enter(PairingStage::Failed);
                }
                if self.session.selected.is_some() {
                    self.session.pair_state = PairState::Failed;
                }
                warn!(error = %e, stage = ?self.stage, "pairing session ended");
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<PairingReport, PairingError> {
        let limit = self.config.step_timeout;

        self.enter(PairingStage::AdapterUnblockRequested);
        bounded(limit, self.adapter.unblock())
            .await
            .map_err(|e| PairingError::AdapterUnavailable(e.to_string()))?;

        bounded(limit, self.adapter.power_on())
            .await
            .map_err(|e| match e {
                AdapterError::NoAdapter => PairingError::AdapterUnavailable(e.to_string()),
                other => PairingError::AdapterPowerFailure(other.to_string()),
            })?;
        self.session.adapter_state = AdapterState::Up;
        self.enter(PairingStage::AdapterUp);

        bounded(limit, self.adapter.register_agent())
            .await
            .map_err(|e| PairingError::AgentRegistrationFailed(e.to_string()))?;
        self.session.adapter_state = AdapterState::AgentReady;
        self.enter(PairingStage::AgentReady);

        self.scan().await?;

        self.enter(PairingStage::Matching);
        let mut candidates = bounded(limit, self.adapter.discovered_devices())
            .await
            .map_err(|e| PairingError::ScanFailed(e.to_string()))?;
        candidates.sort_by_key(|d| d.discovery_order);
        debug!(count = candidates.len(), "discovery snapshot taken");
        self.session.candidates = candidates;

        let Some(device) = match_first(&self.session.candidates, &self.matcher).cloned() else {
            self.enter(PairingStage::NotFound);
            return Err(PairingError::DeviceNotFound {
                scanned: self.session.candidates.len(),
            });
        };
        info!(address = %device.address, name = %device.display_name, "controller found");
        self.session.selected = Some(device.clone());
        self.enter(PairingStage::Found);

        self.enter(PairingStage::Pairing);
        self.run_step(Step::Pair, &device.address).await?;
        self.session.pair_state = PairState::Paired;

        self.enter(PairingStage::Trusting);
        self.run_step(Step::Trust, &device.address).await?;
        self.session.pair_state = PairState::Trusted;

        self.enter(PairingStage::Connecting);
        self.run_step(Step::Connect, &device.address).await?;
        self.session.pair_state = PairState::Connected;

        self.enter(PairingStage::Complete);
        Ok(PairingReport {
            session_id: self.session.id,
            address: device.address,
            display_name: device.display_name,
            completed_at: Utc::now(),
        })
    }

    /// Run discovery for the configured window or until cancelled.
    async fn scan(&mut self) -> Result<(), PairingError> {
        let window = self.config.scan_window;
        let deadline = Instant::now() + window;
        self.session.scan_deadline = Some(deadline);
        self.enter(PairingStage::Scanning);
        info!(window = ?window, "scanning for controllers");

        bounded(self.config.step_timeout, self.adapter.start_scan(window))
            .await
            .map_err(|e| PairingError::ScanFailed(e.to_string()))?;

        let cancelled = tokio::select! {
            _ = tokio::time::sleep_until(deadline.into()) => false,
            _ = self.cancel.notified() => true,
        };

        if let Err(e) = bounded(self.config.step_timeout, self.adapter.stop_scan()).await {
            warn!(error = %e, "could not stop discovery");
        }
        if cancelled {
            return Err(PairingError::Cancelled);
        }
        Ok(())
    }

    /// Run one result-checked step under the retry policy.
    async fn run_step(&self, step: Step, address: &str) -> Result<(), PairingError> {
        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let call = async {
                match step {
                    Step::Pair => self.adapter.pair(address).await,
                    Step::Trust => self.adapter.trust(address).await,
                    Step::Connect => self.adapter.connect(address).await,
                }
            };
            match bounded(self.config.step_timeout, call).await {
                Ok(()) => {
                    debug!(step = step.label(), attempt, "step succeeded");
                    return Ok(());
                }
                Err(e) if attempt < policy.max_attempts() => {
                    let delay = policy.backoff(attempt);
                    warn!(step = step.label(), attempt, error = %e, retry_in = ?delay, "step failed; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let address = address.to_string();
                    let reason = e.to_string();
                    return Err(match step {
                        Step::Pair => PairingError::PairingRejected {
                            address,
                            attempts: attempt,
                            reason,
                        },
                        Step::Trust => PairingError::TrustFailed {
                            address,
                            attempts: attempt,
                            reason,
                        },
                        Step::Connect => PairingError::ConnectionFailed {
                            address,
                            attempts: attempt,
                            reason,
                        },
                    });
                }
            }
        }
    }

    fn enter(&mut self, stage: PairingStage) {
        debug!(from = ?self.stage, to = ?stage, "pairing transition");
        self.stage = stage;
        self.history.push(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAdapter, MockOp};

    const CONTROLLER: &str = "AA:BB:CC:DD:EE:FF";

    fn fast_config() -> PairingConfig {
        PairingConfig {
            scan_window: Duration::from_millis(50),
            step_timeout: Duration::from_millis(200),
            retry: RetryPolicy::new(2, Duration::from_millis(5)),
        }
    }

    fn controller_adapter() -> MockAdapter {
        MockAdapter::new().with_discovered(vec![
            DeviceRecord::new("11:22:33:44:55:66", "Living Room TV", 0),
            DeviceRecord::new(CONTROLLER, "Wireless Controller", 1),
        ])
    }

    fn automaton(adapter: MockAdapter) -> PairingAutomaton<MockAdapter> {
        PairingAutomaton::new(adapter, DeviceMatcher::controllers(), fast_config())
    }

    #[tokio::test]
    async fn happy_path_reaches_complete_with_exact_address() {
        let mut a = automaton(controller_adapter());
        let report = a.run().await.unwrap();

        assert_eq!(report.address, CONTROLLER);
        assert_eq!(report.display_name, "Wireless Controller");
        assert_eq!(report.session_id, a.session().id);
        assert_eq!(
            a.history(),
            &[
                PairingStage::Idle,
                PairingStage::AdapterUnblockRequested,
                PairingStage::AdapterUp,
                PairingStage::AgentReady,
                PairingStage::Scanning,
                PairingStage::Matching,
                PairingStage::Found,
                PairingStage::Pairing,
                PairingStage::Trusting,
                PairingStage::Connecting,
                PairingStage::Complete,
            ]
        );
        assert_eq!(a.session().pair_state, PairState::Connected);
        assert_eq!(a.session().adapter_state, AdapterState::AgentReady);
        let calls = a.adapter().calls();
        let tail: Vec<&str> = calls.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(
            tail,
            [
                "pair AA:BB:CC:DD:EE:FF",
                "trust AA:BB:CC:DD:EE:FF",
                "connect AA:BB:CC:DD:EE:FF"
            ]
        );
    }

    #[tokio::test]
    async fn empty_scan_ends_in_not_found_within_window() {
        let mut a = automaton(MockAdapter::new());
        let started = Instant::now();
        let err = a.run().await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err, PairingError::DeviceNotFound { scanned: 0 });
        assert_eq!(a.stage(), PairingStage::NotFound);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(50 + 500), "took {elapsed:?}");
        // No automatic rescan.
        assert_eq!(a.adapter().call_count("start_scan"), 1);
        assert_eq!(a.adapter().call_count("pair"), 0);
    }

    #[tokio::test]
    async fn non_matching_devices_end_in_not_found() {
        let adapter = MockAdapter::new()
            .with_discovered(vec![DeviceRecord::new("11:22:33:44:55:66", "Galaxy Buds", 0)]);
        let mut a = automaton(adapter);
        assert_eq!(
            a.run().await.unwrap_err(),
            PairingError::DeviceNotFound { scanned: 1 }
        );
        assert!(a.session().selected.is_none());
    }

    #[tokio::test]
    async fn first_discovered_controller_is_selected() {
        let adapter = MockAdapter::new().with_discovered(vec![
            DeviceRecord::new("22:22:22:22:22:22", "DualSense Wireless Controller", 3),
            DeviceRecord::new("33:33:33:33:33:33", "Wireless Controller", 1),
        ]);
        let mut a = automaton(adapter);
        let report = a.run().await.unwrap();
        assert_eq!(report.address, "33:33:33:33:33:33");
        assert_eq!(a.session().candidates[0].discovery_order, 1);
    }

    #[tokio::test]
    async fn single_connect_failure_is_retried_to_completion() {
        let adapter = controller_adapter().fail_times(
            MockOp::Connect,
            1,
            AdapterError::Rejected("br-connection-page-timeout".into()),
        );
        let mut a = automaton(adapter);
        let report = a.run().await.unwrap();
        assert_eq!(report.address, CONTROLLER);
        assert_eq!(a.stage(), PairingStage::Complete);
        assert_eq!(a.adapter().call_count("connect"), 2);
    }

    #[tokio::test]
    async fn connect_failing_past_budget_is_connection_failed() {
        let adapter = controller_adapter().fail_times(
            MockOp::Connect,
            10,
            AdapterError::Rejected("host is down".into()),
        );
        let mut a = automaton(adapter);
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, PairingError::ConnectionFailed { attempts: 3, .. }));
        assert_eq!(a.adapter().call_count("connect"), 3);
        assert_eq!(a.stage(), PairingStage::Failed);
        assert_eq!(a.session().pair_state, PairState::Failed);
    }

    #[tokio::test]
    async fn pair_failure_is_pairing_rejected() {
        let adapter = controller_adapter().fail_times(
            MockOp::Pair,
            10,
            AdapterError::Rejected("AuthenticationFailed".into()),
        );
        let mut a = automaton(adapter);
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, PairingError::PairingRejected { ref address, .. } if address == CONTROLLER));
        assert_eq!(a.adapter().call_count("trust"), 0);
    }

    #[tokio::test]
    async fn missing_adapter_is_adapter_unavailable() {
        let mut a = automaton(MockAdapter::new().without_adapter());
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, PairingError::AdapterUnavailable(_)));
        assert_eq!(
            a.history(),
            &[
                PairingStage::Idle,
                PairingStage::AdapterUnblockRequested,
                PairingStage::Failed
            ]
        );
        assert_eq!(a.adapter().calls(), vec!["unblock"]);
    }

    #[tokio::test]
    async fn hung_power_on_is_adapter_power_failure() {
        let mut a = automaton(controller_adapter().hanging(MockOp::PowerOn));
        let started = Instant::now();
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, PairingError::AdapterPowerFailure(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(a.session().adapter_state, AdapterState::Down);
    }

    #[tokio::test]
    async fn agent_failure_is_agent_registration_failed() {
        let adapter = controller_adapter().fail_times(
            MockOp::RegisterAgent,
            1,
            AdapterError::CommandFailed {
                command: "bluetoothctl default-agent".into(),
                detail: "No agent is registered".into(),
            },
        );
        let mut a = automaton(adapter);
        assert!(matches!(
            a.run().await.unwrap_err(),
            PairingError::AgentRegistrationFailed(_)
        ));
        assert_eq!(a.adapter().call_count("start_scan"), 0);
    }

    #[tokio::test]
    async fn cancellation_cuts_the_scan_short() {
        let mut a = PairingAutomaton::new(
            controller_adapter(),
            DeviceMatcher::controllers(),
            PairingConfig {
                scan_window: Duration::from_secs(30),
                ..fast_config()
            },
        );
        a.cancel_handle().notify_one();

        let started = Instant::now();
        assert_eq!(a.run().await.unwrap_err(), PairingError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(a.adapter().calls().contains(&"stop_scan".to_string()));
        assert_eq!(a.stage(), PairingStage::Failed);
    }

    #[test]
    fn terminal_stages() {
        assert!(PairingStage::Complete.is_terminal());
        assert!(PairingStage::NotFound.is_terminal());
        assert!(PairingStage::Failed.is_terminal());
        assert!(!PairingStage::Scanning.is_terminal());
    }
}
