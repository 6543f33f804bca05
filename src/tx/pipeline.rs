//! Submission pipeline: assemble, guard fee, broadcast, then observe status

use super::assembler::TransactionAssembler;
use super::call::CallDescriptor;
use super::fee::{FeeGuard, FeeReport, GuardedEnvelope};
use crate::account::CredentialProvider;
use crate::chain::{BlockId, ChainClient, ExecutionStatus, FinalityStatus, TransactionStatus};
use crate::config::SubmissionConfig;
use crate::error::{ChainError, SubmitError, SubmitResult};

use chrono::{DateTime, Utc};
use starknet_types_core::felt::Felt;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Stages of one submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Building,
    Assembled,
    FeeChecked,
    Broadcast,
    Polling,
    Resolved,
}

impl SubmissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStage::Building => "building",
            SubmissionStage::Assembled => "assembled",
            SubmissionStage::FeeChecked => "fee_checked",
            SubmissionStage::Broadcast => "broadcast",
            SubmissionStage::Polling => "polling",
            SubmissionStage::Resolved => "resolved",
        }
    }
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is known about a broadcast transaction
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Observed(TransactionStatus),
    /// The transaction was sent but its status could not be read
    Unknown(UnknownStatus),
}

/// Why the status of a sent transaction is unknown
#[derive(Debug, Clone, PartialEq)]
pub enum UnknownStatus {
    /// Every status query failed; holds the last failure
    QueryFailed(SubmitError),
    /// Shutdown interrupted the wait before any status was observed
    Cancelled,
}

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownStatus::QueryFailed(e) => write!(f, "{}", e),
            UnknownStatus::Cancelled => f.write_str("cancelled before status check"),
        }
    }
}

/// Outcome of a broadcast submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub attempt_id: Uuid,
    pub transaction_hash: Felt,
    pub fee: FeeReport,
    pub status: StatusReport,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionResult {
    pub fn finality_status(&self) -> Option<FinalityStatus> {
        match &self.status {
            StatusReport::Observed(status) => Some(status.finality_status),
            StatusReport::Unknown(_) => None,
        }
    }

    pub fn execution_status(&self) -> Option<ExecutionStatus> {
        match &self.status {
            StatusReport::Observed(status) => status.execution_status,
            StatusReport::Unknown(_) => None,
        }
    }

    pub fn is_status_known(&self) -> bool {
        matches!(self.status, StatusReport::Observed(_))
    }
}

/// Timing and fee parameters of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fee cap envelopes are first assembled with
    pub default_max_fee: u128,
    /// Wait between broadcast and the first status check
    pub settle_delay: Duration,
    /// Bound on a single status query
    pub status_timeout: Duration,
    /// Number of status checks; 1 means a single check after settling
    pub status_poll_attempts: u32,
    /// Wait between status checks when polling more than once
    pub status_poll_interval: Duration,
    /// Block context for nonce lookup and fee estimation
    pub block: BlockId,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_max_fee: 100_000_000_000_000,
            settle_delay: Duration::from_secs(3),
            status_timeout: Duration::from_secs(10),
            status_poll_attempts: 1,
            status_poll_interval: Duration::from_secs(2),
            block: BlockId::Latest,
        }
    }
}

impl From<&SubmissionConfig> for PipelineConfig {
    fn from(config: &SubmissionConfig) -> Self {
        Self {
            default_max_fee: config.default_max_fee,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            status_timeout: Duration::from_millis(config.status_timeout_ms),
            status_poll_attempts: config.status_poll_attempts,
            status_poll_interval: Duration::from_millis(config.status_poll_interval_ms),
            block: config.block,
        }
    }
}

/// Drives one account's invoke transactions from call to status.
///
/// Each attempt is sequential. Nothing is retried: a failure before broadcast
/// aborts with no partial result, and a status failure after broadcast is
/// reported as [`StatusReport::Unknown`] next to the transaction hash.
pub struct SubmissionPipeline {
    client: Arc<dyn ChainClient>,
    assembler: TransactionAssembler,
    fee_guard: FeeGuard,
    config: PipelineConfig,
    /// Flips to `true` on shutdown; interrupts the settle and poll waits
    cancel: Option<watch::Receiver<bool>>,
}

impl SubmissionPipeline {
    pub fn new(
        client: Arc<dyn ChainClient>,
        credentials: Arc<dyn CredentialProvider>,
        chain_id: Felt,
        config: PipelineConfig,
    ) -> Self {
        let assembler =
            TransactionAssembler::new(client.clone(), credentials, chain_id, config.block);
        let fee_guard = FeeGuard::new(client.clone(), config.block);

        Self {
            client,
            assembler,
            fee_guard,
            config,
            cancel: None,
        }
    }

    /// Attach a shutdown signal that cancels pending waits
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build the call from human-readable inputs and submit it
    pub async fn submit_invoke(
        &self,
        contract_address: &str,
        entry_point: &str,
        arguments: Vec<Felt>,
    ) -> SubmitResult<SubmissionResult> {
        debug!(stage = %SubmissionStage::Building, "Building call to {}", entry_point);
        let call = CallDescriptor::new(contract_address, entry_point, arguments).map_err(|e| {
            crate::metrics::record_stage_failure(&e);
            e
        })?;
        self.submit(&call).await
    }

    /// Submit a prepared call
    pub async fn submit(&self, call: &CallDescriptor) -> SubmitResult<SubmissionResult> {
        let attempt_id = Uuid::new_v4();
        let span = info_span!(
            "submission",
            attempt = %attempt_id,
            entry_point = call.entry_point()
        );
        let started = Instant::now();

        let result = self.run(attempt_id, call).instrument(span).await;

        crate::metrics::record_submission(&result, started.elapsed().as_secs_f64());
        result
    }

    /// Assemble and fee-check `call` without broadcasting
    pub async fn estimate(&self, call: &CallDescriptor) -> SubmitResult<FeeReport> {
        let guarded = self.prepare(call).await?;
        info!(
            "Dry run: estimated fee {}, cap {}",
            guarded.report.estimated_fee, guarded.report.final_cap
        );
        Ok(guarded.report)
    }

    async fn prepare(&self, call: &CallDescriptor) -> SubmitResult<GuardedEnvelope> {
        let envelope = self
            .assembler
            .assemble(call, self.config.default_max_fee)
            .await?;
        debug!(
            stage = %SubmissionStage::Assembled,
            "Assembled transaction {} with nonce {}",
            envelope.hash().to_hex_string(),
            envelope.nonce()
        );

        let guarded = self.fee_guard.guard(envelope, &self.assembler).await?;
        debug!(
            stage = %SubmissionStage::FeeChecked,
            "Fee checked: estimate {}, cap {}",
            guarded.report.estimated_fee, guarded.report.final_cap
        );

        Ok(guarded)
    }

    async fn run(&self, attempt_id: Uuid, call: &CallDescriptor) -> SubmitResult<SubmissionResult> {
        let GuardedEnvelope { envelope, report } = self.prepare(call).await.map_err(|e| {
            crate::metrics::record_stage_failure(&e);
            e
        })?;

        let transaction_hash = self.client.broadcast(&envelope).await.map_err(|e| {
            let err = SubmitError::BroadcastFailed(e);
            crate::metrics::record_stage_failure(&err);
            err
        })?;
        let submitted_at = Utc::now();

        info!(
            stage = %SubmissionStage::Broadcast,
            "Transaction sent: {} (max fee {})",
            transaction_hash.to_hex_string(),
            report.final_cap
        );

        let status = if self.wait(self.config.settle_delay).await {
            debug!(stage = %SubmissionStage::Polling, "Checking transaction status");
            self.poll_status(transaction_hash).await
        } else {
            StatusReport::Unknown(UnknownStatus::Cancelled)
        };

        match &status {
            StatusReport::Observed(observed) => info!(
                stage = %SubmissionStage::Resolved,
                "Transaction {}: finality {}, execution {}",
                transaction_hash.to_hex_string(),
                observed.finality_status,
                observed
                    .execution_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "pending".to_string())
            ),
            StatusReport::Unknown(reason) => {
                crate::metrics::record_status_unknown();
                warn!(
                    stage = %SubmissionStage::Resolved,
                    "Transaction {} sent, status unknown: {}",
                    transaction_hash.to_hex_string(),
                    reason
                )
            }
        }

        Ok(SubmissionResult {
            attempt_id,
            transaction_hash,
            fee: report,
            status,
            submitted_at,
        })
    }

    /// Query the status of a transaction once, bounded by the status timeout
    pub async fn check_status(&self, transaction_hash: Felt) -> SubmitResult<TransactionStatus> {
        match timeout(self.config.status_timeout, self.client.get_status(transaction_hash)).await {
            Ok(result) => result.map_err(SubmitError::StatusQueryFailed),
            Err(_) => Err(SubmitError::StatusQueryFailed(ChainError::Timeout {
                operation: "starknet_getTransactionStatus".to_string(),
            })),
        }
    }

    /// Observe the status of a broadcast transaction.
    ///
    /// Checks up to `status_poll_attempts` times, stopping early on a terminal
    /// finality status. The last observed status wins over a later failure;
    /// with nothing observed the last query error is reported.
    pub async fn poll_status(&self, transaction_hash: Felt) -> StatusReport {
        let attempts = self.config.status_poll_attempts.max(1);
        let mut last_observed: Option<TransactionStatus> = None;
        let mut last_error: Option<SubmitError> = None;

        for attempt in 1..=attempts {
            match self.check_status(transaction_hash).await {
                Ok(status) => {
                    debug!(
                        "Status check {}/{}: {}",
                        attempt, attempts, status.finality_status
                    );
                    if status.is_terminal() {
                        return StatusReport::Observed(status);
                    }
                    last_observed = Some(status);
                }
                Err(e) => {
                    warn!("Status check {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }

            if attempt < attempts && !self.wait(self.config.status_poll_interval).await {
                debug!("Status polling cancelled after {} checks", attempt);
                break;
            }
        }

        match (last_observed, last_error) {
            (Some(status), _) => StatusReport::Observed(status),
            (None, Some(e)) => StatusReport::Unknown(UnknownStatus::QueryFailed(e)),
            (None, None) => StatusReport::Unknown(UnknownStatus::Cancelled),
        }
    }

    /// Sleep for `delay`; returns `false` if cancelled first
    async fn wait(&self, delay: Duration) -> bool {
        let Some(cancel) = &self.cancel else {
            tokio::time::sleep(delay).await;
            return true;
        };

        let mut cancel = cancel.clone();
        if *cancel.borrow() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            Ok(_) = cancel.wait_for(|cancelled| *cancelled) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, LocalKeystore, Signature, SignerError};
    use crate::chain::{FeeEstimate, MockChainClient};
    use crate::tx::hash::parse_chain_id;
    use crate::tx::TransactionEnvelope;
    use async_trait::async_trait;
    use mockall::Sequence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DEFAULT_CAP: u128 = 100_000_000_000_000;
    const CONTRACT: &str = "0x049D36570D4e46f48e99674bd3fcc84644DdD6b96F7C741B1562B82f9e004dC7";

    fn tx_hash() -> Felt {
        Felt::from_hex_unchecked(
            "0x7d2b6b4c8e1f0a9b3c5d7e9f1a2b3c4d5e6f708192a3b4c5d6e7f8091a2b3c4",
        )
    }

    fn keystore() -> Arc<LocalKeystore> {
        Arc::new(
            LocalKeystore::from_secret(
                Felt::from_hex_unchecked(
                    "0x3ee9e18edc71a6df30ac3aca2e0b02a198fbce19b7480a63a0d71cbd76652e0",
                ),
                0,
                Felt::from_hex_unchecked(
                    "0x0300001800000000300000180000000000030000000000003006001800006600",
                ),
            )
            .unwrap(),
        )
    }

    /// Keystore that counts signatures
    struct CountingSigner {
        inner: Arc<LocalKeystore>,
        signed: Arc<AtomicUsize>,
    }

    impl CredentialProvider for CountingSigner {
        fn account(&self) -> &Account {
            self.inner.account()
        }

        fn sign(&self, hash: &Felt) -> Result<Signature, SignerError> {
            self.signed.fetch_add(1, Ordering::SeqCst);
            self.inner.sign(hash)
        }
    }

    fn counting_pipeline(
        client: MockChainClient,
        config: PipelineConfig,
    ) -> (SubmissionPipeline, Arc<AtomicUsize>) {
        let signed = Arc::new(AtomicUsize::new(0));
        let signer = CountingSigner {
            inner: keystore(),
            signed: signed.clone(),
        };
        let pipeline = SubmissionPipeline::new(
            Arc::new(client),
            Arc::new(signer),
            parse_chain_id("SN_SEPOLIA").unwrap(),
            config,
        );
        (pipeline, signed)
    }

    /// Node whose status endpoint answers only after `status_delay`
    struct SlowStatusClient {
        status_delay: Duration,
    }

    #[async_trait]
    impl ChainClient for SlowStatusClient {
        async fn get_nonce(&self, _block: BlockId, _account: Felt) -> Result<Felt, ChainError> {
            Ok(Felt::from(8u64))
        }

        async fn estimate_fee(
            &self,
            _envelope: &TransactionEnvelope,
            _block: BlockId,
        ) -> Result<FeeEstimate, ChainError> {
            Ok(FeeEstimate::new(1_000))
        }

        async fn broadcast(&self, _envelope: &TransactionEnvelope) -> Result<Felt, ChainError> {
            Ok(tx_hash())
        }

        async fn get_status(&self, _hash: Felt) -> Result<TransactionStatus, ChainError> {
            tokio::time::sleep(self.status_delay).await;
            Ok(accepted())
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            settle_delay: Duration::from_millis(5),
            status_timeout: Duration::from_millis(200),
            status_poll_interval: Duration::from_millis(5),
            ..PipelineConfig::default()
        }
    }

    fn pipeline(client: MockChainClient, config: PipelineConfig) -> SubmissionPipeline {
        SubmissionPipeline::new(
            Arc::new(client),
            keystore(),
            parse_chain_id("SN_SEPOLIA").unwrap(),
            config,
        )
    }

    fn call() -> CallDescriptor {
        CallDescriptor::new(
            CONTRACT,
            "check_due_payments",
            vec![Felt::from(0xffff_ffffu64), Felt::ZERO],
        )
        .unwrap()
    }

    fn accepted() -> TransactionStatus {
        TransactionStatus {
            finality_status: FinalityStatus::AcceptedOnL2,
            execution_status: Some(ExecutionStatus::Succeeded),
        }
    }

    /// Mock with the happy-path nonce, estimate and broadcast. Estimated and
    /// broadcast envelopes are recorded.
    fn client_with(
        estimated_fee: u128,
        estimated: Arc<Mutex<Vec<TransactionEnvelope>>>,
        broadcast: Arc<Mutex<Vec<TransactionEnvelope>>>,
    ) -> MockChainClient {
        let mut client = MockChainClient::new();
        client
            .expect_get_nonce()
            .times(1)
            .returning(|_, _| Ok(Felt::from(8u64)));
        client
            .expect_estimate_fee()
            .times(1)
            .returning(move |envelope, _| {
                estimated.lock().unwrap().push(envelope.clone());
                Ok(FeeEstimate::new(estimated_fee))
            });
        client
            .expect_broadcast()
            .times(1)
            .returning(move |envelope| {
                broadcast.lock().unwrap().push(envelope.clone());
                Ok(tx_hash())
            });
        client
    }

    #[tokio::test]
    async fn test_estimate_within_cap_broadcasts_original_envelope() {
        let estimated = Arc::new(Mutex::new(Vec::new()));
        let broadcast = Arc::new(Mutex::new(Vec::new()));
        let mut client = client_with(50_000_000_000_000, estimated.clone(), broadcast.clone());
        client.expect_get_status().times(1).returning(|_| Ok(accepted()));

        let (pipeline, signed) = counting_pipeline(client, test_config());
        let result = pipeline.submit(&call()).await.unwrap();

        // Signed once at assembly, never re-signed
        assert_eq!(signed.load(Ordering::SeqCst), 1);
        let estimated = estimated.lock().unwrap();
        let broadcast = broadcast.lock().unwrap();
        assert_eq!(broadcast[0], estimated[0]);
        assert_eq!(broadcast[0].max_fee(), DEFAULT_CAP);
        assert!(!result.fee.corrected());
        assert_eq!(result.transaction_hash, tx_hash());
        assert_eq!(result.finality_status(), Some(FinalityStatus::AcceptedOnL2));
        assert_eq!(result.execution_status(), Some(ExecutionStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_estimate_above_cap_broadcasts_corrected_envelope() {
        let estimated = Arc::new(Mutex::new(Vec::new()));
        let broadcast = Arc::new(Mutex::new(Vec::new()));
        let mut client = client_with(150_000_000_000_000, estimated.clone(), broadcast.clone());
        client.expect_get_status().times(1).returning(|_| Ok(accepted()));

        let (pipeline, signed) = counting_pipeline(client, test_config());
        let result = pipeline.submit(&call()).await.unwrap();

        // Assembly plus exactly one re-signing
        assert_eq!(signed.load(Ordering::SeqCst), 2);
        let estimated = estimated.lock().unwrap();
        let broadcast = broadcast.lock().unwrap();
        // Estimated exactly once, on the original envelope
        assert_eq!(estimated.len(), 1);
        assert_eq!(estimated[0].max_fee(), DEFAULT_CAP);

        assert_eq!(broadcast[0].max_fee(), 180_000_000_000_000);
        assert_eq!(broadcast[0].nonce(), estimated[0].nonce());
        assert_ne!(broadcast[0].signature(), estimated[0].signature());
        assert_eq!(result.fee.estimated_fee, 150_000_000_000_000);
        assert_eq!(result.fee.final_cap, 180_000_000_000_000);
        assert!(result.fee.corrected());
    }

    #[tokio::test]
    async fn test_status_failure_reports_unknown_with_hash() {
        let mut client = client_with(
            50_000_000_000_000,
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(Mutex::new(Vec::new())),
        );
        client.expect_get_status().times(1).returning(|_| {
            Err(ChainError::Rpc {
                code: 29,
                message: "Transaction hash not found".into(),
                data: None,
            })
        });

        let result = pipeline(client, test_config()).submit(&call()).await.unwrap();

        assert_eq!(result.transaction_hash, tx_hash());
        assert!(!result.is_status_known());
        assert_eq!(result.finality_status(), None);
        match result.status {
            StatusReport::Unknown(UnknownStatus::QueryFailed(SubmitError::StatusQueryFailed(
                ChainError::Rpc { code, .. },
            ))) => assert_eq!(code, 29),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nonce_failure_stops_before_estimate_and_broadcast() {
        let mut client = MockChainClient::new();
        client
            .expect_get_nonce()
            .times(1)
            .returning(|_, _| Err(ChainError::Transport("connection refused".into())));
        client.expect_estimate_fee().never();
        client.expect_broadcast().never();
        client.expect_get_status().never();

        let err = pipeline(client, test_config()).submit(&call()).await.unwrap_err();
        assert!(matches!(err, SubmitError::NonceFetchFailed(_)));
        assert_eq!(err.stage(), SubmissionStage::Assembled);
    }

    #[tokio::test]
    async fn test_calldata_failure_prevents_broadcast() {
        let mut client = MockChainClient::new();
        client.expect_get_nonce().returning(|_, _| Ok(Felt::ONE));
        client.expect_estimate_fee().never();
        client.expect_broadcast().never();

        let credentials = Arc::new(
            LocalKeystore::from_secret(
                Felt::from_hex_unchecked("0x1234"),
                7,
                Felt::from_hex_unchecked("0x5d1fc1ef5ad0ad5ebbc2b5d1c7ed2e12"),
            )
            .unwrap(),
        );
        let pipeline = SubmissionPipeline::new(
            Arc::new(client),
            credentials,
            parse_chain_id("SN_SEPOLIA").unwrap(),
            test_config(),
        );

        let err = pipeline.submit(&call()).await.unwrap_err();
        assert!(matches!(err, SubmitError::CalldataEncodingFailed(_)));
    }

    #[tokio::test]
    async fn test_fee_estimation_failure_prevents_broadcast() {
        let mut client = MockChainClient::new();
        client.expect_get_nonce().returning(|_, _| Ok(Felt::ONE));
        client
            .expect_estimate_fee()
            .times(1)
            .returning(|_, _| Err(ChainError::Transport("timed out".into())));
        client.expect_broadcast().never();

        let err = pipeline(client, test_config()).submit(&call()).await.unwrap_err();
        assert!(matches!(err, SubmitError::FeeEstimationFailed(_)));
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_not_retried() {
        let mut client = MockChainClient::new();
        client.expect_get_nonce().times(1).returning(|_, _| Ok(Felt::ONE));
        client
            .expect_estimate_fee()
            .times(1)
            .returning(|_, _| Ok(FeeEstimate::new(1_000)));
        client.expect_broadcast().times(1).returning(|_| {
            Err(ChainError::Rpc {
                code: 52,
                message: "Invalid transaction nonce".into(),
                data: None,
            })
        });
        client.expect_get_status().never();

        let err = pipeline(client, test_config()).submit(&call()).await.unwrap_err();
        assert!(matches!(err, SubmitError::BroadcastFailed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_address_fails_before_any_rpc() {
        let mut client = MockChainClient::new();
        client.expect_get_nonce().never();
        client.expect_broadcast().never();

        let err = pipeline(client, test_config())
            .submit_invoke("not-an-address", "check_due_payments", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_never_broadcasts() {
        let mut client = MockChainClient::new();
        client.expect_get_nonce().returning(|_, _| Ok(Felt::ONE));
        client
            .expect_estimate_fee()
            .times(1)
            .returning(|_, _| Ok(FeeEstimate::new(120_000_000_000_000)));
        client.expect_broadcast().never();

        let report = pipeline(client, test_config()).estimate(&call()).await.unwrap();
        assert_eq!(report.final_cap, 144_000_000_000_000);
    }

    #[tokio::test]
    async fn test_polling_stops_on_terminal_status() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut client = MockChainClient::new();
        client.expect_get_status().returning(move |_| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n < 3 {
                Ok(TransactionStatus {
                    finality_status: FinalityStatus::Received,
                    execution_status: None,
                })
            } else {
                Ok(accepted())
            }
        });

        let config = PipelineConfig {
            status_poll_attempts: 5,
            ..test_config()
        };
        let report = pipeline(client, config).poll_status(tx_hash()).await;

        assert_eq!(report, StatusReport::Observed(accepted()));
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_polling_keeps_last_observed_status() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut client = MockChainClient::new();
        client.expect_get_status().times(2).returning(move |_| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Ok(TransactionStatus {
                    finality_status: FinalityStatus::Received,
                    execution_status: None,
                })
            } else {
                Err(ChainError::Transport("reset".into()))
            }
        });

        let config = PipelineConfig {
            status_poll_attempts: 2,
            ..test_config()
        };
        let report = pipeline(client, config).poll_status(tx_hash()).await;
        assert_eq!(
            report,
            StatusReport::Observed(TransactionStatus {
                finality_status: FinalityStatus::Received,
                execution_status: None,
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_settle_skips_status_check() {
        let mut client = client_with(
            1,
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(Mutex::new(Vec::new())),
        );
        client.expect_get_status().never();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let config = PipelineConfig {
            settle_delay: Duration::from_secs(3600),
            ..test_config()
        };
        let pipeline = pipeline(client, config).with_cancellation(cancel_rx);

        let call = call();
        let submit = pipeline.submit(&call);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_tx.send(true).unwrap();
        };
        let (result, _) = tokio::join!(submit, cancel);

        let result = result.unwrap();
        assert_eq!(result.transaction_hash, tx_hash());
        assert_eq!(result.status, StatusReport::Unknown(UnknownStatus::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_query_is_bounded_by_timeout() {
        let client = SlowStatusClient {
            status_delay: Duration::from_secs(3600),
        };
        let pipeline = SubmissionPipeline::new(
            Arc::new(client),
            keystore(),
            parse_chain_id("SN_SEPOLIA").unwrap(),
            test_config(),
        );

        let err = pipeline.check_status(tx_hash()).await.unwrap_err();
        assert!(matches!(err, SubmitError::StatusQueryFailed(ChainError::Timeout { .. })));
        assert!(err.transaction_sent());

        let result = pipeline.submit(&call()).await.unwrap();
        assert_eq!(result.transaction_hash, tx_hash());
        match result.status {
            StatusReport::Unknown(UnknownStatus::QueryFailed(SubmitError::StatusQueryFailed(
                ChainError::Timeout { operation },
            ))) => assert_eq!(operation, "starknet_getTransactionStatus"),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_node_calls_follow_stage_order() {
        let settle_delay = Duration::from_secs(3);
        let started = tokio::time::Instant::now();
        let signed = Arc::new(AtomicUsize::new(0));
        let mut seq = Sequence::new();
        let mut client = MockChainClient::new();

        let at_estimate = signed.clone();
        let at_broadcast = signed.clone();
        client
            .expect_get_nonce()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(Felt::from(8u64)));
        client
            .expect_estimate_fee()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, _| {
                assert_eq!(at_estimate.load(Ordering::SeqCst), 1);
                Ok(FeeEstimate::new(150_000_000_000_000))
            });
        client
            .expect_broadcast()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |envelope| {
                // Re-signed before broadcast, still within the settle window
                assert_eq!(at_broadcast.load(Ordering::SeqCst), 2);
                assert_eq!(envelope.max_fee(), 180_000_000_000_000);
                assert!(started.elapsed() < settle_delay);
                Ok(tx_hash())
            });
        client
            .expect_get_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                assert!(started.elapsed() >= settle_delay);
                Ok(accepted())
            });

        let signer = CountingSigner {
            inner: keystore(),
            signed: signed.clone(),
        };
        let config = PipelineConfig {
            settle_delay,
            ..test_config()
        };
        let pipeline = SubmissionPipeline::new(
            Arc::new(client),
            Arc::new(signer),
            parse_chain_id("SN_SEPOLIA").unwrap(),
            config,
        );

        let result = pipeline.submit(&call()).await.unwrap();
        assert_eq!(result.status, StatusReport::Observed(accepted()));
        assert_eq!(signed.load(Ordering::SeqCst), 2);
    }
}
