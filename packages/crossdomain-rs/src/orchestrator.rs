//! End-to-end transfer flows
//!
//! [`BridgeOrchestrator`] strings the reporter, executor and poller together:
//!
//! ```text
//! deposit:   snapshot -> submit -> RELAYED -> snapshot
//! withdraw:  snapshot -> submit -> IN_CHALLENGE_PERIOD -> READY_FOR_RELAY
//!            -> snapshot -> finalize (once) -> RELAYED -> snapshot
//! ```
//!
//! Every stage transition is written to the checkpoint store (when one is
//! configured) so [`BridgeOrchestrator::resume`] can pick the flow up after
//! a restart. Failures carry the last known state for the caller to report.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{B256, U256};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::balance::BalanceReporter;
use crate::cancel::CancelSignal;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::BridgeError;
use crate::executor::{TransferExecutor, DEFAULT_INCLUSION_TIMEOUT};
use crate::poller::{PollConfig, StatusPoller};
use crate::traits::{BridgeMessenger, ChainSigner};
use crate::types::{
    Asset, BalanceSnapshot, Direction, MessageStatus, TransferHandle, TransferRequest,
    TransferStage,
};

/// Timing knobs for a flow
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    pub poll: PollConfig,
    pub inclusion_timeout: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            inclusion_timeout: DEFAULT_INCLUSION_TIMEOUT,
        }
    }
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub handle: TransferHandle,
    pub stage: TransferStage,
    pub final_status: MessageStatus,
    pub before: BalanceSnapshot,
    pub after: BalanceSnapshot,
}

/// Whatever was known when a flow stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastKnownState {
    pub handle: Option<TransferHandle>,
    /// Transaction broadcast but not seen included before the flow stopped
    pub pending_tx: Option<B256>,
    pub stage: Option<TransferStage>,
    pub status: Option<MessageStatus>,
    pub balances: Option<BalanceSnapshot>,
}

impl fmt::Display for LastKnownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.handle, self.pending_tx) {
            (Some(handle), Some(tx)) => {
                writeln!(f, "transfer: {}", handle)?;
                writeln!(f, "pending:  tx {} broadcast, inclusion unknown", tx)?;
            }
            (Some(handle), None) => writeln!(f, "transfer: {}", handle)?,
            (None, Some(tx)) => writeln!(f, "transfer: broadcast in tx {}, inclusion unknown", tx)?,
            (None, None) => writeln!(f, "transfer: not submitted")?,
        }
        if let Some(stage) = self.stage {
            writeln!(f, "stage:    {}", stage)?;
        }
        match self.status {
            Some(status) => writeln!(f, "status:   {}", status)?,
            None => writeln!(f, "status:   unknown")?,
        }
        match &self.balances {
            Some(balances) => write!(f, "balances: {}", balances),
            None => write!(f, "balances: unknown"),
        }
    }
}

/// A flow that stopped before reaching `RELAYED`
#[derive(Debug, Error)]
#[error("{error}")]
pub struct FlowFailure {
    pub error: BridgeError,
    pub last_known: LastKnownState,
}

impl FlowFailure {
    /// Whether calling `resume` with the saved checkpoint may finish the flow
    ///
    /// A finalization that timed out before inclusion is resumable too: the
    /// portal is asked before finalizing again.
    pub fn is_resumable(&self) -> bool {
        self.last_known.handle.is_some()
            && (self.error.is_resumable()
                || matches!(self.error, BridgeError::InclusionTimeout { .. }))
    }
}

#[derive(Default)]
struct FlowState {
    handle: Option<TransferHandle>,
    pending_tx: Option<B256>,
    stage: Option<TransferStage>,
    status: Option<MessageStatus>,
    before: Option<BalanceSnapshot>,
    balances: Option<BalanceSnapshot>,
}

impl FlowState {
    fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            balances: checkpoint.before.clone(),
            before: checkpoint.before,
            handle: Some(checkpoint.handle),
            pending_tx: None,
            stage: Some(checkpoint.stage),
            status: checkpoint.last_status,
        }
    }

    fn into_last_known(self) -> LastKnownState {
        LastKnownState {
            handle: self.handle,
            pending_tx: self.pending_tx,
            stage: self.stage,
            status: self.status,
            balances: self.balances,
        }
    }

    fn handle(&self) -> Result<&TransferHandle, BridgeError> {
        self.handle
            .as_ref()
            .ok_or_else(|| BridgeError::InvalidRequest("no transfer in progress".to_string()))
    }

    fn stage(&self) -> TransferStage {
        self.stage.unwrap_or(TransferStage::Submitted)
    }

    /// Keep the hash of a transaction that was broadcast but timed out
    fn note_pending<T>(&mut self, result: Result<T, BridgeError>) -> Result<T, BridgeError> {
        if let Err(BridgeError::InclusionTimeout {
            tx_hash: Some(tx_hash),
            ..
        }) = &result
        {
            self.pending_tx = Some(*tx_hash);
        }
        result
    }
}

/// Runs deposit and withdrawal flows for one account
pub struct BridgeOrchestrator<S: ChainSigner, M: BridgeMessenger> {
    l1: Arc<S>,
    l2: Arc<S>,
    executor: TransferExecutor<M>,
    poller: StatusPoller<M>,
    reporter: BalanceReporter,
    poll: PollConfig,
    checkpoints: Option<CheckpointStore>,
}

impl<S: ChainSigner, M: BridgeMessenger> BridgeOrchestrator<S, M> {
    pub fn new(l1: Arc<S>, l2: Arc<S>, messenger: Arc<M>, settings: FlowSettings) -> Self {
        Self {
            l1,
            l2,
            executor: TransferExecutor::new(messenger.clone())
                .with_inclusion_timeout(settings.inclusion_timeout),
            poller: StatusPoller::new(messenger),
            reporter: BalanceReporter::new(settings.poll.retry.clone()),
            poll: settings.poll,
            checkpoints: None,
        }
    }

    /// Persist progress to `store`
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn reporter(&self) -> &BalanceReporter {
        &self.reporter
    }

    /// Balances of `asset` on both chains
    pub async fn balances(&self, asset: Asset) -> Result<BalanceSnapshot, BridgeError> {
        self.reporter
            .snapshot(self.l1.as_ref(), self.l2.as_ref(), asset)
            .await
    }

    /// One-shot status query
    pub async fn status(&self, handle: &TransferHandle) -> Result<MessageStatus, BridgeError> {
        self.poller.status(handle, &self.poll.retry).await
    }

    /// Deposit `amount` of `asset` from L1 to L2 and wait until relayed
    pub async fn deposit(
        &self,
        asset: Asset,
        amount: U256,
        cancel: &CancelSignal,
    ) -> Result<TransferReport, FlowFailure> {
        let mut state = FlowState::default();
        let result = self
            .start(&mut state, Direction::Deposit, asset, amount, cancel)
            .await;
        self.conclude(result, state)
    }

    /// Withdraw `amount` of `asset` from L2 to L1, finalize, and wait until relayed
    pub async fn withdraw(
        &self,
        asset: Asset,
        amount: U256,
        cancel: &CancelSignal,
    ) -> Result<TransferReport, FlowFailure> {
        let mut state = FlowState::default();
        let result = self
            .start(&mut state, Direction::Withdraw, asset, amount, cancel)
            .await;
        self.conclude(result, state)
    }

    /// Continue a flow from a checkpoint
    pub async fn resume(
        &self,
        checkpoint: Checkpoint,
        cancel: &CancelSignal,
    ) -> Result<TransferReport, FlowFailure> {
        info!(
            direction = %checkpoint.handle.direction,
            stage = %checkpoint.stage,
            last_status = ?checkpoint.last_status,
            tx_hash = %checkpoint.handle.tx_hash,
            "Resuming transfer"
        );
        let mut state = FlowState::from_checkpoint(checkpoint);
        let result = self.drive(&mut state, cancel).await;
        self.conclude(result, state)
    }

    fn conclude(
        &self,
        result: Result<TransferReport, BridgeError>,
        state: FlowState,
    ) -> Result<TransferReport, FlowFailure> {
        match result {
            Ok(report) => Ok(report),
            Err(error) => {
                let last_known = state.into_last_known();
                error!(
                    error = %error,
                    kind = error.kind(),
                    stage = ?last_known.stage,
                    status = ?last_known.status,
                    tx_hash = ?last_known.handle.as_ref().map(|h| h.tx_hash),
                    pending_tx = ?last_known.pending_tx,
                    "Transfer flow stopped"
                );
                Err(FlowFailure { error, last_known })
            }
        }
    }

    async fn start(
        &self,
        state: &mut FlowState,
        direction: Direction,
        asset: Asset,
        amount: U256,
        cancel: &CancelSignal,
    ) -> Result<TransferReport, BridgeError> {
        let request =
            TransferRequest::between(direction, asset, amount, self.l1.as_ref(), self.l2.as_ref())?;

        let before = self.balances(asset).await?;
        info!(%before, "Balances before {}", direction);
        state.before = Some(before.clone());
        state.balances = Some(before);

        let submitted = match direction {
            Direction::Deposit => self.executor.submit_deposit(&request).await,
            Direction::Withdraw => self.executor.submit_withdrawal(&request).await,
        };
        let handle = state.note_pending(submitted)?;
        state.handle = Some(handle);
        state.stage = Some(TransferStage::Submitted);
        self.save_checkpoint(state)?;

        self.drive(state, cancel).await
    }

    /// Move the handle from its current stage to `RELAYED`
    async fn drive(
        &self,
        state: &mut FlowState,
        cancel: &CancelSignal,
    ) -> Result<TransferReport, BridgeError> {
        let direction = state.handle()?.direction;

        if direction == Direction::Withdraw {
            if state.stage() < TransferStage::InChallengePeriod {
                self.wait(state, MessageStatus::InChallengePeriod, cancel)
                    .await?;
            }
            if state.stage() < TransferStage::ReadyForRelay {
                self.wait(state, MessageStatus::ReadyForRelay, cancel).await?;
            }
            if state.stage() == TransferStage::ReadyForRelay {
                let snapshot = self.balances(state.handle()?.asset).await?;
                info!(%snapshot, "Balances before finalization");
                state.balances = Some(snapshot);
                self.enter_stage(state, TransferStage::Finalizing)?;
                self.finalize(state).await?;
            } else if state.stage() == TransferStage::Finalizing
                && state.handle()?.finalization_tx.is_none()
            {
                self.refinalize(state, cancel).await?;
            }
        }

        if !state.stage().is_terminal() {
            self.wait(state, MessageStatus::Relayed, cancel).await?;
        }

        let handle = state.handle()?.clone();
        let after = self.balances(handle.asset).await?;
        info!(%after, "Balances after {}", direction);
        state.balances = Some(after.clone());

        if let Some(store) = &self.checkpoints {
            store.clear()?;
        }

        let before = match state.before.clone() {
            Some(before) => before,
            None => after.clone(),
        };
        Ok(TransferReport {
            handle,
            stage: state.stage(),
            final_status: state.status.unwrap_or(MessageStatus::Relayed),
            before,
            after,
        })
    }

    /// Finalize after a restart in `FINALIZING` with no recorded transaction
    ///
    /// The earlier attempt may or may not have landed, so the portal is asked
    /// first and the withdrawal is only finalized while still ready.
    async fn refinalize(
        &self,
        state: &mut FlowState,
        cancel: &CancelSignal,
    ) -> Result<(), BridgeError> {
        let status = self.status(state.handle()?).await?;
        self.observe(state, status)?;
        match status {
            MessageStatus::Relayed => {
                info!("Withdrawal already finalized");
                Ok(())
            }
            MessageStatus::ReadyForRelay => self.finalize(state).await,
            other => {
                warn!(status = %other, "Withdrawal not ready after restart, waiting");
                self.wait(state, MessageStatus::ReadyForRelay, cancel).await?;
                if state.stage().is_terminal() {
                    return Ok(());
                }
                self.finalize(state).await
            }
        }
    }

    async fn finalize(&self, state: &mut FlowState) -> Result<(), BridgeError> {
        let finalized = self.executor.finalize(state.handle()?).await;
        let finalized = state.note_pending(finalized)?;
        info!(
            finalization_tx = ?finalized.finalization_tx,
            "Finalization submitted"
        );
        state.handle = Some(finalized);
        self.save_checkpoint(state)
    }

    async fn wait(
        &self,
        state: &mut FlowState,
        target: MessageStatus,
        cancel: &CancelSignal,
    ) -> Result<(), BridgeError> {
        let result = self
            .poller
            .await_status(state.handle()?, target, &self.poll, cancel)
            .await;
        match result {
            Ok(status) => self.observe(state, status),
            Err(e) => {
                if let BridgeError::Timeout { last: Some(last), .. }
                | BridgeError::Cancelled { last: Some(last), .. } = &e
                {
                    state.status = Some(*last);
                }
                Err(e)
            }
        }
    }

    /// Record an observed status and advance the stage accordingly
    fn observe(&self, state: &mut FlowState, status: MessageStatus) -> Result<(), BridgeError> {
        let direction = state.handle()?.direction;
        state.status = Some(status);
        let stage = state.stage().advance(direction, status);
        if Some(stage) != state.stage {
            self.enter_stage(state, stage)?;
        }
        Ok(())
    }

    fn enter_stage(&self, state: &mut FlowState, stage: TransferStage) -> Result<(), BridgeError> {
        info!(
            from = %state.stage(),
            to = %stage,
            status = ?state.status,
            "Transfer stage"
        );
        state.stage = Some(stage);
        self.save_checkpoint(state)
    }

    fn save_checkpoint(&self, state: &FlowState) -> Result<(), BridgeError> {
        let Some(store) = &self.checkpoints else {
            return Ok(());
        };
        let checkpoint = Checkpoint::new(
            state.handle()?.clone(),
            state.stage(),
            state.status,
            state.before.clone(),
        );
        store.save(&checkpoint)
    }
}
