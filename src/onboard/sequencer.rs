//! Hardware onboarding state machine
//!
//! Events move the flow; the step list is recomputed from `FlowState` after
//! each one. Work that waits on a device (connect, scan, resolve, sign) is
//! tied to a `StepTicket`. Any step change cancels the ticket's token and bumps
//! the generation, so a result that arrives after the user moved on is dropped.

use super::resolver::{AccountResolver, HardwareConnector, Resolution, ResolveContext};
use super::steps::{compute_steps, FlowSpec, FlowState, ResolveFlow, Step};
use crate::core::domain::{HardwareType, SignedWalletDescriptor, Ur, WalletDescriptor};
use crate::core::errors::{KeyringError, KeyringResult};
use crate::hardware::keystone::registry::{CryptoKeypath, KeyDerivationCall};
use crate::hardware::keystone::AirgapInteraction;
use crate::hardware::ledger::LedgerTransport;
use crate::keyring::{KeystoneKeyring, LedgerKeyring, TransactionSigner};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handed to the completion callback once signing succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFlow {
    pub descriptor: SignedWalletDescriptor,
    pub hardware: HardwareType,
    /// The scanned export, for air-gapped onboarding.
    pub ur: Option<Ur>,
}

pub type CompletionHandler = Box<dyn FnOnce(CompletedFlow) + Send + Sync>;

pub enum FlowEvent {
    Welcome(HardwareType),
    TutorialDone,
    ConnectOk(Box<dyn LedgerTransport>),
    UrScanned(Ur),
    ConnectErr(KeyringError),
    ResolveOk(Resolution),
    ResolveErr(KeyringError),
    /// Search missed; go back and try again.
    ResolveRetry,
    SignOk { signature: String, xfp: Option<String> },
    SignErr(KeyringError),
    Back,
    SuccessDone,
}

impl FlowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEvent::Welcome(_) => "welcome",
            FlowEvent::TutorialDone => "tutorial-done",
            FlowEvent::ConnectOk(_) => "connect-ok",
            FlowEvent::UrScanned(_) => "ur-scanned",
            FlowEvent::ConnectErr(_) => "connect-err",
            FlowEvent::ResolveOk(_) => "resolve-ok",
            FlowEvent::ResolveErr(_) => "resolve-err",
            FlowEvent::ResolveRetry => "resolve-retry",
            FlowEvent::SignOk { .. } => "sign-ok",
            FlowEvent::SignErr(_) => "sign-err",
            FlowEvent::Back => "back",
            FlowEvent::SuccessDone => "success-done",
        }
    }
}

impl fmt::Debug for FlowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Moved { from: usize, to: usize },
    Stayed,
    /// Event does not apply to the current step.
    Ignored,
    /// Result belongs to a step the flow already left.
    Stale,
    Finished,
}

/// Identifies the step a piece of pending work was started for.
#[derive(Debug, Clone)]
pub struct StepTicket {
    generation: u64,
    token: CancellationToken,
}

impl StepTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// What the Sign step asks the device to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignPrompt {
    pub descriptor: WalletDescriptor,
    pub message: String,
    pub text: String,
}

pub struct OnboardingSequencer {
    spec: FlowSpec,
    state: FlowState,
    steps: Vec<Step>,
    step: usize,
    transport: Option<Box<dyn LedgerTransport>>,
    generation: u64,
    token: CancellationToken,
    on_complete: Option<CompletionHandler>,
    completed: bool,
    finished: bool,
    aborted: Option<String>,
    last_error: Option<String>,
}

impl OnboardingSequencer {
    pub fn new(spec: FlowSpec, on_complete: impl FnOnce(CompletedFlow) + Send + Sync + 'static) -> Self {
        let state = FlowState::default();
        let steps = compute_steps(&spec, &state);
        Self {
            spec,
            state,
            steps,
            step: 0,
            transport: None,
            generation: 0,
            token: CancellationToken::new(),
            on_complete: Some(Box::new(on_complete)),
            completed: false,
            finished: false,
            aborted: None,
            last_error: None,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.step)
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    /// Back navigation is offered between the first and the last step.
    pub fn can_go_back(&self) -> bool {
        self.step > 0 && self.step + 1 < self.steps.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transport(&self) -> Option<&dyn LedgerTransport> {
        self.transport.as_deref()
    }

    /// Hand the connected transport back to the caller.
    pub fn take_transport(&mut self) -> Option<Box<dyn LedgerTransport>> {
        self.transport.take()
    }

    /// Ticket for work started on the current step.
    pub fn ticket(&self) -> StepTicket {
        StepTicket {
            generation: self.generation,
            token: self.token.clone(),
        }
    }

    /// Ticket for work about to start. A token cancelled from outside is
    /// replaced so the step can be retried.
    fn begin_work(&mut self) -> StepTicket {
        if self.token.is_cancelled() && self.aborted.is_none() {
            debug!("Step {} was cancelled; starting over", self.step_name());
            self.restart_step();
        }
        self.ticket()
    }

    pub fn sign_prompt(&self) -> Option<SignPrompt> {
        let descriptor = self.state.resolved.clone()?;
        Some(SignPrompt {
            message: self.spec.sign_message.render(&descriptor.public_key),
            text: self.spec.sign_text.clone(),
            descriptor,
        })
    }

    /// Apply the result of work started under `ticket`, unless the flow has
    /// moved on since.
    pub fn dispatch_with(&mut self, ticket: &StepTicket, event: FlowEvent) -> KeyringResult<Outcome> {
        if ticket.generation != self.generation || ticket.token.is_cancelled() {
            debug!(
                "Dropping stale {} (generation {}, now {})",
                event.name(),
                ticket.generation,
                self.generation
            );
            return Ok(Outcome::Stale);
        }
        self.dispatch(event)
    }

    pub fn dispatch(&mut self, event: FlowEvent) -> KeyringResult<Outcome> {
        if let Some(reason) = &self.aborted {
            return Err(KeyringError::InternalConsistencyFault(reason.clone()));
        }
        if self.completed && matches!(event, FlowEvent::SignOk { .. }) {
            return Err(self.abort("flow already completed"));
        }

        let Some(step) = self.current_step().cloned() else {
            return Err(self.abort("step index past the end of the step list"));
        };

        match (step, event) {
            (Step::Welcome, FlowEvent::Welcome(hardware)) => {
                self.state.hardware = hardware;
                self.state.resolved = None;
                self.recompute();
                Ok(self.next_step())
            }
            (Step::KeystoneTutorial, FlowEvent::TutorialDone) => Ok(self.next_step()),
            (Step::LedgerSearching { .. }, FlowEvent::ConnectOk(transport)) => {
                info!("Ledger transport attached");
                self.transport = Some(transport);
                self.state.connect_failure = false;
                self.last_error = None;
                self.recompute();
                Ok(self.next_step())
            }
            (Step::KeystoneScan, FlowEvent::UrScanned(ur)) => {
                info!("Keystone payload scanned: {}", ur.ur_type);
                self.state.ur = Some(ur);
                self.state.connect_failure = false;
                self.last_error = None;
                self.recompute();
                Ok(self.next_step())
            }
            (Step::LedgerSearching { .. } | Step::KeystoneScan, FlowEvent::ConnectErr(err)) => self.fail_back(err),
            (Step::Resolve(_), FlowEvent::ResolveOk(resolution)) => match resolution.accounts.into_iter().next() {
                Some(descriptor) => {
                    info!(
                        "Resolved account {} at index {}",
                        descriptor.public_key, descriptor.account_index
                    );
                    self.state.resolved = Some(descriptor);
                    self.recompute();
                    Ok(self.next_step())
                }
                None => self.fail_back(KeyringError::ExchangeFailure("resolver returned no accounts".to_string())),
            },
            (Step::Resolve(_), FlowEvent::ResolveErr(err)) => self.fail_back(err),
            (Step::Resolve(_), FlowEvent::ResolveRetry) => {
                info!("No matching account; stepping back to retry");
                self.state.connect_failure = false;
                self.last_error = None;
                self.recompute();
                Ok(self.prev_step())
            }
            (Step::Sign(hardware), FlowEvent::SignOk { signature, xfp }) => self.complete(hardware, signature, xfp),
            (Step::Sign(_), FlowEvent::SignErr(err)) => {
                if !err.is_recoverable() {
                    return Err(self.abort(&err.to_string()));
                }
                warn!("Signing failed: {}", err);
                self.last_error = Some(err.to_string());
                self.restart_step();
                Ok(Outcome::Stayed)
            }
            (Step::Success, FlowEvent::SuccessDone) => {
                self.finished = true;
                Ok(Outcome::Finished)
            }
            (_, FlowEvent::Back) if self.can_go_back() => Ok(self.prev_step()),
            (step, event) => {
                debug!("Ignoring {} on step {}", event.name(), step);
                Ok(Outcome::Ignored)
            }
        }
    }

    fn complete(&mut self, hardware: HardwareType, signature: String, xfp: Option<String>) -> KeyringResult<Outcome> {
        let Some(descriptor) = self.state.resolved.clone() else {
            return Err(self.abort("sign step reached without a resolved account"));
        };
        let Some(on_complete) = self.on_complete.take() else {
            return Err(self.abort("completion handler already consumed"));
        };

        let flow = CompletedFlow {
            descriptor: descriptor.into_signed(signature, xfp),
            hardware,
            ur: match hardware {
                HardwareType::Keystone => self.state.ur.clone(),
                HardwareType::Ledger => None,
            },
        };
        info!(
            "Onboarding complete: {} account {}",
            hardware,
            flow.descriptor.public_key()
        );
        self.completed = true;
        on_complete(flow);

        if self.spec.with_success {
            Ok(self.next_step())
        } else {
            self.finished = true;
            self.restart_step();
            Ok(Outcome::Finished)
        }
    }

    /// Record a recoverable failure and step back so the user can retry.
    /// Only device round-trip failures raise `connect_failure`.
    fn fail_back(&mut self, err: KeyringError) -> KeyringResult<Outcome> {
        if !err.is_recoverable() {
            return Err(self.abort(&err.to_string()));
        }
        warn!("Step {} failed: {}", self.step_name(), err);
        self.state.connect_failure = err.is_retryable();
        self.last_error = Some(err.to_string());
        self.recompute();
        Ok(self.prev_step())
    }

    fn abort(&mut self, reason: &str) -> KeyringError {
        error!("Onboarding aborted: {}", reason);
        self.aborted = Some(reason.to_string());
        self.token.cancel();
        KeyringError::InternalConsistencyFault(reason.to_string())
    }

    fn step_name(&self) -> String {
        self.current_step().map(|s| s.to_string()).unwrap_or_default()
    }

    fn recompute(&mut self) {
        self.steps = compute_steps(&self.spec, &self.state);
    }

    fn restart_step(&mut self) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation += 1;
    }

    fn next_step(&mut self) -> Outcome {
        self.go_to(self.step + 1)
    }

    fn prev_step(&mut self) -> Outcome {
        self.go_to(self.step.saturating_sub(1))
    }

    fn go_to(&mut self, to: usize) -> Outcome {
        let from = self.step;
        let to = to.min(self.steps.len().saturating_sub(1));

        // Progress gathered at or after the target step is redone.
        match self.steps.get(to) {
            Some(Step::Welcome) | Some(Step::LedgerSearching { .. }) if to < from => {
                self.transport = None;
                self.state.resolved = None;
            }
            Some(Step::KeystoneTutorial) | Some(Step::KeystoneScan) | Some(Step::Resolve(_)) if to < from => {
                self.state.resolved = None;
            }
            _ => {}
        }
        let from_name = self.step_name();
        self.recompute();
        self.step = to;
        self.restart_step();
        info!("Onboarding step {} -> {}", from_name, self.step_name());
        Outcome::Moved { from, to }
    }

    // Drivers for the steps that wait on collaborators.

    /// Connect step for a Ledger.
    pub async fn run_connect(&mut self, connector: &dyn HardwareConnector) -> KeyringResult<Outcome> {
        if !matches!(self.current_step(), Some(Step::LedgerSearching { .. })) {
            return Ok(Outcome::Ignored);
        }
        let ticket = self.begin_work();
        let event = tokio::select! {
            result = connector.connect() => match result {
                Ok(transport) => FlowEvent::ConnectOk(transport),
                Err(err) => FlowEvent::ConnectErr(err),
            },
            _ = ticket.token.cancelled() => return Ok(Outcome::Stale),
        };
        self.dispatch_with(&ticket, event)
    }

    /// Connect step for a Keystone: ask for the Solana account export and
    /// read it back.
    pub async fn run_scan(&mut self, interaction: &dyn AirgapInteraction, origin: &str) -> KeyringResult<Outcome> {
        if !matches!(self.current_step(), Some(Step::KeystoneScan)) {
            return Ok(Outcome::Ignored);
        }
        let call = KeyDerivationCall {
            paths: vec![CryptoKeypath::parse("44'/501'", None)?],
            origin: Some(origin.to_string()),
        };
        let request = call.to_ur()?;
        let ticket = self.begin_work();
        let event = tokio::select! {
            result = interaction.exchange(request) => match result {
                Ok(ur) => FlowEvent::UrScanned(ur),
                Err(err) => FlowEvent::ConnectErr(err),
            },
            _ = ticket.token.cancelled() => return Ok(Outcome::Stale),
        };
        self.dispatch_with(&ticket, event)
    }

    pub async fn run_resolve(&mut self, resolver: &dyn AccountResolver) -> KeyringResult<Outcome> {
        let Some(Step::Resolve(flow)) = self.current_step().cloned() else {
            return Ok(Outcome::Ignored);
        };
        let missing = match self.state.hardware {
            HardwareType::Ledger => self.transport.is_none(),
            HardwareType::Keystone => self.state.ur.is_none(),
        };
        if missing {
            return Err(self.abort("resolve step reached without a connected device"));
        }

        let ticket = self.begin_work();
        let result = {
            let context = match (self.state.hardware, self.transport.as_deref(), self.state.ur.as_ref()) {
                (HardwareType::Ledger, Some(transport), _) => ResolveContext::Ledger { transport },
                (HardwareType::Keystone, _, Some(ur)) => ResolveContext::Keystone { ur },
                _ => return Err(KeyringError::InternalConsistencyFault("device context vanished".to_string())),
            };
            tokio::select! {
                result = resolver.resolve(&flow, context) => Some(result),
                _ = ticket.token.cancelled() => None,
            }
        };
        let event = match result {
            None => return Ok(Outcome::Stale),
            Some(Ok(resolution)) => FlowEvent::ResolveOk(resolution),
            Some(Err(KeyringError::AddressNotFound(address))) if matches!(flow, ResolveFlow::Search { .. }) => {
                debug!("Search found no account for {}", address);
                FlowEvent::ResolveRetry
            }
            Some(Err(err)) => FlowEvent::ResolveErr(err),
        };
        self.dispatch_with(&ticket, event)
    }

    /// Sign step with any signer that holds the resolved account.
    pub async fn run_sign(&mut self, signer: &dyn TransactionSigner, xfp: Option<String>) -> KeyringResult<Outcome> {
        if !matches!(self.current_step(), Some(Step::Sign(_))) {
            return Ok(Outcome::Ignored);
        }
        let Some(prompt) = self.sign_prompt() else {
            return Err(self.abort("sign step reached without a resolved account"));
        };
        let ticket = self.begin_work();
        let event = tokio::select! {
            result = signer.sign_message(prompt.message.as_bytes(), &prompt.descriptor.public_key) => match result {
                Ok(signature) => FlowEvent::SignOk { signature, xfp },
                Err(err) => FlowEvent::SignErr(err),
            },
            _ = ticket.token.cancelled() => return Ok(Outcome::Stale),
        };
        self.dispatch_with(&ticket, event)
    }

    /// Sign step for a Ledger, over the transport attached during Connect.
    pub async fn run_ledger_sign(&mut self) -> KeyringResult<Outcome> {
        if !matches!(self.current_step(), Some(Step::Sign(HardwareType::Ledger))) {
            return Ok(Outcome::Ignored);
        }
        let Some(prompt) = self.sign_prompt() else {
            return Err(self.abort("sign step reached without a resolved account"));
        };
        if self.transport.is_none() {
            return Err(self.abort("sign step reached without a Ledger transport"));
        }
        let keyring = LedgerKeyring::from_accounts(vec![prompt.descriptor.to_imported()])?;

        let ticket = self.begin_work();
        let result = match self.transport.as_deref() {
            Some(transport) => {
                let session = keyring.session(transport);
                tokio::select! {
                    result = session.sign_message(prompt.message.as_bytes(), &prompt.descriptor.public_key) => Some(result),
                    _ = ticket.token.cancelled() => None,
                }
            }
            None => return Err(KeyringError::InternalConsistencyFault("transport vanished".to_string())),
        };
        let event = match result {
            None => return Ok(Outcome::Stale),
            Some(Ok(signature)) => FlowEvent::SignOk { signature, xfp: None },
            Some(Err(err)) => FlowEvent::SignErr(err),
        };
        self.dispatch_with(&ticket, event)
    }

    /// Sign step for a Keystone; the keyring's master fingerprint is carried
    /// into the signed descriptor.
    pub async fn run_keystone_sign(&mut self, keyring: &KeystoneKeyring) -> KeyringResult<Outcome> {
        let xfp = keyring.xfp();
        self.run_sign(keyring, xfp).await
    }
}

impl fmt::Debug for OnboardingSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnboardingSequencer")
            .field("steps", &self.steps)
            .field("step", &self.step)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("completed", &self.completed)
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}
