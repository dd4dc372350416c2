//! Step list for hardware onboarding
//!
//! `compute_steps` is a pure function of the flow spec and the progress so
//! far. The sequencer calls it after every transition instead of editing the
//! list in place.

use crate::core::domain::{HardwareType, Ur, WalletDescriptor};
use std::fmt;
use std::sync::Arc;

/// How the account to onboard is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFlow {
    /// Pick an unused account index, no user input.
    Create,
    /// Take the next sequential index.
    Derive,
    /// Find one known public key on the device.
    Search { public_key: String },
    /// Let the user pick from the accounts the device exposes.
    Import,
}

impl ResolveFlow {
    pub fn name(&self) -> &'static str {
        match self {
            ResolveFlow::Create => "create",
            ResolveFlow::Derive => "derive",
            ResolveFlow::Search { .. } => "search",
            ResolveFlow::Import => "import",
        }
    }

    /// Air-gapped devices only expose what they exported, so they always import.
    pub fn effective_for(&self, hardware: HardwareType) -> ResolveFlow {
        match hardware {
            HardwareType::Keystone => ResolveFlow::Import,
            HardwareType::Ledger => self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Welcome,
    LedgerSearching { connect_failure: bool },
    KeystoneTutorial,
    KeystoneScan,
    Resolve(ResolveFlow),
    Sign(HardwareType),
    Success,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Welcome => "welcome",
            Step::LedgerSearching { .. } => "ledger-searching",
            Step::KeystoneTutorial => "keystone-tutorial",
            Step::KeystoneScan => "keystone-scan",
            Step::Resolve(_) => "resolve",
            Step::Sign(_) => "sign",
            Step::Success => "success",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Resolve(flow) => write!(f, "resolve({})", flow.name()),
            Step::Sign(hardware) => write!(f, "sign({})", hardware),
            other => f.write_str(other.name()),
        }
    }
}

/// Message signed to prove control of the onboarded account.
#[derive(Clone)]
pub enum SignMessage {
    Literal(String),
    Derived(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl SignMessage {
    pub fn derived(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        SignMessage::Derived(Arc::new(f))
    }

    pub fn render(&self, public_key: &str) -> String {
        match self {
            SignMessage::Literal(text) => text.clone(),
            SignMessage::Derived(f) => f(public_key),
        }
    }
}

impl fmt::Debug for SignMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignMessage::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            SignMessage::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// What the caller asked for. Fixed for the life of a flow.
#[derive(Debug, Clone)]
pub struct FlowSpec {
    pub action: ResolveFlow,
    pub sign_message: SignMessage,
    /// Prompt shown next to the signing request.
    pub sign_text: String,
    /// Whether a terminal success step follows signing.
    pub with_success: bool,
}

impl FlowSpec {
    pub fn new(action: ResolveFlow, sign_message: SignMessage) -> Self {
        Self {
            action,
            sign_message,
            sign_text: String::new(),
            with_success: false,
        }
    }

    pub fn with_sign_text(mut self, text: impl Into<String>) -> Self {
        self.sign_text = text.into();
        self
    }

    pub fn with_success(mut self) -> Self {
        self.with_success = true;
        self
    }
}

/// Progress that shapes the step list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowState {
    pub hardware: HardwareType,
    pub connect_failure: bool,
    pub ur: Option<Ur>,
    pub resolved: Option<WalletDescriptor>,
}

pub fn compute_steps(spec: &FlowSpec, state: &FlowState) -> Vec<Step> {
    let mut steps = vec![Step::Welcome];

    match state.hardware {
        HardwareType::Ledger => steps.push(Step::LedgerSearching {
            connect_failure: state.connect_failure,
        }),
        HardwareType::Keystone => {
            steps.push(Step::KeystoneTutorial);
            steps.push(Step::KeystoneScan);
        }
    }

    steps.push(Step::Resolve(spec.action.effective_for(state.hardware)));

    if state.resolved.is_some() {
        steps.push(Step::Sign(state.hardware));
    }
    if spec.with_success {
        steps.push(Step::Success);
    }
    steps
}
