//! Hardware onboarding
//!
//! Walks a user from picking a device to a signed proof of account control.
//! `steps` derives the step list, `resolver` holds the device-facing
//! collaborators and `sequencer` drives the transitions.

pub mod resolver;
pub mod sequencer;
pub mod steps;

pub use resolver::{
    AccountResolver, HardwareConnector, KeystoneAccountResolver, LedgerProbeResolver, Resolution, ResolveContext,
};
pub use sequencer::{
    CompletedFlow, CompletionHandler, FlowEvent, OnboardingSequencer, Outcome, SignPrompt, StepTicket,
};
pub use steps::{compute_steps, FlowSpec, FlowState, ResolveFlow, SignMessage, Step};
