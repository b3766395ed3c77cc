//! Firelens Cloud resource graph
//!
//! This crate provides the declarative resource model used by firelens:
//! components declare resources into a [`Stack`], cross-resource values are
//! intrinsic tokens, and the stack is synthesized into a CloudFormation
//! template. Nothing here talks to a cloud API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  firelens CLI                    │
//! │            (synth / plan / validate)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               firelens-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Construct Abstraction            │   │
//! │  │  trait Construct { fn build(scope) }      │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌─────────┐ │
//! │  │ Stack/Tokens │ │   Template   │ │  State  │ │
//! │  └──────────────┘ └──────────────┘ └─────────┘ │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │ firelens-cloud │
//!           │      -aws      │
//!           └────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod resource;
pub mod stack;
pub mod state;
pub mod template;
pub mod token;

// Re-exports
pub use action::{Action, ActionType, Plan, PlanSummary};
pub use error::{CloudError, Result};
pub use resource::{RemovalPolicy, Resource, ResourceRef};
pub use stack::{Construct, Output, Parameter, Scope, Stack};
pub use state::{GlobalState, ResourceState, StackState, StateLock, StateManager};
pub use template::{PATH_METADATA_KEY, Template, TemplateFormat, TemplateResource};
