//! Assigns object detection proposals to ground-truth targets, producing
//! proposal classification labels and bounding-box regression targets.

mod common;

pub mod assignment;
pub mod config;
pub mod proposal_target;
pub mod regression;
pub mod sampling;

pub use config::Config;
pub use proposal_target::{ProposalTarget, ProposalTargetInit, ProposalTargetOutput};
