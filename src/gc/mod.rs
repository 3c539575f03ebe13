//! Garbage Collection Module
//!
//! Reconciles cache keys against the domain entities that own them.

mod collector;
mod owners;
mod rules;

pub use collector::{GarbageCollector, GcReport};
pub use owners::{EntityKind, EntityRepository, OwnerId, StaticRegistry};
pub use rules::{IdShape, KeyClass, OwnerRule, OwnerRules, DISPLAY_VARIANTS, STATUS_SUFFIXES};
