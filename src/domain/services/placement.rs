//! Placement Service
//!
//! Pure domain logic deciding which adapters should hold which bindings.
//! This service has NO I/O - it turns a desired binding list and the state
//! reported by adapters into a list of create and delete operations.

use crate::domain::entities::Binding;
use crate::domain::value_objects::State;
use fnv::FnvHasher;
use std::collections::BTreeSet;
use std::hash::Hasher;

/// Number of adapters that concurrently hold each binding.
pub const REPLICATION_FACTOR: usize = 2;

/// Operations produced by one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// `(adapter, binding)` pairs to create
    pub creates: Vec<(String, Binding)>,
    /// `(adapter, binding)` pairs to delete
    pub deletes: Vec<(String, Binding)>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.deletes.is_empty()
    }
}

/// Placement service for distributing bindings over adapters.
///
/// The algorithm:
/// 1. Count how many reporting adapters already hold each desired binding
/// 2. Top up to `REPLICATION_FACTOR` using adapters picked by a stable
///    rotation of the sorted address list
/// 3. Delete every reported binding that is no longer desired
///
/// Adapters missing from `actual` are treated as unknown: nothing is placed
/// on them and nothing is deleted from them.
pub struct Placement;

impl Placement {
    /// Compute the operations for one term.
    ///
    /// # Arguments
    /// * `desired` - Bindings that should exist (duplicates are ignored)
    /// * `actual` - State reported by the adapters that answered
    /// * `adapters` - Every configured adapter address
    pub fn plan(desired: &[Binding], actual: &State, adapters: &[String]) -> Plan {
        let mut sorted: Vec<&String> = adapters.iter().collect();
        sorted.sort();
        sorted.dedup();

        let desired: BTreeSet<&Binding> = desired.iter().collect();
        let mut plan = Plan::default();

        for (addr, held) in actual {
            for binding in held {
                if !desired.contains(binding) {
                    plan.deletes.push((addr.clone(), binding.clone()));
                }
            }
        }

        if sorted.is_empty() {
            return plan;
        }

        for binding in desired {
            let placed = actual.values().filter(|held| held.contains(binding)).count();
            if placed >= REPLICATION_FACTOR {
                continue;
            }
            let mut needed = REPLICATION_FACTOR - placed;

            let offset = (Self::stable_hash(binding) % sorted.len() as u64) as usize;
            for i in 0..sorted.len() {
                if needed == 0 {
                    break;
                }
                let addr = sorted[(offset + i) % sorted.len()];
                match actual.get(addr) {
                    Some(held) if !held.contains(binding) => {
                        plan.creates.push((addr.clone(), binding.clone()));
                        needed -= 1;
                    }
                    // holds it already, or did not report
                    _ => {}
                }
            }
        }

        plan
    }

    /// FNV-1a over the binding triple; independent of process and platform.
    pub fn stable_hash(binding: &Binding) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write(binding.app_id.as_bytes());
        hasher.write(&[0]);
        hasher.write(binding.hostname.as_bytes());
        hasher.write(&[0]);
        hasher.write(binding.drain.as_bytes());
        hasher.finish()
    }

    /// Apply a plan to a state. Used to reason about the outcome of a term.
    pub fn apply(state: &State, plan: &Plan) -> State {
        let mut next = state.clone();
        for (addr, binding) in &plan.deletes {
            if let Some(held) = next.get_mut(addr) {
                held.remove(binding);
            }
        }
        for (addr, binding) in &plan.creates {
            next.entry(addr.clone()).or_default().insert(binding.clone());
        }
        next
    }
}
