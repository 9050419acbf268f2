//! Topology-aware admission building blocks.
//!
//! Resource managers report NUMA placement hints per resource; the
//! single-NUMA-node policy filters and intersects them to decide whether a
//! pod can be admitted onto one NUMA node. Everything here is pure and
//! deterministic.

pub mod bitmask;
pub mod single_numa;

pub use bitmask::{BitMask, BitMaskError, MAX_NUMA_NODES};
pub use single_numa::{filter_single_numa_hints, NumaTopologyHint, SingleNumaNodePolicy};
