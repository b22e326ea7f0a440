//! Instrumentation hooks. The core invokes them and never interprets them.

use crate::isa::Instruction;
use crate::state::State;

/// Observes instruction execution on one node.
pub trait Probe: Send + Sync {
    /// Called after fetch, before `instruction` executes at `state.pc()`.
    fn before(&self, state: &State, instruction: &Instruction);

    /// Called after `instruction` has retired.
    fn after(&self, state: &State, instruction: &Instruction);
}

/// Observes data-space accesses at one address.
///
/// Every method defaults to doing nothing so watches implement only what they need.
pub trait MemoryWatch: Send + Sync {
    /// Before a read of `address`.
    fn before_read(&self, address: u16) {
        let _ = address;
    }

    /// After a read of `address` that yielded `value`.
    fn after_read(&self, address: u16, value: u8) {
        let _ = (address, value);
    }

    /// Before `value` is written to `address`.
    fn before_write(&self, address: u16, value: u8) {
        let _ = (address, value);
    }

    /// After `value` was written to `address`.
    fn after_write(&self, address: u16, value: u8) {
        let _ = (address, value);
    }
}
