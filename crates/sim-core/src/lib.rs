//! Cycle-accurate AVR instruction-set simulation with multi-node time synchronization.

/// Fault taxonomy for node halt reasons.
pub mod fault;
pub use fault::{FaultClass, FaultCode};

/// Instruction, operand and register catalog with the encoder.
pub mod isa;
pub use isa::{
    Encoding, Instruction, InstrProperties, Opcode, Operand, OperandError, OperandList, Register,
    RegisterSet, OPCODE_TABLE,
};

/// Decision-tree instruction decoder.
pub mod decoder;
pub use decoder::{DecodeError, Decoder};

/// Disassembly listings with diagnostics for undecodable words.
pub mod disasm;
pub use disasm::{disassemble_one, disassemble_range, disassemble_window, DisassemblyRow};

/// Node and synchronizer configuration.
pub mod config;
pub use config::{ConfigError, McuProfile, NodeConfig, SyncConfig};

/// Architectural state: registers, flags, memories, IO and interrupt lines.
pub mod state;
pub use state::{
    ActiveRegister, ErrorAction, ErrorReporter, Flags, InterruptLines, InterruptState,
    LoggingReporter, MemoryError, RwRegister, State,
};

/// Deterministic dynamic cycle-cost table and lookup helpers.
pub mod timing;
pub use timing::{cycle_cost, skip_cost, CycleCostKind, CYCLE_COST_TABLE};

/// Instruction semantics.
pub mod execute;
pub use execute::{execute_instruction, ExecuteOutcome, FlagsUpdate};

/// Instruction and memory instrumentation hooks.
pub mod probe;
pub use probe::{MemoryWatch, Probe};

/// Main clock, delta queue and derived clocks.
pub mod clock;
pub use clock::{DeltaQueue, DerivedClock, Event, MainClock, Prescaler};

/// Simulated nodes.
pub mod node;
pub use node::{Node, NodeId, RunOutcome, StepOutcome};

/// Multi-node synchronizers.
pub mod sync;
pub use sync::{Barrier, Ripple, Single, StepSync, SyncError, SyncState, Synchronizer};

#[cfg(test)]
use proptest as _;
