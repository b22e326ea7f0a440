//! One simulated microcontroller: architectural state, main clock and probes.
//!
//! A node advances one instruction boundary per [`Node::step`]. At each
//! boundary it checks the host stop flag and the cycle limit, then accepts a
//! pending interrupt, idles while asleep, or fetches and executes the
//! instruction at the PC. Every cycle charged to the core is also advanced on
//! the main clock, so clock events fire at the right instruction boundary.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::MainClock;
use crate::config::{ConfigError, NodeConfig};
use crate::execute::{execute_instruction, ExecuteOutcome};
use crate::fault::FaultCode;
use crate::probe::Probe;
use crate::state::{InterruptState, MemoryError, State};
use crate::timing::{cycle_cost, CycleCostKind};

/// Identity of a node within a synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Result of one [`Node::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// An instruction retired.
    Retired {
        /// Cycles charged, including dynamic costs.
        cycles: u16,
    },
    /// An interrupt was accepted instead of executing an instruction.
    Interrupted {
        /// Interrupt number.
        vector: u8,
        /// Entry cycles, including wake-up from sleep.
        cycles: u16,
    },
    /// The core slept through `cycles` cycles.
    Slept {
        /// Idle cycles.
        cycles: u64,
    },
    /// The node is halted.
    Halted(FaultCode),
}

/// Aggregated outcome of [`Node::run_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Steps taken during the call.
    pub steps: u64,
    /// Last step outcome observed.
    pub final_step: StepOutcome,
}

/// A simulated microcontroller.
pub struct Node {
    id: NodeId,
    state: State,
    clock: MainClock,
    probes: Vec<Arc<dyn Probe>>,
    halted: Option<FaultCode>,
    cycle_limit: Option<u64>,
    cancel: Arc<AtomicBool>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("probes", &self.probes.len())
            .field("halted", &self.halted)
            .finish()
    }
}

impl Node {
    /// Node with erased flash and fresh state.
    ///
    /// # Errors
    ///
    /// Returns the violated limit if `config` does not validate.
    pub fn new(config: &NodeConfig) -> Result<Self, ConfigError> {
        let state = State::new(config)?;
        tracing::debug!(id = %config.id, profile = ?config.profile, "node created");
        Ok(Self {
            id: config.id,
            state,
            clock: MainClock::new(config.clock_hz),
            probes: Vec::new(),
            halted: None,
            cycle_limit: config.cycle_limit,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Copies a raw flash image to address 0.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ImageTooLarge`] if the image exceeds flash.
    pub fn load_program(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.state.load_program(image)
    }

    /// Node identity.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Architectural state.
    #[must_use]
    pub const fn state(&self) -> &State {
        &self.state
    }

    /// Mutable architectural state, for loading and device wiring.
    pub const fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Main clock.
    #[must_use]
    pub const fn clock(&self) -> &MainClock {
        &self.clock
    }

    /// Mutable main clock, for scheduling device events.
    pub const fn clock_mut(&mut self) -> &mut MainClock {
        &mut self.clock
    }

    /// Registers an instruction probe.
    pub fn add_probe(&mut self, probe: Arc<dyn Probe>) {
        self.probes.push(probe);
    }

    /// Halt reason, if halted.
    #[must_use]
    pub const fn halted(&self) -> Option<FaultCode> {
        self.halted
    }

    /// True once the node has halted.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Flag the host sets to stop the node at its next instruction boundary.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Halts with `fault`, keeping the first halt reason.
    pub fn halt(&mut self, fault: FaultCode) -> StepOutcome {
        let fault = *self.halted.get_or_insert(fault);
        StepOutcome::Halted(fault)
    }

    fn charge(&mut self, cycles: u64) {
        self.state.add_cycles(cycles);
        self.clock.advance(cycles);
    }

    /// Advances one instruction boundary.
    pub fn step(&mut self) -> StepOutcome {
        if let Some(fault) = self.halted {
            return StepOutcome::Halted(fault);
        }
        if self.cancel.load(Ordering::Acquire) {
            tracing::debug!(id = %self.id, "node stopped by host");
            return self.halt(FaultCode::Stopped);
        }
        if self
            .cycle_limit
            .is_some_and(|limit| self.state.cycles() >= limit)
        {
            tracing::debug!(id = %self.id, cycles = self.state.cycles(), "cycle limit reached");
            return self.halt(FaultCode::CycleLimit);
        }
        if let Some(outcome) = self.accept_interrupt() {
            return outcome;
        }
        if self.state.is_sleeping() {
            let cycles = self
                .clock
                .next_event_delay()
                .unwrap_or_else(|| u64::from(cycle_cost(CycleCostKind::SleepIdle)));
            self.charge(cycles);
            return StepOutcome::Slept { cycles };
        }
        self.execute_next()
    }

    fn accept_interrupt(&mut self) -> Option<StepOutcome> {
        if self.state.interrupt_state() == InterruptState::SuppressedForOneInstruction {
            self.state.set_interrupt_state(InterruptState::Normal);
            return None;
        }
        if !self.state.flags().i {
            return None;
        }
        let vector = self.state.interrupts().next_pending()?;
        self.state.interrupts().clear(vector);
        let mut cycles = cycle_cost(CycleCostKind::InterruptEntry);
        if self.state.is_sleeping() {
            self.state.set_sleeping(false);
            cycles += cycle_cost(CycleCostKind::WakeFromSleep);
        }
        let pc = self.state.pc();
        self.state.push_return(pc);
        self.state.flags_mut().i = false;
        let target = self.state.vector_address(vector);
        self.state.set_pc(target);
        self.charge(u64::from(cycles));
        Some(StepOutcome::Interrupted { vector, cycles })
    }

    fn execute_next(&mut self) -> StepOutcome {
        let pc = self.state.pc();
        let instruction = match self.state.fetch() {
            Ok((instruction, _)) => instruction,
            Err(error) => {
                let fault = if pc as usize >= self.state.program().len() {
                    FaultCode::ProgramOutOfRange
                } else {
                    FaultCode::IllegalInstruction
                };
                tracing::warn!(id = %self.id, pc, %error, "fetch failed");
                return self.halt(fault);
            }
        };
        for probe in &self.probes {
            probe.before(&self.state, &instruction);
        }
        let cycles = match execute_instruction(&instruction, &mut self.state) {
            ExecuteOutcome::Retired { cycles } | ExecuteOutcome::Sleep { cycles } => cycles,
            ExecuteOutcome::Break => {
                tracing::debug!(id = %self.id, pc, "break");
                return self.halt(FaultCode::Break);
            }
            ExecuteOutcome::Fault { cause } => {
                tracing::warn!(id = %self.id, pc, %cause, "execution fault");
                return self.halt(cause);
            }
        };
        for probe in &self.probes {
            probe.after(&self.state, &instruction);
        }
        self.charge(u64::from(cycles));
        StepOutcome::Retired { cycles }
    }

    /// Steps until `cycles` more cycles have elapsed or the node halts.
    pub fn run_for(&mut self, cycles: u64) -> RunOutcome {
        let goal = self.clock.count().saturating_add(cycles);
        let mut steps = 0;
        let mut final_step = self.halted.map_or(StepOutcome::Retired { cycles: 0 }, StepOutcome::Halted);
        while self.clock.count() < goal {
            final_step = self.step();
            steps += 1;
            if matches!(final_step, StepOutcome::Halted(_)) {
                break;
            }
        }
        RunOutcome { steps, final_step }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::{Node, NodeId, StepOutcome};
    use crate::clock::from_fn;
    use crate::config::{McuProfile, NodeConfig};
    use crate::fault::FaultCode;
    use crate::isa::{Instruction, Register};
    use crate::probe::Probe;
    use crate::state::State;

    fn node(image: &[u8]) -> Node {
        let mut node = Node::new(&NodeConfig::for_profile(NodeId(3), McuProfile::Atmega16))
            .expect("valid config");
        node.load_program(image).expect("image fits");
        node
    }

    #[derive(Default)]
    struct Counter {
        before: AtomicU32,
        after: AtomicU32,
    }

    impl Probe for Counter {
        fn before(&self, _state: &State, _instruction: &Instruction) {
            self.before.fetch_add(1, Ordering::Relaxed);
        }

        fn after(&self, _state: &State, _instruction: &Instruction) {
            self.after.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn add_program_retires_and_charges_the_clock() {
        // ldi r16, 0x10 ; ldi r17, 0x05 ; add r16, r17
        let mut node = node(&[0x00, 0xE1, 0x15, 0xE0, 0x01, 0x0F]);
        for _ in 0..3 {
            assert_eq!(node.step(), StepOutcome::Retired { cycles: 1 });
        }
        let r16 = Register::gpr(16).expect("valid register");
        assert_eq!(node.state().reg(r16), 0x15);
        assert_eq!(node.clock().count(), 3);
        assert_eq!(node.state().cycles(), 3);
    }

    #[test]
    fn illegal_word_halts_the_node() {
        let mut node = node(&[]);
        assert_eq!(
            node.step(),
            StepOutcome::Halted(FaultCode::IllegalInstruction)
        );
        assert_eq!(node.halted(), Some(FaultCode::IllegalInstruction));
        assert_eq!(
            node.step(),
            StepOutcome::Halted(FaultCode::IllegalInstruction)
        );
    }

    #[test]
    fn break_halts_and_keeps_the_pc() {
        let mut node = node(&[0x00, 0x00, 0x98, 0x95]);
        node.step();
        assert_eq!(node.step(), StepOutcome::Halted(FaultCode::Break));
        assert_eq!(node.state().pc(), 2);
    }

    #[test]
    fn interrupt_entry_pushes_the_pc_and_jumps_to_the_vector() {
        // sei ; nop ; nop
        let mut node = node(&[0x78, 0x94, 0x00, 0x00, 0x00, 0x00]);
        node.state().interrupts().post(3);
        assert_eq!(node.step(), StepOutcome::Retired { cycles: 1 });
        assert_eq!(node.step(), StepOutcome::Retired { cycles: 1 });
        assert_eq!(
            node.step(),
            StepOutcome::Interrupted {
                vector: 3,
                cycles: 4
            }
        );
        assert_eq!(node.state().pc(), 8);
        assert!(!node.state().flags().i);
        assert!(!node.state().interrupts().is_pending(3));
    }

    #[test]
    fn clock_events_wake_a_sleeping_core() {
        // sei ; sleep
        let mut node = node(&[0x78, 0x94, 0x88, 0x95]);
        let lines = Arc::clone(node.state().interrupts());
        node.clock_mut()
            .insert(from_fn(move |_| lines.post(2)), 50);
        node.step();
        node.step();
        assert!(node.state().is_sleeping());
        assert_eq!(node.step(), StepOutcome::Slept { cycles: 48 });
        assert_eq!(
            node.step(),
            StepOutcome::Interrupted {
                vector: 2,
                cycles: 8
            }
        );
        assert!(!node.state().is_sleeping());
        assert_eq!(node.state().pc(), 4);
    }

    #[test]
    fn cycle_limit_and_stop_flag_halt_at_a_boundary() {
        let config = NodeConfig {
            cycle_limit: Some(2),
            ..NodeConfig::for_profile(NodeId(1), McuProfile::Atmega16)
        };
        let mut limited = Node::new(&config).expect("valid config");
        limited.load_program(&[0; 8]).expect("image fits");
        let outcome = limited.run_for(100);
        assert_eq!(outcome.final_step, StepOutcome::Halted(FaultCode::CycleLimit));
        assert_eq!(outcome.steps, 3);

        let mut stopped = node(&[0; 8]);
        stopped.stop_handle().store(true, Ordering::Release);
        assert_eq!(stopped.step(), StepOutcome::Halted(FaultCode::Stopped));
    }

    #[test]
    fn probes_see_every_retired_instruction() {
        let mut node = node(&[0; 8]);
        let counter = Arc::new(Counter::default());
        node.add_probe(Arc::clone(&counter) as Arc<dyn Probe>);
        node.run_for(4);
        assert_eq!(counter.before.load(Ordering::Relaxed), 4);
        assert_eq!(counter.after.load(Ordering::Relaxed), 4);
    }
}
