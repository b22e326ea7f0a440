//! Architectural state of one AVR core.
//!
//! The data space is laid out as on the hardware: the 32 general registers at
//! `0x00..0x20`, the IO registers from [`IO_BASE`], then internal SRAM. The
//! status register, stack pointer and extension bytes are IO addresses backed
//! by fields of [`State`]; every other IO address is an [`ActiveRegister`].

pub mod interrupts;
pub mod io;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use interrupts::{InterruptLines, InterruptState, MAX_INTERRUPTS};
pub use io::{ActiveRegister, IoSpace, RwRegister};
pub use memory::{
    ErrorAction, ErrorReporter, HaltingReporter, LoggingReporter, MemoryError, ProgramSegment,
};

use crate::config::{ConfigError, NodeConfig, IO_BASE};
use crate::decoder::DecodeError;
use crate::fault::FaultCode;
use crate::isa::{Instruction, Register, GENERAL_REGISTER_COUNT};
use crate::probe::MemoryWatch;

/// IO address of the status register.
pub const SREG: u8 = 0x3F;
/// IO address of the stack pointer high byte.
pub const SPH: u8 = 0x3E;
/// IO address of the stack pointer low byte.
pub const SPL: u8 = 0x3D;
/// IO address of the indirect-call extension byte.
pub const EIND: u8 = 0x3C;
/// IO address of the program-memory page byte used by `elpm`.
pub const RAMPZ: u8 = 0x3B;

/// Status register bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct Flags {
    /// Global interrupt enable.
    pub i: bool,
    /// Bit copy storage.
    pub t: bool,
    /// Half carry.
    pub h: bool,
    /// Sign, `N ^ V`.
    pub s: bool,
    /// Two's complement overflow.
    pub v: bool,
    /// Negative.
    pub n: bool,
    /// Zero.
    pub z: bool,
    /// Carry.
    pub c: bool,
}

impl Flags {
    /// Bit number of the carry flag.
    pub const C: u8 = 0;
    /// Bit number of the zero flag.
    pub const Z: u8 = 1;
    /// Bit number of the negative flag.
    pub const N: u8 = 2;
    /// Bit number of the overflow flag.
    pub const V: u8 = 3;
    /// Bit number of the sign flag.
    pub const S: u8 = 4;
    /// Bit number of the half-carry flag.
    pub const H: u8 = 5;
    /// Bit number of the bit-copy flag.
    pub const T: u8 = 6;
    /// Bit number of the interrupt-enable flag.
    pub const I: u8 = 7;

    /// `SREG` byte image.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        (self.c as u8)
            | (self.z as u8) << 1
            | (self.n as u8) << 2
            | (self.v as u8) << 3
            | (self.s as u8) << 4
            | (self.h as u8) << 5
            | (self.t as u8) << 6
            | (self.i as u8) << 7
    }

    /// Flags from an `SREG` byte image.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self {
            c: byte & 0x01 != 0,
            z: byte & 0x02 != 0,
            n: byte & 0x04 != 0,
            v: byte & 0x08 != 0,
            s: byte & 0x10 != 0,
            h: byte & 0x20 != 0,
            t: byte & 0x40 != 0,
            i: byte & 0x80 != 0,
        }
    }

    /// Status bit `bit` (0..7).
    #[must_use]
    pub const fn get(self, bit: u8) -> bool {
        (self.to_byte() >> (bit & 7)) & 1 != 0
    }

    /// Sets status bit `bit` (0..7).
    pub const fn set(&mut self, bit: u8, value: bool) {
        let mask = 1u8 << (bit & 7);
        let byte = self.to_byte();
        *self = Self::from_byte(if value { byte | mask } else { byte & !mask });
    }
}

/// Registers, memories and control state of one core. Owned by exactly one node.
pub struct State {
    regs: [u8; GENERAL_REGISTER_COUNT],
    flags: Flags,
    pc: u32,
    next_pc: u32,
    cycles: u64,
    sp: u16,
    rampz: u8,
    eind: u8,
    sleeping: bool,
    interrupt_state: InterruptState,
    pending_fault: Option<FaultCode>,
    sram: Vec<u8>,
    sram_start: usize,
    io: IoSpace,
    program: ProgramSegment,
    interrupts: Arc<InterruptLines>,
    vector_size: u32,
    data_reporter: Box<dyn ErrorReporter>,
    program_reporter: Box<dyn ErrorReporter>,
    watches: BTreeMap<u16, Vec<Arc<dyn MemoryWatch>>>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("regs", &self.regs)
            .field("flags", &self.flags)
            .field("pc", &self.pc)
            .field("cycles", &self.cycles)
            .field("sp", &self.sp)
            .field("sleeping", &self.sleeping)
            .field("interrupt_state", &self.interrupt_state)
            .field("pending_fault", &self.pending_fault)
            .finish_non_exhaustive()
    }
}

impl State {
    /// Fresh state for `config`: erased flash, zeroed SRAM, stack at the top of SRAM.
    ///
    /// # Errors
    ///
    /// Returns the violated limit if `config` does not validate.
    pub fn new(config: &NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let data_top = u16::try_from(config.data_size().saturating_sub(1)).unwrap_or(u16::MAX);
        Ok(Self {
            regs: [0; GENERAL_REGISTER_COUNT],
            flags: Flags::default(),
            pc: 0,
            next_pc: 0,
            cycles: 0,
            sp: config.stack_top.unwrap_or(data_top),
            rampz: 0,
            eind: 0,
            sleeping: false,
            interrupt_state: InterruptState::Normal,
            pending_fault: None,
            sram: vec![0; config.sram_size],
            sram_start: config.sram_start(),
            io: IoSpace::new(config.io_registers),
            program: ProgramSegment::new(config.flash_size),
            interrupts: Arc::new(InterruptLines::default()),
            vector_size: config.vector_size,
            data_reporter: Box::new(LoggingReporter),
            program_reporter: Box::new(LoggingReporter),
            watches: BTreeMap::new(),
        })
    }

    /// General register `reg`; pointer registers read their low byte.
    #[must_use]
    pub const fn reg(&self, reg: Register) -> u8 {
        self.regs[reg.index()]
    }

    /// Writes general register `reg`.
    pub const fn set_reg(&mut self, reg: Register, value: u8) {
        self.regs[reg.index()] = value;
    }

    /// Register pair starting at `reg` (`X`, `Y`, `Z` or an even register).
    #[must_use]
    pub const fn reg_pair(&self, reg: Register) -> u16 {
        let low = reg.index();
        (self.regs[low] as u16) | (self.regs[(low + 1) % GENERAL_REGISTER_COUNT] as u16) << 8
    }

    /// Writes the register pair starting at `reg`.
    pub const fn set_reg_pair(&mut self, reg: Register, value: u16) {
        let low = reg.index();
        let [lo, hi] = value.to_le_bytes();
        self.regs[low] = lo;
        self.regs[(low + 1) % GENERAL_REGISTER_COUNT] = hi;
    }

    /// Whole register file.
    #[must_use]
    pub const fn registers(&self) -> &[u8; GENERAL_REGISTER_COUNT] {
        &self.regs
    }

    /// Status flags.
    #[must_use]
    pub const fn flags(&self) -> Flags {
        self.flags
    }

    /// Mutable status flags.
    pub const fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    /// Program counter (byte address of the current instruction).
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Moves the program counter.
    pub const fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Address the current instruction continues at.
    #[must_use]
    pub const fn next_pc(&self) -> u32 {
        self.next_pc
    }

    /// Redirects control flow after the current instruction.
    pub const fn set_next_pc(&mut self, next_pc: u32) {
        self.next_pc = next_pc;
    }

    /// Cycles executed so far.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Charges `cycles` to this core.
    pub const fn add_cycles(&mut self, cycles: u64) {
        self.cycles = self.cycles.saturating_add(cycles);
    }

    /// Stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.sp
    }

    /// Moves the stack pointer.
    pub const fn set_sp(&mut self, sp: u16) {
        self.sp = sp;
    }

    /// `RAMPZ` extension byte.
    #[must_use]
    pub const fn rampz(&self) -> u8 {
        self.rampz
    }

    /// Sets the `RAMPZ` extension byte.
    pub const fn set_rampz(&mut self, rampz: u8) {
        self.rampz = rampz;
    }

    /// `EIND` extension byte.
    #[must_use]
    pub const fn eind(&self) -> u8 {
        self.eind
    }

    /// True while the core sleeps until an interrupt.
    #[must_use]
    pub const fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Enters or leaves sleep.
    pub const fn set_sleeping(&mut self, sleeping: bool) {
        self.sleeping = sleeping;
    }

    /// Interrupt acceptance state.
    #[must_use]
    pub const fn interrupt_state(&self) -> InterruptState {
        self.interrupt_state
    }

    /// Changes the interrupt acceptance state.
    pub const fn set_interrupt_state(&mut self, state: InterruptState) {
        self.interrupt_state = state;
    }

    /// Fault raised by a reporter during the current instruction, cleared on read.
    pub const fn take_pending_fault(&mut self) -> Option<FaultCode> {
        self.pending_fault.take()
    }

    /// Interrupt lines of this core.
    #[must_use]
    pub const fn interrupts(&self) -> &Arc<InterruptLines> {
        &self.interrupts
    }

    /// Byte address of the vector for interrupt `number`.
    #[must_use]
    pub const fn vector_address(&self, number: u8) -> u32 {
        (number.saturating_sub(1) as u32) * self.vector_size
    }

    /// Program memory.
    #[must_use]
    pub const fn program(&self) -> &ProgramSegment {
        &self.program
    }

    /// Copies a raw flash image to address 0.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::ImageTooLarge`] if the image exceeds flash.
    pub fn load_program(&mut self, image: &[u8]) -> Result<(), MemoryError> {
        self.program.load(0, image)
    }

    /// Decodes (or returns the cached decode of) the instruction at the PC.
    ///
    /// # Errors
    ///
    /// Returns the decode failure for illegal words or a PC outside flash.
    pub fn fetch(&mut self) -> Result<(Instruction, u8), DecodeError> {
        self.program.fetch(self.pc)
    }

    /// Replaces the reporter for data-space errors.
    pub fn set_data_reporter(&mut self, reporter: Box<dyn ErrorReporter>) {
        self.data_reporter = reporter;
    }

    /// Replaces the reporter for program-memory errors.
    pub fn set_program_reporter(&mut self, reporter: Box<dyn ErrorReporter>) {
        self.program_reporter = reporter;
    }

    /// Installs a device register at IO address `io`, returning the previous one.
    pub fn install_io(
        &mut self,
        io: usize,
        register: Box<dyn ActiveRegister>,
    ) -> Option<Box<dyn ActiveRegister>> {
        self.io.install(io, register)
    }

    /// Adds a watch on data address `address`.
    pub fn add_watch(&mut self, address: u16, watch: Arc<dyn MemoryWatch>) {
        self.watches.entry(address).or_default().push(watch);
    }

    /// Removes every watch on `address`.
    pub fn clear_watches(&mut self, address: u16) {
        self.watches.remove(&address);
    }

    fn watches_at(&self, address: u16) -> Vec<Arc<dyn MemoryWatch>> {
        self.watches.get(&address).cloned().unwrap_or_default()
    }

    fn report_data(&mut self, error: &MemoryError) {
        if self.data_reporter.report(error) == ErrorAction::Halt {
            self.pending_fault = Some(FaultCode::MemoryFault);
        }
    }

    fn report_program(&mut self, error: &MemoryError) {
        if self.program_reporter.report(error) == ErrorAction::Halt {
            self.pending_fault = Some(FaultCode::MemoryFault);
        }
    }

    /// Index into the device IO space for `address`, unless it is one of
    /// the core-owned registers or outside the IO window.
    fn device_io(&self, address: u16) -> Option<usize> {
        let at = usize::from(address);
        let io_base = usize::from(IO_BASE);
        if at < io_base || at >= self.sram_start {
            return None;
        }
        match u8::try_from(at - io_base) {
            Ok(SREG | SPH | SPL | EIND | RAMPZ) => None,
            _ => Some(at - io_base),
        }
    }

    fn read_io_raw(&mut self, address: u16) -> u8 {
        if let Some(io) = self.device_io(address) {
            return self.io.read(io).unwrap_or_else(|| {
                self.report_data(&MemoryError::DataReadOutOfRange { address });
                0
            });
        }
        match u8::try_from(address - IO_BASE) {
            Ok(SREG) => self.flags.to_byte(),
            Ok(SPH) => self.sp.to_be_bytes()[0],
            Ok(SPL) => self.sp.to_le_bytes()[0],
            Ok(EIND) => self.eind,
            Ok(RAMPZ) => self.rampz,
            _ => 0,
        }
    }

    fn write_io_raw(&mut self, address: u16, value: u8) {
        if let Some(io) = self.device_io(address) {
            if !self.io.write(io, value) {
                self.report_data(&MemoryError::DataWriteOutOfRange { address });
            }
            return;
        }
        match u8::try_from(address - IO_BASE) {
            Ok(SREG) => self.flags = Flags::from_byte(value),
            Ok(SPH) => self.sp = (self.sp & 0x00FF) | (u16::from(value) << 8),
            Ok(SPL) => self.sp = (self.sp & 0xFF00) | u16::from(value),
            Ok(EIND) => self.eind = value,
            Ok(RAMPZ) => self.rampz = value,
            _ => {}
        }
    }

    fn read_raw(&mut self, address: u16) -> u8 {
        let at = usize::from(address);
        let io_base = usize::from(IO_BASE);
        if at < io_base {
            return self.regs[at];
        }
        if at < self.sram_start {
            return self.read_io_raw(address);
        }
        if let Some(value) = self.sram.get(at - self.sram_start) {
            return *value;
        }
        self.report_data(&MemoryError::DataReadOutOfRange { address });
        0
    }

    fn write_raw(&mut self, address: u16, value: u8) {
        let at = usize::from(address);
        let io_base = usize::from(IO_BASE);
        if at < io_base {
            self.regs[at] = value;
        } else if at < self.sram_start {
            self.write_io_raw(address, value);
        } else if let Some(slot) = self.sram.get_mut(at - self.sram_start) {
            *slot = value;
        } else {
            self.report_data(&MemoryError::DataWriteOutOfRange { address });
        }
    }

    /// Bit `bit` of `address` in place, other bits zero. Devices answer
    /// through their own bit accessors.
    fn read_bit_raw(&mut self, address: u16, bit: u8) -> u8 {
        let mask = 1u8 << (bit & 7);
        let Some(io) = self.device_io(address) else {
            return self.read_raw(address) & mask;
        };
        match self.io.read_bit(io, bit) {
            Some(true) => mask,
            Some(false) => 0,
            None => {
                self.report_data(&MemoryError::DataReadOutOfRange { address });
                0
            }
        }
    }

    fn write_bit_raw(&mut self, address: u16, bit: u8, value: bool) {
        let Some(io) = self.device_io(address) else {
            let mask = 1u8 << (bit & 7);
            let current = self.read_raw(address);
            self.write_raw(address, if value { current | mask } else { current & !mask });
            return;
        };
        if !self.io.write_bit(io, bit, value) {
            self.report_data(&MemoryError::DataWriteOutOfRange { address });
        }
    }

    fn watched_read(&mut self, address: u16, read: impl FnOnce(&mut Self) -> u8) -> u8 {
        if self.watches.is_empty() {
            return read(self);
        }
        let watches = self.watches_at(address);
        for watch in &watches {
            watch.before_read(address);
        }
        let value = read(self);
        for watch in &watches {
            watch.after_read(address, value);
        }
        value
    }

    fn watched_write(&mut self, address: u16, value: u8, write: impl FnOnce(&mut Self)) {
        if self.watches.is_empty() {
            write(self);
            return;
        }
        let watches = self.watches_at(address);
        for watch in &watches {
            watch.before_write(address, value);
        }
        write(self);
        for watch in &watches {
            watch.after_write(address, value);
        }
    }

    /// Reads data-space byte `address`, notifying watches.
    pub fn read_data(&mut self, address: u16) -> u8 {
        self.watched_read(address, |state| state.read_raw(address))
    }

    /// Writes data-space byte `address`, notifying watches.
    pub fn write_data(&mut self, address: u16, value: u8) {
        self.watched_write(address, value, |state| state.write_raw(address, value));
    }

    /// Reads IO register `io` (the `in` address space).
    pub fn read_io(&mut self, io: u8) -> u8 {
        self.read_data(IO_BASE + u16::from(io))
    }

    /// Writes IO register `io` (the `out` address space).
    pub fn write_io(&mut self, io: u8, value: u8) {
        self.write_data(IO_BASE + u16::from(io), value);
    }

    /// Reads one bit of IO register `io`. Watches see the bit in place with
    /// the other bits zero.
    pub fn read_io_bit(&mut self, io: u8, bit: u8) -> bool {
        let address = IO_BASE + u16::from(io);
        self.watched_read(address, |state| state.read_bit_raw(address, bit)) != 0
    }

    /// Sets or clears one bit of IO register `io`. Watches see the bit in
    /// place with the other bits zero.
    pub fn write_io_bit(&mut self, io: u8, bit: u8, value: bool) {
        let address = IO_BASE + u16::from(io);
        let seen = u8::from(value) << (bit & 7);
        self.watched_write(address, seen, |state| {
            state.write_bit_raw(address, bit, value);
        });
    }

    /// Reads program byte `address` (`lpm`, `elpm`).
    pub fn read_program(&mut self, address: u32) -> u8 {
        if let Some(value) = self.program.read_byte(address) {
            return value;
        }
        self.report_program(&MemoryError::ProgramOutOfRange { address });
        0
    }

    /// Writes program word at byte `address` (`spm`).
    pub fn write_program(&mut self, address: u32, value: u16) {
        if let Err(error) = self.program.write_word(address, value) {
            self.report_program(&error);
        }
    }

    /// Pushes one byte: store at `SP`, then decrement.
    pub fn push(&mut self, value: u8) {
        self.write_data(self.sp, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    /// Pops one byte: increment `SP`, then load.
    pub fn pop(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.read_data(self.sp)
    }

    /// Pushes a two-byte return address for byte address `address`, low byte first.
    pub fn push_return(&mut self, address: u32) {
        let [low, high, ..] = (address >> 1).to_le_bytes();
        self.push(low);
        self.push(high);
    }

    /// Pops a return address pushed by [`State::push_return`].
    pub fn pop_return(&mut self) -> u32 {
        let high = self.pop();
        let low = self.pop();
        u32::from(u16::from_le_bytes([low, high])) << 1
    }
}
