//! Instruction and operand catalog for the AVR 8-bit core.

pub mod encoder;
pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod registers;

pub use encoder::Encoding;
pub use instruction::{
    relative_target, Abs, BinaryOperands, Flag, FlagRel, Instruction, IoBit, OneReg, RegAddr,
    RegBit, RegImm, RegIndexed, RegIo, RegPtr, RegReg, Rel, UnaryOperand,
};
pub use opcode::{InstrProperties, Opcode, OPCODE_TABLE};
pub use operand::{Constraint, Operand, OperandError, OperandKind, OperandList};
pub use registers::{Register, RegisterSet, GENERAL_REGISTER_COUNT};
