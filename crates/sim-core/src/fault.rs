use thiserror::Error;

/// Fault classes used for halt-reason aggregation and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder rejected the fetched instruction stream.
    Decode,
    /// Program or data memory policy violation escalated by a reporter.
    Memory,
    /// Debugger-visible stop requested by the program itself.
    Debug,
    /// Host-imposed execution limit.
    Budget,
    /// Host-initiated cancellation.
    Host,
}

/// Stable reasons a node stops executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultCode {
    /// Fetched word does not decode to a legal instruction.
    #[error("illegal instruction encoding")]
    IllegalInstruction = 0x01,
    /// Program counter left the flash segment.
    #[error("instruction fetch outside program memory")]
    ProgramOutOfRange = 0x02,
    /// A memory segment reporter escalated an access error.
    #[error("memory access error escalated to halt")]
    MemoryFault = 0x03,
    /// `BREAK` executed.
    #[error("break instruction executed")]
    Break = 0x04,
    /// Node reached its configured cycle limit.
    #[error("cycle limit reached")]
    CycleLimit = 0x05,
    /// Node was removed or its synchronizer stopped.
    #[error("node stopped by host")]
    Stopped = 0x06,
}

impl FaultCode {
    /// Converts a fault code to its stable byte value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte value back into a fault code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalInstruction),
            0x02 => Some(Self::ProgramOutOfRange),
            0x03 => Some(Self::MemoryFault),
            0x04 => Some(Self::Break),
            0x05 => Some(Self::CycleLimit),
            0x06 => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Returns the class for this fault code.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::IllegalInstruction => FaultClass::Decode,
            Self::ProgramOutOfRange | Self::MemoryFault => FaultClass::Memory,
            Self::Break => FaultClass::Debug,
            Self::CycleLimit => FaultClass::Budget,
            Self::Stopped => FaultClass::Host,
        }
    }

    /// Faults caused by the simulated program rather than by the host.
    #[must_use]
    pub const fn is_program_fault(self) -> bool {
        matches!(
            self.class(),
            FaultClass::Decode | FaultClass::Memory | FaultClass::Debug
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{FaultClass, FaultCode};

    #[test]
    fn stable_code_roundtrip_is_bijective_for_defined_values() {
        for code in 0x01u8..=0x06 {
            let fault = FaultCode::from_u8(code).expect("defined taxonomy code");
            assert_eq!(fault.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(FaultCode::from_u8(0x00).is_none());
        assert!(FaultCode::from_u8(0xFF).is_none());
    }

    #[test]
    fn host_and_budget_stops_are_not_program_faults() {
        assert!(FaultCode::IllegalInstruction.is_program_fault());
        assert!(FaultCode::Break.is_program_fault());
        assert!(!FaultCode::CycleLimit.is_program_fault());
        assert!(!FaultCode::Stopped.is_program_fault());
    }

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(FaultCode::IllegalInstruction.class(), FaultClass::Decode);
        assert_eq!(FaultCode::ProgramOutOfRange.class(), FaultClass::Memory);
        assert_eq!(FaultCode::MemoryFault.class(), FaultClass::Memory);
        assert_eq!(FaultCode::Break.class(), FaultClass::Debug);
        assert_eq!(FaultCode::CycleLimit.class(), FaultClass::Budget);
        assert_eq!(FaultCode::Stopped.class(), FaultClass::Host);
    }
}
