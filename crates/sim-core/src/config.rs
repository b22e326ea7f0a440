//! Node and synchronizer configuration.

use thiserror::Error;

use crate::node::NodeId;

/// Default main-clock frequency in Hz.
pub const DEFAULT_CLOCK_HZ: u64 = 7_372_800;
/// Default synchronization period in main-clock cycles.
pub const DEFAULT_SYNC_PERIOD: u64 = 1000;
/// Largest flash reachable with 16-bit return addresses.
pub const MAX_FLASH_BYTES: usize = 128 * 1024;
/// First data-space address of the IO registers.
pub const IO_BASE: u16 = 0x20;

/// Supported microcontroller presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum McuProfile {
    /// 128 KiB flash, 4 KiB SRAM, extended IO space.
    #[default]
    Atmega128,
    /// 32 KiB flash, 2 KiB SRAM.
    Atmega32,
    /// 16 KiB flash, 1 KiB SRAM.
    Atmega16,
}

impl McuProfile {
    /// Flash size in bytes.
    #[must_use]
    pub const fn flash_size(self) -> usize {
        match self {
            Self::Atmega128 => 128 * 1024,
            Self::Atmega32 => 32 * 1024,
            Self::Atmega16 => 16 * 1024,
        }
    }

    /// Internal SRAM size in bytes.
    #[must_use]
    pub const fn sram_size(self) -> usize {
        match self {
            Self::Atmega128 => 4096,
            Self::Atmega32 => 2048,
            Self::Atmega16 => 1024,
        }
    }

    /// IO registers mapped between the register file and SRAM.
    #[must_use]
    pub const fn io_registers(self) -> usize {
        match self {
            Self::Atmega128 => 224,
            Self::Atmega32 | Self::Atmega16 => 64,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Flash larger than 16-bit return addresses can reach.
    #[error("flash size {size} exceeds {MAX_FLASH_BYTES} bytes")]
    FlashTooLarge {
        /// Requested size.
        size: usize,
    },
    /// Registers, IO and SRAM do not fit the 16-bit data space.
    #[error("data space of {size} bytes does not fit 16-bit addresses")]
    DataSpaceTooLarge {
        /// Requested data-space size.
        size: usize,
    },
    /// Clock frequency of zero.
    #[error("clock frequency must be non-zero")]
    ZeroClock,
    /// Interrupt vector spacing of zero.
    #[error("interrupt vector size must be non-zero")]
    ZeroVectorSize,
}

/// Configuration of one simulated node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NodeConfig {
    /// Node identity, unique per synchronizer.
    pub id: NodeId,
    /// Part this node simulates.
    pub profile: McuProfile,
    /// Main-clock frequency in Hz.
    pub clock_hz: u64,
    /// Halt with [`crate::FaultCode::CycleLimit`] once this many cycles have run.
    pub cycle_limit: Option<u64>,
    /// Internal SRAM bytes.
    pub sram_size: usize,
    /// Flash bytes.
    pub flash_size: usize,
    /// IO registers.
    pub io_registers: usize,
    /// Bytes between interrupt vectors.
    pub vector_size: u32,
    /// Initial stack pointer; defaults to the last SRAM address.
    pub stack_top: Option<u16>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_profile(NodeId(0), McuProfile::default())
    }
}

impl NodeConfig {
    /// Preset sizes for `profile`.
    #[must_use]
    pub const fn for_profile(id: NodeId, profile: McuProfile) -> Self {
        Self {
            id,
            profile,
            clock_hz: DEFAULT_CLOCK_HZ,
            cycle_limit: None,
            sram_size: profile.sram_size(),
            flash_size: profile.flash_size(),
            io_registers: profile.io_registers(),
            vector_size: 4,
            stack_top: None,
        }
    }

    /// First SRAM address in data space.
    #[must_use]
    pub const fn sram_start(&self) -> usize {
        IO_BASE as usize + self.io_registers
    }

    /// Size of the whole data space: registers, IO and SRAM.
    #[must_use]
    pub const fn data_size(&self) -> usize {
        self.sram_start() + self.sram_size
    }

    /// Checks the limits the core relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated limit.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.flash_size > MAX_FLASH_BYTES {
            return Err(ConfigError::FlashTooLarge {
                size: self.flash_size,
            });
        }
        if self.data_size() > 1 << 16 {
            return Err(ConfigError::DataSpaceTooLarge {
                size: self.data_size(),
            });
        }
        if self.clock_hz == 0 {
            return Err(ConfigError::ZeroClock);
        }
        if self.vector_size == 0 {
            return Err(ConfigError::ZeroVectorSize);
        }
        Ok(())
    }
}

/// Synchronizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SyncConfig {
    /// Main-clock cycles between rendezvous or progress notifications.
    pub period: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_SYNC_PERIOD,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ConfigError, McuProfile, NodeConfig, SyncConfig, DEFAULT_CLOCK_HZ};
    use crate::node::NodeId;

    #[rstest]
    #[case(McuProfile::Atmega128, 0x1100)]
    #[case(McuProfile::Atmega32, 0x0860)]
    #[case(McuProfile::Atmega16, 0x0460)]
    fn presets_lay_out_the_data_space(#[case] profile: McuProfile, #[case] data_size: usize) {
        let config = NodeConfig::for_profile(NodeId(1), profile);
        assert_eq!(config.data_size(), data_size);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn defaults_use_the_reference_clock() {
        let config = NodeConfig::default();
        assert_eq!(config.clock_hz, DEFAULT_CLOCK_HZ);
        assert_eq!(config.profile, McuProfile::Atmega128);
        assert_eq!(SyncConfig::default().period, 1000);
    }

    #[test]
    fn oversized_layouts_are_rejected() {
        let config = NodeConfig {
            flash_size: 256 * 1024,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FlashTooLarge { .. })
        ));
        let config = NodeConfig {
            sram_size: 0x10000,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DataSpaceTooLarge { .. })
        ));
        let config = NodeConfig {
            clock_hz: 0,
            ..NodeConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroClock));
    }
}
