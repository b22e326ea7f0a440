/// Dynamic cycle costs charged on top of an instruction's minimum cycle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// Conditional branch whose condition held.
    BranchTaken,
    /// Skip instruction skipping a one-word instruction.
    SkipOneWord,
    /// Skip instruction skipping a two-word instruction.
    SkipTwoWords,
    /// Interrupt acceptance: return-address push and vector jump.
    InterruptEntry,
    /// Extra latency when an interrupt wakes a sleeping core.
    WakeFromSleep,
    /// Idle cycle spent by a sleeping core with nothing scheduled.
    SleepIdle,
}

/// Single source-of-truth cycle-cost table for dynamic costs.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u16)] = &[
    (CycleCostKind::BranchTaken, 1),
    (CycleCostKind::SkipOneWord, 1),
    (CycleCostKind::SkipTwoWords, 2),
    (CycleCostKind::InterruptEntry, 4),
    (CycleCostKind::WakeFromSleep, 4),
    (CycleCostKind::SleepIdle, 1),
];

/// Looks up the cycle cost for a cycle-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> u16 {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
        .unwrap_or(0)
}

/// Extra cycles for skipping an instruction of `size` bytes.
#[must_use]
pub fn skip_cost(size: u8) -> u16 {
    if size > 2 {
        cycle_cost(CycleCostKind::SkipTwoWords)
    } else {
        cycle_cost(CycleCostKind::SkipOneWord)
    }
}
