//! CVD driver register map and signal words.
//!
//! | Address | Width | Content |
//! |---------|-------|---------|
//! | `0x007A` | 32 bit | NET selection number (operation to run) |
//! | `0x007D` | 16 bit | Driver input command (low word of `0x007C`) |
//! | `0x007F` | 16 bit | Driver output status (low word of `0x007E`) |
//! | `0x0080` | 32 bit | Present alarm |
//! | `0x1800 + n·0x40` | 12 × 16 bit | Operation data block `n` |
//!
//! 32-bit values occupy two registers, high word first.

use bitflags::bitflags;
use static_assertions::const_assert;

/// NET selection number, high word.
pub const REG_NET_SELECTION: u16 = 0x007A;
/// Driver input command, low word.
pub const REG_INPUT_COMMAND: u16 = 0x007D;
/// Driver output status, high word (always zero with the default assignment).
pub const REG_OUTPUT_STATUS_HIGH: u16 = 0x007E;
/// Driver output status, low word.
pub const REG_OUTPUT_STATUS: u16 = 0x007F;
/// Present alarm code, high word.
pub const REG_PRESENT_ALARM: u16 = 0x0080;
/// First operation data block.
pub const REG_OPERATION_DATA_BASE: u16 = 0x1800;
/// Distance between operation data blocks.
pub const OPERATION_DATA_STRIDE: u16 = 0x40;
/// Registers written per operation data block.
pub const OPERATION_DATA_WORDS: usize = 12;

const_assert!(OPERATION_DATA_WORDS as u16 <= OPERATION_DATA_STRIDE);
const_assert!(REG_OPERATION_DATA_BASE as u32 + 255 * OPERATION_DATA_STRIDE as u32 <= u16::MAX as u32);

bitflags! {
    /// Driver output status word (`0x007F`).
    ///
    /// `IN_POS` is not part of the factory assignment; R-OUT9 must be
    /// assigned to IN-POS in the driver parameters.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusBits: u16 {
        const START_R  = 1 << 3;
        const HOME_END = 1 << 4;
        const READY    = 1 << 5;
        const INFO     = 1 << 6;
        const ALARM    = 1 << 7;
        const SYS_BUSY = 1 << 8;
        const IN_POS   = 1 << 9;
        const MOVE     = 1 << 13;
    }
}

impl StatusBits {
    #[inline]
    pub const fn ready(self) -> bool {
        self.contains(Self::READY)
    }

    #[inline]
    pub const fn moving(self) -> bool {
        self.contains(Self::MOVE)
    }

    #[inline]
    pub const fn in_position(self) -> bool {
        self.contains(Self::IN_POS)
    }

    #[inline]
    pub const fn home_end(self) -> bool {
        self.contains(Self::HOME_END)
    }

    #[inline]
    pub const fn alarm(self) -> bool {
        self.contains(Self::ALARM)
    }
}

bitflags! {
    /// Driver input command word (`0x007D`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandBits: u16 {
        const M0          = 1 << 0;
        const M1          = 1 << 1;
        const M2          = 1 << 2;
        const START       = 1 << 3;
        const HOME        = 1 << 4;
        const STOP        = 1 << 5;
        const FREE        = 1 << 6;
        const ALARM_RESET = 1 << 7;
    }
}

/// Logical signal written to the input command word.
///
/// Exactly one signal bit is set per write; `Off` releases every input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverSignal {
    Off,
    Start,
    Home,
    Stop,
    Free,
    AlarmReset,
}

impl DriverSignal {
    /// Command word for this signal.
    pub const fn bits(self) -> CommandBits {
        match self {
            Self::Off => CommandBits::empty(),
            Self::Start => CommandBits::START,
            Self::Home => CommandBits::HOME,
            Self::Stop => CommandBits::STOP,
            Self::Free => CommandBits::FREE,
            Self::AlarmReset => CommandBits::ALARM_RESET,
        }
    }

    /// Inverse of [`bits`](Self::bits). Operation-select bits are ignored;
    /// words carrying more than one signal return `None`.
    pub fn from_bits(bits: CommandBits) -> Option<Self> {
        let signal = bits - (CommandBits::M0 | CommandBits::M1 | CommandBits::M2);
        [
            Self::Off,
            Self::Start,
            Self::Home,
            Self::Stop,
            Self::Free,
            Self::AlarmReset,
        ]
        .into_iter()
        .find(|candidate| candidate.bits() == signal)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Start => "START",
            Self::Home => "HOME",
            Self::Stop => "STOP",
            Self::Free => "FREE",
            Self::AlarmReset => "ALM-RST",
        }
    }
}

// ─── 32-bit Helpers ─────────────────────────────────────────────────

/// Split into `[high, low]` register words.
#[inline]
pub const fn split_u32(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

/// Combine `high`/`low` register words.
#[inline]
pub const fn combine_u32(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}

/// First register of operation data block `op`.
#[inline]
pub const fn operation_data_address(op: u8) -> u16 {
    REG_OPERATION_DATA_BASE + op as u16 * OPERATION_DATA_STRIDE
}

// ─── Operation Data ─────────────────────────────────────────────────

/// Positioning mode of an operation data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum OperationMode {
    #[default]
    Absolute = 1,
    Relative = 2,
}

/// Motion profile stored in one operation data block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationData {
    pub mode: OperationMode,
    /// Target position [steps].
    pub position: i32,
    /// Operating speed [Hz].
    pub velocity: i32,
    /// Starting rate [kHz/s].
    pub start_rate: i32,
    /// Stopping rate [kHz/s].
    pub stop_rate: i32,
    /// Operating current as a fraction of rated current, clamped to 0..=1.
    pub current: f32,
}

impl Default for OperationData {
    fn default() -> Self {
        Self {
            mode: OperationMode::Absolute,
            position: 0,
            velocity: 2000,
            start_rate: 1000,
            stop_rate: 1000,
            current: 1.0,
        }
    }
}

impl OperationData {
    /// Register image of the block, in write order.
    pub fn to_registers(&self) -> [u16; OPERATION_DATA_WORDS] {
        let current = (self.current.clamp(0.0, 1.0) * 1000.0) as u32;
        let fields = [
            self.mode as u32,
            self.position as u32,
            self.velocity as u32,
            self.start_rate as u32,
            self.stop_rate as u32,
            current,
        ];
        let mut words = [0u16; OPERATION_DATA_WORDS];
        for (i, field) in fields.into_iter().enumerate() {
            let [high, low] = split_u32(field);
            words[i * 2] = high;
            words[i * 2 + 1] = low;
        }
        words
    }
}
