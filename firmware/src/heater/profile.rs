//! Heating profiles: ordered temperature stages over half-open time
//! windows, walked by a forward-only cursor.

use crate::error::{Error, Result};
use crate::timer::units::s_to_ms;

/// Most stages a profile may carry.
pub const MAX_STAGES: usize = 8;

/// Hold `target_c` while elapsed seconds are in `[from_s, to_s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureStage {
    pub from_s: u32,
    pub to_s: u32,
    pub target_c: u16,
}

impl TemperatureStage {
    pub const fn new(from_s: u32, to_s: u32, target_c: u16) -> Self {
        Self {
            from_s,
            to_s,
            target_c,
        }
    }

    fn contains_ms(&self, elapsed_ms: u64) -> bool {
        let from = u64::from(s_to_ms(self.from_s));
        let to = u64::from(s_to_ms(self.to_s));
        (from..to).contains(&elapsed_ms)
    }
}

/// Lead-free reflow profile after J-STD-020: preheat, soak, reflow,
/// cool-down.
pub const JEDEC_STAGES: [TemperatureStage; 4] = [
    TemperatureStage::new(0, 90, 150),
    TemperatureStage::new(90, 180, 200),
    TemperatureStage::new(180, 240, 250),
    TemperatureStage::new(240, 300, 30),
];

/// Built-in multi-stage profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProfileId {
    Jedec = 0,
}

impl ProfileId {
    pub fn stages(self) -> &'static [TemperatureStage] {
        match self {
            Self::Jedec => &JEDEC_STAGES,
        }
    }
}

impl TryFrom<u8> for ProfileId {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Jedec),
            _ => Err(Error::InvalidInputParameter),
        }
    }
}

/// A running profile: stages plus elapsed time and cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatingProfile {
    stages: heapless::Vec<TemperatureStage, MAX_STAGES>,
    elapsed_ms: u64,
    cursor: usize,
}

impl HeatingProfile {
    /// Stages must be non-empty, start at 0, have `from < to` and be
    /// contiguous.
    pub fn new(stages: &[TemperatureStage]) -> Result<Self> {
        let first = stages.first().ok_or(Error::InvalidInputParameter)?;
        if first.from_s != 0 {
            return Err(Error::InvalidInputParameter);
        }
        if stages.iter().any(|s| s.from_s >= s.to_s)
            || stages.windows(2).any(|w| w[0].to_s != w[1].from_s)
        {
            return Err(Error::InvalidInputParameter);
        }
        let stages = heapless::Vec::from_slice(stages).map_err(|()| Error::CollectionFull)?;
        Ok(Self {
            stages,
            elapsed_ms: 0,
            cursor: 0,
        })
    }

    /// Single stage `[0, duration_s)` at `target_c`.
    pub fn constant(target_c: u16, duration_s: u32) -> Result<Self> {
        if duration_s == 0 {
            return Err(Error::InvalidInputParameter);
        }
        Self::new(&[TemperatureStage::new(0, duration_s, target_c)])
    }

    pub fn builtin(id: ProfileId) -> Result<Self> {
        Self::new(id.stages())
    }

    /// Move the cursor forward to the stage containing the elapsed time.
    /// `None` once elapsed time is past the last stage.
    pub fn locate_stage(&mut self) -> Option<TemperatureStage> {
        let found = self.stages[self.cursor..]
            .iter()
            .position(|s| s.contains_ms(self.elapsed_ms))?;
        self.cursor += found;
        Some(self.stages[self.cursor])
    }

    pub fn advance(&mut self, ms: u32) {
        self.elapsed_ms += u64::from(ms);
    }

    pub fn elapsed_secs(&self) -> u32 {
        (self.elapsed_ms / 1000) as u32
    }

    /// Adjust elapsed time externally; the cursor stays where it is.
    pub fn set_elapsed_secs(&mut self, secs: u32) {
        self.elapsed_ms = u64::from(s_to_ms(secs));
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn reset(&mut self) {
        self.elapsed_ms = 0;
        self.cursor = 0;
    }

    pub fn stages(&self) -> &[TemperatureStage] {
        &self.stages
    }
}
