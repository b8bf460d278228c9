use super::registry::MeterSlot;
use super::utils::get_u16_be;
use chrono::NaiveDateTime;

/// Meter-local wall-clock time as decoded from the 8-byte date/time block.
/// No timezone or DST information is on the wire; the fields are stored
/// verbatim. Month is 1-based, which is also chrono's convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeterTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl MeterTimestamp {
    /// Wire layout: year-high, year-low, month, day, weekday, hour, min, sec.
    pub fn from_bytes(data: &[u8]) -> Self {
        MeterTimestamp {
            year: get_u16_be(&data[0..2]),
            month: data[2],
            day: data[3],
            weekday: data[4],
            hour: data[5],
            minute: data[6],
            second: data[7],
        }
    }

    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        chrono::NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?
            .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }

    pub fn to_display(&self) -> String {
        match self.to_naive() {
            Some(dt) => dt.format("%Y-%m-%d - %H:%M:%S").to_string(),
            None => format!(
                "invalid meter time {}-{}-{} {}:{}:{}",
                self.year, self.month, self.day, self.hour, self.minute, self.second
            ),
        }
    }
}

/// The live measurement snapshot, overwritten register by register as
/// address/value pairs are decoded. Cleared to all-zero only on an external
/// reset request; the daily maxima and the day energy accumulator are
/// additionally reset at the midnight rollover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterState {
    pub timestamp: MeterTimestamp,
    /// Import at index 0, export at index 1.
    pub active_power: [u32; 2],
    pub reactive_power: [u32; 2],
    pub current: [u32; 3],
    pub max_current: [u32; 3],
    pub voltage: [u32; 3],
    pub active_energy: [u32; 2],
    pub reactive_energy: [u32; 2],
    /// Running sum of active-power-import samples since midnight. This is not
    /// time-integrated energy; the constant telegram interval is folded into
    /// the display scale.
    pub day_energy: u64,
}

impl MeterState {
    pub fn clear(&mut self) {
        *self = MeterState::default();
    }

    pub fn store(&mut self, slot: MeterSlot, raw: u32) {
        match slot {
            MeterSlot::ActivePowerIn => self.active_power[0] = raw,
            MeterSlot::ActivePowerOut => self.active_power[1] = raw,
            MeterSlot::ReactivePowerIn => self.reactive_power[0] = raw,
            MeterSlot::ReactivePowerOut => self.reactive_power[1] = raw,
            MeterSlot::CurrentL1 => self.current[0] = raw,
            MeterSlot::CurrentL2 => self.current[1] = raw,
            MeterSlot::CurrentL3 => self.current[2] = raw,
            MeterSlot::VoltageL1 => self.voltage[0] = raw,
            MeterSlot::VoltageL2 => self.voltage[1] = raw,
            MeterSlot::VoltageL3 => self.voltage[2] = raw,
            MeterSlot::ActiveEnergyIn => self.active_energy[0] = raw,
            MeterSlot::ActiveEnergyOut => self.active_energy[1] = raw,
            MeterSlot::ReactiveEnergyIn => self.reactive_energy[0] = raw,
            MeterSlot::ReactiveEnergyOut => self.reactive_energy[1] = raw,
        }
    }

    pub fn value(&self, slot: MeterSlot) -> u32 {
        match slot {
            MeterSlot::ActivePowerIn => self.active_power[0],
            MeterSlot::ActivePowerOut => self.active_power[1],
            MeterSlot::ReactivePowerIn => self.reactive_power[0],
            MeterSlot::ReactivePowerOut => self.reactive_power[1],
            MeterSlot::CurrentL1 => self.current[0],
            MeterSlot::CurrentL2 => self.current[1],
            MeterSlot::CurrentL3 => self.current[2],
            MeterSlot::VoltageL1 => self.voltage[0],
            MeterSlot::VoltageL2 => self.voltage[1],
            MeterSlot::VoltageL3 => self.voltage[2],
            MeterSlot::ActiveEnergyIn => self.active_energy[0],
            MeterSlot::ActiveEnergyOut => self.active_energy[1],
            MeterSlot::ReactiveEnergyIn => self.reactive_energy[0],
            MeterSlot::ReactiveEnergyOut => self.reactive_energy[1],
        }
    }
}

/// Transient decoder context carried across telegrams.
#[derive(Debug, Clone, Default)]
pub struct DecoderContext {
    /// Register index set by an address element, consumed by the very next
    /// value-bearing element and cleared by every other element type.
    pub pending_register: Option<usize>,
    /// Hour of the previous telegram, None until the first one was seen.
    pub last_hour: Option<u8>,
    /// Telegrams decoded since midnight, one tick per 10 seconds.
    pub sample_count: u32,
}

impl DecoderContext {
    /// Display-only time of day derived from the sample counter, independent
    /// of the meter's own clock.
    pub fn elapsed_time_of_day(&self) -> (u32, u32, u32) {
        let c = self.sample_count;
        (c / 360, (c / 6) % 60, (c % 6) * 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_from_bytes() {
        let ts = MeterTimestamp::from_bytes(&[0x07, 0xE3, 11, 28, 4, 21, 30, 15]);
        assert_eq!(ts.year, 2019);
        assert_eq!(ts.month, 11);
        assert_eq!(ts.day, 28);
        assert_eq!(ts.weekday, 4);
        assert_eq!(ts.hour, 21);
        assert_eq!(ts.minute, 30);
        assert_eq!(ts.second, 15);
        assert_eq!(ts.to_display(), "2019-11-28 - 21:30:15");
    }

    #[test]
    fn test_timestamp_invalid_date() {
        let ts = MeterTimestamp::from_bytes(&[0x07, 0xE3, 13, 40, 0, 0, 0, 0]);
        assert!(ts.to_naive().is_none());
    }

    #[test]
    fn test_store_and_value_roundtrip() {
        let mut state = MeterState::default();
        state.store(MeterSlot::CurrentL2, 1234);
        state.store(MeterSlot::ActiveEnergyOut, 99);
        assert_eq!(state.value(MeterSlot::CurrentL2), 1234);
        assert_eq!(state.current[1], 1234);
        assert_eq!(state.active_energy[1], 99);
    }

    #[test]
    fn test_clear() {
        let mut state = MeterState::default();
        state.store(MeterSlot::VoltageL3, 230);
        state.day_energy = 42;
        state.clear();
        assert_eq!(state, MeterState::default());
    }

    #[test]
    fn test_elapsed_time_of_day() {
        let mut ctx = DecoderContext::default();
        assert_eq!(ctx.elapsed_time_of_day(), (0, 0, 0));
        ctx.sample_count = 7; // 70 seconds
        assert_eq!(ctx.elapsed_time_of_day(), (0, 1, 10));
        ctx.sample_count = 360 * 3 + 6 * 15 + 2; // 3h 15m 20s
        assert_eq!(ctx.elapsed_time_of_day(), (3, 15, 20));
    }
}
