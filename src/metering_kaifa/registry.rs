/// 6-byte OBIS object identifier as sent on the HAN port. The 6th byte is a
/// wildcard/terminator (0xFF on the wire) and never takes part in comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObisId(pub [u8; 6]);

impl ObisId {
    pub const fn new(medium: u8, channel: u8, indicator: u8, mode: u8, tariff: u8) -> Self {
        ObisId([medium, channel, indicator, mode, tariff, 255])
    }

    /// First 5 bytes only, byte-for-byte.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        candidate.len() >= 5 && self.0[..5] == candidate[..5]
    }

    pub fn to_dotted(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}.{}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Which `MeterState` field a register writes to. Informational registers
/// (RTC, meter id, meter type) carry no slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterSlot {
    ActivePowerIn,
    ActivePowerOut,
    ReactivePowerIn,
    ReactivePowerOut,
    CurrentL1,
    CurrentL2,
    CurrentL3,
    VoltageL1,
    VoltageL2,
    VoltageL3,
    ActiveEnergyIn,
    ActiveEnergyOut,
    ReactiveEnergyIn,
    ReactiveEnergyOut,
}

pub struct RegisterDescriptor {
    pub obis: ObisId,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    /// 0.0 means the raw integer is used unscaled.
    pub divisor: f64,
    pub slot: Option<MeterSlot>,
}

/// The fixed register table of the Kaifa/Kamstrup HAN telegram. Order is the
/// order the meter emits them in; lookup is first match.
pub static REGISTERS: [RegisterDescriptor; 17] = [
    RegisterDescriptor { obis: ObisId::new(0, 1, 1, 0, 9), name: "rtc", unit: None, divisor: 0.0, slot: None },
    RegisterDescriptor { obis: ObisId::new(1, 1, 0, 0, 5), name: "meter_id", unit: None, divisor: 0.0, slot: None },
    RegisterDescriptor { obis: ObisId::new(1, 1, 96, 1, 1), name: "meter_type", unit: None, divisor: 0.0, slot: None },
    RegisterDescriptor { obis: ObisId::new(1, 1, 1, 7, 0), name: "active_power_in", unit: Some("W"), divisor: 0.0, slot: Some(MeterSlot::ActivePowerIn) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 2, 7, 0), name: "active_power_out", unit: Some("W"), divisor: 0.0, slot: Some(MeterSlot::ActivePowerOut) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 3, 7, 0), name: "reactive_power_in", unit: Some("var"), divisor: 0.0, slot: Some(MeterSlot::ReactivePowerIn) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 4, 7, 0), name: "reactive_power_out", unit: Some("var"), divisor: 0.0, slot: Some(MeterSlot::ReactivePowerOut) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 31, 7, 0), name: "current_l1", unit: Some("A"), divisor: 100.0, slot: Some(MeterSlot::CurrentL1) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 51, 7, 0), name: "current_l2", unit: Some("A"), divisor: 100.0, slot: Some(MeterSlot::CurrentL2) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 71, 7, 0), name: "current_l3", unit: Some("A"), divisor: 100.0, slot: Some(MeterSlot::CurrentL3) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 32, 7, 0), name: "voltage_l1", unit: Some("V"), divisor: 0.0, slot: Some(MeterSlot::VoltageL1) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 52, 7, 0), name: "voltage_l2", unit: Some("V"), divisor: 0.0, slot: Some(MeterSlot::VoltageL2) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 72, 7, 0), name: "voltage_l3", unit: Some("V"), divisor: 0.0, slot: Some(MeterSlot::VoltageL3) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 1, 8, 0), name: "active_energy_in", unit: Some("kWh"), divisor: 0.0, slot: Some(MeterSlot::ActiveEnergyIn) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 2, 8, 0), name: "active_energy_out", unit: Some("kWh"), divisor: 0.0, slot: Some(MeterSlot::ActiveEnergyOut) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 3, 8, 0), name: "reactive_energy_in", unit: Some("kvarh"), divisor: 0.0, slot: Some(MeterSlot::ReactiveEnergyIn) },
    RegisterDescriptor { obis: ObisId::new(1, 1, 4, 8, 0), name: "reactive_energy_out", unit: Some("kvarh"), divisor: 0.0, slot: Some(MeterSlot::ReactiveEnergyOut) },
];

/// Periodic marker the meter sends once an hour. It carries no measurement
/// and must not count toward the sample counter.
pub static HOURLY_MARKER: ObisId = ObisId::new(0, 1, 1, 0, 0);

/// Linear scan over the register table, first match wins.
pub fn find_register(candidate: &[u8]) -> Option<usize> {
    REGISTERS.iter().position(|r| r.obis.matches(candidate))
}

/// Descriptor lookup by target slot, for scaling on the publish side.
pub fn descriptor_for(slot: MeterSlot) -> &'static RegisterDescriptor {
    REGISTERS
        .iter()
        .find(|r| r.slot == Some(slot))
        .expect("every MeterSlot has a register entry")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_known_registers() {
        assert_eq!(find_register(&[1, 1, 1, 7, 0, 255]), Some(3));
        assert_eq!(find_register(&[1, 1, 31, 7, 0, 255]), Some(7));
        assert_eq!(find_register(&[1, 1, 4, 8, 0, 255]), Some(16));
    }

    #[test]
    fn test_sixth_byte_is_wildcard() {
        assert_eq!(find_register(&[1, 1, 1, 7, 0, 0]), Some(3));
        assert_eq!(find_register(&[1, 1, 1, 7, 0, 42]), Some(3));
    }

    #[test]
    fn test_find_unknown_register() {
        assert_eq!(find_register(&[9, 9, 9, 9, 9, 255]), None);
        assert_eq!(find_register(&[1, 1]), None);
    }

    #[test]
    fn test_every_register_found_by_its_own_id() {
        for (i, reg) in REGISTERS.iter().enumerate() {
            assert_eq!(find_register(&reg.obis.0), Some(i), "register {}", reg.name);
        }
    }

    #[test]
    fn test_hourly_marker_is_not_a_register() {
        assert!(HOURLY_MARKER.matches(&[0, 1, 1, 0, 0, 255]));
        assert_eq!(find_register(&[0, 1, 1, 0, 0, 255]), None);
    }

    #[test]
    fn test_dotted_format() {
        assert_eq!(ObisId::new(1, 1, 31, 7, 0).to_dotted(), "1.1.31.7.0.255");
    }

    #[test]
    fn test_descriptor_for_slot() {
        let reg = descriptor_for(MeterSlot::CurrentL2);
        assert_eq!(reg.name, "current_l2");
        assert_eq!(reg.divisor, 100.0);
    }
}
