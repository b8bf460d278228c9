use super::registry::{descriptor_for, find_register, MeterSlot, RegisterDescriptor, HOURLY_MARKER, REGISTERS};
use super::state::{DecoderContext, MeterState, MeterTimestamp};
use super::utils::{format_address, get_u16_be, get_u32_be};
use super::KaifaParseError;
use log::debug;
use serde_json::json;

// Element tags of the Kaifa/Kamstrup HAN stream.
const TAG_VISIBLE_STRING: u8 = 0x0A;
const TAG_DATETIME: u8 = 0x0C;
const TAG_OCTET_STRING: u8 = 0x09;
const TAG_U32: u8 = 0x06;
const TAG_U16: u8 = 0x12;

/// Byte that must follow the header timestamp block.
const STRUCTURE_MARKER: u8 = 0x02;

/// The 0x06/0x12 tags carry no length byte on the wire; the payload width is
/// fixed per tag and any shorter buffer is a framing fault.
const U32_ELEMENT_LEN: usize = 5;
const U16_ELEMENT_LEN: usize = 3;

/// Decoder for one meter: the live measurement state plus the cross-telegram
/// context. Single caller, run-to-completion per telegram; the caller
/// serializes if it ever decodes from more than one task.
#[derive(Debug, Default)]
pub struct KaifaDecoder {
    pub meter: MeterState,
    pub ctx: DecoderContext,
}

impl KaifaDecoder {
    pub fn new() -> Self {
        KaifaDecoder::default()
    }

    /// Decodes one complete telegram: header timestamp, midnight rollover,
    /// the count-prefixed element list, then the daily aggregates. On error
    /// the telegram is abandoned; registers already written stay as they are
    /// and are overwritten again by the next telegram.
    pub fn decode_telegram(&mut self, data: &[u8]) -> Result<(), KaifaParseError> {
        if data.len() < 9 {
            return Err(KaifaParseError::TruncatedTelegram);
        }

        // The header is a length-prefixed block with the telegram timestamp.
        let header_len = data[0] as usize;
        self.meter.timestamp = MeterTimestamp::from_bytes(&data[1..9]);
        debug!("telegram time {}", self.meter.timestamp.to_display());

        let hour = self.meter.timestamp.hour;
        let prev_hour = self.ctx.last_hour.replace(hour);
        if prev_hour == Some(23) && hour == 0 {
            debug!("midnight rollover, resetting daily aggregates");
            self.meter.max_current = [0; 3];
            self.meter.day_energy = 0;
            self.ctx.sample_count = 0;
        }

        let mut pos = header_len + 1;
        if pos + 1 >= data.len() {
            return Err(KaifaParseError::TruncatedTelegram);
        }
        if data[pos] != STRUCTURE_MARKER {
            return Err(KaifaParseError::MalformedFrame(data[pos]));
        }
        let element_count = data[pos + 1];
        pos += 2;

        self.ctx.pending_register = None;
        for s in 0..element_count {
            if pos >= data.len() {
                return Err(KaifaParseError::TruncatedTelegram);
            }
            debug!("element {}/{} at offset {}", s + 1, element_count, pos);
            pos += self.decode_element(&data[pos..])?;
        }

        for i in 0..3 {
            if self.meter.current[i] > self.meter.max_current[i] {
                self.meter.max_current[i] = self.meter.current[i];
            }
        }
        self.meter.day_energy += self.meter.active_power[0] as u64;

        let (h, m, s) = self.ctx.elapsed_time_of_day();
        self.ctx.sample_count = self.ctx.sample_count.wrapping_add(1);
        debug!("telegram decoded, [{:02}:{:02}:{:02}] since midnight", h, m, s);

        Ok(())
    }

    /// Decodes one self-describing element and returns how many bytes it
    /// occupied, tag and length byte included.
    pub fn decode_element(&mut self, data: &[u8]) -> Result<usize, KaifaParseError> {
        let tag = data[0];
        match tag {
            TAG_VISIBLE_STRING => {
                let len = *data.get(1).ok_or(KaifaParseError::TruncatedElement(tag))? as usize;
                if data.len() < len + 2 {
                    return Err(KaifaParseError::TruncatedElement(tag));
                }
                let text = String::from_utf8_lossy(&data[2..2 + len]);
                match self.ctx.pending_register.take() {
                    Some(idx) => debug!("{}: {}", REGISTERS[idx].name, text),
                    None => debug!("string element: {}", text),
                }
                Ok(len + 2)
            }
            TAG_DATETIME => {
                let len = *data.get(1).ok_or(KaifaParseError::TruncatedElement(tag))?;
                if len != 8 {
                    return Err(KaifaParseError::BadTimestampLength(len));
                }
                if data.len() < 10 {
                    return Err(KaifaParseError::TruncatedElement(tag));
                }
                self.meter.timestamp = MeterTimestamp::from_bytes(&data[2..10]);
                debug!("time element {}", self.meter.timestamp.to_display());
                Ok(len as usize + 2)
            }
            TAG_OCTET_STRING => {
                let len = *data.get(1).ok_or(KaifaParseError::TruncatedElement(tag))? as usize;
                if data.len() < len + 2 {
                    return Err(KaifaParseError::TruncatedElement(tag));
                }
                self.ctx.pending_register = None;
                if len == 6 {
                    let candidate = &data[2..8];
                    if let Some(idx) = find_register(candidate) {
                        self.ctx.pending_register = Some(idx);
                        debug!("address {} -> {}", format_address(candidate), REGISTERS[idx].name);
                    } else if HOURLY_MARKER.matches(candidate) {
                        // Periodic marker, keep it out of the sample count.
                        self.ctx.sample_count = self.ctx.sample_count.wrapping_sub(1);
                        debug!("hourly marker {}", format_address(candidate));
                    } else {
                        debug!("unmatched address {}", format_address(candidate));
                    }
                } else {
                    debug!("octet string ({} bytes): {}", len, hex::encode(&data[2..2 + len]));
                }
                Ok(len + 2)
            }
            TAG_U32 => {
                if data.len() < U32_ELEMENT_LEN {
                    return Err(KaifaParseError::TruncatedElement(tag));
                }
                self.apply_value(get_u32_be(&data[1..5]));
                Ok(U32_ELEMENT_LEN)
            }
            TAG_U16 => {
                if data.len() < U16_ELEMENT_LEN {
                    return Err(KaifaParseError::TruncatedElement(tag));
                }
                self.apply_value(get_u16_be(&data[1..3]) as u32);
                Ok(U16_ELEMENT_LEN)
            }
            other => Err(KaifaParseError::UnknownElementTag(other)),
        }
    }

    /// Writes a decoded value into the register a preceding address element
    /// selected, consuming the pending index either way.
    fn apply_value(&mut self, raw: u32) {
        match self.ctx.pending_register.take() {
            Some(idx) => {
                let reg = &REGISTERS[idx];
                if let Some(slot) = reg.slot {
                    self.meter.store(slot, raw);
                }
                debug!("{}", render_register(reg, raw));
            }
            None => debug!("value element without address: {}", raw),
        }
    }

    /// Register value scaled by its divisor (raw when the divisor is 0).
    pub fn scaled(&self, slot: MeterSlot) -> f64 {
        let reg = descriptor_for(slot);
        let raw = self.meter.value(slot) as f64;
        if reg.divisor > 0.0 {
            raw / reg.divisor
        } else {
            raw
        }
    }

    /// The compact outbound status message: per-phase current and daily max
    /// (2 decimals), instantaneous import power, day total and the
    /// pass-through signal strength.
    pub fn snapshot(&self, rssi: i32) -> serde_json::Map<String, serde_json::Value> {
        let divisor = descriptor_for(MeterSlot::CurrentL1).divisor;
        let mut msg = serde_json::Map::new();
        for i in 0..3 {
            msg.insert(format!("l{}", i + 1), json!(round2(self.meter.current[i] as f64 / divisor)));
            msg.insert(format!("m{}", i + 1), json!(round2(self.meter.max_current[i] as f64 / divisor)));
        }
        msg.insert("p".to_string(), json!(self.meter.active_power[0]));
        msg.insert("ptot".to_string(), json!(self.meter.day_energy));
        msg.insert("rssi".to_string(), json!(rssi));
        msg
    }

    /// All backed registers, scaled, for the full metering record.
    pub fn metering_values(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut values = serde_json::Map::new();
        for reg in REGISTERS.iter() {
            if let Some(slot) = reg.slot {
                let raw = self.meter.value(slot);
                if reg.divisor > 0.0 {
                    values.insert(reg.name.to_string(), json!(round2(raw as f64 / reg.divisor)));
                } else {
                    values.insert(reg.name.to_string(), json!(raw));
                }
            }
        }
        values.insert("day_energy".to_string(), json!(self.meter.day_energy));
        values.insert("meter_time".to_string(), json!(self.meter.timestamp.to_display()));
        let (h, m, s) = self.ctx.elapsed_time_of_day();
        values.insert("sample_time".to_string(), json!(format!("{:02}:{:02}:{:02}", h, m, s)));
        values
    }
}

fn render_register(reg: &RegisterDescriptor, raw: u32) -> String {
    let unit = reg.unit.unwrap_or("");
    if reg.divisor > 0.0 {
        format!("{}: {:.2}{}", reg.name, raw as f64 / reg.divisor, unit)
    } else {
        format!("{}: {}{}", reg.name, raw, unit)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(obis: [u8; 6]) -> Vec<u8> {
        let mut e = vec![TAG_OCTET_STRING, 6];
        e.extend_from_slice(&obis);
        e
    }

    fn value_u32(val: u32) -> Vec<u8> {
        let mut e = vec![TAG_U32];
        e.extend_from_slice(&val.to_be_bytes());
        e
    }

    fn value_u16(val: u16) -> Vec<u8> {
        let mut e = vec![TAG_U16];
        e.extend_from_slice(&val.to_be_bytes());
        e
    }

    fn telegram(hour: u8, elements: &[Vec<u8>]) -> Vec<u8> {
        let mut t = vec![8, 0x07, 0xE3, 3, 14, 5, hour, 30, 0];
        t.push(STRUCTURE_MARKER);
        t.push(elements.len() as u8);
        for e in elements {
            t.extend_from_slice(e);
        }
        t
    }

    #[test]
    fn test_header_timestamp() {
        let mut dec = KaifaDecoder::new();
        dec.decode_telegram(&telegram(21, &[])).unwrap();
        assert_eq!(dec.meter.timestamp.year, 2019);
        assert_eq!(dec.meter.timestamp.hour, 21);
        assert_eq!(dec.ctx.last_hour, Some(21));
        assert_eq!(dec.ctx.sample_count, 1);
    }

    #[test]
    fn test_address_value_pair() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(12, &[address([1, 1, 1, 7, 0, 255]), value_u32(100)]);
        dec.decode_telegram(&t).unwrap();
        // Divisor 0, stored as the raw integer.
        assert_eq!(dec.meter.active_power[0], 100);
        assert_eq!(dec.ctx.pending_register, None);
    }

    #[test]
    fn test_u16_value_element() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(12, &[address([1, 1, 32, 7, 0, 255]), value_u16(230)]);
        dec.decode_telegram(&t).unwrap();
        assert_eq!(dec.meter.voltage[0], 230);
    }

    #[test]
    fn test_value_after_unmatched_address_updates_nothing() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(12, &[address([9, 9, 9, 9, 9, 255]), value_u32(100)]);
        dec.decode_telegram(&t).unwrap();
        assert_eq!(dec.meter, MeterState { timestamp: dec.meter.timestamp, day_energy: 0, ..Default::default() });
    }

    #[test]
    fn test_second_address_discards_first() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(
            12,
            &[address([1, 1, 31, 7, 0, 255]), address([1, 1, 1, 7, 0, 255]), value_u32(100)],
        );
        dec.decode_telegram(&t).unwrap();
        assert_eq!(dec.meter.active_power[0], 100);
        assert_eq!(dec.meter.current[0], 0);
    }

    #[test]
    fn test_visible_string_clears_pending() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(
            12,
            &[address([1, 1, 0, 0, 5, 255]), vec![TAG_VISIBLE_STRING, 4, b'6', b'9', b'7', b'0'], value_u32(77)],
        );
        dec.decode_telegram(&t).unwrap();
        // The string consumed the pending index, the value had no target left.
        assert_eq!(dec.meter.active_power[0], 0);
        assert_eq!(dec.meter.current, [0; 3]);
    }

    #[test]
    fn test_datetime_element_keeps_pending_untouched() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(
            12,
            &[
                address([1, 1, 1, 7, 0, 255]),
                vec![TAG_DATETIME, 8, 0x07, 0xE3, 3, 14, 5, 13, 45, 30],
                value_u32(250),
            ],
        );
        dec.decode_telegram(&t).unwrap();
        assert_eq!(dec.meter.timestamp.minute, 45);
        assert_eq!(dec.meter.active_power[0], 250);
    }

    #[test]
    fn test_datetime_element_bad_length() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(12, &[vec![TAG_DATETIME, 7, 0, 0, 0, 0, 0, 0, 0]]);
        assert!(matches!(dec.decode_telegram(&t), Err(KaifaParseError::BadTimestampLength(7))));
    }

    #[test]
    fn test_non_address_octet_string_is_diagnostic_only() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(
            12,
            &[address([1, 1, 1, 7, 0, 255]), vec![TAG_OCTET_STRING, 3, 0xAA, 0xBB, 0xCC], value_u32(123)],
        );
        dec.decode_telegram(&t).unwrap();
        // The odd-length octet string cleared the pending index.
        assert_eq!(dec.meter.active_power[0], 0);
    }

    #[test]
    fn test_unknown_tag_is_fatal() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(12, &[vec![0x42, 1, 2]]);
        assert!(matches!(dec.decode_telegram(&t), Err(KaifaParseError::UnknownElementTag(0x42))));
    }

    #[test]
    fn test_bad_marker_leaves_registers_untouched() {
        let mut dec = KaifaDecoder::new();
        dec.decode_telegram(&telegram(12, &[address([1, 1, 31, 7, 0, 255]), value_u32(500)])).unwrap();
        let before = dec.meter.clone();

        let mut bad = telegram(12, &[address([1, 1, 31, 7, 0, 255]), value_u32(999)]);
        bad[9] = 0x03;
        assert!(matches!(dec.decode_telegram(&bad), Err(KaifaParseError::MalformedFrame(0x03))));
        assert_eq!(dec.meter, before);
    }

    #[test]
    fn test_truncated_element_is_fatal() {
        let mut dec = KaifaDecoder::new();
        let mut t = telegram(12, &[address([1, 1, 31, 7, 0, 255])]);
        t.truncate(t.len() - 2);
        assert!(matches!(dec.decode_telegram(&t), Err(KaifaParseError::TruncatedElement(TAG_OCTET_STRING))));
    }

    #[test]
    fn test_midnight_rollover_sequence() {
        let mut dec = KaifaDecoder::new();
        let current = |raw| vec![address([1, 1, 31, 7, 0, 255]), value_u32(raw)];
        let power = |raw| vec![address([1, 1, 1, 7, 0, 255]), value_u32(raw)];

        for hour in [21, 22] {
            let mut elems = current(500);
            elems.extend(power(100));
            dec.decode_telegram(&telegram(hour, &elems)).unwrap();
        }
        assert_eq!(dec.meter.max_current[0], 500);
        assert_eq!(dec.meter.day_energy, 200);
        assert_eq!(dec.ctx.sample_count, 2);

        let mut elems = current(400);
        elems.extend(power(100));
        dec.decode_telegram(&telegram(23, &elems)).unwrap();
        assert_eq!(dec.meter.max_current[0], 500);
        assert_eq!(dec.meter.day_energy, 300);

        // Hour 23 -> 0: maxima, day energy and sample counter start over.
        let mut elems = current(300);
        elems.extend(power(100));
        dec.decode_telegram(&telegram(0, &elems)).unwrap();
        assert_eq!(dec.meter.max_current[0], 300);
        assert_eq!(dec.meter.day_energy, 100);
        assert_eq!(dec.ctx.sample_count, 1);

        // No second reset on the next hour-0-adjacent telegram.
        dec.decode_telegram(&telegram(1, &current(200))).unwrap();
        assert_eq!(dec.meter.max_current[0], 300);
        assert_eq!(dec.ctx.sample_count, 2);
    }

    #[test]
    fn test_no_midnight_on_first_telegram() {
        let mut dec = KaifaDecoder::new();
        dec.meter.max_current = [700, 0, 0];
        dec.decode_telegram(&telegram(0, &[])).unwrap();
        assert_eq!(dec.meter.max_current[0], 700);
    }

    #[test]
    fn test_hourly_marker_not_counted() {
        let mut dec = KaifaDecoder::new();
        dec.ctx.sample_count = 5;
        let mut marker = vec![TAG_OCTET_STRING, 6];
        marker.extend_from_slice(&[0, 1, 1, 0, 0, 255]);
        dec.decode_telegram(&telegram(12, &[marker])).unwrap();
        // Marker decrement and telegram increment cancel out.
        assert_eq!(dec.ctx.sample_count, 5);
    }

    #[test]
    fn test_snapshot_scaling() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(12, &[address([1, 1, 31, 7, 0, 255]), value_u32(12345)]);
        dec.decode_telegram(&t).unwrap();

        let snapshot = dec.snapshot(-70);
        assert_eq!(snapshot["l1"], json!(123.45));
        assert_eq!(snapshot["m1"], json!(123.45));
        assert_eq!(snapshot["rssi"], json!(-70));
        let rendered = serde_json::Value::Object(snapshot).to_string();
        assert!(rendered.contains("123.45"), "rendered: {rendered}");
    }

    #[test]
    fn test_metering_values() {
        let mut dec = KaifaDecoder::new();
        let t = telegram(
            12,
            &[
                address([1, 1, 1, 7, 0, 255]),
                value_u32(100),
                address([1, 1, 51, 7, 0, 255]),
                value_u32(250),
            ],
        );
        dec.decode_telegram(&t).unwrap();
        let values = dec.metering_values();
        assert_eq!(values["active_power_in"], json!(100));
        assert_eq!(values["current_l2"], json!(2.5));
        assert_eq!(values["day_energy"], json!(100));
        assert_eq!(values["meter_time"], json!("2019-03-14 - 12:30:00"));
        assert_eq!(values["sample_time"], json!("00:00:10"));
    }
}
