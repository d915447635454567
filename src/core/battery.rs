//! JBD battery monitor data parsing
//! This module decodes the hardware info payload (command 0x03) into typed readings.

use log::warn;

use crate::core::bluetooth::types::BatteryTelemetry;

/// Shortest payload that still carries every fixed field.
pub const HARDWARE_INFO_MIN_LEN: usize = 23;

/// Temperatures are reported in 0.1 K
const KELVIN_OFFSET_DECI: i32 = 2731;

/// Decodes a hardware info payload.
///
/// Layout (offsets into DATA, multi-byte fields big-endian):
///
/// | Offset | Len | Field                                |
/// |--------|-----|--------------------------------------|
/// | 0      | 2   | Pack voltage, u16 × 0.01 V           |
/// | 2      | 2   | Current, i16 × 0.01 A                |
/// | 4      | 2   | Residual capacity, u16 × 0.01 Ah     |
/// | 6      | 2   | Nominal capacity, u16 × 0.01 Ah      |
/// | 8      | 2   | Cycle count                          |
/// | 19     | 1   | State of charge, %                   |
/// | 21     | 1   | Cell count                           |
/// | 22     | 1   | NTC count                            |
/// | 23     | 2·n | NTC readings, u16 × 0.1 K            |
///
/// Returns `None` when the payload is too short.
pub fn parse_hardware_info(data: &[u8]) -> Option<BatteryTelemetry> {
    if data.len() < HARDWARE_INFO_MIN_LEN {
        warn!("Hardware info frame too short: {} bytes", data.len());
        return None;
    }

    let u16_at = |offset: usize| u16::from_be_bytes([data[offset], data[offset + 1]]);

    let ntc_count = usize::from(data[22]);
    let temperatures = (0..ntc_count)
        .map(|n| 23 + n * 2)
        .take_while(|offset| offset + 1 < data.len())
        .map(|offset| (i32::from(u16_at(offset)) - KELVIN_OFFSET_DECI) as f32 * 0.1)
        .collect();

    Some(BatteryTelemetry {
        pack_voltage: f32::from(u16_at(0)) * 0.01,
        current: f32::from(u16_at(2) as i16) * 0.01,
        state_of_charge: data[19],
        residual_capacity: f32::from(u16_at(4)) * 0.01,
        nominal_capacity: f32::from(u16_at(6)) * 0.01,
        cycle_count: u16_at(8),
        cell_count: data[21],
        temperatures,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 52.10 V, -1.50 A, 80 %, 2 NTCs at 25.0 °C and 26.5 °C
    pub(crate) fn sample_payload() -> Vec<u8> {
        let mut data = vec![0u8; 27];
        data[0..2].copy_from_slice(&5210u16.to_be_bytes());
        data[2..4].copy_from_slice(&(-150i16).to_be_bytes());
        data[4..6].copy_from_slice(&4000u16.to_be_bytes());
        data[6..8].copy_from_slice(&5000u16.to_be_bytes());
        data[8..10].copy_from_slice(&12u16.to_be_bytes());
        data[19] = 80;
        data[21] = 14;
        data[22] = 2;
        data[23..25].copy_from_slice(&2981u16.to_be_bytes());
        data[25..27].copy_from_slice(&2996u16.to_be_bytes());
        data
    }

    #[test]
    fn decodes_scaled_fields() {
        let info = parse_hardware_info(&sample_payload()).unwrap();
        assert!((info.pack_voltage - 52.10).abs() < 1e-3);
        assert!((info.current + 1.50).abs() < 1e-3);
        assert!((info.residual_capacity - 40.0).abs() < 1e-3);
        assert!((info.nominal_capacity - 50.0).abs() < 1e-3);
        assert_eq!(info.cycle_count, 12);
        assert_eq!(info.state_of_charge, 80);
        assert_eq!(info.cell_count, 14);
        assert_eq!(info.temperatures.len(), 2);
        assert!((info.temperatures[0] - 25.0).abs() < 1e-3);
        assert!((info.temperatures[1] - 26.5).abs() < 1e-3);
    }

    #[test]
    fn short_payload_is_rejected() {
        assert!(parse_hardware_info(&[0u8; 22]).is_none());
    }

    #[test]
    fn truncated_temperature_block_keeps_complete_readings() {
        let mut data = sample_payload();
        data.truncate(26);
        let info = parse_hardware_info(&data).unwrap();
        assert_eq!(info.temperatures.len(), 1);
    }
}
