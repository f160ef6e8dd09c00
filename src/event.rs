//! Event types delivered to the accounting engine.
//!
//! Both producer tasks (sleep transitions and battery property changes)
//! decode their bus payloads into these types before pushing them into the
//! reducer inbox, keeping the engine free of any transport detail.

use crate::stats::ChargeState;
use std::collections::HashMap;
use zbus::zvariant::OwnedValue;

/// One item of the reducer inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Sleep(SleepEvent),
    Battery(BatteryUpdate),
}

/// Payload of the sleep-hook signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepEvent {
    pub stage: String,
    pub operation: String,
    pub extra: String,
}

/// Recognized properties of one UPower payload. Unrecognized keys are
/// dropped during decoding; a malformed value is treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryUpdate {
    pub state: Option<ChargeState>,
    pub energy_empty_wh: Option<f64>,
    pub energy_full_wh: Option<f64>,
    pub energy_wh: Option<f64>,
}

impl BatteryUpdate {
    /// Decode a UPower property map (full snapshot or change delta).
    pub fn from_properties(properties: &HashMap<String, OwnedValue>) -> Self {
        Self {
            state: get_u32(properties, "State").and_then(charge_state_from_upower),
            energy_empty_wh: get_f64(properties, "EnergyEmpty"),
            energy_full_wh: get_f64(properties, "EnergyFull"),
            energy_wh: get_f64(properties, "Energy"),
        }
    }

    /// True when the payload carried nothing the engine reacts to.
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.energy_empty_wh.is_none()
            && self.energy_full_wh.is_none()
            && self.energy_wh.is_none()
    }
}

/// Map the UPower `State` enumeration onto [`ChargeState`].
///
/// 1 is charging, 2 discharging, 4 and 5 (fully charged / empty) both count
/// as idle. Other values have no mapping and are ignored.
pub fn charge_state_from_upower(value: u32) -> Option<ChargeState> {
    match value {
        1 => Some(ChargeState::Charging),
        2 => Some(ChargeState::Discharging),
        4 | 5 => Some(ChargeState::Idle),
        _ => None,
    }
}

fn get_u32(properties: &HashMap<String, OwnedValue>, key: &str) -> Option<u32> {
    properties.get(key).and_then(|v| v.downcast_ref::<u32>().ok())
}

fn get_f64(properties: &HashMap<String, OwnedValue>, key: &str) -> Option<f64> {
    properties.get(key).and_then(|v| v.downcast_ref::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::Value;

    fn owned(value: Value<'_>) -> OwnedValue {
        value.try_to_owned().expect("owned value")
    }

    #[test]
    fn test_charge_state_mapping() {
        assert_eq!(charge_state_from_upower(1), Some(ChargeState::Charging));
        assert_eq!(charge_state_from_upower(2), Some(ChargeState::Discharging));
        assert_eq!(charge_state_from_upower(4), Some(ChargeState::Idle));
        assert_eq!(charge_state_from_upower(5), Some(ChargeState::Idle));
        assert_eq!(charge_state_from_upower(0), None);
        assert_eq!(charge_state_from_upower(3), None);
        assert_eq!(charge_state_from_upower(6), None);
    }

    #[test]
    fn test_decode_full_payload() {
        let mut props = HashMap::new();
        props.insert("State".to_string(), owned(Value::U32(2)));
        props.insert("EnergyEmpty".to_string(), owned(Value::F64(0.0)));
        props.insert("EnergyFull".to_string(), owned(Value::F64(100.0)));
        props.insert("Energy".to_string(), owned(Value::F64(80.0)));
        props.insert("Vendor".to_string(), owned(Value::from("ACME")));

        let update = BatteryUpdate::from_properties(&props);
        assert_eq!(update.state, Some(ChargeState::Discharging));
        assert_eq!(update.energy_empty_wh, Some(0.0));
        assert_eq!(update.energy_full_wh, Some(100.0));
        assert_eq!(update.energy_wh, Some(80.0));
    }

    #[test]
    fn test_decode_ignores_mistyped_values() {
        let mut props = HashMap::new();
        props.insert("Energy".to_string(), owned(Value::from("eighty")));
        props.insert("State".to_string(), owned(Value::F64(2.0)));

        let update = BatteryUpdate::from_properties(&props);
        assert!(update.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let update = BatteryUpdate::from_properties(&HashMap::new());
        assert!(update.is_empty());
    }
}
