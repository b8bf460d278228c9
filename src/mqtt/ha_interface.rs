use serde::Serialize;


#[derive(Serialize)]
pub struct HaDevice {
    ids: String,
    name: String,
    manufacturer: String,
    model: String,
}

#[derive(Serialize)]
pub struct HaOrigin {
    pub name: String,
    pub sw_version: String,
    pub support_url: String,
}

fn is_none_str(value: &String) -> bool {
    if value.is_empty() || value == "NONE" {
        return true;
    }
    return false;
}

#[derive(Serialize)]
pub struct HaComponent {
    pub p: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub device_class: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub unit_of_measurement: String,
    pub value_template: String,
    pub unique_id: String,
    pub object_id: String,
    pub via_device: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub state_class: String,
}

impl HaComponent {
    pub fn new_energy(device: String, uof: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "energy".to_string(),
            unit_of_measurement: uof,
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("k2m_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: "total_increasing".to_string(),
            via_device: "k2m_management".to_string(),
         }
    }

    pub fn new_current(device: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "current".to_string(),
            unit_of_measurement: "A".to_string(),
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("k2m_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: "measurement".to_string(),
            via_device: "k2m_management".to_string(),
         }
    }

    pub fn new_power(device: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "power".to_string(),
            unit_of_measurement: "W".to_string(),
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("k2m_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: "measurement".to_string(),
            via_device: "k2m_management".to_string(),
         }
    }

    pub fn new_voltage(device: String, proto: String, name: String, json_key: String) -> Self {
        let safe_name= name.clone().replace(" ", "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name,
            device_class: "voltage".to_string(),
            unit_of_measurement: "V".to_string(),
            value_template: format!("{{{{ value_json.{json_key} }}}}"),
            unique_id: format!("k2m_{proto}_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}",).to_lowercase(),
            state_class: "measurement".to_string(),
            via_device: "k2m_management".to_string(),
         }
    }
}

#[derive(Serialize)]
pub struct HaDiscover {
    pub dev: HaDevice,
    pub o: HaOrigin,
    pub cmps: serde_json::Map<String, serde_json::Value>,
    pub state_topic: String,
    pub qos: u32,
    #[serde(skip_serializing)]
    pub discover_topic: String,
}

impl HaDiscover {
    pub fn new(name: String, manu: String, model: String, proto: String) -> Self {
        return HaDiscover {
            discover_topic: format!("homeassistant/device/k2m_{}-{}/config", proto.clone(), name.clone()),
            dev: HaDevice {
                ids: format!("k2m_{}_{}", proto.clone(), name.clone()),
                name: name.clone(),
                manufacturer: manu,
                model: model,
            },
            o: HaOrigin {
                name: "kaifa2mqtt".to_string(),
                sw_version: "0.1.0".to_string(),
                support_url: "https://github.com/kaifa2mqtt/kaifa2mqtt".to_string()
            },
            cmps: serde_json::Map::new(),
            state_topic: format!("kaifa2mqtt/devs/{}/{}", proto, name),
            qos: 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_value_template() {
        let c = HaComponent::new_current("meter".to_string(), "kaifa".to_string(), "Current L1".to_string(), "current_l1".to_string());
        assert_eq!(c.value_template, "{{ value_json.current_l1 }}");
        assert_eq!(c.unique_id, "k2m_kaifa_meter_current_l1");
    }

    #[test]
    fn test_discover_topics() {
        let d = HaDiscover::new("house".to_string(), "Kaifa".to_string(), "MA304H3E".to_string(), "Kaifa".to_string());
        assert_eq!(d.discover_topic, "homeassistant/device/k2m_Kaifa-house/config");
        assert_eq!(d.state_topic, "kaifa2mqtt/devs/Kaifa/house");
    }
}
