use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeviceProtocol {
    Unknown,
    Kaifa,
}

impl DeviceProtocol {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Kaifa" => Some(DeviceProtocol::Kaifa),
            _ => Some(DeviceProtocol::Unknown),
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            DeviceProtocol::Kaifa => "Kaifa".to_string(),
            DeviceProtocol::Unknown => "Unknown".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_roundtrip() {
        assert_eq!(DeviceProtocol::from_str("Kaifa"), Some(DeviceProtocol::Kaifa));
        assert_eq!(DeviceProtocol::from_str("whatever"), Some(DeviceProtocol::Unknown));
        assert_eq!(DeviceProtocol::Kaifa.to_string(), "Kaifa");
    }
}
