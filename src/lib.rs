//! kaifa2mqtt library
//!
//! Decodes the OBIS-tagged binary telegrams of Kaifa/Kamstrup HAN meters and
//! exports the measurements to MQTT.

pub mod models;
pub mod mqtt;
pub mod config;
pub mod metering_kaifa;

// Re-export common types for easier access
pub use mqtt::{CALLBACKS, MeteringData};
pub use config::CONFIG;
pub use metering_kaifa::{KaifaManager, KaifaParseError};

pub fn get_unix_ts() -> u64 {
    return std::time::SystemTime::now().duration_since(std::time::SystemTime::UNIX_EPOCH).unwrap().as_secs();
}
