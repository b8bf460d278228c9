use crate::config::ConfigBases;
use crate::models::DeviceProtocol;
use crate::mqtt::ha_interface::{HaComponent, HaDiscover};
use crate::mqtt::{MeteringData, PublishData, SubscribeData, Transmission};
use crate::{get_config_or_panic, get_unix_ts, CONFIG};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc::Sender;

pub mod crc;
pub mod decoder;
pub mod registry;
pub mod state;
pub mod utils;

use decoder::KaifaDecoder;

/// Custom error types for Kaifa telegram decoding
#[derive(Error, Debug)]
pub enum KaifaParseError {
    #[error("structure marker 0x02 missing, found {0:#04x}")]
    MalformedFrame(u8),
    #[error("unrecognized element tag {0:#04x}")]
    UnknownElementTag(u8),
    #[error("date/time element declares {0} payload bytes, expected 8")]
    BadTimestampLength(u8),
    #[error("telegram too short for the header")]
    TruncatedTelegram,
    #[error("telegram ends inside a {0:#04x} element")]
    TruncatedElement(u8),
    #[error("checksum mismatch (expected {expected:#06x}, found {found:#06x})")]
    ChecksumMismatch { expected: u16, found: u16 },
}

pub struct KaifaManager {
    sender: Sender<Transmission>,
    decoder: KaifaDecoder,
    meter_name: String,
    verify_crc: bool,
    rssi: i32,
}

impl KaifaManager {
    pub fn new(sender: Sender<Transmission>) -> Self {
        KaifaManager {
            sender,
            decoder: KaifaDecoder::new(),
            meter_name: "kaifa".to_string(),
            verify_crc: false,
            rssi: 0,
        }
    }

    pub async fn start_thread(&mut self) {
        info!("Starting Kaifa thread");

        let conf = get_config_or_panic!("kaifa", ConfigBases::Kaifa);
        self.meter_name = conf.name;
        self.verify_crc = conf.verify_crc;

        /* One subscription per topic: raw telegrams, signal strength, commands */
        let (telegram_sender, mut telegram_receiver) = tokio::sync::mpsc::channel(10);
        let _ = self
            .sender
            .send(Transmission::Subscribe(SubscribeData {
                topic: "kaifa_input".to_string(),
                sender: telegram_sender,
            }))
            .await;

        let (rssi_sender, mut rssi_receiver) = tokio::sync::mpsc::channel(10);
        let _ = self
            .sender
            .send(Transmission::Subscribe(SubscribeData {
                topic: "kaifa_rssi".to_string(),
                sender: rssi_sender,
            }))
            .await;

        let (command_sender, mut command_receiver) = tokio::sync::mpsc::channel(10);
        let _ = self
            .sender
            .send(Transmission::Subscribe(SubscribeData {
                topic: "kaifa_command".to_string(),
                sender: command_sender,
            }))
            .await;

        self.announce_discovery().await;

        info!("Starting Kaifa waiting for messages");
        loop {
            tokio::select! {
                payload = telegram_receiver.recv() => {
                    let Some(payload) = payload else { break };
                    let raw = match hex::decode(payload.trim()) {
                        Ok(d) => d,
                        Err(_) => {
                            error!("Non hex string received: {payload}");
                            continue;
                        }
                    };
                    if let Err(e) = self.handle_telegram(&raw).await {
                        error!("Kaifa telegram can not be decoded: {e}");
                    }
                },
                value = rssi_receiver.recv() => {
                    let Some(value) = value else { break };
                    match value.trim().parse::<i32>() {
                        Ok(v) => self.rssi = v,
                        Err(_) => warn!("Ignoring non numeric rssi value: {value}"),
                    }
                },
                command = command_receiver.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(&command);
                },
            }
        }
    }

    /// Decodes one telegram and publishes the compact snapshot plus the full
    /// metering record. Exactly one publish pair per successful decode.
    async fn handle_telegram(&mut self, raw: &[u8]) -> Result<(), KaifaParseError> {
        debug!("Received Kaifa telegram with {} bytes", raw.len());

        /*
            Some acquisition firmwares forward the trailing link checksum,
            others strip it before publishing.
        */
        let telegram: &[u8] = if self.verify_crc {
            match crc::verify_trailing(raw) {
                Ok(body) => body,
                Err((expected, found)) => {
                    return Err(KaifaParseError::ChecksumMismatch { expected, found })
                }
            }
        } else {
            raw
        };

        self.decoder.decode_telegram(telegram)?;

        let snapshot = self.decoder.snapshot(self.rssi);
        let _ = self
            .sender
            .send(Transmission::Publish(PublishData {
                topic: format!("kaifa2mqtt/current/{}", self.meter_name),
                payload: serde_json::Value::Object(snapshot).to_string(),
                qos: 1,
                retain: false,
            }))
            .await;

        let mut mr = MeteringData::new().unwrap();
        mr.protocol = DeviceProtocol::Kaifa;
        mr.id = format!("kaifa-{}", self.meter_name);
        mr.meter_name = self.meter_name.clone();
        mr.transmission_time = get_unix_ts();
        mr.metered_time = mr.transmission_time;
        mr.metered_values = self.decoder.metering_values();
        let _ = self.sender.send(Transmission::Metering(mr)).await;

        Ok(())
    }

    fn handle_command(&mut self, command: &str) {
        match command.trim() {
            "reset" => {
                info!("Reset requested, clearing meter state");
                self.decoder.meter.clear();
            }
            other => warn!("Unknown Kaifa command: {other}"),
        }
    }

    /// Home Assistant discovery for the meter, announced once on startup.
    async fn announce_discovery(&self) {
        /* The proto here must match the Debug rendering of DeviceProtocol,
        it is part of the devs state topic */
        let mut disc = HaDiscover::new(
            self.meter_name.clone(),
            "Kaifa".to_string(),
            "MA304H3E".to_string(),
            format!("{:?}", DeviceProtocol::Kaifa),
        );

        let phase_keys = [("L1", "current_l1"), ("L2", "current_l2"), ("L3", "current_l3")];
        for (phase, key) in phase_keys {
            let c = HaComponent::new_current(
                self.meter_name.clone(),
                "kaifa".to_string(),
                format!("Current {phase}"),
                key.to_string(),
            );
            disc.cmps.insert(key.to_string(), serde_json::to_value(&c).unwrap());
        }

        let power = HaComponent::new_power(
            self.meter_name.clone(),
            "kaifa".to_string(),
            "Active Power In".to_string(),
            "active_power_in".to_string(),
        );
        disc.cmps.insert("active_power_in".to_string(), serde_json::to_value(&power).unwrap());

        let energy = HaComponent::new_energy(
            self.meter_name.clone(),
            "Wh".to_string(),
            "kaifa".to_string(),
            "Day Energy".to_string(),
            "day_energy".to_string(),
        );
        disc.cmps.insert("day_energy".to_string(), serde_json::to_value(&energy).unwrap());

        let voltage_keys = [("L1", "voltage_l1"), ("L2", "voltage_l2"), ("L3", "voltage_l3")];
        for (phase, key) in voltage_keys {
            let c = HaComponent::new_voltage(
                self.meter_name.clone(),
                "kaifa".to_string(),
                format!("Voltage {phase}"),
                key.to_string(),
            );
            disc.cmps.insert(key.to_string(), serde_json::to_value(&c).unwrap());
        }

        let _ = self.sender.send(Transmission::AutoDiscovery(disc)).await;
    }
}
