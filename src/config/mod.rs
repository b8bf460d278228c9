use lazy_static::lazy_static;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_yml;
use std::error::Error;
use std::fs::{self, File};
use std::io::prelude::*;
use std::sync::RwLock;

fn mqtt_client_name_default() -> String { return "kaifa2mqtt".to_string() }

#[derive(Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub ha_enabled: bool,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
}

fn kaifa_name_default() -> String { return "kaifa".to_string() }
fn kaifa_verify_crc_default() -> bool { return false }

#[derive(Deserialize, Serialize, Clone)]
pub struct KaifaConfig {
    #[serde(default="kaifa_name_default")]
    pub name: String,
    /* Set when the acquisition firmware forwards the trailing CRC16 */
    #[serde(default="kaifa_verify_crc_default")]
    pub verify_crc: bool,
}

#[derive(Deserialize, Serialize, Clone, PartialEq)]
pub enum ConfigOperation {
    ADD,
    DELETE,
    CHANGE
}

#[derive(Deserialize, Serialize, Clone)]
pub struct ConfigChange {
    pub operation: ConfigOperation,
    pub base: String, /* This is like mqtt, kaifa and so on */
}

#[derive(Clone)]
pub struct Callbacks {
    sender: tokio::sync::broadcast::Sender<ConfigChange>,
}

fn kaifa_default() -> KaifaConfig { return KaifaConfig { name: kaifa_name_default(), verify_crc: kaifa_verify_crc_default() } }

#[derive(Deserialize, Serialize, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    #[serde(default="kaifa_default")]
    pub kaifa: KaifaConfig,
}

pub struct ConfigHolder {
    pub config: Config,
    pub callbacks: Callbacks,
    pub dirty: bool,
    pub lock: RwLock<bool>,
    pub base_path: String,
}

pub enum ConfigBases {
    Mqtt(MqttConfig),
    Kaifa(KaifaConfig),
}

impl ConfigHolder {
    pub fn load() -> Self {

        let mut bpath = "config/".to_string();
        /* Check for the two paths of the config file */
        let mut file = File::open("config/k2m.yaml");
        if file.is_err() {
            file = Ok(File::open("k2m.yaml").expect("Unable to read the config on config/k2m.yaml or k2m.yaml"));
            bpath = "".to_string();
        }

        let mut file = file.unwrap();

        let mut contents = String::new();
        file.read_to_string(&mut contents).expect("Unable to read config file");
        let c: Config =  serde_yml::from_str(&contents).expect("Unable to parse config file");
        let (s, _) = tokio::sync::broadcast::channel(100);
        return ConfigHolder {
            config: c,
            callbacks: Callbacks { sender: s },
            dirty: false,
            lock: RwLock::new(true),
            base_path: bpath,
        }
    }

    pub fn save(&mut self) {
        /* No need to write config if it's not dirty */
        if !self.dirty {
            debug!("Who ever called me, the config is not dirty");
            return;
        }

        let config_path = format!("{}k2m.yaml", self.base_path);
        let backup_path = format!("{}backup.yaml", self.base_path);

        if fs::copy(config_path.clone(), backup_path).is_err() {
            error!("Backing up config failed, not replacing it");
        } else {
            let x = serde_yml::to_string(&self.config).unwrap();
            match fs::write(config_path, x.as_bytes()) {
                Ok(_) => { info!("New Config written"); self.dirty = false; }
                Err(e) => { error!("Error writing config {e:?}"); }
            }
        }
    }

    pub fn get_change_receiver(&self) -> tokio::sync::broadcast::Receiver<ConfigChange> {
        return self.callbacks.sender.subscribe();
    }

    pub fn is_dirty(&self) -> bool {
        return self.dirty;
    }

    pub fn update_config(&mut self, operation: ConfigOperation, new_data: ConfigBases) {
        let base: &str;

        match new_data {
            ConfigBases::Mqtt(mqtt_config) => {
                self.config.mqtt = mqtt_config;
                base = "mqtt";
            },
            ConfigBases::Kaifa(kaifa_config) => {
                self.config.kaifa = kaifa_config;
                base = "kaifa";
            },
        }

        self.dirty = true;

        let _ = self.callbacks.sender.send(ConfigChange { operation: operation, base: base.to_string()});
    }

    pub fn get_copy(&self, base: &str) -> Result<ConfigBases, Box<dyn Error>> {
        /* Lock against modifications during copy */
        let _lock = self.lock.read().unwrap();

        match base {
            "mqtt" => { return Ok(ConfigBases::Mqtt(self.config.mqtt.clone())) },
            "kaifa" => { return Ok(ConfigBases::Kaifa(self.config.kaifa.clone())) },
            _ => { Err("Type not known")? }
        }
    }

    pub fn get_complete_config(&self) -> Config {
        return self.config.clone();
    }
}

lazy_static! {
    pub static ref CONFIG: RwLock<ConfigHolder> = RwLock::new(ConfigHolder::load());
}

#[macro_export]
macro_rules! get_config_or_panic {
    ($base: expr, $pat: path) => {
        {
            let c = CONFIG.read().unwrap().get_copy($base).unwrap();
            if let $pat(a) = c { // #1
                a
            } else {
                panic!(
                    "mismatch variant when cast to {}",
                    stringify!($pat)); // #2
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
mqtt:
  host: "broker.local"
  port: 1883
  user: "k2m"
  pass: "secret"
  ha_enabled: true
kaifa:
  name: "house"
  verify_crc: true
"#;

    #[test]
    fn test_parse_config() {
        let c: Config = serde_yml::from_str(SAMPLE).unwrap();
        assert_eq!(c.mqtt.host, "broker.local");
        assert_eq!(c.mqtt.client_name, "kaifa2mqtt");
        assert_eq!(c.kaifa.name, "house");
        assert!(c.kaifa.verify_crc);
    }

    #[test]
    fn test_kaifa_section_defaults() {
        let yaml = r#"
mqtt:
  host: "broker.local"
  port: 1883
  user: "k2m"
  pass: "secret"
  ha_enabled: false
"#;
        let c: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(c.kaifa.name, "kaifa");
        assert!(!c.kaifa.verify_crc);
    }

    #[test]
    fn test_save_rewrites_dirty_config() {
        let dir = tempfile::tempdir().unwrap();
        let base_path = format!("{}/", dir.path().display());
        let mut f = File::create(format!("{}k2m.yaml", base_path)).unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();

        let (s, _) = tokio::sync::broadcast::channel(10);
        let mut holder = ConfigHolder {
            config: serde_yml::from_str(SAMPLE).unwrap(),
            callbacks: Callbacks { sender: s },
            dirty: false,
            lock: RwLock::new(true),
            base_path,
        };

        let mut kaifa = holder.config.kaifa.clone();
        kaifa.name = "garage".to_string();
        holder.update_config(ConfigOperation::CHANGE, ConfigBases::Kaifa(kaifa));
        assert!(holder.is_dirty());

        holder.save();
        assert!(!holder.is_dirty());

        let written = fs::read_to_string(format!("{}k2m.yaml", holder.base_path)).unwrap();
        let reread: Config = serde_yml::from_str(&written).unwrap();
        assert_eq!(reread.kaifa.name, "garage");
    }
}
