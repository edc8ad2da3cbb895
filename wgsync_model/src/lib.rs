//! Data model for wgsync.
//!
//! This crate holds the pieces every other wgsync crate agrees on: key
//! material and its textual encodings, the device descriptor types, and
//! the configuration file format. It knows nothing about sockets or
//! reconciliation.

pub mod config_file;
pub mod device;
pub mod key;

pub use config_file::{
    compose_config, parse_config, ConfigFileError, ConfigFileResult, ParseMode,
};
pub use device::{
    validate_interface_name, AllowedIp, DeviceConfig, DeviceParseError, Endpoint, Peer,
    MAX_IFACE_NAME_LEN,
};
pub use key::{Key, KeyError, KeyResult, KEY_LEN, KEY_LEN_BASE64, KEY_LEN_HEX};
