pub mod config;
pub mod constants;

pub use config::{
    ConfigError, GroupingThresholds, InstrumentConfig, InstrumentSetting, LsfRange,
    load_instrument_config,
};
