use std::fs;

use log::{debug, info};
use poll_tally::{TallyRules, TieBreakMode};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::args::Args;
use crate::polls::{OpeningJsonSnafu, ParsingJsonSnafu, VerdictResult};

pub const DEFAULT_DATA_FILE: &str = "verdict.json";

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictConfig {
    pub data_file: Option<String>,
    pub tiebreak_mode: Option<String>,
    pub random_seed: Option<String>,
}

pub fn read_config(path: &str) -> VerdictResult<VerdictConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_config: content: {:?}", contents);
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

/// The configuration file (if any), with the command-line overrides applied.
pub fn load_config(args: &Args) -> VerdictResult<VerdictConfig> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => VerdictConfig::default(),
    };
    if let Some(data) = &args.data {
        config.data_file = Some(data.clone());
    }
    if let Some(seed) = &args.seed {
        config.random_seed = Some(seed.clone());
        if config.tiebreak_mode.as_deref() != Some("hashed") {
            config.tiebreak_mode = Some("random".to_string());
        }
    }
    info!("config: {:?}", config);
    Ok(config)
}

pub fn data_file(config: &VerdictConfig) -> String {
    config
        .data_file
        .clone()
        .unwrap_or_else(|| DEFAULT_DATA_FILE.to_string())
}

pub fn validate_rules(config: &VerdictConfig) -> VerdictResult<TallyRules> {
    let tiebreak_mode = match config.tiebreak_mode.as_deref() {
        None | Some("entropy") => TieBreakMode::Entropy,
        Some("useChoiceOrder") => TieBreakMode::UseChoiceOrder,
        Some("random") => {
            let seed = match config.random_seed.as_ref().map(|s| s.parse::<u64>()) {
                Some(Ok(x)) => x,
                x => {
                    whatever!("Cannot use tiebreak mode random with seed {:?}", x)
                }
            };
            TieBreakMode::Random(seed)
        }
        Some("hashed") => {
            let seed = match config.random_seed.as_ref().map(|s| s.parse::<u32>()) {
                Some(Ok(x)) => x,
                x => {
                    whatever!("Cannot use tiebreak mode hashed with seed {:?}", x)
                }
            };
            TieBreakMode::Hashed(seed)
        }
        Some(x) => {
            whatever!("Cannot use tiebreak mode {:?}: unknown mode", x)
        }
    };
    Ok(TallyRules { tiebreak_mode })
}
