use serde::{Deserialize, Serialize};

/// Operating mode for a miner instance.
///
/// `Loop` keeps creating/incrementing counters indefinitely; `OneShot` only
/// drains pending maintenance work (delete/claim/register) and then stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinerMode {
    Loop,
    OneShot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Per-instance spam configuration shared across ledger implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamConfig {
    /// Ledger endpoints this instance rotates across.
    pub endpoints: Vec<EndpointConfig>,
    /// Identity that owns the counters (opaque address string).
    pub owner: String,
    /// Destination address for claimed rewards.
    pub claim_destination: String,
    pub mode: MinerMode,
}

impl SpamConfig {
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError;

        if self.owner.is_empty() {
            return Err(ConfigError::MissingField {
                field: "owner".to_string(),
            });
        }
        if self.claim_destination.is_empty() {
            return Err(ConfigError::MissingField {
                field: "claim_destination".to_string(),
            });
        }
        if !self.endpoints.iter().any(|e| e.active) {
            return Err(ConfigError::InvalidValue {
                field: "endpoints".to_string(),
                reason: "at least one active endpoint is required".to_string(),
            });
        }
        for endpoint in &self.endpoints {
            if endpoint.url.is_empty() || endpoint.url.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidEndpointUrl {
                    url: endpoint.url.clone(),
                });
            }
        }
        Ok(())
    }
}
