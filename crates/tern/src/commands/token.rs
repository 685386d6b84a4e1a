//! `generate-token` and `show-token`.

use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::json;

use tern_config::{settings::save_token, AgentConfig};

use crate::format::{print, OutputFormat};

const TOKEN_BYTES: usize = 32;

/// 32 random bytes, lowercase hex.
pub fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn generate_token(config_path: &Path, force: bool, format: OutputFormat) -> anyhow::Result<()> {
    let config = AgentConfig::load(config_path)?;
    if !config.server.token.is_empty() && !force {
        anyhow::bail!(
            "a token is already configured in {}; pass --force to replace it",
            config_path.display()
        );
    }
    let token = new_token();
    save_token(config_path, &token)?;
    tracing::info!(path = %config_path.display(), "Control-plane token written");
    print(format, &json!({ "token": token }))
}

pub fn show_token(config: &AgentConfig, format: OutputFormat) -> anyhow::Result<()> {
    if config.server.token.is_empty() {
        anyhow::bail!("no token configured; run `tern generate-token`");
    }
    print(format, &json!({ "token": config.server.token }))
}
