use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Algorithm preferences handed to each key-agreement engine.
///
/// Algorithm names are engine-defined four-character identifiers; the lists
/// are ordered by preference, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ZrtpConfig {
    /// Hash algorithms (default "S256", "S384").
    #[serde(default = "default_hashes")]
    pub hashes: Vec<String>,

    /// Symmetric ciphers (default "AES1", "AES3").
    #[serde(default = "default_ciphers")]
    pub ciphers: Vec<String>,

    /// Key agreement types.
    #[serde(default = "default_public_keys")]
    pub public_keys: Vec<String>,

    /// SAS rendering schemes.
    #[serde(default = "default_sas_types")]
    pub sas_types: Vec<String>,

    /// SRTP authentication tag lengths.
    #[serde(default = "default_auth_lengths")]
    pub auth_lengths: Vec<String>,

    /// Treat every SAS as unverified and allow only the strongest suite.
    #[serde(default)]
    pub paranoid_mode: bool,

    /// Accept trusted MitM (PBX) enrollment.
    #[serde(default)]
    pub trusted_mitm: bool,

    /// Exchange SAS signatures.
    #[serde(default)]
    pub sas_signature: bool,
}

fn default_hashes() -> Vec<String> {
    strings(&["S256", "S384"])
}

fn default_ciphers() -> Vec<String> {
    strings(&["AES1", "AES3"])
}

fn default_public_keys() -> Vec<String> {
    strings(&["EC25", "DH3k", "Mult", "EC38"])
}

fn default_sas_types() -> Vec<String> {
    strings(&["B32 ", "B256"])
}

fn default_auth_lengths() -> Vec<String> {
    strings(&["HS32", "HS80"])
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Strongest entries, used when paranoid mode narrows the lists.
const STRONG_HASHES: &[&str] = &["S384"];
const STRONG_CIPHERS: &[&str] = &["AES3"];
const STRONG_PUBLIC_KEYS: &[&str] = &["EC38", "Mult"];
const STRONG_AUTH_LENGTHS: &[&str] = &["HS80"];

impl ZrtpConfig {
    /// The standard negotiation suite.
    pub fn standard() -> Self {
        Self {
            hashes: default_hashes(),
            ciphers: default_ciphers(),
            public_keys: default_public_keys(),
            sas_types: default_sas_types(),
            auth_lengths: default_auth_lengths(),
            paranoid_mode: false,
            trusted_mitm: false,
            sas_signature: false,
        }
    }

    /// Switch paranoid mode. Enabling it keeps only the strongest
    /// algorithms of each list; disabling only clears the flag.
    pub fn set_paranoid_mode(&mut self, enable: bool) {
        self.paranoid_mode = enable;
        if !enable {
            return;
        }
        narrow(&mut self.hashes, STRONG_HASHES);
        narrow(&mut self.ciphers, STRONG_CIPHERS);
        narrow(&mut self.public_keys, STRONG_PUBLIC_KEYS);
        narrow(&mut self.auth_lengths, STRONG_AUTH_LENGTHS);
    }

    /// Load a configuration from a TOML file. Missing keys take the
    /// standard values.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

impl Default for ZrtpConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Keep the entries of `list` that appear in `strong`. A list with none of
/// them is replaced by `strong`.
fn narrow(list: &mut Vec<String>, strong: &[&str]) {
    list.retain(|name| strong.contains(&name.as_str()));
    if list.is_empty() {
        *list = strings(strong);
    }
}
