//! Virtual domain routing.
//!
//! Besides its own partition, an event may be copied into synthetic
//! partitions that aggregate traffic across sites. Three rule families
//! exist:
//!
//! - `relabel`: events whose URL matches a pattern go, unchanged, to a
//!   fixed domain (browser extension telemetry, for instance).
//! - `sample`: events of one checkpoint go to a shared domain with
//!   probability `1/rate`, their weight multiplied by `rate` so weighted
//!   totals stay unbiased.
//! - `collapse`: hosts matching a naming convention are merged into one
//!   domain per organization, built from the pattern's captures.
//!
//! Every copy records the source domain in `domain`. Rules are evaluated in
//! order and an event may match several of them.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use rum_core::{PartitionKey, RawEvent};
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Serialized form of a rule, as read from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VirtualRuleConfig {
    Relabel {
        url_pattern: String,
        domain: String,
    },
    Sample {
        checkpoint: String,
        rate: u32,
        domain: String,
    },
    Collapse {
        host_pattern: String,
        /// Template over the pattern's named captures, e.g. `${owner}.aem.live`
        domain: String,
        host_type: String,
    },
}

/// Rules used when configuration does not name any.
pub fn default_rules() -> Vec<VirtualRuleConfig> {
    vec![
        VirtualRuleConfig::Relabel {
            url_pattern: r"^(chrome|moz|safari-web)-extension://".to_string(),
            domain: "extensions".to_string(),
        },
        VirtualRuleConfig::Sample {
            checkpoint: "top".to_string(),
            rate: 10,
            domain: "all".to_string(),
        },
        VirtualRuleConfig::Collapse {
            host_pattern: r"^[a-z0-9-]+--[a-z0-9-]+--(?P<owner>[a-z0-9-]+)\.aem\.(?P<tld>live|page)$"
                .to_string(),
            domain: "${owner}.aem.${tld}".to_string(),
            host_type: "aem-${tld}".to_string(),
        },
    ]
}

/// A compiled rule.
#[derive(Debug)]
pub enum VirtualRule {
    Relabel {
        url: Regex,
        domain: String,
    },
    Sample {
        checkpoint: String,
        rate: u32,
        domain: String,
        rng: Mutex<StdRng>,
    },
    Collapse {
        host: Regex,
        domain: String,
        host_type: String,
    },
}

/// A virtual copy of an event and the partition it goes to.
#[derive(Debug, Clone)]
pub struct VirtualRoute {
    pub key: PartitionKey,
    pub event: RawEvent,
}

impl VirtualRule {
    /// Compiles a configured rule. `seed` fixes the sampling stream.
    pub fn compile(config: &VirtualRuleConfig, seed: Option<u64>) -> Result<Self> {
        match config {
            VirtualRuleConfig::Relabel {
                url_pattern,
                domain,
            } => Ok(Self::Relabel {
                url: compile_pattern(url_pattern)?,
                domain: domain.clone(),
            }),
            VirtualRuleConfig::Sample {
                checkpoint,
                rate,
                domain,
            } => {
                if *rate == 0 {
                    return Err(BundleError::config(format!(
                        "sample rule for {checkpoint}: rate must be at least 1"
                    )));
                }
                let rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                Ok(Self::Sample {
                    checkpoint: checkpoint.clone(),
                    rate: *rate,
                    domain: domain.clone(),
                    rng: Mutex::new(rng),
                })
            }
            VirtualRuleConfig::Collapse {
                host_pattern,
                domain,
                host_type,
            } => Ok(Self::Collapse {
                host: compile_pattern(host_pattern)?,
                domain: domain.clone(),
                host_type: host_type.clone(),
            }),
        }
    }

    /// The virtual copy of `event` this rule produces, if it matches.
    pub fn route(&self, event: &RawEvent, key: &PartitionKey) -> Option<VirtualRoute> {
        match self {
            Self::Relabel { url, domain } => {
                if !url.is_match(&event.url) {
                    return None;
                }
                Some(copy(event, key, domain, None))
            }
            Self::Sample {
                checkpoint,
                rate,
                domain,
                rng,
            } => {
                if event.checkpoint() != checkpoint || !rng.lock().gen_ratio(1, *rate) {
                    return None;
                }
                let mut route = copy(event, key, domain, None);
                route.event.weight = event.weight.saturating_mul(*rate);
                Some(route)
            }
            Self::Collapse {
                host,
                domain,
                host_type,
            } => {
                let caps = host.captures(&key.domain)?;
                let mut target = String::new();
                caps.expand(domain, &mut target);
                let mut kind = String::new();
                caps.expand(host_type, &mut kind);
                Some(copy(event, key, &target, Some(kind)))
            }
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| BundleError::config(format!("pattern {pattern}: {e}")))
}

fn copy(event: &RawEvent, key: &PartitionKey, domain: &str, host_type: Option<String>) -> VirtualRoute {
    let mut event = event.clone();
    event.domain = Some(key.domain.clone());
    if host_type.is_some() {
        event.host_type = host_type;
    }
    VirtualRoute {
        key: key.with_domain(domain),
        event,
    }
}

/// Ordered set of virtual rules.
#[derive(Debug, Default)]
pub struct VirtualRouter {
    rules: Vec<VirtualRule>,
}

impl VirtualRouter {
    /// A router with no rules; every event stays primary only.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(rules: Vec<VirtualRule>) -> Self {
        Self { rules }
    }

    /// Compiles configured rules. Sampling rules get distinct streams
    /// derived from `seed` when one is given.
    pub fn from_config(configs: &[VirtualRuleConfig], seed: Option<u64>) -> Result<Self> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(i, config)| VirtualRule::compile(config, seed.map(|s| s.wrapping_add(i as u64))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All virtual copies of `event`, whose primary partition is `key`.
    pub fn route(&self, event: &RawEvent, key: &PartitionKey) -> Vec<VirtualRoute> {
        self.rules
            .iter()
            .filter_map(|rule| rule.route(event, key))
            .collect()
    }
}
