//! Behavioral function groups and their expansion into concrete neurons.
//!
//! A group is a label plus a list of name prefixes (`"AVM"`, `"DA"`, ...).
//! Activating a group pins every neuron whose name starts with one of its
//! prefixes; the set of active groups is the source of the forced-active set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connectome::{Connectome, NeuronId};
use crate::error::{NemabotError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionGroup {
    pub name: String,
    pub prefixes: Vec<String>,
}

impl FunctionGroup {
    pub fn new(name: &str, prefixes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Every neuron matched by at least one prefix, ascending by id.
    pub fn expand(&self, connectome: &Connectome) -> BTreeSet<NeuronId> {
        self.prefixes
            .iter()
            .flat_map(|p| connectome.ids_with_prefix(p))
            .collect()
    }
}

/// The stock behavioral groups.
pub fn default_groups() -> Vec<FunctionGroup> {
    vec![
        FunctionGroup::new("Photodetection", &["ASI", "AFD", "AWB", "AWC", "ASK"]),
        FunctionGroup::new("Osmosensation", &["ASH", "FLP", "OLQ", "IL1", "AVM", "ALM"]),
        FunctionGroup::new(
            "Chemosensation",
            &["ASE", "ASG", "ASI", "ASK", "AWA", "AWB", "AWC"],
        ),
        FunctionGroup::new(
            "Mechanoreception",
            &["AVM", "ALM", "PLM", "PVD", "FLP", "OLQ", "IL1"],
        ),
        FunctionGroup::new("Hunger / satiety", &["ADF", "ASG", "ASI", "ASJ", "NSM", "URX"]),
        FunctionGroup::new("Oxygen / CO2", &["URX", "AQR", "PQR", "BAG", "SDQ"]),
        FunctionGroup::new("Thermosensation", &["AFD", "AWC"]),
        FunctionGroup::new("Locomotion", &["DA", "DB", "VA", "VB", "DD", "VD"]),
        FunctionGroup::new(
            "Pharyngeal muscles",
            &["MC", "M3", "M4", "M5", "M1", "I1", "I2", "I3"],
        ),
        FunctionGroup::new("Avoidance reflex", &["ASH", "FLP", "AVA", "AVB"]),
        FunctionGroup::new("Stretch / shape detection", &["PVD", "DVA"]),
        FunctionGroup::new("Contact neurons", &["OLQ", "IL1", "CEP"]),
        FunctionGroup::new("Reproductive system", &["HSN", "VC"]),
        FunctionGroup::new("Social / specialized", &["RMG", "SAA", "SAB", "URA"]),
    ]
}

/// On/off state for a list of groups.
#[derive(Debug, Clone)]
pub struct FunctionPanel {
    groups: Vec<FunctionGroup>,
    active: Vec<bool>,
}

impl FunctionPanel {
    pub fn new(groups: Vec<FunctionGroup>) -> Self {
        let active = vec![false; groups.len()];
        Self { groups, active }
    }

    pub fn groups(&self) -> &[FunctionGroup] {
        &self.groups
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.groups
            .iter()
            .position(|g| g.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| NemabotError::UnknownFunctionGroup(name.to_string()))
    }

    /// Switch one group. Turning on a group that matches nothing in the
    /// wiring is rejected and leaves the panel unchanged.
    pub fn set_active(&mut self, index: usize, active: bool, connectome: &Connectome) -> Result<()> {
        let group = self
            .groups
            .get(index)
            .ok_or_else(|| NemabotError::UnknownFunctionGroup(format!("#{index}")))?;
        if active {
            let matched = group.expand(connectome);
            if matched.is_empty() {
                return Err(NemabotError::EmptyFunctionGroup(group.name.clone()));
            }
            debug!(group = %group.name, neurons = matched.len(), "function group enabled");
        }
        self.active[index] = active;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.active.fill(false);
    }

    /// Union of every active group's neurons.
    pub fn forced_set(&self, connectome: &Connectome) -> BTreeSet<NeuronId> {
        self.groups
            .iter()
            .zip(&self.active)
            .filter(|&(_, &on)| on)
            .flat_map(|(g, _)| g.expand(connectome))
            .collect()
    }
}

impl Default for FunctionPanel {
    fn default() -> Self {
        Self::new(default_groups())
    }
}
