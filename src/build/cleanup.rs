use crate::hypervisor::Hypervisor;
use crate::models::{template_family, TemplateRecord};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Log family members whose build id suffix does not parse at `warn`
    /// instead of `debug`. They are never deleted either way.
    pub warn_on_unparsable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleTemplate {
    pub id: String,
    pub name_label: String,
    pub build_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Deleted,
    Failed(String),
}

/// Older generations of `target`, newest first.
///
/// A template belongs to the family when its label contains
/// `template.<target>.` and its last dot-separated segment is an integer.
/// The template identified by `current_id`, and any generation carrying
/// `current_build_id`, is never returned.
pub fn stale_templates(
    templates: &BTreeMap<String, TemplateRecord>,
    target: &str,
    current_id: &str,
    current_build_id: u64,
    policy: CleanupPolicy,
) -> Vec<StaleTemplate> {
    let prefix = format!("{}.", template_family(target));
    let mut family: Vec<StaleTemplate> = Vec::new();

    for (id, record) in templates {
        if !record.name_label.contains(&prefix) {
            continue;
        }
        let Some(build_id) = record.build_id() else {
            if policy.warn_on_unparsable {
                warn!("Skipping template '{}' ({}): no build id suffix", record.name_label, id);
            } else {
                debug!("Skipping template '{}' ({}): no build id suffix", record.name_label, id);
            }
            continue;
        };
        family.push(StaleTemplate {
            id: id.clone(),
            name_label: record.name_label.clone(),
            build_id,
        });
    }

    family.sort_by(|a, b| b.build_id.cmp(&a.build_id));
    debug!("Found {} matching templates", family.len());

    family
        .into_iter()
        .filter(|t| t.id != current_id && t.build_id != current_build_id)
        .collect()
}

/// Deletes every entry in `stale`, continuing past failures.
pub async fn remove_stale(
    hypervisor: &dyn Hypervisor,
    stale: Vec<StaleTemplate>,
) -> Vec<(StaleTemplate, CleanupOutcome)> {
    let mut results = Vec::with_capacity(stale.len());

    for template in stale {
        debug!("Deleting old template: {} (ID: {})", template.name_label, template.id);
        let outcome = match hypervisor.delete_template(&template.id).await {
            Ok(true) => {
                info!("Template '{}' with ID {} deleted", template.name_label, template.id);
                CleanupOutcome::Deleted
            }
            Ok(false) => {
                warn!("Failed to delete template '{}' (ID: {}): refused", template.name_label, template.id);
                CleanupOutcome::Failed("delete was refused".to_string())
            }
            Err(e) => {
                warn!("Failed to delete template '{}' (ID: {}): {}", template.name_label, template.id, e);
                CleanupOutcome::Failed(e.to_string())
            }
        };
        results.push((template, outcome));
    }

    results
}
