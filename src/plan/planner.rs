/*!
 * Deployment Planner
 * Resolves each placement against the host, merges its property layers,
 * and orders standalone units ahead of composite-hosted ones
 */

use crate::descriptor::{
    ComponentInstantiation, ComponentKind, ComponentPlacement, DescriptorStore, Implementation,
    NodeConfiguration, PackageDescriptor, PropertyCatalog,
};
use crate::plan::overrides::apply_overrides;
use crate::plan::DeploymentError;
use crate::resolve::select_implementation;
use log::{error, info, warn};
use std::collections::{BTreeMap, HashSet};

/// How a planned unit gets started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// Own OS process.
    Standalone,
    /// Loaded into an already-registered composite host.
    CompositeHosted,
}

/// Everything needed to launch one component instance.
#[derive(Debug, Clone)]
pub struct DeploymentRecord {
    pub instantiation: ComponentInstantiation,
    pub package: PackageDescriptor,
    pub strategy: LaunchStrategy,
    /// Instantiation id of the composite host, for hosted units.
    pub composite_parent: Option<String>,
    /// Package catalog, then implementation catalog, then instance
    /// overrides.
    pub merged: PropertyCatalog,
}

impl DeploymentRecord {
    pub fn implementation(&self) -> Option<&Implementation> {
        self.package.selected_implementation()
    }

    pub fn kind(&self) -> ComponentKind {
        self.package.kind
    }

    pub fn label(&self) -> &str {
        self.instantiation.label()
    }

    /// Identity the unit registers under: devices use their
    /// instantiation id, services their label.
    pub fn registration_identity(&self) -> &str {
        match self.kind() {
            ComponentKind::Device => &self.instantiation.id,
            ComponentKind::Service => self.label(),
        }
    }
}

/// The launch-ready output of planning: standalone records first, then
/// composite-hosted ones, plus the explicit start sequence.
#[derive(Debug, Default)]
pub struct DeploymentPlan {
    pub records: Vec<DeploymentRecord>,
    /// Registration identities in ascending start order. Units without
    /// a declared order are not listed here.
    pub start_sequence: Vec<String>,
}

pub struct DeploymentPlanner<'a> {
    store: &'a dyn DescriptorStore,
    host: &'a PropertyCatalog,
}

impl<'a> DeploymentPlanner<'a> {
    pub fn new(store: &'a dyn DescriptorStore, host: &'a PropertyCatalog) -> Self {
        Self { store, host }
    }

    /// Build the plan. A placement that cannot be planned is logged and
    /// skipped; it never aborts the rest of the node.
    pub fn build(&self, config: &NodeConfiguration) -> DeploymentPlan {
        let mut standalone = Vec::new();
        let mut hosted = Vec::new();
        let mut planned_ids: HashSet<String> = HashSet::new();

        // Standalone placements plan first so composite parents exist
        // before their personas are considered.
        let (plain, composite): (Vec<_>, Vec<_>) = config
            .placements
            .iter()
            .partition(|p| p.composite_part_of.is_none());

        for placement in plain {
            match self.plan_placement(placement, &planned_ids) {
                Ok(records) => {
                    for rec in records {
                        planned_ids.insert(rec.instantiation.id.clone());
                        standalone.push(rec);
                    }
                }
                Err(e) => error!(
                    "skipping placement of {}: {}",
                    placement.package_file, e
                ),
            }
        }
        for placement in composite {
            match self.plan_placement(placement, &planned_ids) {
                Ok(records) => {
                    for rec in records {
                        planned_ids.insert(rec.instantiation.id.clone());
                        hosted.push(rec);
                    }
                }
                Err(e) => error!(
                    "skipping placement of {}: {}",
                    placement.package_file, e
                ),
            }
        }

        let mut records = standalone;
        records.append(&mut hosted);
        let start_sequence = start_sequence(&records);
        info!(
            "planned {} units ({} in explicit start sequence)",
            records.len(),
            start_sequence.len()
        );
        DeploymentPlan {
            records,
            start_sequence,
        }
    }

    fn plan_placement(
        &self,
        placement: &ComponentPlacement,
        planned_ids: &HashSet<String>,
    ) -> Result<Vec<DeploymentRecord>, DeploymentError> {
        if placement.instantiations.is_empty() {
            return Err(DeploymentError::EmptyPlacement {
                package: placement.package_file.clone(),
            });
        }

        let mut package = self.store.load_package(&placement.package_file)?;
        let index = select_implementation(&mut package, self.host).ok_or_else(|| {
            DeploymentError::NoDeployableImplementation {
                package: package.name.clone(),
            }
        })?;
        let implementation = &package.implementations[index];

        let strategy = if placement.composite_part_of.is_some()
            && implementation.is_shared_library()
        {
            LaunchStrategy::CompositeHosted
        } else {
            LaunchStrategy::Standalone
        };
        if let Some(parent) = &placement.composite_part_of {
            if !planned_ids.contains(parent) {
                return Err(DeploymentError::MissingCompositeParent {
                    instantiation: placement.instantiations[0].id.clone(),
                    parent: parent.clone(),
                });
            }
        }

        let base = self.merge_package_catalogs(&package, implementation)?;

        let mut records = Vec::with_capacity(placement.instantiations.len());
        for inst in &placement.instantiations {
            let mut merged = base.clone();
            apply_overrides(&mut merged, &inst.overrides);
            records.push(DeploymentRecord {
                instantiation: inst.clone(),
                package: package.clone(),
                strategy,
                composite_parent: placement.composite_part_of.clone(),
                merged,
            });
        }
        Ok(records)
    }

    /// Package catalog first, implementation-specific catalog joined on
    /// top of it.
    fn merge_package_catalogs(
        &self,
        package: &PackageDescriptor,
        implementation: &Implementation,
    ) -> Result<PropertyCatalog, DeploymentError> {
        let mut merged = match &package.prf_file {
            Some(path) => self.store.load_property_catalog(path)?,
            None => PropertyCatalog::new(),
        };
        if let Some(path) = &implementation.prf_file {
            match self.store.load_property_catalog(path) {
                Ok(overlay) => merged.join(overlay),
                Err(e) => warn!(
                    "implementation catalog {} for {} unusable: {}",
                    path, package.name, e
                ),
            }
        }
        Ok(merged)
    }
}

/// Ascending start order over every planned unit that declares one.
/// Ties start in planning order.
fn start_sequence(records: &[DeploymentRecord]) -> Vec<String> {
    let mut ordered: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    for rec in records {
        if let Some(order) = rec.instantiation.start_order {
            ordered
                .entry(order)
                .or_default()
                .push(rec.registration_identity().to_string());
        }
    }
    ordered.into_values().flatten().collect()
}
