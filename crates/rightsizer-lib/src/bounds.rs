//! Per-namespace container resource bounds
//!
//! Folds every `type: Container` LimitRange item of a namespace into a single
//! [`ContainerBoundRange`]. Two fold strategies exist:
//!
//! - [`BoundsMergeStrategy::Intersection`] keeps the largest min and the
//!   smallest max, so the result satisfies every declaration. This is the
//!   default.
//! - [`BoundsMergeStrategy::Widest`] keeps the smallest min and the largest
//!   max starting from `[0, unbounded]`. Seeded that way it can never narrow
//!   the range, so for non-negative bounds it always yields `[0, unbounded]`.
//!   It is kept for deployments that relied on that behaviour.

use crate::cache::TtlCache;
use crate::cluster::ClusterClient;
use crate::error::RightsizingError;
use crate::models::{Resource, ResourceBoundDeclaration};
use crate::quantity::parse_quantity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// LimitRange item type the resolver folds
pub const CONTAINER_KIND: &str = "Container";

/// How multiple bound declarations combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsMergeStrategy {
    #[default]
    Intersection,
    Widest,
}

impl std::str::FromStr for BoundsMergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intersection" => Ok(Self::Intersection),
            "widest" => Ok(Self::Widest),
            other => Err(format!("unknown bounds strategy: {}", other)),
        }
    }
}

/// Allowed request range for one resource; `max: None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBound {
    pub min: Decimal,
    pub max: Option<Decimal>,
}

impl Default for ResourceBound {
    fn default() -> Self {
        Self {
            min: Decimal::ZERO,
            max: None,
        }
    }
}

impl ResourceBound {
    /// Strictly inside the range on both ends
    pub fn admits(&self, value: Decimal) -> bool {
        value > self.min && self.max.map_or(true, |max| value < max)
    }

    fn merge_min(&mut self, min: Decimal, strategy: BoundsMergeStrategy) {
        self.min = match strategy {
            BoundsMergeStrategy::Intersection => self.min.max(min),
            BoundsMergeStrategy::Widest => self.min.min(min),
        };
    }

    fn merge_max(&mut self, max: Decimal, strategy: BoundsMergeStrategy) {
        self.max = match strategy {
            BoundsMergeStrategy::Intersection => {
                Some(self.max.map_or(max, |current| current.min(max)))
            }
            BoundsMergeStrategy::Widest => self.max.map(|current| current.max(max)),
        };
    }
}

/// Effective container bounds for a namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBoundRange {
    pub cpu: ResourceBound,
    pub memory: ResourceBound,
}

impl ContainerBoundRange {
    /// `[0, unbounded]` for every resource
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: Resource) -> &ResourceBound {
        match resource {
            Resource::Cpu => &self.cpu,
            Resource::Memory => &self.memory,
        }
    }

    fn get_mut(&mut self, resource: Resource) -> &mut ResourceBound {
        match resource {
            Resource::Cpu => &mut self.cpu,
            Resource::Memory => &mut self.memory,
        }
    }

    /// Fold `Container` declarations into one range
    ///
    /// Declarations of other kinds are ignored, as are resource keys a
    /// declaration leaves out. A quantity that fails to parse is logged and
    /// skipped rather than failing the whole namespace.
    pub fn merge(
        declarations: &[ResourceBoundDeclaration],
        strategy: BoundsMergeStrategy,
    ) -> Self {
        let mut range = Self::unbounded();

        for declaration in declarations.iter().filter(|d| d.kind == CONTAINER_KIND) {
            for resource in Resource::ALL {
                let bound = range.get_mut(resource);
                if let Some(min) = declaration.min.get(resource.key()) {
                    match parse_quantity(min) {
                        Ok(min) => bound.merge_min(min, strategy),
                        Err(e) => warn!(error = %e, resource = %resource, "Ignoring bound minimum"),
                    }
                }
                if let Some(max) = declaration.max.get(resource.key()) {
                    match parse_quantity(max) {
                        Ok(max) => bound.merge_max(max, strategy),
                        Err(e) => warn!(error = %e, resource = %resource, "Ignoring bound maximum"),
                    }
                }
            }
        }

        range
    }
}

/// Resolves and caches bound ranges per namespace
pub struct BoundsResolver {
    cluster: Arc<dyn ClusterClient>,
    strategy: BoundsMergeStrategy,
    cache: TtlCache<String, ContainerBoundRange>,
}

impl BoundsResolver {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        strategy: BoundsMergeStrategy,
        ttl: Duration,
    ) -> Self {
        Self {
            cluster,
            strategy,
            cache: TtlCache::new(ttl),
        }
    }

    /// Effective container bounds for `namespace`
    pub async fn resolve_container_bounds(
        &self,
        namespace: &str,
    ) -> Result<ContainerBoundRange, RightsizingError> {
        self.cache
            .get_or_try_insert_with(namespace.to_string(), || async {
                let declarations = self
                    .cluster
                    .list_resource_bounds(namespace)
                    .await
                    .map_err(|e| RightsizingError::listing("limitranges", Some(namespace), e))?;
                let range = ContainerBoundRange::merge(&declarations, self.strategy);
                debug!(
                    namespace = %namespace,
                    declarations = declarations.len(),
                    strategy = ?self.strategy,
                    range = ?range,
                    "Resolved container bounds"
                );
                Ok(range)
            })
            .await
    }
}
