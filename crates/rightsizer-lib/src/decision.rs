//! Patch decision engine
//!
//! Pure functions deciding, for one container, which requests to rewrite.
//! The same logic runs against live pods and deployment templates.
//!
//! Order per container:
//! 1. every recommended resource must fall strictly inside the namespace
//!    bounds, otherwise the whole container is skipped;
//! 2. a resource without a current request takes the recommendation;
//! 3. a resource with a request takes it only when the relative difference
//!    reaches the policy threshold.

use crate::bounds::ContainerBoundRange;
use crate::error::QuantityError;
use crate::models::{
    Container, ContainerPatch, ContainerRecommendation, Resource, ResourceRecommendation,
    ResourceRequests,
};
use crate::quantity::{format_quantity, parse_quantity, relative_difference};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Why a container with a recommendation was left alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The recommendation is outside the namespace bounds
    OutOfBounds { resource: Resource, value: Decimal },
    /// A current request or the formatted recommendation is not a valid quantity
    MalformedQuantity(QuantityError),
}

impl SkipReason {
    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::OutOfBounds { .. } => "out_of_bounds",
            SkipReason::MalformedQuantity(_) => "malformed_quantity",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::OutOfBounds { resource, value } => {
                write!(f, "recommended {} {} is outside bounds", resource, value)
            }
            SkipReason::MalformedQuantity(e) => write!(f, "{}", e),
        }
    }
}

/// Outcome of evaluating one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerDecision {
    Patch(ContainerPatch),
    /// Nothing met the threshold
    Unchanged,
    Skipped(SkipReason),
}

fn threshold_decimal(threshold: f64) -> Decimal {
    Decimal::from_f64(threshold).unwrap_or(Decimal::ZERO)
}

/// Evaluate one container against its recommendation
pub fn evaluate_container(
    container: &Container,
    recommendation: &ResourceRecommendation,
    bounds: &ContainerBoundRange,
    threshold: f64,
) -> ContainerDecision {
    for resource in Resource::ALL {
        if let Some(value) = recommendation.get(resource) {
            if !bounds.get(resource).admits(value) {
                return ContainerDecision::Skipped(SkipReason::OutOfBounds { resource, value });
            }
        }
    }

    let threshold = threshold_decimal(threshold);
    let mut requests = ResourceRequests::default();

    for resource in Resource::ALL {
        let Some(recommended) = recommendation.get(resource) else {
            continue;
        };

        let stage = match container.requests.get(resource) {
            None => true,
            Some(current) => match parse_quantity(current) {
                Ok(current) => relative_difference(current, recommended) >= threshold,
                Err(e) => return ContainerDecision::Skipped(SkipReason::MalformedQuantity(e)),
            },
        };

        if stage {
            match format_quantity(recommended, resource.patch_suffix()) {
                Ok(formatted) => requests.set(resource, formatted),
                Err(e) => return ContainerDecision::Skipped(SkipReason::MalformedQuantity(e)),
            }
        }
    }

    if requests.is_empty() {
        ContainerDecision::Unchanged
    } else {
        ContainerDecision::Patch(ContainerPatch {
            container_name: container.name.clone(),
            requests,
        })
    }
}

/// The patch for one container, if any
pub fn decide_container_patch(
    container: &Container,
    recommendation: &ResourceRecommendation,
    bounds: &ContainerBoundRange,
    threshold: f64,
) -> Option<ContainerPatch> {
    match evaluate_container(container, recommendation, bounds, threshold) {
        ContainerDecision::Patch(patch) => Some(patch),
        ContainerDecision::Unchanged | ContainerDecision::Skipped(_) => None,
    }
}

/// Decisions for every container of a pod or template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerPlan {
    pub patches: Vec<ContainerPatch>,
    /// (container name, reason)
    pub skipped: Vec<(String, SkipReason)>,
}

impl ContainerPlan {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Evaluate a container list against a deployment's recommendations
///
/// Containers without a recommendation are ignored.
pub fn plan_containers(
    containers: &[Container],
    recommendations: &HashMap<String, ContainerRecommendation>,
    bounds: &ContainerBoundRange,
    threshold: f64,
) -> ContainerPlan {
    let mut plan = ContainerPlan::default();

    for container in containers {
        let Some(recommendation) = recommendations.get(&container.name) else {
            continue;
        };
        match evaluate_container(container, &recommendation.requests, bounds, threshold) {
            ContainerDecision::Patch(patch) => plan.patches.push(patch),
            ContainerDecision::Unchanged => {}
            ContainerDecision::Skipped(reason) => {
                plan.skipped.push((container.name.clone(), reason))
            }
        }
    }

    plan
}
