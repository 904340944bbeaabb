use serde::{Deserialize, Serialize};

use crate::model::PlanId;

/// Events emitted by the record store for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    /// A word's learning status changed; word lists should refresh.
    ListChanged { plan_id: PlanId },
    /// The current-plan pointer moved.
    PlanSelected { plan_id: Option<PlanId> },
}
