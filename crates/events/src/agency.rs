use agencyops_core::AgencyId;

use crate::EventEnvelope;

/// Helper trait for agency-scoped messages.
///
/// Workers pinned to one agency use it to drop messages from other agencies
/// before they reach a handler.
pub trait AgencyScoped {
    fn agency_id(&self) -> AgencyId;
}

impl<E> AgencyScoped for EventEnvelope<E> {
    fn agency_id(&self) -> AgencyId {
        self.agency_id()
    }
}
