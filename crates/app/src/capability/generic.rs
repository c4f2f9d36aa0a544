//! Label-only fallback for services without a dedicated controller.

use hkhub_domain::accessory::ServiceType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericController {
    label: String,
    service_type: ServiceType,
}

impl GenericController {
    #[must_use]
    pub fn new(label: String, service_type: ServiceType) -> Self {
        Self {
            label,
            service_type,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }
}
