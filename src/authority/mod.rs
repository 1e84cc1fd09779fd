use crate::error::AuthorityError;
use crate::model::{
    IssuanceRequest, PhysicalId, TagSet, TransparencyPreference, ValidationDescriptor,
};

mod acm;

pub use acm::AcmAuthority;

/// Operations the controller needs from the certificate authority.
///
/// Implementations block until the remote call completes. Failures other
/// than a missing certificate are reported as [`AuthorityError::Service`]
/// and are not interpreted by the caller.
pub trait CertificateAuthority: Send + Sync {
    /// Requests a DNS-validated certificate. A repeated idempotency token
    /// yields the identity issued for the first request.
    fn request_certificate(&self, request: &IssuanceRequest) -> Result<PhysicalId, AuthorityError>;

    fn describe_validation(&self, id: &PhysicalId) -> Result<ValidationDescriptor, AuthorityError>;

    fn update_transparency_preference(
        &self,
        id: &PhysicalId,
        preference: TransparencyPreference,
    ) -> Result<(), AuthorityError>;

    fn list_tags(&self, id: &PhysicalId) -> Result<TagSet, AuthorityError>;

    fn remove_tags(&self, id: &PhysicalId, tags: &TagSet) -> Result<(), AuthorityError>;

    fn add_tags(&self, id: &PhysicalId, tags: &TagSet) -> Result<(), AuthorityError>;

    /// Deletes the certificate; [`AuthorityError::NotFound`] when it is already gone.
    fn delete_certificate(&self, id: &PhysicalId) -> Result<(), AuthorityError>;
}
