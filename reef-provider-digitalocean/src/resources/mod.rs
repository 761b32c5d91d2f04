//! Managed resource kinds
//!
//! Each kind is a unit struct implementing [`ResourceType`] over the
//! provider's [`CombinedConfig`] handle. Spaces kinds live in
//! [`crate::spaces`] and are registered here as well.

pub mod byoip_prefix;
pub mod domain;
pub mod droplet;
pub mod droplet_snapshot;
pub mod partner_attachment;
pub mod record;
pub mod reserved_ip;
pub mod reserved_ip_assignment;
pub mod reserved_ipv6;
pub mod ssh_key;
pub mod volume_snapshot;
pub mod vpc_peering;

use std::future::Future;
use std::time::Duration;

use reef_core::provider::{Context, ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData};
use reef_core::retry::{RetryError, is_retryable_on_create, retry};

use crate::config::CombinedConfig;
use crate::spaces;

pub(crate) type Ctx = Context<CombinedConfig>;

/// How long a create call keeps retrying 5xx and 412 responses
pub(crate) const CREATE_RETRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Issue a create call, retrying 5xx and 412 responses until the create
/// timeout of the bag elapses
pub(crate) async fn create_with_retry<T, F, Fut>(ctx: &Ctx, data: &ResourceData, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let timeout = data.timeout(Operation::Create, CREATE_RETRY_TIMEOUT);
    retry(&ctx.cancel, timeout, || {
        let attempt = op();
        async move { attempt.await.map_err(|e| RetryError::classify(e, is_retryable_on_create)) }
    })
    .await
}

/// Unwrap a lookup, clearing the id when the remote object is gone
pub(crate) fn found<T>(data: &mut ResourceData, result: ProviderResult<T>) -> ProviderResult<Option<T>> {
    match result {
        Ok(object) => Ok(Some(object)),
        Err(e) if e.is_not_found() => {
            log::warn!("{} not found, removing from state", data.resource_id());
            data.clear_id();
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Copy flattened remote attributes into the bag
pub(crate) fn merge(data: &mut ResourceData, attributes: Attributes) {
    for (key, value) in attributes {
        data.set(key, value);
    }
}

/// Numeric id of the bag
pub(crate) fn int_id(data: &ResourceData) -> ProviderResult<i64> {
    data.id_str().parse().map_err(|_| {
        ProviderError::internal(format!("invalid id '{}' for {}: expected an integer", data.id_str(), data.kind()))
    })
}

/// Required string attribute; absence is a schema bug rather than user error
pub(crate) fn required_str<'a>(data: &'a ResourceData, key: &str) -> ProviderResult<&'a str> {
    data.get_str(key)
        .ok_or_else(|| ProviderError::internal(format!("{} is missing required attribute '{key}'", data.kind())))
}

pub(crate) fn required_int(data: &ResourceData, key: &str) -> ProviderResult<i64> {
    data.get_int(key)
        .ok_or_else(|| ProviderError::internal(format!("{} is missing required attribute '{key}'", data.kind())))
}

/// Get all resource types
pub fn resource_types() -> Vec<Box<dyn ResourceType<CombinedConfig>>> {
    vec![
        // ====================
        // DNS
        // ====================
        Box::new(domain::DomainType),
        Box::new(record::RecordType),
        // ====================
        // Compute
        // ====================
        Box::new(droplet::DropletType),
        Box::new(droplet_snapshot::DropletSnapshotType),
        Box::new(volume_snapshot::VolumeSnapshotType),
        Box::new(ssh_key::SshKeyType),
        // ====================
        // Networking
        // ====================
        Box::new(reserved_ip::ReservedIpType),
        Box::new(reserved_ip_assignment::ReservedIpAssignmentType),
        Box::new(reserved_ipv6::ReservedIpv6Type),
        Box::new(reserved_ip_assignment::ReservedIpv6AssignmentType),
        Box::new(vpc_peering::VpcPeeringType),
        Box::new(partner_attachment::PartnerAttachmentType),
        Box::new(byoip_prefix::ByoipPrefixType),
        // ====================
        // Spaces
        // ====================
        Box::new(spaces::bucket::BucketType),
        Box::new(spaces::bucket_policy::BucketPolicyType),
        Box::new(spaces::cors::CorsConfigurationType),
        Box::new(spaces::logging::BucketLoggingType),
        Box::new(spaces::key::SpacesKeyType),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resource_type_names_are_unique() {
        let types = resource_types();
        let names: HashSet<&str> = types.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), types.len());
    }

    #[test]
    fn schemas_are_named_after_their_kind() {
        for t in resource_types() {
            assert_eq!(t.schema().resource_type, t.name());
        }
    }

    #[test]
    fn found_clears_id_on_not_found() {
        let mut data = ResourceData::new("domain");
        data.set_id("example.com");
        let result: ProviderResult<()> = Err(ProviderError::not_found("gone"));
        assert!(found(&mut data, result).unwrap().is_none());
        assert!(data.id().is_none());
    }
}
