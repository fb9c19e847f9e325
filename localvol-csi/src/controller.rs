//! CSI Controller service implementation.
//!
//! Thin gRPC layer that delegates to DriverState for business logic.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use crate::capability;
use crate::csi;
use crate::driver::DriverState;
use crate::error::{Error, Require};
use crate::types::{VolumeDescriptor, VolumeId};

/// Capabilities advertised by ControllerGetCapabilities, in response order.
const CONTROLLER_CAPABILITIES: [csi::controller_service_capability::rpc::Type; 4] = {
    use csi::controller_service_capability::rpc::Type;
    [
        Type::CreateDeleteVolume,
        Type::PublishUnpublishVolume,
        Type::ListVolumes,
        Type::GetCapacity,
    ]
};

pub struct ControllerService {
    state: Arc<DriverState>,
}

impl ControllerService {
    pub fn new(state: Arc<DriverState>) -> Self {
        Self { state }
    }

    /// Capacity to record for a new volume; 0 when the request names none.
    fn requested_capacity(range: Option<&csi::CapacityRange>) -> i64 {
        match range {
            Some(r) if r.required_bytes > 0 => r.required_bytes,
            Some(r) if r.limit_bytes > 0 => r.limit_bytes,
            _ => 0,
        }
    }

    fn volume_to_proto(descriptor: &VolumeDescriptor) -> csi::Volume {
        csi::Volume {
            volume_id: descriptor.id.as_str().to_string(),
            capacity_bytes: descriptor.capacity_bytes,
            volume_context: descriptor.attributes.clone(),
            content_source: None,
            accessible_topology: vec![],
        }
    }

    /// Slice `volumes` according to a ListVolumes request.
    ///
    /// The token is the decimal offset of the first entry to return. It must
    /// point inside the current list; a token that no longer does (because
    /// volumes were deleted between pages) is rejected.
    fn paginate(
        volumes: &[VolumeDescriptor],
        max_entries: i32,
        starting_token: &str,
    ) -> Result<(Vec<csi::list_volumes_response::Entry>, String), Error> {
        if max_entries < 0 {
            return Err(Error::NegativeMaxEntries(max_entries));
        }

        let start = if starting_token.is_empty() {
            0
        } else {
            match starting_token.parse::<usize>() {
                Ok(start) if start < volumes.len() => start,
                _ => {
                    return Err(Error::InvalidStartingToken {
                        token: starting_token.to_string(),
                    });
                }
            }
        };
        let max = if max_entries > 0 {
            max_entries as usize
        } else {
            volumes.len()
        };

        let entries: Vec<_> = volumes
            .iter()
            .skip(start)
            .take(max)
            .map(|descriptor| csi::list_volumes_response::Entry {
                volume: Some(Self::volume_to_proto(descriptor)),
                status: None,
            })
            .collect();

        let next_token = if start + entries.len() < volumes.len() {
            (start + entries.len()).to_string()
        } else {
            String::new()
        };

        Ok((entries, next_token))
    }
}

#[tonic::async_trait]
impl csi::controller_server::Controller for ControllerService {
    async fn create_volume(
        &self,
        request: Request<csi::CreateVolumeRequest>,
    ) -> Result<Response<csi::CreateVolumeResponse>, Status> {
        let req = request.into_inner();
        let name = req.name.require("volume name")?;
        let id = VolumeId::parse(name)?;

        let capacity = Self::requested_capacity(req.capacity_range.as_ref());
        let descriptor = self.state.create_volume(id, capacity, req.parameters);

        Ok(Response::new(csi::CreateVolumeResponse {
            volume: Some(Self::volume_to_proto(&descriptor)),
        }))
    }

    async fn delete_volume(
        &self,
        request: Request<csi::DeleteVolumeRequest>,
    ) -> Result<Response<csi::DeleteVolumeResponse>, Status> {
        let req = request.into_inner();
        let volume_id = req.volume_id.require("volume ID")?;
        let id = VolumeId::parse(volume_id)?;

        self.state.delete_volume(&id);
        Ok(Response::new(csi::DeleteVolumeResponse {}))
    }

    async fn controller_publish_volume(
        &self,
        request: Request<csi::ControllerPublishVolumeRequest>,
    ) -> Result<Response<csi::ControllerPublishVolumeResponse>, Status> {
        // Volumes have no backing device, so there is nothing to attach.
        let req = request.into_inner();
        debug!(volume_id = %req.volume_id, node_id = %req.node_id, "publish is a no-op");
        Ok(Response::new(csi::ControllerPublishVolumeResponse {
            publish_context: HashMap::new(),
        }))
    }

    async fn controller_unpublish_volume(
        &self,
        request: Request<csi::ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<csi::ControllerUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();
        debug!(volume_id = %req.volume_id, node_id = %req.node_id, "unpublish is a no-op");
        Ok(Response::new(csi::ControllerUnpublishVolumeResponse {}))
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<csi::ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<csi::ValidateVolumeCapabilitiesResponse>, Status> {
        let req = request.into_inner();

        // Unsupported capabilities are reported in the response, not as an error.
        if let Err(e) = capability::validate(&req.volume_capabilities) {
            debug!(volume_id = %req.volume_id, reason = %e, "capabilities not supported");
            return Ok(Response::new(csi::ValidateVolumeCapabilitiesResponse {
                confirmed: None,
                message: e.to_string(),
            }));
        }

        Ok(Response::new(csi::ValidateVolumeCapabilitiesResponse {
            confirmed: Some(csi::validate_volume_capabilities_response::Confirmed {
                volume_context: req.volume_context,
                volume_capabilities: req.volume_capabilities,
                parameters: req.parameters,
                mutable_parameters: req.mutable_parameters,
            }),
            message: String::new(),
        }))
    }

    async fn list_volumes(
        &self,
        request: Request<csi::ListVolumesRequest>,
    ) -> Result<Response<csi::ListVolumesResponse>, Status> {
        let req = request.into_inner();

        let volumes = self.state.list_volumes();
        let (entries, next_token) =
            Self::paginate(&volumes, req.max_entries, &req.starting_token)?;

        Ok(Response::new(csi::ListVolumesResponse {
            entries,
            next_token,
        }))
    }

    async fn get_capacity(
        &self,
        _request: Request<csi::GetCapacityRequest>,
    ) -> Result<Response<csi::GetCapacityResponse>, Status> {
        // No backing store, so capacity is unbounded.
        Ok(Response::new(csi::GetCapacityResponse {
            available_capacity: i64::MAX,
            maximum_volume_size: None,
            minimum_volume_size: None,
        }))
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<csi::ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<csi::ControllerGetCapabilitiesResponse>, Status> {
        let capabilities = CONTROLLER_CAPABILITIES
            .into_iter()
            .map(|t| csi::ControllerServiceCapability {
                r#type: Some(csi::controller_service_capability::Type::Rpc(
                    csi::controller_service_capability::Rpc { r#type: t as i32 },
                )),
            })
            .collect();

        Ok(Response::new(csi::ControllerGetCapabilitiesResponse {
            capabilities,
        }))
    }

    async fn create_snapshot(
        &self,
        _request: Request<csi::CreateSnapshotRequest>,
    ) -> Result<Response<csi::CreateSnapshotResponse>, Status> {
        Err(Status::unimplemented("snapshots are not supported"))
    }

    async fn delete_snapshot(
        &self,
        _request: Request<csi::DeleteSnapshotRequest>,
    ) -> Result<Response<csi::DeleteSnapshotResponse>, Status> {
        Err(Status::unimplemented("snapshots are not supported"))
    }

    async fn list_snapshots(
        &self,
        _request: Request<csi::ListSnapshotsRequest>,
    ) -> Result<Response<csi::ListSnapshotsResponse>, Status> {
        Ok(Response::new(csi::ListSnapshotsResponse {
            entries: vec![],
            next_token: String::new(),
        }))
    }

    async fn controller_expand_volume(
        &self,
        _request: Request<csi::ControllerExpandVolumeRequest>,
    ) -> Result<Response<csi::ControllerExpandVolumeResponse>, Status> {
        Err(Status::unimplemented("volume expansion is not supported"))
    }

    async fn controller_get_volume(
        &self,
        _request: Request<csi::ControllerGetVolumeRequest>,
    ) -> Result<Response<csi::ControllerGetVolumeResponse>, Status> {
        Err(Status::unimplemented("ControllerGetVolume is not supported"))
    }

    async fn controller_modify_volume(
        &self,
        _request: Request<csi::ControllerModifyVolumeRequest>,
    ) -> Result<Response<csi::ControllerModifyVolumeResponse>, Status> {
        Err(Status::unimplemented(
            "volume modification is not supported",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csi::controller_server::Controller;
    use crate::csi::volume_capability::{AccessType, MountVolume};
    use crate::registry::VolumeRegistry;
    use crate::test_util::TestFixture;
    use crate::types::AccessMode;
    use tonic::Code;

    fn create_request(name: &str) -> csi::CreateVolumeRequest {
        csi::CreateVolumeRequest {
            name: name.to_string(),
            capacity_range: None,
            volume_capabilities: vec![],
            parameters: HashMap::new(),
            secrets: HashMap::new(),
            volume_content_source: None,
            accessibility_requirements: None,
            mutable_parameters: HashMap::new(),
        }
    }

    fn delete_request(volume_id: &str) -> csi::DeleteVolumeRequest {
        csi::DeleteVolumeRequest {
            volume_id: volume_id.to_string(),
            secrets: HashMap::new(),
        }
    }

    fn list_request(max_entries: i32, starting_token: &str) -> csi::ListVolumesRequest {
        csi::ListVolumesRequest {
            max_entries,
            starting_token: starting_token.to_string(),
        }
    }

    fn mount_capability(fs_type: &str, mount_flags: &[&str]) -> csi::VolumeCapability {
        csi::VolumeCapability {
            access_type: Some(AccessType::Mount(MountVolume {
                fs_type: fs_type.to_string(),
                mount_flags: mount_flags.iter().map(|f| f.to_string()).collect(),
                volume_mount_group: String::new(),
            })),
            access_mode: None,
        }
    }

    fn validate_request(caps: Vec<csi::VolumeCapability>) -> csi::ValidateVolumeCapabilitiesRequest {
        csi::ValidateVolumeCapabilitiesRequest {
            volume_id: "vol-name".to_string(),
            volume_context: HashMap::new(),
            volume_capabilities: caps,
            parameters: HashMap::new(),
            secrets: HashMap::new(),
            mutable_parameters: HashMap::new(),
        }
    }

    fn listed_ids(response: &csi::ListVolumesResponse) -> Vec<String> {
        response
            .entries
            .iter()
            .map(|e| e.volume.as_ref().unwrap().volume_id.clone())
            .collect()
    }

    #[tokio::test]
    async fn volume_lifecycle() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let first = service
            .create_volume(Request::new(create_request("vol-name")))
            .await
            .expect("CreateVolume should succeed")
            .into_inner()
            .volume
            .expect("volume should exist");
        assert_eq!(first.volume_id, "vol-name");

        let stored = fixture
            .state
            .get_volume(&VolumeId::parse("vol-name").unwrap())
            .expect("volume should be registered");
        assert_eq!(stored.access_mode, AccessMode::Unknown);

        let second = service
            .create_volume(Request::new(create_request("vol-name")))
            .await
            .expect("second CreateVolume should succeed (idempotent)")
            .into_inner()
            .volume
            .expect("volume should exist");
        assert_eq!(first, second);

        let listed = service
            .list_volumes(Request::new(list_request(0, "")))
            .await
            .expect("ListVolumes should succeed")
            .into_inner();
        assert_eq!(listed_ids(&listed), ["vol-name"]);

        service
            .delete_volume(Request::new(delete_request("vol-name")))
            .await
            .expect("DeleteVolume should succeed");

        let listed = service
            .list_volumes(Request::new(list_request(0, "")))
            .await
            .expect("ListVolumes should succeed")
            .into_inner();
        assert!(listed.entries.is_empty());
    }

    #[tokio::test]
    async fn create_volume_requires_name() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let err = service
            .create_volume(Request::new(create_request("")))
            .await
            .expect_err("CreateVolume without name should fail");

        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(fixture.state.registry().is_empty());
    }

    #[tokio::test]
    async fn create_volume_records_capacity_and_parameters() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        let mut request = create_request("vol-name");
        request.capacity_range = Some(csi::CapacityRange {
            required_bytes: 0,
            limit_bytes: 1 << 30,
        });
        request
            .parameters
            .insert("tier".to_string(), "fast".to_string());

        let volume = service
            .create_volume(Request::new(request))
            .await
            .expect("CreateVolume should succeed")
            .into_inner()
            .volume
            .expect("volume should exist");

        assert_eq!(volume.capacity_bytes, 1 << 30);
        assert_eq!(volume.volume_context.get("tier").map(String::as_str), Some("fast"));
    }

    #[tokio::test]
    async fn create_volume_returns_existing_volume_for_different_request() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        service
            .create_volume(Request::new(create_request("vol-name")))
            .await
            .expect("CreateVolume should succeed");

        let mut request = create_request("vol-name");
        request.capacity_range = Some(csi::CapacityRange {
            required_bytes: 1 << 30,
            limit_bytes: 0,
        });
        let volume = service
            .create_volume(Request::new(request))
            .await
            .expect("CreateVolume should succeed")
            .into_inner()
            .volume
            .expect("volume should exist");

        assert_eq!(volume.capacity_bytes, 0);
        assert_eq!(fixture.state.registry().len(), 1);
    }

    #[tokio::test]
    async fn delete_volume_requires_volume_id() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let err = service
            .delete_volume(Request::new(delete_request("")))
            .await
            .expect_err("DeleteVolume without volume_id should fail");

        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn delete_volume_is_idempotent_for_nonexistent_volume() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        service
            .create_volume(Request::new(create_request("vol-name")))
            .await
            .expect("CreateVolume should succeed");

        service
            .delete_volume(Request::new(delete_request("unknown")))
            .await
            .expect("DeleteVolume for nonexistent volume should succeed (idempotent)");
        service
            .delete_volume(Request::new(delete_request("unknown")))
            .await
            .expect("second call should also succeed");

        assert_eq!(fixture.state.registry().len(), 1);
    }

    #[tokio::test]
    async fn list_volumes_returns_empty_when_no_volumes() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let list = service
            .list_volumes(Request::new(list_request(0, "")))
            .await
            .expect("ListVolumes should succeed")
            .into_inner();

        assert!(list.entries.is_empty());
        assert!(list.next_token.is_empty());
    }

    #[tokio::test]
    async fn list_volumes_supports_pagination() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        for i in 0..3 {
            service
                .create_volume(Request::new(create_request(&format!("test-volume-{i}"))))
                .await
                .expect("CreateVolume should succeed");
        }

        let list1 = service
            .list_volumes(Request::new(list_request(2, "")))
            .await
            .expect("ListVolumes should succeed")
            .into_inner();
        assert_eq!(listed_ids(&list1), ["test-volume-0", "test-volume-1"]);
        assert_eq!(list1.next_token, "2");

        let list2 = service
            .list_volumes(Request::new(list_request(2, &list1.next_token)))
            .await
            .expect("ListVolumes should succeed")
            .into_inner();
        assert_eq!(listed_ids(&list2), ["test-volume-2"]);
        assert!(list2.next_token.is_empty());
    }

    #[tokio::test]
    async fn list_volumes_rejects_negative_max_entries() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let err = service
            .list_volumes(Request::new(list_request(-1, "")))
            .await
            .expect_err("negative max_entries should fail");

        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn list_volumes_rejects_stale_token() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        service
            .create_volume(Request::new(create_request("vol-name")))
            .await
            .expect("CreateVolume should succeed");

        for token in ["1", "not-a-number"] {
            let err = service
                .list_volumes(Request::new(list_request(0, token)))
                .await
                .expect_err("invalid token should fail");
            assert_eq!(err.code(), Code::Aborted, "token {token:?}");
        }
    }

    #[tokio::test]
    async fn validate_volume_capabilities_confirms_plain_mounts() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        let caps = vec![mount_capability("", &["", ""])];

        let response = service
            .validate_volume_capabilities(Request::new(validate_request(caps.clone())))
            .await
            .expect("ValidateVolumeCapabilities should succeed")
            .into_inner();

        let confirmed = response.confirmed.expect("capabilities should be confirmed");
        assert_eq!(confirmed.volume_capabilities, caps);
        assert!(response.message.is_empty());
    }

    #[tokio::test]
    async fn validate_volume_capabilities_confirms_empty_list() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let response = service
            .validate_volume_capabilities(Request::new(validate_request(vec![])))
            .await
            .expect("ValidateVolumeCapabilities should succeed")
            .into_inner();

        assert!(response.confirmed.is_some());
    }

    #[tokio::test]
    async fn validate_volume_capabilities_reports_fs_type() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        let caps = vec![mount_capability("", &["ro"]), mount_capability("ext4", &[])];

        let response = service
            .validate_volume_capabilities(Request::new(validate_request(caps)))
            .await
            .expect("unsupported capabilities are not an error")
            .into_inner();

        assert!(response.confirmed.is_none());
        assert_eq!(response.message, "Specifying FsType is unsupported.");
    }

    #[tokio::test]
    async fn validate_volume_capabilities_reports_mount_flags() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        let caps = vec![mount_capability("", &["", "noatime"])];

        let response = service
            .validate_volume_capabilities(Request::new(validate_request(caps)))
            .await
            .expect("unsupported capabilities are not an error")
            .into_inner();

        assert!(response.confirmed.is_none());
        assert_eq!(response.message, "Specifying mount flags is unsupported.");
    }

    #[tokio::test]
    async fn validate_volume_capabilities_does_not_require_volume() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();
        let mut request = validate_request(vec![mount_capability("", &[])]);
        request.volume_id = String::new();

        let response = service
            .validate_volume_capabilities(Request::new(request))
            .await
            .expect("ValidateVolumeCapabilities should succeed")
            .into_inner();

        assert!(response.confirmed.is_some());
    }

    #[tokio::test]
    async fn publish_and_unpublish_always_succeed() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let published = service
            .controller_publish_volume(Request::new(csi::ControllerPublishVolumeRequest {
                volume_id: "vol-name".to_string(),
                node_id: "node-1".to_string(),
                volume_capability: None,
                readonly: false,
                secrets: HashMap::new(),
                volume_context: HashMap::new(),
            }))
            .await
            .expect("ControllerPublishVolume should succeed")
            .into_inner();
        assert!(published.publish_context.is_empty());

        for _ in 0..2 {
            service
                .controller_unpublish_volume(Request::new(
                    csi::ControllerUnpublishVolumeRequest {
                        volume_id: "vol-name".to_string(),
                        node_id: "node-1".to_string(),
                        secrets: HashMap::new(),
                    },
                ))
                .await
                .expect("ControllerUnpublishVolume should succeed");
        }
        assert!(fixture.state.registry().is_empty());
    }

    #[tokio::test]
    async fn get_capacity_is_unbounded() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let response = service
            .get_capacity(Request::new(csi::GetCapacityRequest {
                volume_capabilities: vec![],
                parameters: HashMap::new(),
                accessible_topology: None,
            }))
            .await
            .expect("GetCapacity should succeed")
            .into_inner();

        assert_eq!(response.available_capacity, i64::MAX);
    }

    #[tokio::test]
    async fn controller_get_capabilities_returns_fixed_list() {
        use csi::controller_service_capability::rpc::Type;

        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let caps = service
            .controller_get_capabilities(Request::new(csi::ControllerGetCapabilitiesRequest {}))
            .await
            .expect("ControllerGetCapabilities should succeed")
            .into_inner()
            .capabilities;

        let types: Vec<_> = caps
            .iter()
            .map(|cap| match &cap.r#type {
                Some(csi::controller_service_capability::Type::Rpc(rpc)) => rpc.r#type,
                None => panic!("capability without type"),
            })
            .collect();

        assert_eq!(
            types,
            [
                Type::CreateDeleteVolume as i32,
                Type::PublishUnpublishVolume as i32,
                Type::ListVolumes as i32,
                Type::GetCapacity as i32,
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_operations() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let err = service
            .create_snapshot(Request::new(csi::CreateSnapshotRequest {
                source_volume_id: "vol-name".to_string(),
                name: "snap".to_string(),
                secrets: HashMap::new(),
                parameters: HashMap::new(),
            }))
            .await
            .expect_err("CreateSnapshot should be unimplemented");
        assert_eq!(err.code(), Code::Unimplemented);

        let err = service
            .delete_snapshot(Request::new(csi::DeleteSnapshotRequest {
                snapshot_id: "snap".to_string(),
                secrets: HashMap::new(),
            }))
            .await
            .expect_err("DeleteSnapshot should be unimplemented");
        assert_eq!(err.code(), Code::Unimplemented);

        let list = service
            .list_snapshots(Request::new(csi::ListSnapshotsRequest {
                max_entries: 0,
                starting_token: String::new(),
                source_volume_id: String::new(),
                snapshot_id: String::new(),
                secrets: HashMap::new(),
            }))
            .await
            .expect("ListSnapshots should succeed")
            .into_inner();
        assert!(list.entries.is_empty());
        assert!(list.next_token.is_empty());
    }

    #[tokio::test]
    async fn unadvertised_operations_are_unimplemented() {
        let fixture = TestFixture::new();
        let service = fixture.controller_service();

        let err = service
            .controller_get_volume(Request::new(csi::ControllerGetVolumeRequest {
                volume_id: "vol-name".to_string(),
            }))
            .await
            .expect_err("ControllerGetVolume should be unimplemented");
        assert_eq!(err.code(), Code::Unimplemented);

        let err = service
            .controller_expand_volume(Request::new(csi::ControllerExpandVolumeRequest {
                volume_id: "vol-name".to_string(),
                capacity_range: None,
                secrets: HashMap::new(),
                volume_capability: None,
            }))
            .await
            .expect_err("ControllerExpandVolume should be unimplemented");
        assert_eq!(err.code(), Code::Unimplemented);

        let err = service
            .controller_modify_volume(Request::new(csi::ControllerModifyVolumeRequest {
                volume_id: "vol-name".to_string(),
                secrets: HashMap::new(),
                mutable_parameters: HashMap::new(),
            }))
            .await
            .expect_err("ControllerModifyVolume should be unimplemented");
        assert_eq!(err.code(), Code::Unimplemented);
    }
}
