//! Collaborator interfaces consumed by the pipeline.
//!
//! The remote compute API and the provisioning collaborator are modeled as
//! object-safe traits so concrete transports can be plugged in without the
//! engine knowing their wire format.

mod api;
mod provisioner;
mod types;

pub use api::ComputeApi;
pub use provisioner::{ConnectTarget, Provisioner};
pub use types::{
    BootConfigId, DiskId, DiskSpec, ImageId, ImagizeSpec, InstanceId, InstanceSpec,
    InstanceStatus, JobId, JobStatus, RemoteJob,
};
