//! # Custom Resource Definitions
//!
//! Custom resources shared with the on-cluster operator.
//!
//! ## Module Structure
//!
//! - `bkapp.rs` - BkApp specification (`paas.bk.tencent.com/v1alpha2`)
//! - `status.rs` - BkApp status and conditions
//! - `domain_group_mapping.rs` - DomainGroupMapping (`paas.bk.tencent.com/v1alpha1`)

mod bkapp;
mod domain_group_mapping;
mod status;

pub use bkapp::*;
pub use domain_group_mapping::{
    DomainEntry, DomainGroup, DomainGroupMapping, DomainGroupMappingSpec, MappingRef,
    DGM_API_VERSION,
};
pub use status::{
    BkAppStatus, Condition, CONDITION_ADDONS_PROVISIONED, CONDITION_APP_AVAILABLE,
    CONDITION_APP_PROGRESSING, CONDITION_HOOKS_FINISHED,
};
