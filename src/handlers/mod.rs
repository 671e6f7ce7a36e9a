//! HTTP surface, split by access tier:
//!
//! - public: collections (except deforestation), adm3 rollups, enums, auth
//! - token: farm risk verification
//! - admin: deforestation, farm risk, enterprise risk; farm and enterprise
//!   scopes of `/risk/by-ids-and-type` are checked in the handler

pub mod analysis;
pub mod auth;
pub mod collections;
pub mod enterprise_risk;
pub mod enums;
pub mod farmrisk;
pub mod readonly;
pub mod risk;
pub mod system;
pub mod verification;
