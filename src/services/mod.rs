pub mod adm3_risk;
pub mod analysis;
pub mod enterprise_risk;
pub mod farmrisk;
pub mod label;
pub mod periods;
pub mod risk;
pub mod verification;
