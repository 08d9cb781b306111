// scenecraft-common: project document engine and sync protocol types

pub mod domain;
pub mod protocol;
