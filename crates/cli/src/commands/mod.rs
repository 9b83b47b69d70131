pub mod flag;
pub mod status;
