pub mod bandwidth;
pub mod interfaces;
pub mod processes;
pub mod status;
