// Radar: rising-post momentum detection for Reddit
//
// This is the library root. Each module corresponds to one subsystem:
// the momentum state machine, the per-community monitor loops, the Reddit
// client they poll through, and the alert sink they report to.

pub mod alert;
pub mod config;
pub mod momentum;
pub mod monitor;
pub mod output;
pub mod reddit;
pub mod status;
