#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod dcu_hal;
pub mod dcu_mock;

pub use dcu_hal::{DcuConfig, DcuDriver, VoltageCalibration};
pub use dcu_mock::DcuDriverMock;
