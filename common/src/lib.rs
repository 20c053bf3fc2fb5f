//! Common types shared between the `petcam` service and its tests.
pub mod detection;
pub mod status;
