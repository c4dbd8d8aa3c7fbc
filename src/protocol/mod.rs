//! Protocol module for decoding measurement payloads.
//!
//! This module contains the implementations for:
//! - Flag-header bitfield decoding
//! - Scalar, weight, timestamp and auxiliary field decoding

pub mod flags;
pub mod measurement;

pub use flags::{decode_flag_header, FlagHeader, WeightScaleFlags};
pub use measurement::{
    decode_bmi_and_height, decode_measurement_site, decode_scalar_measurement, decode_timestamp,
    decode_weight_measurement, MeasurementSite,
};
