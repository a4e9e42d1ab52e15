//! # Equipment Interface
//!
//! This module defines the interface structures which will be sent to equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod mech;
